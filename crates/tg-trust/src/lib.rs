//! # tg-trust
//!
//! Publisher trust and content signatures for template-guard.
//!
//! - [`PublisherRegistry`] tracks known publishers on an ordered trust
//!   hierarchy and decides how much trust a template's claimed publisher
//!   earns.
//! - [`TemplateSigner`] creates and verifies HMAC-SHA256 signatures over
//!   template content, with a short-lived verification cache.
//!
//! Both return decisions as values. Errors are reserved for invalid input
//! such as an empty publisher id or malformed import JSON.

pub mod error;
pub mod publisher;
pub mod signer;

pub use error::TrustError;
pub use publisher::{
    NewPublisher, PublisherEntry, PublisherInfo, PublisherQuery, PublisherRegistry, RegistryConfig,
    TrustLevel,
};
pub use signer::{
    fingerprint, SignatureVerification, SignerConfig, TemplateSignature, TemplateSigner, ALGORITHM,
};
