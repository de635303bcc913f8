//! # tg-policy
//!
//! Permission and filesystem policy for template-guard.
//!
//! Two independent evaluators live here:
//!
//! - [`PermissionEngine`] checks an operation against a [`PermissionSet`]:
//!   one of four ordered levels (restricted < standard < elevated < trusted)
//!   with a fixed operation table, plus optional per-operation [`Restriction`]s.
//! - [`FilesystemRestrictor`] validates a concrete path for a read or write.
//!
//! ## Key invariants
//!
//! - **Level tables are fixed**: a set's allowed operations always come from
//!   its level. Restrictions narrow, they never grant.
//! - **Decisions are data**: denials come back as [`PermissionCheck`] /
//!   [`PathValidation`] values, never as errors.
//! - **Traversal first**: ".." in the raw path is rejected before the path
//!   is normalized.

pub mod error;
pub mod filesystem;
pub mod permission;

pub use error::PolicyError;
pub use filesystem::{
    normalize_path, FileOperation, FilesystemConfig, FilesystemRestrictor, PathValidation,
    PathViolation,
};
pub use permission::{
    Operation, PermissionCheck, PermissionEngine, PermissionLevel, PermissionSet, Restriction,
};
