// metadata.rs - Security metadata carried alongside a template.

use serde::{Deserialize, Serialize};
use tg_command::Template;
use tg_policy::PermissionLevel;
use tg_trust::{PublisherInfo, TemplateSignature};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<PublisherInfo>,

    /// Signature over the canonical JSON of the template, excluding this block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<TemplateSignature>,

    /// Level the template needs to run. Absent means "whatever was granted".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_level: Option<PermissionLevel>,
}

/// A template together with its security block, as it appears on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardedTemplate {
    #[serde(flatten)]
    pub template: Template,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityMetadata>,
}

impl GuardedTemplate {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            security: None,
        }
    }

    pub fn with_security(mut self, security: SecurityMetadata) -> Self {
        self.security = Some(security);
        self
    }

    pub fn publisher(&self) -> Option<&PublisherInfo> {
        self.security.as_ref()?.publisher.as_ref()
    }

    pub fn signature(&self) -> Option<&TemplateSignature> {
        self.security.as_ref()?.signature.as_ref()
    }

    pub fn required_level(&self) -> Option<PermissionLevel> {
        self.security.as_ref()?.required_level
    }
}
