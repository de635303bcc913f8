// context.rs - Host-side composition of the evaluators.
//
// The evaluators never call each other. `SecurityContext` is the host glue:
// it owns one of each, built from a single `GuardConfig` and secret key,
// runs them in sequence for a template, and records every finding in the
// audit log. Each `check_*` helper runs exactly one evaluator and audits
// its negative outcome.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tg_audit::{AlertSink, AuditEvent, AuditEventType, AuditLog, AuditSeverity, SecretKey};
use tg_command::{
    DangerousCommandDetector, DangerousCommandMatch, InjectionPreventer, ProcessedCommand, Severity,
};
use tg_policy::{
    FileOperation, FilesystemRestrictor, Operation, PathValidation, PermissionCheck, PermissionEngine,
    PermissionLevel, PermissionSet,
};
use tg_trust::{PublisherRegistry, SignatureVerification, TemplateSigner, TrustLevel};

use crate::config::GuardConfig;
use crate::error::ConfigError;
use crate::metadata::GuardedTemplate;

/// The combined verdict for one template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateAssessment {
    pub template_id: String,
    /// False iff the signature is invalid, a command reaches the block
    /// threshold, or the template needs a higher level than was granted.
    /// Publisher trust never vetoes: an untrusted or unknown publisher is
    /// reported through `publisher_trusted` and left for the host to act on.
    pub allowed: bool,
    /// Absent when the template is unsigned.
    pub signature: Option<SignatureVerification>,
    /// Trust earned by the claimed publisher, or the registry default.
    pub trust_level: TrustLevel,
    /// `RegistryConfig::allow_untrusted` applied to the claimed publisher.
    /// Absent when no publisher is claimed. Does not affect `allowed`.
    pub publisher_trusted: Option<bool>,
    pub matches: Vec<DangerousCommandMatch>,
    pub blocked_by_commands: bool,
    pub required_level: PermissionLevel,
    pub requires_escalation: bool,
    /// Human-readable reasons for a refusal, in check order.
    pub reasons: Vec<String>,
}

pub struct SecurityContext {
    config: GuardConfig,
    permissions: PermissionEngine,
    detector: DangerousCommandDetector,
    injection: InjectionPreventer,
    filesystem: FilesystemRestrictor,
    registry: PublisherRegistry,
    audit: AuditLog,
    signer: TemplateSigner,
}

impl SecurityContext {
    /// Builds every evaluator. `key` keys both audit integrity and signatures.
    pub fn new(config: GuardConfig, key: SecretKey) -> Result<Self, ConfigError> {
        let detector = DangerousCommandDetector::new(config.detector.clone())?;
        Ok(Self {
            permissions: PermissionEngine::new(),
            detector,
            injection: InjectionPreventer::new(config.injection.clone()),
            filesystem: FilesystemRestrictor::new(config.filesystem.clone()),
            registry: PublisherRegistry::new(config.registry.clone()),
            audit: AuditLog::new(config.audit.clone(), key.clone()),
            signer: TemplateSigner::new(key, config.signer.clone()),
            config,
        })
    }

    pub fn with_alert_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.audit = self.audit.with_alert_sink(sink);
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn permissions(&self) -> &PermissionEngine {
        &self.permissions
    }

    pub fn detector(&self) -> &DangerousCommandDetector {
        &self.detector
    }

    pub fn injection(&self) -> &InjectionPreventer {
        &self.injection
    }

    pub fn filesystem(&self) -> &FilesystemRestrictor {
        &self.filesystem
    }

    pub fn registry(&self) -> &PublisherRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PublisherRegistry {
        &mut self.registry
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn audit_mut(&mut self) -> &mut AuditLog {
        &mut self.audit
    }

    pub fn signer(&self) -> &TemplateSigner {
        &self.signer
    }

    pub fn default_permission_set(&self) -> PermissionSet {
        self.config.default_permission_set()
    }

    /// Runs signature, trust, command and escalation checks for a template
    /// about to run with `granted`, and audits the outcome.
    pub fn assess_template(&mut self, guarded: &GuardedTemplate, granted: &PermissionSet) -> TemplateAssessment {
        let template = &guarded.template;
        let mut reasons = Vec::new();

        // Step 1: signature, if the template carries one.
        let signature = guarded
            .signature()
            .map(|sig| self.signer.verify_template(template, sig));
        if let Some(result) = signature.as_ref().filter(|r| !r.valid) {
            let error = result.error.clone().unwrap_or_default();
            reasons.push(format!("signature verification failed: {}", error));
            self.record(
                guarded,
                AuditEventType::SignatureVerification,
                AuditSeverity::High,
                json!({ "signer": result.signer, "error": error }),
            );
        }

        // Step 2: publisher trust.
        let (trust_level, publisher_trusted) = match guarded.publisher() {
            Some(info) => (self.registry.inherit_trust(info), Some(self.registry.is_trusted(&info.id))),
            None => (self.registry.config().default_trust_level, None),
        };
        if let Some(info) = guarded.publisher() {
            if trust_level < info.trust_level {
                self.record(
                    guarded,
                    AuditEventType::PublisherTrust,
                    AuditSeverity::Low,
                    json!({
                        "publisher": info.id,
                        "claimed": info.trust_level,
                        "granted": trust_level,
                    }),
                );
            }
        }

        // Step 3: dangerous commands.
        let matches = self.detector.scan_template(template);
        for m in &matches {
            self.record(
                guarded,
                AuditEventType::DangerousCommand,
                audit_severity(m.severity),
                json!({
                    "commandId": m.command_id,
                    "stepId": m.step_id,
                    "pattern": m.pattern,
                    "category": m.category,
                    "reason": m.reason,
                }),
            );
        }
        let blocked_by_commands = self.detector.should_block(&matches);
        if blocked_by_commands {
            reasons.push(format!(
                "dangerous commands at or above '{}' severity",
                self.detector.config().block_threshold
            ));
        }

        // Step 4: escalation.
        let required_level = guarded.required_level().unwrap_or(granted.level());
        let requires_escalation = self
            .permissions
            .requires_escalation(granted.level(), required_level);
        if requires_escalation {
            reasons.push(format!(
                "requires level '{}' but '{}' was granted",
                required_level,
                granted.level()
            ));
            self.record(
                guarded,
                AuditEventType::PermissionDenied,
                AuditSeverity::Medium,
                json!({ "granted": granted.level(), "required": required_level }),
            );
        }

        let signature_ok = signature.as_ref().map_or(true, |r| r.valid);
        let allowed = signature_ok && !blocked_by_commands && !requires_escalation;

        self.record(
            guarded,
            AuditEventType::TemplateLoad,
            if allowed { AuditSeverity::Info } else { AuditSeverity::High },
            json!({
                "allowed": allowed,
                "signed": signature.is_some(),
                "trustLevel": trust_level,
                "matches": matches.len(),
                "requiresEscalation": requires_escalation,
            }),
        );
        tracing::info!(
            template_id = %template.id,
            allowed,
            matches = matches.len(),
            "template assessed"
        );

        TemplateAssessment {
            template_id: template.id.clone(),
            allowed,
            signature,
            trust_level,
            publisher_trusted,
            matches,
            blocked_by_commands,
            required_level,
            requires_escalation,
            reasons,
        }
    }

    /// Permission check for one operation. Denials are audited.
    pub fn check_operation(&mut self, template_id: &str, set: &PermissionSet, operation: Operation) -> PermissionCheck {
        let check = self.permissions.check_permission(set, operation);
        if !check.allowed {
            self.log(
                AuditEvent::new(AuditEventType::PermissionDenied, AuditSeverity::Medium, template_id).with_details(
                    json!({
                        "operation": operation,
                        "level": set.level(),
                        "reason": check.reason,
                    }),
                ),
            );
        }
        check
    }

    /// Filesystem check for one path. Violations are audited.
    pub fn check_path(&mut self, template_id: &str, path: &str, operation: FileOperation) -> PathValidation {
        let validation = self.filesystem.validate_path(path, operation);
        if !validation.valid {
            self.log(
                AuditEvent::new(AuditEventType::PathViolation, AuditSeverity::High, template_id).with_details(json!({
                    "path": path,
                    "operation": operation,
                    "violation": validation.violation,
                    "reason": validation.reason,
                })),
            );
        }
        validation
    }

    /// Interpolates and screens a command. Unsafe results are audited.
    pub fn check_command(
        &mut self,
        template_id: &str,
        command: &str,
        variables: &HashMap<String, String>,
    ) -> ProcessedCommand {
        let processed = self.injection.process_command(command, variables);
        if !processed.safe {
            self.log(
                AuditEvent::new(AuditEventType::InjectionAttempt, AuditSeverity::High, template_id).with_details(
                    json!({
                        "command": processed.command,
                        "issues": processed.issues,
                    }),
                ),
            );
        }
        processed
    }

    fn record(&mut self, guarded: &GuardedTemplate, event_type: AuditEventType, severity: AuditSeverity, details: serde_json::Value) {
        let template = &guarded.template;
        self.log(
            AuditEvent::new(event_type, severity, template.id.as_str())
                .with_version(template.version.as_str())
                .with_details(details),
        );
    }

    fn log(&mut self, event: AuditEvent) {
        self.audit.log_event(event);
    }
}

fn audit_severity(severity: Severity) -> AuditSeverity {
    match severity {
        Severity::Low => AuditSeverity::Low,
        Severity::Medium => AuditSeverity::Medium,
        Severity::High => AuditSeverity::High,
        Severity::Critical => AuditSeverity::Critical,
    }
}
