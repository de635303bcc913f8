// permission.rs - Four-tier permission model.
//
// Every template runs at one of four ordered levels:
//
//   restricted < standard < elevated < trusted
//
// A level fixes the set of operations a template may perform and whether
// the host must confirm with the user first. Restrictions narrow an allowed
// operation to specific path prefixes and can force confirmation; they never
// grant an operation the level does not already allow.
//
// Checks never fail with an error. A restriction that lists both allowed and
// denied paths is reported as a denial with its own reason, so the caller
// sees the misconfiguration at the point of use.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// A capability a template step may need.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    FileRead,
    FileWrite,
    ProcessSpawn,
    NetworkAccess,
    EnvAccess,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::FileRead,
        Operation::FileWrite,
        Operation::ProcessSpawn,
        Operation::NetworkAccess,
        Operation::EnvAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::FileRead => "fileRead",
            Operation::FileWrite => "fileWrite",
            Operation::ProcessSpawn => "processSpawn",
            Operation::NetworkAccess => "networkAccess",
            Operation::EnvAccess => "envAccess",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| PolicyError::UnknownOperation(s.to_string()))
    }
}

/// Permission tiers, lowest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Restricted,
    Standard,
    Elevated,
    Trusted,
}

impl PermissionLevel {
    /// The fixed hierarchy, lowest first.
    pub const ALL: [PermissionLevel; 4] = [
        PermissionLevel::Restricted,
        PermissionLevel::Standard,
        PermissionLevel::Elevated,
        PermissionLevel::Trusted,
    ];

    /// Position in the hierarchy.
    pub fn index(&self) -> usize {
        match self {
            PermissionLevel::Restricted => 0,
            PermissionLevel::Standard => 1,
            PermissionLevel::Elevated => 2,
            PermissionLevel::Trusted => 3,
        }
    }

    /// The fixed operation table for this level.
    pub fn allowed_operations(&self) -> &'static [Operation] {
        match self {
            PermissionLevel::Restricted => &[Operation::FileRead],
            PermissionLevel::Standard => &[
                Operation::FileRead,
                Operation::FileWrite,
                Operation::EnvAccess,
            ],
            PermissionLevel::Elevated => &[
                Operation::FileRead,
                Operation::FileWrite,
                Operation::ProcessSpawn,
                Operation::EnvAccess,
            ],
            PermissionLevel::Trusted => &Operation::ALL,
        }
    }

    /// Whether operations at this level need user confirmation by default.
    pub fn requires_confirmation(&self) -> bool {
        match self {
            PermissionLevel::Restricted => true,
            PermissionLevel::Standard => false,
            PermissionLevel::Elevated => true,
            PermissionLevel::Trusted => false,
        }
    }

    pub fn allows(&self, operation: Operation) -> bool {
        self.allowed_operations().contains(&operation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Restricted => "restricted",
            PermissionLevel::Standard => "standard",
            PermissionLevel::Elevated => "elevated",
            PermissionLevel::Trusted => "trusted",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| PolicyError::UnknownLevel(s.to_string()))
    }
}

/// Narrows one operation to path prefixes and/or forces confirmation.
///
/// At most one of `allowed_paths` / `denied_paths` may be non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Restriction {
    pub operation: Operation,
    #[serde(default)]
    pub allowed_paths: BTreeSet<String>,
    #[serde(default)]
    pub denied_paths: BTreeSet<String>,
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl Restriction {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            allowed_paths: BTreeSet::new(),
            denied_paths: BTreeSet::new(),
            requires_confirmation: false,
        }
    }

    pub fn allow_path(mut self, path: impl Into<String>) -> Self {
        self.allowed_paths.insert(path.into());
        self
    }

    pub fn deny_path(mut self, path: impl Into<String>) -> Self {
        self.denied_paths.insert(path.into());
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    /// Reject restrictions that list both allowed and denied paths.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.allowed_paths.is_empty() && !self.denied_paths.is_empty() {
            return Err(PolicyError::ConflictingPathLists {
                operation: self.operation.to_string(),
            });
        }
        Ok(())
    }
}

/// A level plus its restrictions.
///
/// `allowed_operations` always equals the level's fixed table. Sets are
/// never edited in place; every change returns a new set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", from = "PermissionSetRepr")]
pub struct PermissionSet {
    level: PermissionLevel,
    allowed_operations: BTreeSet<Operation>,
    restrictions: Vec<Restriction>,
}

/// Wire form. `allowed_operations` is ignored on input and rebuilt from `level`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionSetRepr {
    level: PermissionLevel,
    #[serde(default)]
    restrictions: Vec<Restriction>,
}

impl From<PermissionSetRepr> for PermissionSet {
    fn from(repr: PermissionSetRepr) -> Self {
        PermissionSet::for_level(repr.level).with_restrictions(repr.restrictions)
    }
}

impl PermissionSet {
    /// Factory: the default set for a level, with no restrictions.
    pub fn for_level(level: PermissionLevel) -> Self {
        Self {
            level,
            allowed_operations: level.allowed_operations().iter().copied().collect(),
            restrictions: Vec::new(),
        }
    }

    pub fn level(&self) -> PermissionLevel {
        self.level
    }

    pub fn allowed_operations(&self) -> &BTreeSet<Operation> {
        &self.allowed_operations
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    /// A new set with `restriction` added, replacing any existing
    /// restriction for the same operation.
    pub fn with_restriction(&self, restriction: Restriction) -> Self {
        let mut restrictions: Vec<Restriction> = self
            .restrictions
            .iter()
            .filter(|r| r.operation != restriction.operation)
            .cloned()
            .collect();
        restrictions.push(restriction);
        Self {
            restrictions,
            ..self.clone()
        }
    }

    /// A new set without the restriction for `operation`, if any.
    pub fn without_restriction(&self, operation: Operation) -> Self {
        Self {
            restrictions: self
                .restrictions
                .iter()
                .filter(|r| r.operation != operation)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    /// A new set at `target` that keeps this set's restrictions.
    pub fn upgraded_to(&self, target: PermissionLevel) -> Self {
        PermissionSet::for_level(target).with_restrictions(self.restrictions.clone())
    }

    fn with_restrictions(self, restrictions: Vec<Restriction>) -> Self {
        Self {
            restrictions,
            ..self
        }
    }
}

/// The result of a permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheck {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub requires_confirmation: bool,
    /// The restriction the caller must apply to the concrete path, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restriction: Option<Restriction>,
}

impl PermissionCheck {
    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            requires_confirmation: false,
            restriction: None,
        }
    }

    fn allow(requires_confirmation: bool, restriction: Option<Restriction>) -> Self {
        Self {
            allowed: true,
            reason: None,
            requires_confirmation,
            restriction,
        }
    }
}

/// Evaluates permission sets. Holds no state; every method is a pure
/// function of its arguments and the fixed level tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionEngine;

impl PermissionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Check whether `operation` may run under `set`.
    pub fn check_permission(&self, set: &PermissionSet, operation: Operation) -> PermissionCheck {
        // Step 1: the level's fixed table.
        if !set.allowed_operations.contains(&operation) {
            tracing::debug!(%operation, level = %set.level, "operation denied by level");
            return PermissionCheck::deny(not_allowed_reason(operation.as_str(), set.level));
        }

        // Step 2: an applicable restriction, if any.
        match set.restrictions.iter().find(|r| r.operation == operation) {
            Some(restriction) => {
                if let Err(e) = restriction.validate() {
                    tracing::warn!(%operation, "invalid restriction configuration: {}", e);
                    return PermissionCheck::deny(
                        "cannot have both allowed and denied paths".to_string(),
                    );
                }
                PermissionCheck::allow(
                    restriction.requires_confirmation || set.level.requires_confirmation(),
                    Some(restriction.clone()),
                )
            }
            None => PermissionCheck::allow(set.level.requires_confirmation(), None),
        }
    }

    /// Like [`check_permission`](Self::check_permission) for an operation
    /// given by name. Unknown names are denied, never rejected.
    pub fn check_permission_named(&self, set: &PermissionSet, operation: &str) -> PermissionCheck {
        match operation.parse::<Operation>() {
            Ok(op) => self.check_permission(set, op),
            Err(_) => {
                tracing::debug!(operation, level = %set.level, "unknown operation denied");
                PermissionCheck::deny(not_allowed_reason(operation, set.level))
            }
        }
    }

    /// Apply a restriction's path lists to a concrete path.
    ///
    /// Denied prefixes win; a non-empty allow list is default-deny.
    pub fn validate_path(&self, path: &str, restriction: &Restriction) -> bool {
        if restriction
            .denied_paths
            .iter()
            .any(|denied| path.starts_with(denied.as_str()))
        {
            return false;
        }
        if restriction.allowed_paths.is_empty() {
            return true;
        }
        restriction
            .allowed_paths
            .iter()
            .any(|allowed| path.starts_with(allowed.as_str()))
    }

    /// True iff `required` sits strictly above `current` in the hierarchy.
    pub fn requires_escalation(&self, current: PermissionLevel, required: PermissionLevel) -> bool {
        required.index() > current.index()
    }

    /// A new set at `target` with `current`'s restrictions carried over.
    pub fn upgrade_permission(&self, current: &PermissionSet, target: PermissionLevel) -> PermissionSet {
        tracing::info!(from = %current.level, to = %target, "permission level changed");
        current.upgraded_to(target)
    }

    /// The lowest level whose fixed table includes `operation`.
    pub fn minimum_level_for(&self, operation: Operation) -> PermissionLevel {
        PermissionLevel::ALL
            .iter()
            .copied()
            .find(|level| level.allows(operation))
            .unwrap_or(PermissionLevel::Trusted)
    }
}

fn not_allowed_reason(operation: &str, level: PermissionLevel) -> String {
    format!("operation '{}' not allowed at level '{}'", operation, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PermissionEngine {
        PermissionEngine::new()
    }

    #[test]
    fn each_level_grants_exactly_its_table() {
        for level in PermissionLevel::ALL {
            let set = PermissionSet::for_level(level);
            for op in Operation::ALL {
                let check = engine().check_permission(&set, op);
                assert_eq!(
                    check.allowed,
                    level.allowed_operations().contains(&op),
                    "{} at {}",
                    op,
                    level
                );
                if check.allowed {
                    assert_eq!(check.requires_confirmation, level.requires_confirmation());
                    assert!(check.restriction.is_none());
                } else {
                    assert_eq!(
                        check.reason.as_deref(),
                        Some(format!("operation '{}' not allowed at level '{}'", op, level).as_str())
                    );
                }
            }
        }
    }

    #[test]
    fn level_tables_match_expected_sets() {
        use Operation::*;
        assert_eq!(PermissionLevel::Restricted.allowed_operations(), &[FileRead]);
        assert_eq!(
            PermissionLevel::Standard.allowed_operations(),
            &[FileRead, FileWrite, EnvAccess]
        );
        assert_eq!(
            PermissionLevel::Elevated.allowed_operations(),
            &[FileRead, FileWrite, ProcessSpawn, EnvAccess]
        );
        assert_eq!(PermissionLevel::Trusted.allowed_operations().len(), 5);
        assert!(PermissionLevel::Restricted.requires_confirmation());
        assert!(!PermissionLevel::Standard.requires_confirmation());
        assert!(PermissionLevel::Elevated.requires_confirmation());
        assert!(!PermissionLevel::Trusted.requires_confirmation());
    }

    #[test]
    fn restriction_cannot_grant_a_missing_operation() {
        let set = PermissionSet::for_level(PermissionLevel::Restricted)
            .with_restriction(Restriction::new(Operation::NetworkAccess).allow_path("/tmp"));
        let check = engine().check_permission(&set, Operation::NetworkAccess);
        assert!(!check.allowed);
    }

    #[test]
    fn valid_restriction_is_returned_and_can_force_confirmation() {
        let restriction = Restriction::new(Operation::FileWrite)
            .allow_path("/workspace")
            .requiring_confirmation();
        let set = PermissionSet::for_level(PermissionLevel::Trusted).with_restriction(restriction.clone());

        let check = engine().check_permission(&set, Operation::FileWrite);
        assert!(check.allowed);
        assert!(check.requires_confirmation);
        assert_eq!(check.restriction, Some(restriction));
    }

    #[test]
    fn level_confirmation_applies_even_with_lenient_restriction() {
        let set = PermissionSet::for_level(PermissionLevel::Elevated)
            .with_restriction(Restriction::new(Operation::ProcessSpawn));
        let check = engine().check_permission(&set, Operation::ProcessSpawn);
        assert!(check.allowed);
        assert!(check.requires_confirmation);
    }

    #[test]
    fn conflicting_restriction_is_a_configuration_denial() {
        let bad = Restriction::new(Operation::FileRead)
            .allow_path("/workspace")
            .deny_path("/workspace/secret");
        for level in PermissionLevel::ALL {
            let set = PermissionSet::for_level(level).with_restriction(bad.clone());
            let check = engine().check_permission(&set, Operation::FileRead);
            assert!(!check.allowed);
            assert_eq!(
                check.reason.as_deref(),
                Some("cannot have both allowed and denied paths")
            );
        }
        assert!(matches!(
            bad.validate(),
            Err(PolicyError::ConflictingPathLists { .. })
        ));
    }

    #[test]
    fn unknown_operation_name_is_denied() {
        let set = PermissionSet::for_level(PermissionLevel::Trusted);
        let check = engine().check_permission_named(&set, "rootkitInstall");
        assert!(!check.allowed);
        assert_eq!(
            check.reason.as_deref(),
            Some("operation 'rootkitInstall' not allowed at level 'trusted'")
        );

        assert!(engine().check_permission_named(&set, "networkAccess").allowed);
    }

    #[test]
    fn validate_path_applies_deny_then_allow() {
        let deny = Restriction::new(Operation::FileRead).deny_path("/secret");
        assert!(!engine().validate_path("/secret/key", &deny));
        assert!(engine().validate_path("/public/file", &deny));

        let allow = Restriction::new(Operation::FileRead).allow_path("/workspace");
        assert!(engine().validate_path("/workspace/a.txt", &allow));
        assert!(!engine().validate_path("/home/a.txt", &allow));

        let open = Restriction::new(Operation::FileRead);
        assert!(engine().validate_path("/anything", &open));
    }

    #[test]
    fn escalation_for_all_level_pairs() {
        for current in PermissionLevel::ALL {
            for required in PermissionLevel::ALL {
                assert_eq!(
                    engine().requires_escalation(current, required),
                    required.index() > current.index(),
                    "{} -> {}",
                    current,
                    required
                );
            }
        }
        assert!(!engine().requires_escalation(PermissionLevel::Elevated, PermissionLevel::Elevated));
    }

    #[test]
    fn upgrade_keeps_restrictions_and_takes_target_table() {
        let restriction = Restriction::new(Operation::FileRead).deny_path("/etc");
        let current = PermissionSet::for_level(PermissionLevel::Restricted).with_restriction(restriction.clone());

        let upgraded = engine().upgrade_permission(&current, PermissionLevel::Elevated);
        assert_eq!(upgraded.level(), PermissionLevel::Elevated);
        assert!(upgraded.allowed_operations().contains(&Operation::ProcessSpawn));
        assert_eq!(upgraded.restrictions(), &[restriction]);
        // The original is untouched.
        assert_eq!(current.level(), PermissionLevel::Restricted);
    }

    #[test]
    fn with_restriction_replaces_same_operation() {
        let set = PermissionSet::for_level(PermissionLevel::Standard)
            .with_restriction(Restriction::new(Operation::FileWrite).allow_path("/a"))
            .with_restriction(Restriction::new(Operation::FileWrite).allow_path("/b"))
            .with_restriction(Restriction::new(Operation::FileRead));
        assert_eq!(set.restrictions().len(), 2);
        let write = set
            .restrictions()
            .iter()
            .find(|r| r.operation == Operation::FileWrite)
            .unwrap();
        assert!(write.allowed_paths.contains("/b"));
        assert!(!write.allowed_paths.contains("/a"));

        let trimmed = set.without_restriction(Operation::FileWrite);
        assert_eq!(trimmed.restrictions().len(), 1);
        assert_eq!(set.restrictions().len(), 2);
    }

    #[test]
    fn deserialization_rebuilds_operation_table() {
        let json = r#"{
            "level": "restricted",
            "allowedOperations": ["fileRead", "networkAccess", "processSpawn"],
            "restrictions": [{"operation": "fileRead", "deniedPaths": ["/etc"]}]
        }"#;
        let set: PermissionSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.allowed_operations().len(), 1);
        assert!(!engine().check_permission(&set, Operation::NetworkAccess).allowed);
        assert_eq!(set.restrictions().len(), 1);
    }

    #[test]
    fn minimum_level_for_each_operation() {
        assert_eq!(engine().minimum_level_for(Operation::FileRead), PermissionLevel::Restricted);
        assert_eq!(engine().minimum_level_for(Operation::FileWrite), PermissionLevel::Standard);
        assert_eq!(engine().minimum_level_for(Operation::ProcessSpawn), PermissionLevel::Elevated);
        assert_eq!(engine().minimum_level_for(Operation::NetworkAccess), PermissionLevel::Trusted);
    }

    #[test]
    fn names_parse_and_display() {
        assert_eq!("envAccess".parse::<Operation>().unwrap(), Operation::EnvAccess);
        assert_eq!("elevated".parse::<PermissionLevel>().unwrap(), PermissionLevel::Elevated);
        assert!(matches!(
            "root".parse::<PermissionLevel>(),
            Err(PolicyError::UnknownLevel(_))
        ));
        assert_eq!(serde_json::to_string(&Operation::ProcessSpawn).unwrap(), "\"processSpawn\"");
    }
}
