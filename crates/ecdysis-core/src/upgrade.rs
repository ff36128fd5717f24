// crates/ecdysis-core/src/upgrade.rs
//
// Upgrade descriptors and pending upgrade records.
//
// A Descriptor names an upgrade and the consensus epoch at which it must take
// effect. Once submitted, it is tracked by a PendingUpgrade record that moves
// through the following progression:
//
//   submitted (height unset)
//     -> height recorded (node halts for the binary swap)
//     -> Startup stage done (new binary, before consensus resumes)
//     -> Consensus stage done (completed, purged on next flush)

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::EcdysisError;
use crate::version::SoftwareVersion;

/// Reserved epoch value that can never be an upgrade target.
pub const EPOCH_INVALID: u64 = u64::MAX;

/// Maximum length in bytes of an upgrade name.
pub const MAX_UPGRADE_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// An immutable, epoch-targeted upgrade request.
///
/// Two descriptors are equal iff their `name` and `epoch` match; the target
/// version is informational for compatibility checks only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// Name selecting the migration handler that performs this upgrade.
    pub name: String,
    /// Consensus epoch at which the upgrade takes effect.
    pub epoch: u64,
    /// Binary version that must be running once the upgrade is due.
    #[serde(default)]
    pub target: SoftwareVersion,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, epoch: u64, target: SoftwareVersion) -> Self {
        Self {
            name: name.into(),
            epoch,
            target,
        }
    }

    /// Perform basic structural validation of the descriptor.
    pub fn validate_basic(&self) -> Result<(), EcdysisError> {
        if self.name.is_empty() {
            return Err(EcdysisError::BadDescriptor("empty upgrade name".to_string()));
        }
        if self.name.len() > MAX_UPGRADE_NAME_LEN {
            return Err(EcdysisError::BadDescriptor(format!(
                "upgrade name longer than {} bytes",
                MAX_UPGRADE_NAME_LEN
            )));
        }
        if let Some(c) = self
            .name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(EcdysisError::BadDescriptor(format!(
                "invalid character {:?} in upgrade name {:?}",
                c, self.name
            )));
        }
        if self.epoch == EPOCH_INVALID {
            return Err(EcdysisError::BadDescriptor(
                "upgrade epoch is the reserved invalid epoch".to_string(),
            ));
        }
        Ok(())
    }

    /// Ensure the running binary can execute this upgrade.
    pub fn ensure_compatible(&self, running: &SoftwareVersion) -> Result<(), EcdysisError> {
        if running.is_compatible_with(&self.target) {
            Ok(())
        } else {
            Err(EcdysisError::IncompatibleBinary {
                name: self.name.clone(),
                required: self.target.to_string(),
                running: running.to_string(),
            })
        }
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.epoch == other.epoch
    }
}

impl Eq for Descriptor {}

impl Hash for Descriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.epoch.hash(state);
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@epoch {} (target {})", self.name, self.epoch, self.target)
    }
}

// ---------------------------------------------------------------------------
// UpgradeStage
// ---------------------------------------------------------------------------

/// A completed stage of a pending upgrade, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UpgradeStage {
    /// The migration handler's startup stage ran on the new binary.
    Startup,
    /// The migration handler's consensus stage ran at the upgrade height.
    /// Terminal: a record carrying this marker is completed.
    Consensus,
}

impl fmt::Display for UpgradeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeStage::Startup => write!(f, "startup"),
            UpgradeStage::Consensus => write!(f, "consensus"),
        }
    }
}

// ---------------------------------------------------------------------------
// PendingUpgrade
// ---------------------------------------------------------------------------

/// Mutable tracking state for one submitted descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpgrade {
    /// The originating descriptor.
    pub descriptor: Descriptor,
    /// Block height at which the target epoch was first observed.
    /// `None` until the upgrade comes due; never changes once set.
    pub upgrade_height: Option<u64>,
    /// Completed stage markers.
    pub stages: BTreeSet<UpgradeStage>,
    /// Version of the node software that accepted the descriptor.
    #[serde(default)]
    pub submitting_version: SoftwareVersion,
}

impl PendingUpgrade {
    /// Create a fresh record for a newly submitted descriptor.
    pub fn new(descriptor: Descriptor, submitting_version: SoftwareVersion) -> Self {
        Self {
            descriptor,
            upgrade_height: None,
            stages: BTreeSet::new(),
            submitting_version,
        }
    }

    pub fn has_stage(&self, stage: UpgradeStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn has_any_stages(&self) -> bool {
        !self.stages.is_empty()
    }

    /// Record a completed stage. Pushing an already present stage is a no-op.
    pub fn push_stage(&mut self, stage: UpgradeStage) {
        self.stages.insert(stage);
    }

    /// Whether the upgrade height has been recorded or any stage has run.
    pub fn is_started(&self) -> bool {
        self.upgrade_height.is_some() || self.has_any_stages()
    }

    /// Whether the terminal consensus stage has completed.
    pub fn is_completed(&self) -> bool {
        self.has_stage(UpgradeStage::Consensus)
    }

    /// Record the height at which the upgrade epoch was reached.
    ///
    /// Setting the same height again is accepted; changing a recorded height is not.
    pub fn set_upgrade_height(&mut self, height: u64) -> Result<(), EcdysisError> {
        match self.upgrade_height {
            Some(existing) if existing != height => Err(EcdysisError::InvariantViolation(format!(
                "upgrade {} already has height {}, refusing to move it to {}",
                self.descriptor.name, existing, height
            ))),
            _ => {
                self.upgrade_height = Some(height);
                Ok(())
            }
        }
    }

    /// Check the structural invariants of a (possibly persisted) record.
    pub fn validate(&self) -> Result<(), EcdysisError> {
        if self.upgrade_height.is_none() && self.has_any_stages() {
            return Err(EcdysisError::InvariantViolation(format!(
                "upgrade {} has completed stages but no upgrade height",
                self.descriptor.name
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UpgradeOutcome
// ---------------------------------------------------------------------------

/// Non-error result of the per-block consensus upgrade hook.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeOutcome {
    /// Keep processing the block normally.
    Continue,
    /// An upgrade came due at this height: halt now so the binary can be swapped.
    /// The block at `height` must not be committed by this process.
    StopForUpgrade {
        name: String,
        epoch: u64,
        height: u64,
    },
}

impl UpgradeOutcome {
    pub fn is_stop(&self) -> bool {
        matches!(self, UpgradeOutcome::StopForUpgrade { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, epoch: u64) -> Descriptor {
        Descriptor::new(name, epoch, SoftwareVersion::new(2, 0, 0))
    }

    #[test]
    fn test_descriptor_equality_ignores_target() {
        let a = descriptor("v2", 100);
        let mut b = descriptor("v2", 100);
        b.target = SoftwareVersion::new(2, 5, 1);
        assert_eq!(a, b);

        assert_ne!(a, descriptor("v2", 101));
        assert_ne!(a, descriptor("v3", 100));
    }

    #[test]
    fn test_validate_basic() {
        assert!(descriptor("v2-mainnet_1.0", 100).validate_basic().is_ok());

        assert!(matches!(
            descriptor("", 100).validate_basic(),
            Err(EcdysisError::BadDescriptor(_))
        ));
        assert!(matches!(
            descriptor("has space", 100).validate_basic(),
            Err(EcdysisError::BadDescriptor(_))
        ));
        assert!(matches!(
            descriptor(&"x".repeat(MAX_UPGRADE_NAME_LEN + 1), 100).validate_basic(),
            Err(EcdysisError::BadDescriptor(_))
        ));
        assert!(matches!(
            descriptor("v2", EPOCH_INVALID).validate_basic(),
            Err(EcdysisError::BadDescriptor(_))
        ));
    }

    #[test]
    fn test_ensure_compatible() {
        let d = descriptor("v2", 100);
        assert!(d.ensure_compatible(&SoftwareVersion::new(2, 0, 3)).is_ok());
        match d.ensure_compatible(&SoftwareVersion::new(1, 9, 0)) {
            Err(EcdysisError::IncompatibleBinary { name, required, running }) => {
                assert_eq!(name, "v2");
                assert_eq!(required, "2.0.0");
                assert_eq!(running, "1.9.0");
            }
            other => panic!("Expected IncompatibleBinary, got: {:?}", other),
        }
    }

    #[test]
    fn test_stage_progression() {
        let mut pu = PendingUpgrade::new(descriptor("v2", 100), SoftwareVersion::new(1, 0, 0));
        assert!(!pu.is_started());
        assert!(!pu.is_completed());

        pu.set_upgrade_height(51).unwrap();
        assert!(pu.is_started());

        pu.push_stage(UpgradeStage::Startup);
        pu.push_stage(UpgradeStage::Startup);
        assert_eq!(pu.stages.len(), 1);
        assert!(!pu.is_completed());

        pu.push_stage(UpgradeStage::Consensus);
        assert!(pu.is_completed());
        assert_eq!(
            pu.stages.iter().copied().collect::<Vec<_>>(),
            vec![UpgradeStage::Startup, UpgradeStage::Consensus]
        );
    }

    #[test]
    fn test_upgrade_height_is_immutable() {
        let mut pu = PendingUpgrade::new(descriptor("v2", 100), SoftwareVersion::default());
        pu.set_upgrade_height(51).unwrap();
        assert!(pu.set_upgrade_height(51).is_ok());
        assert!(matches!(
            pu.set_upgrade_height(52),
            Err(EcdysisError::InvariantViolation(_))
        ));
        assert_eq!(pu.upgrade_height, Some(51));
    }

    #[test]
    fn test_validate_rejects_stages_without_height() {
        let mut pu = PendingUpgrade::new(descriptor("v2", 100), SoftwareVersion::default());
        assert!(pu.validate().is_ok());
        pu.push_stage(UpgradeStage::Startup);
        assert!(matches!(pu.validate(), Err(EcdysisError::InvariantViolation(_))));
    }

    #[test]
    fn test_pending_upgrade_json_shape() {
        let mut pu = PendingUpgrade::new(descriptor("v2", 100), SoftwareVersion::new(1, 2, 3));
        pu.set_upgrade_height(51).unwrap();
        pu.push_stage(UpgradeStage::Startup);

        let json = serde_json::to_value(&pu).unwrap();
        assert_eq!(json["descriptor"]["name"], "v2");
        assert_eq!(json["upgrade_height"], 51);
        assert_eq!(json["stages"], serde_json::json!(["Startup"]));
        assert_eq!(json["descriptor"]["target"], "2.0.0");

        let decoded: PendingUpgrade = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, pu);
        assert_eq!(decoded.descriptor.target, pu.descriptor.target);
    }
}
