// crates/ecdysis-core/src/version.rs
//
// Software versions and binary compatibility checks.
//
// Every descriptor names the binary version that must be running when its
// upgrade comes due. A running binary is compatible with a target when both
// share the same major version and the running binary is not older.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EcdysisError;

/// A `major.minor.patch` software version, serialized as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SoftwareVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl SoftwareVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Check whether this (running) version can execute work targeted at `target`.
    pub fn is_compatible_with(&self, target: &SoftwareVersion) -> bool {
        self.major == target.major && self >= target
    }
}

impl Default for SoftwareVersion {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl fmt::Display for SoftwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SoftwareVersion {
    type Err = EcdysisError;

    /// Parse `major.minor.patch`. Missing trailing components default to 0,
    /// and any pre-release/build suffix (`-rc1`, `+abc`) is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core = s
            .trim()
            .split(['-', '+'])
            .next()
            .unwrap_or_default();
        if core.is_empty() {
            return Err(EcdysisError::BadDescriptor(format!(
                "empty software version: {:?}",
                s
            )));
        }

        let mut parts = [0u16; 3];
        for (idx, component) in core.split('.').enumerate() {
            if idx >= parts.len() {
                return Err(EcdysisError::BadDescriptor(format!(
                    "too many version components: {:?}",
                    s
                )));
            }
            parts[idx] = component.parse().map_err(|_| {
                EcdysisError::BadDescriptor(format!("invalid version component {:?} in {:?}", component, s))
            })?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for SoftwareVersion {
    type Error = EcdysisError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SoftwareVersion> for String {
    fn from(v: SoftwareVersion) -> Self {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let v: SoftwareVersion = "1.4.2".parse().unwrap();
        assert_eq!(v, SoftwareVersion::new(1, 4, 2));
        assert_eq!(v.to_string(), "1.4.2");

        let short: SoftwareVersion = "2".parse().unwrap();
        assert_eq!(short, SoftwareVersion::new(2, 0, 0));

        let rc: SoftwareVersion = "3.1.0-rc1".parse().unwrap();
        assert_eq!(rc, SoftwareVersion::new(3, 1, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<SoftwareVersion>().is_err());
        assert!("1.x.0".parse::<SoftwareVersion>().is_err());
        assert!("1.2.3.4".parse::<SoftwareVersion>().is_err());
    }

    #[test]
    fn test_serde_string_form() {
        let v = SoftwareVersion::new(2, 1, 0);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"2.1.0\"");
        let back: SoftwareVersion = serde_json::from_str("\"2.1.0\"").unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<SoftwareVersion>("\"two\"").is_err());
    }

    #[test]
    fn test_compatibility() {
        let target = SoftwareVersion::new(2, 1, 0);

        assert!(SoftwareVersion::new(2, 1, 0).is_compatible_with(&target));
        assert!(SoftwareVersion::new(2, 3, 7).is_compatible_with(&target));

        // Older binary in the same major line cannot run it.
        assert!(!SoftwareVersion::new(2, 0, 9).is_compatible_with(&target));
        // Different major lines are never compatible.
        assert!(!SoftwareVersion::new(1, 9, 0).is_compatible_with(&target));
        assert!(!SoftwareVersion::new(3, 0, 0).is_compatible_with(&target));
    }
}
