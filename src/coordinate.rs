use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a locally-defined configuration: `(project, type, configId)`.
///
/// Coordinates are the node identity of the dependency graph and the error
/// context attached to every per-config failure. They are unique within a
/// project manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub project: String,
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(rename = "configId")]
    pub config_id: String,
}

impl Coordinate {
    pub fn new(
        project: impl Into<String>,
        config_type: impl Into<String>,
        config_id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            config_type: config_type.into(),
            config_id: config_id.into(),
        }
    }

    /// Deterministic external id used to correlate a remote object with this
    /// coordinate when no origin-object-id is known. Stable across runs.
    pub fn external_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.project.as_bytes());
        hasher.update([b'$']);
        hasher.update(self.config_type.as_bytes());
        hasher.update([b'$']);
        hasher.update(self.config_id.as_bytes());
        format!("opsgrid-{}", URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.project, self.config_type, self.config_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_colon_separated_tuple() {
        let coord = Coordinate::new("infra", "settings", "disk-alerts");
        assert_eq!(coord.to_string(), "infra:settings:disk-alerts");
    }

    #[test]
    fn external_id_is_stable() {
        let a = Coordinate::new("infra", "bucket", "raw-logs");
        let b = Coordinate::new("infra", "bucket", "raw-logs");
        assert_eq!(a.external_id(), b.external_id());
        assert!(a.external_id().starts_with("opsgrid-"));
    }

    #[test]
    fn external_id_distinguishes_fields() {
        // The separator keeps ("ab","c") and ("a","bc") apart.
        let a = Coordinate::new("ab", "c", "x");
        let b = Coordinate::new("a", "bc", "x");
        assert_ne!(a.external_id(), b.external_id());
    }
}
