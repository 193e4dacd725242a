use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash of a risk configuration.
///
/// Uses BLAKE3 over the canonical JSON encoding, so two configs with the same
/// thresholds always hash identically across builds and platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigHash(pub String);

impl ConfigHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// First 12 hex characters, for log lines and terminal output.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
