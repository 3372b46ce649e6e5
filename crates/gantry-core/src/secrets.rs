//! Secret types.

use serde::{Deserialize, Serialize};

/// A job's declared use of a secret. Resolution happens at JobRun
/// construction; the value lands in the job environment and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretReference {
    pub name: String,
    /// Environment variable to expose the value under; defaults to `name`.
    #[serde(default)]
    pub env: Option<String>,
    /// Named provider to resolve against; the manager's default when absent.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default = "default_true")]
    pub masked: bool,
}

fn default_true() -> bool {
    true
}

impl SecretReference {
    pub fn env_name(&self) -> &str {
        self.env.as_deref().unwrap_or(&self.name)
    }
}

/// A resolved secret value. Never serialized, never logged.
#[derive(Clone)]
pub struct SecretValue {
    pub value: String,
    pub masked: bool,
}

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            masked: true,
        }
    }

    pub fn unmasked(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            masked: false,
        }
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValue")
            .field("value", &"***")
            .field("masked", &self.masked)
            .finish()
    }
}
