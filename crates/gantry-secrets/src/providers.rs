//! Secret provider implementations.

use async_trait::async_trait;
use gantry_core::ports::SecretProvider;
use gantry_core::secrets::SecretValue;
use gantry_core::{Error, Result};
use std::collections::HashMap;

/// Reads secrets from the orchestrator's own process environment,
/// optionally under a prefix (`GANTRY_SECRET_<NAME>`).
pub struct EnvProvider {
    prefix: Option<String>,
}

impl EnvProvider {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn var_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{}{}", p, name),
            None => name.to_string(),
        }
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretProvider for EnvProvider {
    async fn get(&self, name: &str) -> Result<SecretValue> {
        std::env::var(self.var_name(name))
            .map(SecretValue::new)
            .map_err(|_| Error::SecretNotFound(name.to_string()))
    }
}

/// Fixed in-memory secrets, for tests and CLI `--secret k=v` flags.
pub struct StaticProvider {
    values: HashMap<String, String>,
}

impl StaticProvider {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl SecretProvider for StaticProvider {
    async fn get(&self, name: &str) -> Result<SecretValue> {
        self.values
            .get(name)
            .map(|v| SecretValue::new(v.clone()))
            .ok_or_else(|| Error::SecretNotFound(name.to_string()))
    }
}
