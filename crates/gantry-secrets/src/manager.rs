//! Secret manager resolving references against registered providers.

use gantry_core::ports::SecretProvider;
use gantry_core::secrets::SecretReference;
use gantry_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Environment entries plus the values that must be masked in logs.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub env: HashMap<String, String>,
    pub masked: Vec<String>,
}

/// Resolves a job's secret references at JobRun construction time.
pub struct SecretManager {
    providers: HashMap<String, Arc<dyn SecretProvider>>,
    default_provider: String,
}

impl SecretManager {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register_provider(&mut self, name: &str, provider: Arc<dyn SecretProvider>) {
        debug!(provider = %name, "Registering secret provider");
        self.providers.insert(name.to_string(), provider);
    }

    /// Resolve one reference to its value.
    pub async fn resolve(&self, reference: &SecretReference) -> Result<String> {
        let provider_key = reference
            .provider
            .as_deref()
            .unwrap_or(&self.default_provider);

        let provider = self
            .providers
            .get(provider_key)
            .ok_or_else(|| Error::SecretProviderNotConfigured(provider_key.to_string()))?;

        let value = provider.get(&reference.name).await?;
        debug!(name = %reference.name, provider = %provider_key, "Secret resolved");
        Ok(value.value)
    }

    /// Resolve every reference into environment entries. A missing optional
    /// secret is skipped with a warning; a missing required one fails the
    /// job before it starts.
    pub async fn resolve_all(&self, references: &[SecretReference]) -> Result<ResolvedSecrets> {
        let mut resolved = ResolvedSecrets::default();

        for reference in references {
            match self.resolve(reference).await {
                Ok(value) => {
                    if reference.masked {
                        resolved.masked.push(value.clone());
                    }
                    resolved.env.insert(reference.env_name().to_string(), value);
                }
                Err(e) if !reference.required => {
                    warn!(name = %reference.name, error = %e, "Optional secret unavailable");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StaticProvider;

    fn manager_with(values: &[(&str, &str)]) -> SecretManager {
        let map = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut manager = SecretManager::new("static");
        manager.register_provider("static", Arc::new(StaticProvider::new(map)));
        manager
    }

    fn reference(name: &str) -> SecretReference {
        SecretReference {
            name: name.to_string(),
            env: None,
            provider: None,
            required: true,
            masked: true,
        }
    }

    #[tokio::test]
    async fn test_resolve_all_populates_env_and_masks() {
        let manager = manager_with(&[("TOKEN", "t-1"), ("KEY", "k-1")]);
        let refs = vec![reference("TOKEN"), reference("KEY")];

        let resolved = manager.resolve_all(&refs).await.unwrap();
        assert_eq!(resolved.env.get("TOKEN").unwrap(), "t-1");
        assert_eq!(resolved.env.get("KEY").unwrap(), "k-1");
        assert!(resolved.masked.contains(&"t-1".to_string()));
    }

    #[tokio::test]
    async fn test_missing_required_secret_fails() {
        let manager = manager_with(&[]);
        let err = manager
            .resolve_all(&[reference("ABSENT")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SecretNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_optional_secret_skipped() {
        let manager = manager_with(&[]);
        let mut optional = reference("ABSENT");
        optional.required = false;

        let resolved = manager.resolve_all(&[optional]).await.unwrap();
        assert!(resolved.env.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let manager = SecretManager::new("vault");
        let err = manager.resolve(&reference("TOKEN")).await.unwrap_err();
        assert!(matches!(err, Error::SecretProviderNotConfigured(_)));
    }
}
