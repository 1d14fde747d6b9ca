//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use upfall_storage::{CredentialSource, ProviderRegistry};

/// Variable holding a comma separated preference chain.
pub const PROVIDERS_VAR: &str = "UPFALL_PROVIDERS";

/// Configuration for the uploader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Preference chain. Empty means registration order.
    #[serde(default)]
    pub providers: Vec<String>,
}

impl UploadConfig {
    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = providers.into_iter().map(Into::into).collect();
        self
    }

    /// Read the preference chain from a variable source.
    pub fn from_source(source: &dyn CredentialSource) -> Self {
        let providers = source
            .var(PROVIDERS_VAR)
            .map(|value| parse_chain(&value))
            .unwrap_or_default();
        Self { providers }
    }

    /// Read the preference chain from the process environment.
    pub fn from_env() -> Self {
        Self::from_source(&upfall_storage::EnvCredentials)
    }

    /// The chain to use when no selector is given.
    pub fn default_chain(&self, registry: &ProviderRegistry) -> Vec<String> {
        if self.providers.is_empty() {
            registry.providers().to_vec()
        } else {
            self.providers.clone()
        }
    }
}

fn parse_chain(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
