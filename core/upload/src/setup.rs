//! Provider setup diagnostics.
//!
//! Reports whether a provider could take an upload right now, without
//! uploading anything. Every outcome is a [`ProviderStatus`]; nothing here
//! returns an error.

use serde::Serialize;
use tracing::debug;

use upfall_common::ProviderHelp;
use upfall_storage::ProviderRegistry;

use crate::chain::{prepare, SkipReason};

/// Whether a provider is usable, and what to do if it is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub usable: bool,
    pub explanation: String,
}

impl ProviderStatus {
    fn usable(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            usable: true,
            explanation: format!("You can upload files to: {}", provider),
        }
    }

    fn unusable(provider: &str, reason: SkipReason, help: Option<ProviderHelp>) -> Self {
        let mut explanation = reason.describe(provider);
        if let Some(help) = help {
            explanation.push_str(".\n\n");
            explanation.push_str(help.setup);
            explanation.push_str("\n\n");
            explanation.push_str(help.deps);
        }
        Self {
            provider: provider.to_string(),
            usable: false,
            explanation,
        }
    }
}

/// Check a single provider: credentials present and a client can be built.
pub async fn check(registry: &ProviderRegistry, name: &str) -> ProviderStatus {
    let provider = match registry.resolve(name) {
        Ok(provider) => provider,
        Err(_) => return ProviderStatus::unusable(name, SkipReason::UnknownProvider, None),
    };

    if let Err(reason) = prepare(provider.as_ref()).await {
        return ProviderStatus::unusable(name, reason, Some(provider.help()));
    }

    debug!("Provider {} is ready", name);
    ProviderStatus::usable(name)
}

/// Check every registered provider, in preference order.
pub async fn check_all(registry: &ProviderRegistry) -> Vec<ProviderStatus> {
    let mut statuses = Vec::with_capacity(registry.providers().len());
    for name in registry.providers() {
        statuses.push(check(registry, name).await);
    }
    statuses
}
