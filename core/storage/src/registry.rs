//! Provider registry for name-based provider resolution.

use std::collections::HashMap;
use std::sync::Arc;

use upfall_common::{Error, Result};

use crate::credentials::CredentialSource;
use crate::dropbox::DropboxProvider;
use crate::provider::Provider;

/// Registry of upload providers.
///
/// Providers are kept in registration order, which is also the default
/// preference chain.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    order: Vec<String>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a provider under its own name.
    ///
    /// # Preconditions
    /// - The provider's name must be unique within the registry
    ///
    /// # Postconditions
    /// - Provider can be resolved by name and is last in the default order
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<()> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(Error::Validation(format!(
                "Provider '{}' is already registered",
                name
            )));
        }
        self.order.push(name.clone());
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Resolve a provider by name.
    ///
    /// # Errors
    /// - Returns error if provider is not registered
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            Error::Validation(format!(
                "Unknown provider '{}' (available: {})",
                name,
                self.order.join(", ")
            ))
        })
    }

    /// Registered provider names, in preference order.
    pub fn providers(&self) -> &[String] {
        &self.order
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with all built-in providers.
pub fn create_default_registry(credentials: Arc<dyn CredentialSource>) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(DropboxProvider::new(credentials)))?;
    Ok(registry)
}
