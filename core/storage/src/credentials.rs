//! Credential sources.
//!
//! Providers never read the process environment directly; they ask a
//! [`CredentialSource`]. Tests hand in a [`StaticCredentials`] instead of
//! mutating real process state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use zeroize::Zeroizing;

/// Opaque secret resolved for a provider.
#[derive(Clone)]
pub struct Credentials {
    secret: Zeroizing<String>,
    source: String,
}

impl Credentials {
    /// Wrap a secret together with the key it was read from.
    pub fn new(secret: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            source: source.into(),
        }
    }

    /// The secret value.
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Name of the variable the secret came from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({}: [REDACTED])", self.source)
    }
}

/// Read-only lookup of named secrets.
pub trait CredentialSource: Send + Sync {
    /// Look up a variable. Blank values count as absent.
    fn var(&self, key: &str) -> Option<String>;

    /// First present variable out of `keys`, in order.
    fn first_present(&self, keys: &[&str]) -> Option<Credentials> {
        keys.iter()
            .find_map(|key| self.var(key).map(|value| Credentials::new(value, *key)))
    }
}

/// Process environment, read at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.trim().is_empty())
    }
}

/// Fixed set of variables.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn var(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }
}

/// Per-process cache in front of another source.
///
/// A value is remembered once it has been resolved; misses are not cached,
/// so a variable set later is still picked up.
pub struct CachedCredentials<S> {
    inner: S,
    cache: RwLock<HashMap<String, String>>,
}

impl<S: CredentialSource> CachedCredentials<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl<S: CredentialSource> CredentialSource for CachedCredentials<S> {
    fn var(&self, key: &str) -> Option<String> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = cache.get(key) {
                return Some(value.clone());
            }
        }

        let value = self.inner.var(key)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        Some(value)
    }
}
