//! Which providers an upload may use.

/// Provider selection for a single upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProviderSelector {
    /// The configured preference chain.
    #[default]
    Default,
    /// Exactly one provider; its failure is final.
    Single(String),
    /// Providers tried in order until one succeeds.
    Chain(Vec<String>),
}

impl From<&str> for ProviderSelector {
    fn from(name: &str) -> Self {
        Self::Single(name.to_string())
    }
}

impl From<String> for ProviderSelector {
    fn from(name: String) -> Self {
        Self::Single(name)
    }
}

impl From<Vec<String>> for ProviderSelector {
    fn from(names: Vec<String>) -> Self {
        Self::Chain(names)
    }
}

impl From<&[&str]> for ProviderSelector {
    fn from(names: &[&str]) -> Self {
        Self::Chain(names.iter().map(|name| name.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ProviderSelector {
    fn from(names: [&str; N]) -> Self {
        Self::from(&names[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(
            ProviderSelector::from("dropbox"),
            ProviderSelector::Single("dropbox".into())
        );
        assert_eq!(
            ProviderSelector::from(["a", "b"]),
            ProviderSelector::Chain(vec!["a".into(), "b".into()])
        );
        assert_eq!(ProviderSelector::default(), ProviderSelector::Default);
    }
}
