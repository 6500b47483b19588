//! Configuration for lazy target resolution.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::target::TargetKind;

/// Kinds that may be answered with a lazy-over-handle proxy.
const LAZY_CAPABLE: [TargetKind; 3] = [TargetKind::PortfolioNode, TargetKind::Position, TargetKind::Trade];

/// Tunables for the delegating resolver and the resolver registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LazyResolutionConfig {
    /// Kinds the delegating resolver answers with a proxy instead of a lookup.
    pub lazy_kinds: Vec<TargetKind>,
    /// New registrations after which the registry drops dead entries.
    pub registry_sweep_threshold: usize,
}

impl Default for LazyResolutionConfig {
    fn default() -> Self {
        Self {
            lazy_kinds: LAZY_CAPABLE.to_vec(),
            registry_sweep_threshold: 64,
        }
    }
}

impl LazyResolutionConfig {
    /// A configuration that resolves everything eagerly.
    #[must_use]
    pub fn eager() -> Self {
        Self {
            lazy_kinds: Vec::new(),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// This must be called before constructing a `DelegatingTargetResolver`
    /// or a `ResolverRegistry` from it.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(kind) = self.lazy_kinds.iter().find(|k| !LAZY_CAPABLE.contains(k)) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("{kind} targets cannot be resolved lazily"),
            });
        }
        if self.registry_sweep_threshold == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "registry_sweep_threshold must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LazyResolutionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.lazy_kinds.len(), 3);
        LazyResolutionConfig::eager().validate().unwrap();
    }

    #[test]
    fn test_rejects_unsupported_kind_and_zero_threshold() {
        let mut c = LazyResolutionConfig::default();
        c.lazy_kinds.push(TargetKind::Security);
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("security"));

        let mut c = LazyResolutionConfig::default();
        c.registry_sweep_threshold = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let c: LazyResolutionConfig = serde_json::from_str(r#"{"lazy_kinds":["trade"]}"#).unwrap();
        assert_eq!(c.lazy_kinds, vec![TargetKind::Trade]);
        assert_eq!(c.registry_sweep_threshold, 64);
    }
}
