//! Engine configuration.
//!
//! Loaded from YAML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```rust
//! use kiln::config::{EngineConfig, MissPolicy};
//! let config = EngineConfig::from_yaml_str("unresolved_derive: error\noperators:\n  \"+\": Vec.add\n").unwrap();
//! assert_eq!(config.unresolved_derive, MissPolicy::Error);
//! assert_eq!(config.unmatched_anchor, MissPolicy::Ignore);
//! assert_eq!(config.operators.get("+").map(String::as_str), Some("Vec.add"));
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{KilnError, Result};

/// What to do when a lookup finds nothing to act on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissPolicy {
    /// Drop silently.
    #[default]
    Ignore,
    /// Drop and log a warning.
    Warn,
    /// Fail the compilation.
    Error,
}

impl MissPolicy {
    /// Applies the policy to a miss described by `error`.
    pub fn apply(self, error: impl FnOnce() -> KilnError) -> Result<()> {
        match self {
            MissPolicy::Ignore => {
                debug!(error = %error(), "dropped");
                Ok(())
            }
            MissPolicy::Warn => {
                warn!("{}", error());
                Ok(())
            }
            MissPolicy::Error => Err(error()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Names in a `derives` list that resolve to no derive macro.
    pub unresolved_derive: MissPolicy,
    /// Conditioned statement patches whose matcher selects no statement.
    pub unmatched_anchor: MissPolicy,
    /// Binary operator token to callee path, e.g. `"+": "Vec.add"`.
    pub operators: BTreeMap<String, String>,
    /// File extensions the rewrite hook intercepts, without the dot.
    pub extensions: Vec<String>,
    /// Directory names the rewrite hook never intercepts.
    pub ignored_dirs: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unresolved_derive: MissPolicy::Ignore,
            unmatched_anchor: MissPolicy::Ignore,
            operators: BTreeMap::new(),
            extensions: vec!["kn".to_string()],
            ignored_dirs: vec!["node_modules".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| KilnError::Config {
            message: e.to_string(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| KilnError::io(path, e))?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = EngineConfig::from_yaml_str("no_such_field: 1");
        assert!(matches!(result, Err(KilnError::Config { .. })));
    }

    #[test]
    fn error_policy_fails() {
        let result = MissPolicy::Error.apply(|| KilnError::UnresolvedDerive {
            class: "Foo".into(),
            name: "Bar".into(),
        });
        assert!(result.is_err());
        assert!(MissPolicy::Warn
            .apply(|| KilnError::UnresolvedDerive {
                class: "Foo".into(),
                name: "Bar".into(),
            })
            .is_ok());
    }
}
