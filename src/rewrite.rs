//! Source-rewrite hook.
//!
//! Sits in front of a host compiler's file reader: given a path and its raw
//! text it either passes the file through untouched or returns the text the
//! engine produced for it.

use std::ffi::OsStr;
use std::path::{Component, Path};

use tracing::debug;

use crate::config::EngineConfig;
use crate::errors::Result;
use crate::session::CompilationSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteHook {
    extensions: Vec<String>,
    ignored_dirs: Vec<String>,
}

impl RewriteHook {
    pub fn new(extensions: Vec<String>, ignored_dirs: Vec<String>) -> Self {
        Self {
            extensions,
            ignored_dirs,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.extensions.clone(), config.ignored_dirs.clone())
    }

    /// True when `path` has a listed extension and no ignored directory.
    ///
    /// ```rust
    /// use kiln::rewrite::RewriteHook;
    /// use std::path::Path;
    ///
    /// let hook = RewriteHook::new(vec!["kn".into()], vec!["node_modules".into()]);
    /// assert!(hook.intercepts(Path::new("src/app.kn")));
    /// assert!(!hook.intercepts(Path::new("node_modules/lib/app.kn")));
    /// assert!(!hook.intercepts(Path::new("src/app.js")));
    /// ```
    pub fn intercepts(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(OsStr::to_str) else {
            return false;
        };
        if !self.extensions.iter().any(|ext| ext == extension) {
            return false;
        }
        !path.components().any(|component| match component {
            Component::Normal(name) => self
                .ignored_dirs
                .iter()
                .any(|dir| OsStr::new(dir) == name),
            _ => false,
        })
    }

    /// Returns `Ok(None)` for files passed through, otherwise the rewritten
    /// text. A file that cannot be compiled fails the whole rewrite.
    pub fn rewrite(
        &self,
        session: &mut CompilationSession,
        path: &Path,
        text: &str,
    ) -> Result<Option<String>> {
        if !self.intercepts(path) {
            debug!(path = %path.display(), "passed through");
            return Ok(None);
        }
        session.compile_source(path, text).map(Some)
    }
}
