//! Macro loader: resolves a declaration to its callable implementation.
//!
//! Turning a declaring file into callable code is the job of a
//! [`ModuleSource`]. The loader only caches: modules per path, implementations
//! per declaration. It also refuses to enter a module that is already being
//! loaded further up the stack.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::ast::NodeId;
use crate::errors::MacroLoadError;
use crate::macros::hooks::MacroRegistrationApi;
use crate::macros::MacroDeclaration;

/// The compiled body of a macro declaration: a registration callback.
pub type MacroImplementation = Arc<dyn Fn(&mut MacroRegistrationApi<'_>) + Send + Sync>;

// ============================================================================
// MODULES
// ============================================================================

/// A loaded macro module: its exports and the modules it needs first.
#[derive(Clone, Default)]
pub struct MacroModule {
    exports: BTreeMap<String, MacroImplementation>,
    requires: Vec<PathBuf>,
}

impl MacroModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an export.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kiln::macros::MacroModule;
    ///
    /// let module = MacroModule::new().export("noop", |api| api.transform(|_| {}));
    /// assert!(module.get("noop").is_some());
    /// ```
    pub fn export<F>(mut self, name: impl Into<String>, implementation: F) -> Self
    where
        F: Fn(&mut MacroRegistrationApi<'_>) + Send + Sync + 'static,
    {
        self.exports.insert(name.into(), Arc::new(implementation));
        self
    }

    /// Declares a module that must load before this one.
    pub fn require(mut self, path: impl Into<PathBuf>) -> Self {
        self.requires.push(path.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&MacroImplementation> {
        self.exports.get(name)
    }

    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    pub fn requires(&self) -> &[PathBuf] {
        &self.requires
    }
}

impl fmt::Debug for MacroModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroModule")
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .field("requires", &self.requires)
            .finish()
    }
}

/// Maps a declaring file to its loaded module.
pub trait ModuleSource: Send + Sync {
    fn load_module(&self, path: &Path) -> Option<MacroModule>;
}

/// In-process module source: modules registered by path, plus an optional
/// fallback module answered for any other path.
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    modules: HashMap<PathBuf, MacroModule>,
    fallback: Option<MacroModule>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>, module: MacroModule) -> Self {
        self.insert(path, module);
        self
    }

    pub fn with_fallback(mut self, module: MacroModule) -> Self {
        self.fallback = Some(module);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, module: MacroModule) {
        self.modules.insert(path.into(), module);
    }
}

impl ModuleSource for ModuleTable {
    fn load_module(&self, path: &Path) -> Option<MacroModule> {
        self.modules
            .get(path)
            .or(self.fallback.as_ref())
            .cloned()
    }
}

// ============================================================================
// LOADER
// ============================================================================

pub struct MacroLoader {
    source: Box<dyn ModuleSource>,
    modules: HashMap<PathBuf, Arc<MacroModule>>,
    implementations: HashMap<NodeId, MacroImplementation>,
    /// Modules currently being loaded, outermost first.
    loading: Vec<PathBuf>,
}

impl fmt::Debug for MacroLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroLoader")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("implementations", &self.implementations.len())
            .finish()
    }
}

impl MacroLoader {
    pub fn new(source: impl ModuleSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            modules: HashMap::new(),
            implementations: HashMap::new(),
            loading: Vec::new(),
        }
    }

    /// Resolves `declaration` to its implementation, caching per declaration.
    pub fn load_macro(
        &mut self,
        declaration: &MacroDeclaration,
    ) -> Result<MacroImplementation, MacroLoadError> {
        if let Some(implementation) = self.implementations.get(&declaration.id) {
            return Ok(Arc::clone(implementation));
        }

        let module = self.load_module(&declaration.file)?;
        let Some(export) = declaration.export_name() else {
            return Err(MacroLoadError::UnsupportedDeclaration {
                path: declaration.file.clone(),
            });
        };
        let Some(implementation) = module.get(export) else {
            return Err(MacroLoadError::ExportNotFound {
                name: export.to_string(),
                path: declaration.file.clone(),
            });
        };

        debug!(name = %declaration.name, export, "loaded macro implementation");
        self.implementations
            .insert(declaration.id, Arc::clone(implementation));
        Ok(Arc::clone(implementation))
    }

    /// Loads a module and, before it, everything it requires.
    pub fn load_module(&mut self, path: &Path) -> Result<Arc<MacroModule>, MacroLoadError> {
        if let Some(module) = self.modules.get(path) {
            return Ok(Arc::clone(module));
        }

        if let Some(start) = self.loading.iter().position(|p| p == path) {
            let mut chain = self.loading[start..].to_vec();
            chain.push(path.to_path_buf());
            return Err(MacroLoadError::Cyclic { chain });
        }

        self.loading.push(path.to_path_buf());
        let loaded = self.load_uncached(path);
        self.loading.pop();

        let module = Arc::new(loaded?);
        debug!(path = %path.display(), "loaded macro module");
        self.modules.insert(path.to_path_buf(), Arc::clone(&module));
        Ok(module)
    }

    fn load_uncached(&mut self, path: &Path) -> Result<MacroModule, MacroLoadError> {
        let module = self
            .source
            .load_module(path)
            .ok_or_else(|| MacroLoadError::ModuleNotFound {
                path: path.to_path_buf(),
            })?;
        for required in module.requires() {
            self.load_module(required)?;
        }
        Ok(module)
    }

    pub fn loaded_module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn reset(&mut self) {
        self.modules.clear();
        self.implementations.clear();
        self.loading.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{MacroKind, Span};
    use crate::macros::DeclarationShape;

    fn declaration(file: &str, name: &str, shape: DeclarationShape) -> MacroDeclaration {
        MacroDeclaration {
            id: NodeId(7),
            kind: MacroKind::Function,
            name: name.to_string(),
            shape,
            file: PathBuf::from(file),
            span: Span::default(),
        }
    }

    fn named() -> DeclarationShape {
        DeclarationShape::Function {
            default_export: false,
        }
    }

    #[test]
    fn resolves_named_and_default_exports() {
        let table = ModuleTable::new().with_module(
            "m.kn",
            MacroModule::new()
                .export("f", |_| {})
                .export("default", |_| {}),
        );
        let mut loader = MacroLoader::new(table);
        assert!(loader.load_macro(&declaration("m.kn", "f", named())).is_ok());

        let mut default = declaration(
            "m.kn",
            "g",
            DeclarationShape::Function {
                default_export: true,
            },
        );
        default.id = NodeId(8);
        assert!(loader.load_macro(&default).is_ok());
        assert_eq!(loader.loaded_module_count(), 1);
    }

    #[test]
    fn reports_missing_module_export_and_shape() {
        let table = ModuleTable::new().with_module("m.kn", MacroModule::new().export("f", |_| {}));
        let mut loader = MacroLoader::new(table);

        let missing_module = loader.load_macro(&declaration("other.kn", "f", named()));
        assert!(matches!(missing_module, Err(MacroLoadError::ModuleNotFound { .. })));

        let missing_export = loader.load_macro(&declaration("m.kn", "g", named()));
        assert!(matches!(missing_export, Err(MacroLoadError::ExportNotFound { name, .. }) if name == "g"));

        let unbound = loader.load_macro(&declaration("m.kn", "f", DeclarationShape::Unbound));
        assert!(matches!(unbound, Err(MacroLoadError::UnsupportedDeclaration { .. })));
    }

    #[test]
    fn cyclic_requires_fail_fast() {
        let table = ModuleTable::new()
            .with_module("a.kn", MacroModule::new().export("f", |_| {}).require("b.kn"))
            .with_module("b.kn", MacroModule::new().require("a.kn"));
        let mut loader = MacroLoader::new(table);

        let result = loader.load_macro(&declaration("a.kn", "f", named()));
        let Err(MacroLoadError::Cyclic { chain }) = result else {
            panic!("expected a cyclic load error");
        };
        assert_eq!(
            chain,
            vec![PathBuf::from("a.kn"), PathBuf::from("b.kn"), PathBuf::from("a.kn")]
        );
    }

    #[test]
    fn fallback_module_answers_unknown_paths() {
        let table = ModuleTable::new().with_fallback(MacroModule::new().export("f", |_| {}));
        let mut loader = MacroLoader::new(table);
        assert!(loader.load_macro(&declaration("anything.kn", "f", named())).is_ok());
    }
}
