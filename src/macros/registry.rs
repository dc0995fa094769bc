//! Macro registry: declarations, use-site bindings and the derive table.
//!
//! One registry belongs to one [`CompilationSession`]; nothing here is global,
//! so independent compilations never see each other's bindings.
//!
//! | Table                 | Key                      | Value                     |
//! |-----------------------|--------------------------|---------------------------|
//! | declarations          | declaring node id        | declaration               |
//! | bindings              | (kind, use-site node id) | declaration               |
//! | derives               | derive name              | declaration               |
//! | files                 | declaring file           | declarations, in order    |
//! | metaprogram files     | path                     | -                         |
//!
//! [`CompilationSession`]: crate::session::CompilationSession

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::ast::{ClassDecl, MacroKind, NodeId};
use crate::macros::MacroDeclaration;

#[derive(Debug, Default)]
pub struct MacroRegistry {
    declarations: Vec<Arc<MacroDeclaration>>,
    by_id: HashMap<NodeId, Arc<MacroDeclaration>>,
    bindings: HashMap<(MacroKind, NodeId), Arc<MacroDeclaration>>,
    derives: HashMap<String, Arc<MacroDeclaration>>,
    files: HashMap<PathBuf, Vec<Arc<MacroDeclaration>>>,
    metaprogram_files: BTreeSet<PathBuf>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a declaration and returns the shared handle for it.
    ///
    /// Declaring the same node twice returns the existing handle. Derive
    /// declarations also enter the derive table under their function name,
    /// and the declaring file joins the metaprogram set.
    pub fn declare(&mut self, declaration: MacroDeclaration) -> Arc<MacroDeclaration> {
        if let Some(existing) = self.by_id.get(&declaration.id) {
            return Arc::clone(existing);
        }

        let declaration = Arc::new(declaration);
        debug!(
            name = %declaration.name,
            kind = %declaration.kind,
            file = %declaration.file.display(),
            "declared macro"
        );

        if declaration.kind == MacroKind::Derive {
            self.derives
                .insert(declaration.name.clone(), Arc::clone(&declaration));
        }
        self.files
            .entry(declaration.file.clone())
            .or_default()
            .push(Arc::clone(&declaration));
        self.metaprogram_files.insert(declaration.file.clone());
        self.by_id.insert(declaration.id, Arc::clone(&declaration));
        self.declarations.push(Arc::clone(&declaration));
        declaration
    }

    /// Drops every declaration `path` made, along with the bindings and
    /// derive entries that point at them. Returns how many were dropped.
    ///
    /// The file stays in the metaprogram set.
    pub fn forget_file(&mut self, path: &Path) -> usize {
        let Some(stale) = self.files.remove(path) else {
            return 0;
        };
        let ids: HashSet<NodeId> = stale.iter().map(|declaration| declaration.id).collect();
        self.declarations.retain(|declaration| !ids.contains(&declaration.id));
        self.by_id.retain(|id, _| !ids.contains(id));
        self.bindings.retain(|_, declaration| !ids.contains(&declaration.id));
        self.derives.retain(|_, declaration| !ids.contains(&declaration.id));
        debug!(file = %path.display(), declarations = stale.len(), "forgot declarations");
        stale.len()
    }

    /// Binds a use site to the declaration that governs it.
    ///
    /// Bindings are made before any hook runs. Binding a site twice keeps the
    /// last declaration.
    pub fn bind_macro(
        &mut self,
        kind: MacroKind,
        declaration: &Arc<MacroDeclaration>,
        use_site: NodeId,
    ) {
        debug!(name = %declaration.name, %kind, site = use_site.0, "bound macro use site");
        self.bindings
            .insert((kind, use_site), Arc::clone(declaration));
    }

    pub fn get_macro_binding(
        &self,
        kind: MacroKind,
        use_site: NodeId,
    ) -> Option<&Arc<MacroDeclaration>> {
        self.bindings.get(&(kind, use_site))
    }

    /// Resolves a class's `derives` list, in source order.
    ///
    /// Names without a derive declaration are skipped; see
    /// [`unresolved_derive_names`](Self::unresolved_derive_names).
    pub fn get_derive_macros(&self, class: &ClassDecl) -> Vec<Arc<MacroDeclaration>> {
        class
            .derives
            .iter()
            .filter_map(|name| self.derives.get(name))
            .cloned()
            .collect()
    }

    pub fn unresolved_derive_names<'c>(&self, class: &'c ClassDecl) -> Vec<&'c str> {
        class
            .derives
            .iter()
            .filter(|name| !self.derives.contains_key(*name))
            .map(String::as_str)
            .collect()
    }

    pub fn get_derive(&self, name: &str) -> Option<&Arc<MacroDeclaration>> {
        self.derives.get(name)
    }

    /// Every declaration seen so far, in declaration order.
    pub fn get_macro_declarations(&self) -> &[Arc<MacroDeclaration>] {
        &self.declarations
    }

    pub fn get_declaration(&self, id: NodeId) -> Option<&Arc<MacroDeclaration>> {
        self.by_id.get(&id)
    }

    pub fn declarations_in_file(&self, path: &Path) -> &[Arc<MacroDeclaration>] {
        self.files.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns false when the file was already in the set.
    pub fn add_metaprogram_source_file(&mut self, path: impl Into<PathBuf>) -> bool {
        self.metaprogram_files.insert(path.into())
    }

    /// Files only relevant to compile-time execution, sorted.
    pub fn get_metaprogram_source_files(&self) -> Vec<PathBuf> {
        self.metaprogram_files.iter().cloned().collect()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Forgets everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
