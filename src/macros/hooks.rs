//! Hook registration and the per-declaration hook cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::ast::{MacroKind, NodeId};
use crate::errors::MacroLoadError;
use crate::macros::check::{CheckApi, TypeDefinition};
use crate::macros::loader::MacroLoader;
use crate::macros::transform::TransformApi;
use crate::macros::MacroDeclaration;

pub type TransformHook = Arc<dyn Fn(&mut TransformApi<'_>) + Send + Sync>;
pub type CheckHook = Arc<dyn Fn(&mut CheckApi<'_>) -> Option<TypeDefinition> + Send + Sync>;

/// The hooks one declaration registered, in registration order.
#[derive(Clone, Default)]
pub struct MacroHooks {
    pub transform: Vec<TransformHook>,
    pub check: Vec<CheckHook>,
}

impl fmt::Debug for MacroHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroHooks")
            .field("transform", &self.transform.len())
            .field("check", &self.check.len())
            .finish()
    }
}

/// What a macro body receives: the means to register hooks.
pub struct MacroRegistrationApi<'a> {
    hooks: &'a mut MacroHooks,
    declaration: &'a MacroDeclaration,
}

impl<'a> MacroRegistrationApi<'a> {
    pub fn new(hooks: &'a mut MacroHooks, declaration: &'a MacroDeclaration) -> Self {
        Self { hooks, declaration }
    }

    /// Registers a transform hook, run once per use site.
    pub fn transform<F>(&mut self, hook: F)
    where
        F: Fn(&mut TransformApi<'_>) + Send + Sync + 'static,
    {
        self.hooks.transform.push(Arc::new(hook));
    }

    /// Registers a check hook. Only the last one registered is ever run.
    pub fn check<F>(&mut self, hook: F)
    where
        F: Fn(&mut CheckApi<'_>) -> Option<TypeDefinition> + Send + Sync + 'static,
    {
        self.hooks.check.push(Arc::new(hook));
    }

    pub fn declaration(&self) -> &MacroDeclaration {
        self.declaration
    }

    pub fn kind(&self) -> MacroKind {
        self.declaration.kind
    }
}

// ============================================================================
// HOOK CACHE
// ============================================================================

/// Materializes hooks lazily, once per declaration.
#[derive(Debug)]
pub struct HookCache {
    loader: MacroLoader,
    hooks: HashMap<NodeId, Arc<MacroHooks>>,
}

impl HookCache {
    pub fn new(loader: MacroLoader) -> Self {
        Self {
            loader,
            hooks: HashMap::new(),
        }
    }

    /// Returns the hooks of `declaration`, running its body on first request.
    ///
    /// Later calls return the same record without touching the loader or the
    /// macro body again.
    pub fn get_hooks_for_macro(
        &mut self,
        declaration: &MacroDeclaration,
    ) -> Result<Arc<MacroHooks>, MacroLoadError> {
        if let Some(hooks) = self.hooks.get(&declaration.id) {
            debug!(name = %declaration.name, "hook cache hit");
            return Ok(Arc::clone(hooks));
        }

        let implementation = self.loader.load_macro(declaration)?;
        let mut hooks = MacroHooks::default();
        {
            let mut api = MacroRegistrationApi::new(&mut hooks, declaration);
            implementation(&mut api);
        }
        debug!(
            name = %declaration.name,
            transform = hooks.transform.len(),
            check = hooks.check.len(),
            "hook cache miss: ran macro body"
        );

        let hooks = Arc::new(hooks);
        self.hooks.insert(declaration.id, Arc::clone(&hooks));
        Ok(hooks)
    }

    pub fn loader(&self) -> &MacroLoader {
        &self.loader
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn reset(&mut self) {
        self.hooks.clear();
        self.loader.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::macros::loader::{MacroModule, ModuleTable};
    use crate::macros::DeclarationShape;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn body_runs_once_and_record_is_shared() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let module = MacroModule::new().export("f", move |api| {
            counter.fetch_add(1, Ordering::SeqCst);
            api.transform(|_| {});
            api.check(|_| None);
        });
        let mut cache = HookCache::new(MacroLoader::new(ModuleTable::new().with_module("m.kn", module)));
        let declaration = MacroDeclaration {
            id: NodeId(1),
            kind: MacroKind::Function,
            name: "f".into(),
            shape: DeclarationShape::Function {
                default_export: false,
            },
            file: PathBuf::from("m.kn"),
            span: Span::default(),
        };

        let first = cache.get_hooks_for_macro(&declaration).unwrap();
        let second = cache.get_hooks_for_macro(&declaration).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!((first.transform.len(), first.check.len()), (1, 1));
    }
}
