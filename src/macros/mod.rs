//! # Kiln Macro System
//!
//! Macros are ordinary host-language functions marked with the `macro`
//! modifier. Their bodies never see a use site. Instead they receive a
//! [`MacroRegistrationApi`] and register `transform` and `check` hooks, which
//! the engine then runs once per use site.
//!
//! ## Pipeline
//!
//! 1. [`binder`] classifies declarations and binds use sites in the
//!    [`MacroRegistry`].
//! 2. [`hooks::HookCache`] loads each declaration's implementation through the
//!    [`loader::MacroLoader`] and runs it once to collect its hooks.
//! 3. [`expander`] walks each file outer-first, folding every bound site
//!    through its transform hooks and committing the results.
//!
//! **INVARIANT:** a declaration's body runs at most once per session, no
//! matter how many sites use it. Hooks run once per site.

use ::std::path::PathBuf;

use serde::Serialize;

use crate::ast::{MacroKind, Node, NodeId, Span, Stmt};

pub mod binder;
pub mod check;
pub mod expander;
pub mod hooks;
pub mod loader;
pub mod registry;
pub mod std;
pub mod transform;

pub use check::{CheckApi, CheckDiagnostic, DiagnosticKind, IntrinsicType, TypeDefinition};
pub use hooks::{HookCache, MacroHooks, MacroRegistrationApi};
pub use loader::{MacroImplementation, MacroLoader, MacroModule, ModuleSource, ModuleTable};
pub use registry::MacroRegistry;
pub use transform::{SourceFileApi, TransformApi, TransformNode};

// ============================================================================
// DECLARATIONS
// ============================================================================

/// How a macro declaration is reachable from its module's exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeclarationShape {
    /// `macro function name() {}`, exported as `name` or as `default`.
    Function { default_export: bool },
    /// `const variable = macro function name() {}`, exported as `variable`.
    BoundExpression { variable: String },
    /// A function expression reachable through no binding.
    Unbound,
}

/// A function declared with the `macro` modifier.
///
/// Identity is the declaring node's id. Declarations are created once during
/// classification and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroDeclaration {
    pub id: NodeId,
    pub kind: MacroKind,
    /// The declared function name.
    pub name: String,
    pub shape: DeclarationShape,
    /// The declaring file.
    pub file: PathBuf,
    pub span: Span,
}

impl MacroDeclaration {
    /// The export the loader resolves this declaration through.
    pub fn export_name(&self) -> Option<&str> {
        match &self.shape {
            DeclarationShape::Function {
                default_export: true,
            } => Some("default"),
            DeclarationShape::Function { .. } => Some(&self.name),
            DeclarationShape::BoundExpression { variable } => Some(variable),
            DeclarationShape::Unbound => None,
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// One edit requested by a hook.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroResult {
    /// Replace the use site.
    Replace(Node),
    /// Insert a statement after the statement holding the use site.
    Append(Stmt),
    /// Insert a statement before the statement holding the use site.
    Prepend(Stmt),
    /// Remove the use site.
    Remove,
    /// Append a statement to the end of the file.
    AppendAll(Stmt),
    /// Insert a statement at the top of the file.
    PrependAll(Stmt),
}

/// The edits one hook invocation requested, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroResults {
    list: Vec<MacroResult>,
}

impl MacroResults {
    pub fn replace(&mut self, node: Node) {
        self.list.push(MacroResult::Replace(node));
    }

    pub fn append(&mut self, stmt: Stmt) {
        self.list.push(MacroResult::Append(stmt));
    }

    pub fn prepend(&mut self, stmt: Stmt) {
        self.list.push(MacroResult::Prepend(stmt));
    }

    pub fn remove(&mut self) {
        self.list.push(MacroResult::Remove);
    }

    pub fn append_all(&mut self, stmt: Stmt) {
        self.list.push(MacroResult::AppendAll(stmt));
    }

    pub fn prepend_all(&mut self, stmt: Stmt) {
        self.list.push(MacroResult::PrependAll(stmt));
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn extend(&mut self, other: MacroResults) {
        self.list.extend(other.list);
    }

    pub fn into_list(self) -> Vec<MacroResult> {
        self.list
    }
}

impl IntoIterator for MacroResults {
    type Item = MacroResult;
    type IntoIter = ::std::vec::IntoIter<MacroResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.into_iter()
    }
}
