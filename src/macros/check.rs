//! Check hooks: synthetic return types for macro use sites.
//!
//! A check hook inspects a site read-only and may describe the type the site
//! evaluates to, using [`TypeDefinition`] values instead of real checker types.
//! The checker itself is an external oracle behind [`TypeChecker`].
//!
//! Only the most recently registered check hook of a declaration runs.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::ast::{Expr, MacroKind, Node, Span};
use crate::errors::Result;
use crate::macros::hooks::{HookCache, MacroHooks};
use crate::macros::registry::MacroRegistry;
use crate::macros::MacroDeclaration;

// ============================================================================
// TYPE DEFINITIONS
// ============================================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum IntrinsicType {
    String,
    Number,
    Boolean,
    Any,
    Null,
    Undefined,
    Void,
    Never,
}

impl IntrinsicType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntrinsicType::String => "string",
            IntrinsicType::Number => "number",
            IntrinsicType::Boolean => "boolean",
            IntrinsicType::Any => "any",
            IntrinsicType::Null => "null",
            IntrinsicType::Undefined => "undefined",
            IntrinsicType::Void => "void",
            IntrinsicType::Never => "never",
        }
    }
}

/// Opaque handle to a type owned by the external checker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CheckerTypeId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectMemberDefinition {
    pub name: String,
    pub ty: Box<TypeDefinition>,
    pub optional: bool,
}

/// A type description a check hook can build without the real checker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeDefinition {
    Intrinsic(IntrinsicType),
    Object { members: Vec<ObjectMemberDefinition> },
    ObjectMember(ObjectMemberDefinition),
    Array { element: Box<TypeDefinition> },
    Union(Vec<TypeDefinition>),
    Intersection(Vec<TypeDefinition>),
    GenericInstance {
        base: Box<TypeDefinition>,
        arguments: Vec<TypeDefinition>,
    },
    GlobalReference { name: String, arity: usize },
    ResolvedType(CheckerTypeId),
}

impl fmt::Display for ObjectMemberDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let optional = if self.optional { "?" } else { "" };
        write!(f, "{}{}: {}", self.name, optional, self.ty)
    }
}

impl fmt::Display for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDefinition::Intrinsic(intrinsic) => f.write_str(intrinsic.as_str()),
            TypeDefinition::Object { members } if members.is_empty() => f.write_str("{}"),
            TypeDefinition::Object { members } => {
                let members: Vec<_> = members.iter().map(ToString::to_string).collect();
                write!(f, "{{ {} }}", members.join("; "))
            }
            TypeDefinition::ObjectMember(member) => write!(f, "{member}"),
            TypeDefinition::Array { element } => match element.as_ref() {
                TypeDefinition::Union(_) | TypeDefinition::Intersection(_) => write!(f, "({element})[]"),
                _ => write!(f, "{element}[]"),
            },
            TypeDefinition::Union(types) => write_joined(f, types, " | "),
            TypeDefinition::Intersection(types) => write_joined(f, types, " & "),
            TypeDefinition::GenericInstance { base, arguments } => {
                write!(f, "{base}<")?;
                write_joined(f, arguments, ", ")?;
                f.write_str(">")
            }
            TypeDefinition::GlobalReference { name, .. } => f.write_str(name),
            TypeDefinition::ResolvedType(id) => write!(f, "#{}", id.0),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, types: &[TypeDefinition], separator: &str) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

/// Constructors handed to check hooks.
#[derive(Debug, Copy, Clone, Default)]
pub struct TypeDefinitionFactory;

impl TypeDefinitionFactory {
    pub fn create_intrinsic(&self, ty: IntrinsicType) -> TypeDefinition {
        TypeDefinition::Intrinsic(ty)
    }

    pub fn create_object(&self, members: Vec<ObjectMemberDefinition>) -> TypeDefinition {
        TypeDefinition::Object { members }
    }

    pub fn create_object_member(
        &self,
        name: impl Into<String>,
        ty: TypeDefinition,
        optional: bool,
    ) -> ObjectMemberDefinition {
        ObjectMemberDefinition {
            name: name.into(),
            ty: Box::new(ty),
            optional,
        }
    }

    pub fn create_array(&self, element: TypeDefinition) -> TypeDefinition {
        TypeDefinition::Array {
            element: Box::new(element),
        }
    }

    pub fn create_union(&self, types: Vec<TypeDefinition>) -> TypeDefinition {
        TypeDefinition::Union(types)
    }

    pub fn create_intersection(&self, types: Vec<TypeDefinition>) -> TypeDefinition {
        TypeDefinition::Intersection(types)
    }

    pub fn create_generic_instance(
        &self,
        base: TypeDefinition,
        arguments: Vec<TypeDefinition>,
    ) -> TypeDefinition {
        TypeDefinition::GenericInstance {
            base: Box::new(base),
            arguments,
        }
    }

    pub fn create_global_reference(&self, name: impl Into<String>, arity: usize) -> TypeDefinition {
        TypeDefinition::GlobalReference {
            name: name.into(),
            arity,
        }
    }

    pub fn create_resolved_type(&self, ty: CheckerTypeId) -> TypeDefinition {
        TypeDefinition::ResolvedType(ty)
    }
}

// ============================================================================
// CHECKER ORACLE
// ============================================================================

/// Read-only view of the host type checker.
pub trait TypeChecker {
    fn type_of_expr(&self, expr: &Expr) -> Option<CheckerTypeId>;
    fn type_to_string(&self, ty: CheckerTypeId) -> String;
}

/// A checker that knows nothing.
#[derive(Debug, Copy, Clone, Default)]
pub struct NullChecker;

impl TypeChecker for NullChecker {
    fn type_of_expr(&self, _expr: &Expr) -> Option<CheckerTypeId> {
        None
    }

    fn type_to_string(&self, ty: CheckerTypeId) -> String {
        format!("#{}", ty.0)
    }
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Message,
    Suggestion,
    Error,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::Message => "message",
            DiagnosticKind::Suggestion => "suggestion",
            DiagnosticKind::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckDiagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Everything a check hook receives.
pub struct CheckApi<'a> {
    pub node: &'a Node,
    pub factory: TypeDefinitionFactory,
    pub declaration: &'a MacroDeclaration,
    pub source_file: &'a Path,
    pub checker: &'a dyn TypeChecker,
    report: &'a mut dyn FnMut(CheckDiagnostic),
}

impl CheckApi<'_> {
    /// Reports a diagnostic against the site.
    pub fn diagnostic(&mut self, kind: DiagnosticKind, text: impl Into<String>) {
        let span = self.node.span();
        (self.report)(CheckDiagnostic {
            kind,
            message: text.into(),
            span,
        });
    }
}

/// Runs the last registered check hook of a declaration against `node`.
pub fn execute_check_return_type_hook(
    hooks: &MacroHooks,
    declaration: &MacroDeclaration,
    node: &Node,
    source_file: &Path,
    checker: &dyn TypeChecker,
    report: &mut dyn FnMut(CheckDiagnostic),
) -> Option<TypeDefinition> {
    let hook = hooks.check.last()?;
    let mut api = CheckApi {
        node,
        factory: TypeDefinitionFactory,
        declaration,
        source_file,
        checker,
        report,
    };
    hook(&mut api)
}

/// Checks a `name!(...)` site. Unbound sites yield `None`.
pub fn check_function_macro(
    registry: &MacroRegistry,
    cache: &mut HookCache,
    site: &Expr,
    source_file: &Path,
    checker: &dyn TypeChecker,
    report: &mut dyn FnMut(CheckDiagnostic),
) -> Result<Option<TypeDefinition>> {
    check_site(registry, cache, MacroKind::Function, site, source_file, checker, report)
}

/// Checks a `` tag`...` `` site. Unbound sites yield `None`.
pub fn check_tagged_template_macro(
    registry: &MacroRegistry,
    cache: &mut HookCache,
    site: &Expr,
    source_file: &Path,
    checker: &dyn TypeChecker,
    report: &mut dyn FnMut(CheckDiagnostic),
) -> Result<Option<TypeDefinition>> {
    check_site(registry, cache, MacroKind::TaggedTemplate, site, source_file, checker, report)
}

fn check_site(
    registry: &MacroRegistry,
    cache: &mut HookCache,
    kind: MacroKind,
    site: &Expr,
    source_file: &Path,
    checker: &dyn TypeChecker,
    report: &mut dyn FnMut(CheckDiagnostic),
) -> Result<Option<TypeDefinition>> {
    let Some(declaration) = registry.get_macro_binding(kind, site.id) else {
        return Ok(None);
    };
    let hooks = cache.get_hooks_for_macro(declaration)?;
    let node = Node::Expr(site.clone());
    Ok(execute_check_return_type_hook(
        &hooks,
        declaration,
        &node,
        source_file,
        checker,
        report,
    ))
}

/// One checked site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckedSite {
    pub macro_name: String,
    pub span: Span,
    pub return_type: Option<TypeDefinition>,
}

/// Results of checking every bound site in a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub sites: Vec<CheckedSite>,
    pub diagnostics: Vec<CheckDiagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeFactory, NodeId};
    use crate::macros::hooks::MacroRegistrationApi;
    use crate::macros::DeclarationShape;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn declaration() -> MacroDeclaration {
        MacroDeclaration {
            id: NodeId(0),
            kind: MacroKind::Function,
            name: "m".into(),
            shape: DeclarationShape::Function {
                default_export: false,
            },
            file: PathBuf::from("m.kn"),
            span: Span::default(),
        }
    }

    #[test]
    fn only_last_check_hook_runs_every_time() {
        let calls: Arc<[AtomicUsize; 3]> = Arc::new(Default::default());
        let declaration = declaration();
        let mut hooks = MacroHooks::default();
        {
            let mut api = MacroRegistrationApi::new(&mut hooks, &declaration);
            for i in 0..3 {
                let calls = Arc::clone(&calls);
                api.check(move |api| {
                    calls[i].fetch_add(1, Ordering::SeqCst);
                    Some(api.factory.create_intrinsic(IntrinsicType::Number))
                });
            }
        }

        let factory = NodeFactory::new();
        let node = Node::Expr(factory.ident("x"));
        for _ in 0..2 {
            let ty = execute_check_return_type_hook(
                &hooks,
                &declaration,
                &node,
                Path::new("a.kn"),
                &NullChecker,
                &mut |_| {},
            );
            assert_eq!(ty, Some(TypeDefinition::Intrinsic(IntrinsicType::Number)));
        }

        let counts: Vec<_> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(counts, [0, 0, 2]);
    }

    #[test]
    fn diagnostics_reach_the_sink() {
        let declaration = declaration();
        let mut hooks = MacroHooks::default();
        MacroRegistrationApi::new(&mut hooks, &declaration).check(|api| {
            api.diagnostic(DiagnosticKind::Suggestion, "consider a literal");
            None
        });

        let factory = NodeFactory::new();
        let node = Node::Expr(factory.ident("x"));
        let mut seen = Vec::new();
        let ty = execute_check_return_type_hook(
            &hooks,
            &declaration,
            &node,
            Path::new("a.kn"),
            &NullChecker,
            &mut |d| seen.push(d),
        );
        assert!(ty.is_none());
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, DiagnosticKind::Suggestion);
    }

    #[test]
    fn type_definitions_display_like_annotations() {
        let f = TypeDefinitionFactory;
        let object = f.create_object(vec![
            f.create_object_member("a", f.create_intrinsic(IntrinsicType::Number), false),
            f.create_object_member(
                "b",
                f.create_array(f.create_union(vec![
                    f.create_intrinsic(IntrinsicType::String),
                    f.create_intrinsic(IntrinsicType::Null),
                ])),
                true,
            ),
        ]);
        assert_eq!(object.to_string(), "{ a: number; b?: (string | null)[] }");

        let promise = f.create_generic_instance(
            f.create_global_reference("Promise", 1),
            vec![f.create_intrinsic(IntrinsicType::Void)],
        );
        assert_eq!(promise.to_string(), "Promise<void>");
    }
}
