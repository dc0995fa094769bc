//! The compile-time program.
//!
//! Files that declare macros are emitted as loadable modules before the main
//! compilation. The emitter is an external collaborator behind
//! [`MetaprogramBuilder`]; [`PrintingBuilder`] is the in-crate one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ast::{Export, SourceFile, Stmt, StmtKind};
use crate::errors::{KilnError, Result};
use crate::macros::MacroRegistry;
use crate::matchers::{is_compiler_import, macro_declaration_kind};
use crate::syntax::print;

/// Options of the restricted compile-time program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetaprogramOptions {
    pub emit_declarations: bool,
    pub skip_lib_check: bool,
    pub strict: bool,
}

impl Default for MetaprogramOptions {
    fn default() -> Self {
        Self {
            emit_declarations: false,
            skip_lib_check: true,
            strict: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmitDiagnostic {
    pub path: PathBuf,
    pub message: String,
}

/// Emitted text per output path, plus whatever the builder had to say.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmitOutput {
    pub files: BTreeMap<PathBuf, String>,
    pub diagnostics: Vec<EmitDiagnostic>,
}

pub trait MetaprogramBuilder {
    fn emit(&mut self, files: &[&SourceFile], options: &MetaprogramOptions) -> EmitOutput;
}

/// Emits the registry's metaprogram files found among `files`.
///
/// Builder diagnostics are logged and do not fail the emit. A metaprogram
/// file that produced no text does.
pub fn emit_macro_modules(
    builder: &mut dyn MetaprogramBuilder,
    files: &[SourceFile],
    registry: &MacroRegistry,
    options: &MetaprogramOptions,
) -> Result<EmitOutput> {
    let wanted = registry.get_metaprogram_source_files();
    let selected: Vec<&SourceFile> = files
        .iter()
        .filter(|file| wanted.contains(&file.path))
        .collect();
    debug!(files = selected.len(), "emitting metaprogram");

    let output = builder.emit(&selected, options);
    for diagnostic in &output.diagnostics {
        warn!(
            path = %diagnostic.path.display(),
            "{}",
            KilnError::CompileTimeEmit {
                path: diagnostic.path.clone(),
                message: diagnostic.message.clone(),
            }
        );
    }

    if let Some(missing) = selected
        .iter()
        .find(|file| !output.files.contains_key(&file.path))
    {
        return Err(KilnError::CompileTimeEmit {
            path: missing.path.clone(),
            message: "the builder produced no text for this file".to_string(),
        });
    }
    Ok(output)
}

// ============================================================================
// PRINTING BUILDER
// ============================================================================

/// Prints each file with its `"compiler"` imports removed.
#[derive(Debug, Default)]
pub struct PrintingBuilder;

impl MetaprogramBuilder for PrintingBuilder {
    fn emit(&mut self, files: &[&SourceFile], options: &MetaprogramOptions) -> EmitOutput {
        let mut output = EmitOutput::default();
        for file in files {
            let mut module = (*file).clone();
            module.statements.retain(|stmt| !is_compiler_import(stmt));

            if options.strict && !module.statements.iter().any(|stmt| macro_declaration_kind(stmt).is_some()) {
                output.diagnostics.push(EmitDiagnostic {
                    path: file.path.clone(),
                    message: "no top-level macro declaration; the module exports nothing loadable".to_string(),
                });
            }
            if options.emit_declarations {
                output
                    .files
                    .insert(declaration_path(&file.path), print_declarations(&module));
            }
            output.files.insert(file.path.clone(), print(&module));
        }
        output
    }
}

/// `macros.kn` → `macros.d.kn`
fn declaration_path(path: &Path) -> PathBuf {
    let extension = path
        .extension()
        .map(|ext| format!("d.{}", ext.to_string_lossy()))
        .unwrap_or_else(|| "d".to_string());
    path.with_extension(extension)
}

/// Exported macro declarations with their bodies emptied.
fn print_declarations(file: &SourceFile) -> String {
    let statements = file
        .statements
        .iter()
        .filter_map(|stmt| {
            let StmtKind::Function(function) = &stmt.kind else {
                return None;
            };
            if function.macro_kind.is_none() || function.export == Export::None {
                return None;
            }
            let mut signature = function.clone();
            signature.body.stmts.clear();
            Some(Stmt {
                id: stmt.id,
                span: stmt.span,
                kind: StmtKind::Function(signature),
            })
        })
        .collect();
    print(&SourceFile {
        id: file.id,
        path: file.path.clone(),
        statements,
        span: file.span,
        text: Arc::clone(&file.text),
    })
}
