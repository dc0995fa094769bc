//! The compilation pipeline.
//!
//! Every path through the engine, the CLI and the rewrite hook included, goes
//! through the same layering: Parse → Register (declarations, then use sites)
//! → Expand → Lower (`defer`, operators) → Print.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::ast::visit::{walk_expr, Visit};
use crate::ast::{Expr, MacroKind, SourceFile};
use crate::errors::{KilnError, Result};
use crate::lowering::{lower_defers, lower_operators};
use crate::macros::binder::{bind_use_sites, collect_declarations, collect_metaprogram_dependencies};
use crate::macros::check::{
    check_function_macro, check_tagged_template_macro, CheckReport, CheckedSite, TypeChecker,
};
use crate::macros::expander::expand_source_file;
use crate::matchers::macro_use_site;
use crate::session::CompilationSession;
use crate::syntax;

/// What the pipeline did to one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub sites: usize,
    pub derived_classes: usize,
    pub patches: usize,
    pub defer_bodies: usize,
    pub operators: usize,
}

/// A compiled file: its path, rewritten text and report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledFile {
    pub path: PathBuf,
    pub text: String,
    pub report: FileReport,
}

// ============================================================================
// PIPELINE STAGES
// ============================================================================

impl CompilationSession {
    /// Parses `text` with this session's node factory.
    pub fn parse(&self, path: impl AsRef<Path>, text: &str) -> Result<SourceFile> {
        syntax::parse(path, text, &self.factory)
    }

    /// Reads and parses a file.
    pub fn parse_file(&self, path: &Path) -> Result<SourceFile> {
        let text = std::fs::read_to_string(path).map_err(|e| KilnError::io(path, e))?;
        self.parse(path, &text)
    }

    /// Registers every declaration in `files`, then binds every use site.
    /// Files imported by declaring files join the metaprogram set.
    ///
    /// Both passes finish before any hook runs, so a file may use macros
    /// declared in a file that comes after it.
    pub fn register_files(&mut self, files: &[SourceFile]) -> Result<()> {
        for file in files {
            collect_declarations(&mut self.registry, file)?;
        }
        collect_metaprogram_dependencies(&mut self.registry, files);
        for file in files {
            bind_use_sites(&mut self.registry, file);
        }
        Ok(())
    }

    /// Expands and lowers one registered file in place.
    pub fn transform_file(&mut self, file: &mut SourceFile) -> Result<FileReport> {
        let expansion = expand_source_file(
            file,
            &self.registry,
            &mut self.hooks,
            &self.factory,
            &self.config,
        )?;
        let defer_bodies = lower_defers(file, &self.factory)?;
        let operators = lower_operators(file, &self.operators, &self.factory);

        let report = FileReport {
            sites: expansion.sites,
            derived_classes: expansion.derived_classes,
            patches: expansion.patches,
            defer_bodies,
            operators,
        };
        info!(
            file = %file.path.display(),
            sites = report.sites,
            derived = report.derived_classes,
            defer = report.defer_bodies,
            operators = report.operators,
            "compiled"
        );
        Ok(report)
    }

    // ========================================================================
    // WHOLE-PROGRAM ENTRY POINTS
    // ========================================================================

    /// Compiles a set of `(path, text)` inputs as one program.
    pub fn compile_files(&mut self, inputs: &[(PathBuf, String)]) -> Result<Vec<CompiledFile>> {
        let mut files = inputs
            .iter()
            .map(|(path, text)| self.parse(path, text))
            .collect::<Result<Vec<_>>>()?;
        self.register_files(&files)?;

        let mut compiled = Vec::with_capacity(files.len());
        for file in &mut files {
            let report = self.transform_file(file)?;
            compiled.push(CompiledFile {
                path: file.path.clone(),
                text: syntax::print(file),
                report,
            });
        }
        Ok(compiled)
    }

    /// Compiles one file against whatever this session has registered so far.
    pub fn compile_source(&mut self, path: impl AsRef<Path>, text: &str) -> Result<String> {
        let mut file = self.parse(path, text)?;
        self.register_files(std::slice::from_ref(&file))?;
        self.transform_file(&mut file)?;
        Ok(syntax::print(&file))
    }

    // ========================================================================
    // CHECKING
    // ========================================================================

    /// Runs the check hook of every bound site in a registered file.
    pub fn check_file(&mut self, file: &SourceFile, checker: &dyn TypeChecker) -> Result<CheckReport> {
        let mut collector = SiteCollector::default();
        collector.visit_file(file);

        let mut report = CheckReport::default();
        for site in &collector.sites {
            let Some((kind, name)) = macro_use_site(site) else {
                continue;
            };
            if self.registry.get_macro_binding(kind, site.id).is_none() {
                continue;
            }

            let mut sink = |diagnostic| report.diagnostics.push(diagnostic);
            let return_type = match kind {
                MacroKind::TaggedTemplate => check_tagged_template_macro(
                    &self.registry,
                    &mut self.hooks,
                    site,
                    &file.path,
                    checker,
                    &mut sink,
                )?,
                _ => check_function_macro(
                    &self.registry,
                    &mut self.hooks,
                    site,
                    &file.path,
                    checker,
                    &mut sink,
                )?,
            };
            report.sites.push(CheckedSite {
                macro_name: name.to_string(),
                span: site.span,
                return_type,
            });
        }
        Ok(report)
    }
}

/// Collects macro call and tagged template sites in source order.
#[derive(Default)]
struct SiteCollector {
    sites: Vec<Expr>,
}

impl Visit for SiteCollector {
    fn visit_expr(&mut self, expr: &Expr) {
        if macro_use_site(expr).is_some() {
            self.sites.push(expr.clone());
        }
        walk_expr(self, expr);
    }
}
