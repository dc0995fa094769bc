//! Kiln error handling.
//!
//! All failures surface as [`KilnError`], a `thiserror` enum that also derives
//! `miette::Diagnostic` so the CLI can render spans and help text. Loader
//! failures have their own [`MacroLoadError`] which converts into `KilnError`.
//!
//! Policy: structural and loading errors abort the compilation of the file
//! that hit them. Lookup misses (unresolved derive names, unmatched statement
//! anchors) are only errors when the configured [`MissPolicy`] says so.
//!
//! [`MissPolicy`]: crate::config::MissPolicy

use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::ast::Span;

pub type Result<T, E = KilnError> = std::result::Result<T, E>;

/// The unified engine error.
#[derive(Error, Diagnostic, Debug)]
pub enum KilnError {
    #[error("Parse error in {path}: {message}")]
    #[diagnostic(code(kiln::parse))]
    Parse {
        path: PathBuf,
        message: String,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    MacroLoad(#[from] MacroLoadError),

    #[error("Malformed macro declaration in {path}: {reason}")]
    #[diagnostic(
        code(kiln::macro_binding),
        help("declare macros as `macro function name() {{}}` or `const name = macro function name() {{}}`")
    )]
    MacroBinding {
        path: PathBuf,
        reason: String,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("declared here")]
        span: SourceSpan,
    },

    #[error("Macro '{macro_name}' replaced a {site} site with a {found}")]
    #[diagnostic(code(kiln::invalid_replacement))]
    InvalidReplacement {
        macro_name: String,
        site: &'static str,
        found: &'static str,
    },

    #[error("Class '{class}' derives '{name}', which is not a registered derive macro")]
    #[diagnostic(code(kiln::unresolved_derive))]
    UnresolvedDerive { class: String, name: String },

    #[error("{count} statement patch(es) in {path} matched no anchor statement")]
    #[diagnostic(code(kiln::unresolved_patch_anchor))]
    UnresolvedPatchAnchor { path: PathBuf, count: usize },

    #[error("`defer` in {path} is not a direct statement of a function body")]
    #[diagnostic(
        code(kiln::misplaced_defer),
        help("move the `defer` to the top level of the enclosing function")
    )]
    MisplacedDefer {
        path: PathBuf,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("outside any function body")]
        span: SourceSpan,
    },

    #[error("Could not emit metaprogram file {path}: {message}")]
    #[diagnostic(code(kiln::compile_time_emit))]
    CompileTimeEmit { path: PathBuf, message: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(code(kiln::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(kiln::config))]
    Config { message: String },
}

/// Failures while resolving a macro declaration to its implementation.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum MacroLoadError {
    #[error("Macro module {path} could not be loaded")]
    #[diagnostic(code(kiln::load::module_not_found))]
    ModuleNotFound { path: PathBuf },

    #[error("Function {name} not found in module {path}")]
    #[diagnostic(code(kiln::load::export_not_found))]
    ExportNotFound { name: String, path: PathBuf },

    #[error("Failed to load macro from {path}: declaration is neither a named function nor a variable-bound function expression")]
    #[diagnostic(code(kiln::load::unsupported_declaration))]
    UnsupportedDeclaration { path: PathBuf },

    #[error("Cyclic macro module load: {}", display_chain(.chain))]
    #[diagnostic(
        code(kiln::load::cyclic),
        help("a macro module cannot require itself, directly or through other macro modules")
    )]
    Cyclic { chain: Vec<PathBuf> },
}

fn display_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl KilnError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KilnError::Io {
            path: path.into(),
            source,
        }
    }
}

/// The source of a file, named by its path, for labelled diagnostics.
pub fn named_source(path: &Path, text: &str) -> Arc<NamedSource<String>> {
    Arc::new(NamedSource::new(path.display().to_string(), text.to_string()))
}

/// Converts a Kiln span to a miette span.
pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

/// Prints an error with full miette diagnostics.
pub fn print_error(error: KilnError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}
