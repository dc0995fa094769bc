//! The Kiln Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the core library functions. Errors are rendered through `miette`.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use crate::cli::args::{Command, KilnArgs};
use crate::config::EngineConfig;
use crate::errors::{print_error, KilnError, Result};
use crate::macros::check::NullChecker;
use crate::macros::std::STANDARD_MACROS;
use crate::metaprogram::{emit_macro_modules, MetaprogramOptions, PrintingBuilder};
use crate::rewrite::RewriteHook;
use crate::session::CompilationSession;

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = KilnArgs::parse();
    init_tracing(args.verbose);

    if let Err(error) = dispatch(args) {
        print_error(error);
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("KILN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn dispatch(args: KilnArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Expand { paths, diff } => handle_expand(config, &paths, diff),
        Command::Check { file } => handle_check(config, &file),
        Command::Meta {
            paths,
            declarations,
        } => handle_meta(config, &paths, declarations),
        Command::Ast { file } => handle_ast(config, &file),
        Command::ListMacros => {
            output::print_macro_table(STANDARD_MACROS);
            Ok(())
        }
    }
}

// ============================================================================
// COMMAND HANDLERS
// ============================================================================

fn handle_expand(config: EngineConfig, paths: &[PathBuf], diff: bool) -> Result<()> {
    let hook = RewriteHook::from_config(&config);
    let inputs = collect_inputs(paths, &hook)?;
    let mut session = CompilationSession::with_std(config)?;
    let compiled = session.compile_files(&inputs)?;

    let show_headers = compiled.len() > 1 || diff;
    for ((_, original), file) in inputs.iter().zip(&compiled) {
        if show_headers {
            output::print_header(&file.path);
        }
        if diff {
            output::print_diff(original, &file.text);
        } else {
            output::print_text(&file.text);
        }
    }
    Ok(())
}

fn handle_check(config: EngineConfig, path: &Path) -> Result<()> {
    let mut session = CompilationSession::with_std(config)?;
    let file = session.parse_file(path)?;
    session.register_files(std::slice::from_ref(&file))?;
    let report = session.check_file(&file, &NullChecker)?;
    output::print_check_report(path, &report);
    Ok(())
}

fn handle_meta(config: EngineConfig, paths: &[PathBuf], declarations: bool) -> Result<()> {
    let hook = RewriteHook::from_config(&config);
    let inputs = collect_inputs(paths, &hook)?;
    let mut session = CompilationSession::with_std(config)?;
    let files = inputs
        .iter()
        .map(|(path, text)| session.parse(path, text))
        .collect::<Result<Vec<_>>>()?;
    session.register_files(&files)?;

    let options = MetaprogramOptions {
        emit_declarations: declarations,
        ..MetaprogramOptions::default()
    };
    let emitted = emit_macro_modules(&mut PrintingBuilder, &files, &session.registry, &options)?;
    for (path, text) in &emitted.files {
        output::print_header(path);
        output::print_text(text);
    }
    Ok(())
}

fn handle_ast(config: EngineConfig, path: &Path) -> Result<()> {
    let session = CompilationSession::with_std(config)?;
    let file = session.parse_file(path)?;
    let json = serde_json::to_string_pretty(&file).map_err(|e| KilnError::Config {
        message: format!("could not serialize the tree: {e}"),
    })?;
    println!("{json}");
    Ok(())
}

// ============================================================================
// DISCOVERY
// ============================================================================

/// Reads every input. Files named on the command line are always taken;
/// directories contribute the files the rewrite hook intercepts.
fn collect_inputs(paths: &[PathBuf], hook: &RewriteHook) -> Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| path.clone());
                KilnError::io(at, e.into())
            })?;
            if entry.file_type().is_file() && hook.intercepts(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    files
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path).map_err(|e| KilnError::io(&path, e))?;
            Ok((path, text))
        })
        .collect()
}
