//! Defines the command-line arguments and subcommands for the Kiln CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Compile-time macro expansion with derive chaining and defer lowering."
)]
pub struct KilnArgs {
    /// Engine configuration file (YAML).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Raise the log level; repeat for more detail. `KILN_LOG` overrides it.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expand macros and lower defer/operators; print the rewritten files.
    Expand {
        /// Files or directories to compile as one program.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Show a colored line diff against the input instead of the output.
        #[arg(long)]
        diff: bool,
    },
    /// Run check hooks and print synthetic return types and diagnostics.
    Check {
        /// The file to check.
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Print the compile-time program: every file that declares macros.
    Meta {
        /// Files or directories to scan.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Also emit `.d` declaration files.
        #[arg(long)]
        declarations: bool,
    },
    /// Show the parsed tree as JSON.
    Ast {
        /// The file to parse.
        #[arg(required = true)]
        file: PathBuf,
    },
    /// List the standard macros.
    ListMacros,
}
