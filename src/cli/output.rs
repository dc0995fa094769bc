//! Handles all user-facing output for the CLI.
//!
//! Colors go through `termcolor`, diffs through `difference`. Write errors on
//! stdout are ignored; there is nowhere left to report them.

use std::io::Write;
use std::path::Path;

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::macros::check::{CheckReport, DiagnosticKind};
use crate::macros::std::StandardMacro;

fn stdout() -> StandardStream {
    StandardStream::stdout(ColorChoice::Auto)
}

/// Prints `// path` in bold, used to separate files.
pub fn print_header(path: &Path) {
    let mut out = stdout();
    let _ = out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    let _ = writeln!(out, "// {}", path.display());
    let _ = out.reset();
}

pub fn print_text(text: &str) {
    print!("{text}");
}

/// Prints a line diff from `before` to `after`.
pub fn print_diff(before: &str, after: &str) {
    let changeset = Changeset::new(before, after, "\n");
    let mut out = stdout();
    for diff in &changeset.diffs {
        let (color, marker, text) = match diff {
            Difference::Same(text) => (None, ' ', text),
            Difference::Add(text) => (Some(Color::Green), '+', text),
            Difference::Rem(text) => (Some(Color::Red), '-', text),
        };
        let _ = out.set_color(ColorSpec::new().set_fg(color));
        for line in text.split('\n') {
            let _ = writeln!(out, "{marker}{line}");
        }
    }
    let _ = out.reset();
}

pub fn print_check_report(path: &Path, report: &CheckReport) {
    let mut out = stdout();
    if report.sites.is_empty() {
        let _ = writeln!(out, "{}: no macro sites", path.display());
    }
    for site in &report.sites {
        let ty = site
            .return_type
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "(no type)".to_string());
        let _ = out.set_color(ColorSpec::new().set_bold(true));
        let _ = write!(out, "{}!", site.macro_name);
        let _ = out.reset();
        let _ = writeln!(out, " at {}..{}: {}", site.span.start, site.span.end, ty);
    }
    for diagnostic in &report.diagnostics {
        let color = match diagnostic.kind {
            DiagnosticKind::Error => Color::Red,
            DiagnosticKind::Suggestion => Color::Cyan,
            DiagnosticKind::Message => Color::White,
        };
        let _ = out.set_color(ColorSpec::new().set_fg(Some(color)));
        let _ = write!(out, "{}", diagnostic.kind);
        let _ = out.reset();
        let _ = writeln!(
            out,
            " [{}..{}]: {}",
            diagnostic.span.start, diagnostic.span.end, diagnostic.message
        );
    }
}

pub fn print_macro_table(macros: &[StandardMacro]) {
    let mut out = stdout();
    let width = macros.iter().map(|m| m.name.len()).max().unwrap_or(0);
    for entry in macros {
        let _ = out.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
        let _ = write!(out, "{:<width$}", entry.name);
        let _ = out.reset();
        let _ = writeln!(out, "  {:<8}  {}", entry.kind.as_str(), entry.summary);
    }
}
