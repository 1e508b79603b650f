//! CLI command definitions and argument parsing.
//!
//! Uses clap derive macros for ergonomic argument definitions.

pub mod args;

/// About text with ANSI styling for clap help output.
pub const ABOUT_STYLED: &str =
    "\x1b[1mprlens\x1b[0m \x1b[2m· AI code review for GitHub pull requests and GitLab merge requests\x1b[0m";

/// Print a one-line header naming the change under review to stderr.
pub fn print_header(url: &str, backend: &str) {
    use colored::Colorize;
    use std::io::Write;
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = writeln!(handle);
    let _ = writeln!(
        handle,
        "  {} {}",
        "prlens".bold(),
        format!("· {url} · {backend}").dimmed(),
    );
    let _ = writeln!(handle);
    let _ = handle.flush();
}
