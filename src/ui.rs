//! UI utilities for consistent terminal output formatting.
//!
//! Provides shared formatting for error messages and the post-mortem log
//! tails shown when a stage fails.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Width of error box separators.
const ERROR_BOX_WIDTH: usize = 60;

/// How many log lines to show when a component fails.
const FAILURE_TAIL_LINES: usize = 20;

/// Print an error box with a title and optional stderr/stdout content.
pub fn print_error_box(title: &str, stderr: Option<&str>, stdout: Option<&str>) {
    eprintln!("\n{}", "=".repeat(ERROR_BOX_WIDTH));
    eprintln!("{title}");
    eprintln!("{}", "=".repeat(ERROR_BOX_WIDTH));

    if let Some(err) = stderr
        && !err.is_empty()
    {
        eprintln!("\n{err}");
    }

    if let Some(out) = stdout
        && !out.is_empty()
    {
        eprintln!("{out}");
    }
}

/// Print an error box from command output.
///
/// Convenience function that extracts stderr/stdout from `std::process::Output`.
pub fn print_error_box_from_output(title: &str, output: &std::process::Output) {
    let stderr = String::from_utf8(output.stderr.clone()).ok();
    let stdout = String::from_utf8(output.stdout.clone()).ok();

    print_error_box(title, stderr.as_deref(), stdout.as_deref());
}

/// Read the last N lines from a log file.
///
/// Returns an empty vec if the file does not exist or cannot be read; the
/// failure report is best-effort.
fn tail_log(log_path: &Path, lines: usize) -> Vec<String> {
    let Ok(file) = File::open(log_path) else {
        return Vec::new();
    };

    let all_lines: Vec<String> = BufReader::new(file)
        .lines()
        .map_while(std::io::Result::ok)
        .collect();

    let start = all_lines.len().saturating_sub(lines);
    all_lines[start..].to_vec()
}

/// Show the tail of a failed component's log files.
///
/// Printed by the command layer after a launch failure or readiness
/// timeout, so the operator sees the cause without hunting for log files.
pub fn print_failure_report(logs_dir: &Path, component: &str) {
    for extension in ["err", "out"] {
        let path = logs_dir.join(format!("{component}.{extension}"));
        let tail = tail_log(&path, FAILURE_TAIL_LINES);
        if !tail.is_empty() {
            print_error_box(
                &format!("Last output from {} ({})", component, path.display()),
                None,
                Some(&tail.join("\n")),
            );
        }
    }
}
