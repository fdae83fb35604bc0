//! Utility functions for external command execution and size/time parsing.

use crate::error::GfError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Command;

static WALLTIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+:[0-5]\d:[0-5]\d$").unwrap());

/// Result of running an external command
#[derive(Debug)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.return_code == Some(0)
    }
}

/// Execute a command and capture stdout, stderr and the return code.
///
/// The return code is `None` when the process was killed by a signal.
pub fn run_command(program: &str, args: &[String]) -> Result<CommandResult, GfError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| GfError::SubmitLaunch {
            program: program.to_string(),
            source,
        })?;

    Ok(CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        return_code: output.status.code(),
    })
}

/// Parse a size with an optional `MB`/`GB` suffix into megabytes.
///
/// `GB` is decimal (x1000). A bare number is taken as megabytes.
pub fn parse_size_mb(value: &str) -> Result<u64, GfError> {
    let invalid = |reason: &str| GfError::InvalidSize {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let upper = value.trim().to_uppercase();
    if upper.is_empty() {
        return Err(invalid("empty value"));
    }

    let (number, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1000)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1)
    } else if upper.chars().all(|c| c.is_ascii_digit()) {
        (upper.as_str(), 1)
    } else {
        return Err(invalid("unsupported unit, use MB or GB"));
    };

    let number: u64 = number
        .trim()
        .parse()
        .map_err(|_| invalid("not a whole number"))?;
    number
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("value too large"))
}

/// Parse an optional size, keeping `current` when the value is blank.
pub fn parse_size_or(value: &str, current: Option<u64>) -> Result<Option<u64>, GfError> {
    if value.trim().is_empty() {
        return Ok(current);
    }
    parse_size_mb(value).map(Some)
}

/// Format megabytes back into the shortest `GB`/`MB` form.
pub fn format_mb(value: u64) -> String {
    if value != 0 && value % 1000 == 0 {
        format!("{}GB", value / 1000)
    } else {
        format!("{}MB", value)
    }
}

/// Check a walltime of the form `H+:MM:SS`.
pub fn validate_walltime(value: &str) -> Result<String, GfError> {
    let value = value.trim();
    if WALLTIME_RE.is_match(value) {
        Ok(value.to_string())
    } else {
        Err(GfError::InvalidWalltime(value.to_string()))
    }
}

/// Truncate a job name to the scheduler's 15 character display limit.
pub fn truncate_job_name(name: &str) -> String {
    name.chars().take(15).collect()
}

/// Line terminator used by `content`: CRLF if any line ends with it, LF otherwise.
pub fn line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Join lines back with the terminator of `original`, keeping its trailing newline.
pub fn join_lines(lines: &[String], original: &str) -> String {
    let eol = line_ending(original);
    let mut joined = lines.join(eol);
    if original.ends_with('\n') || original.is_empty() {
        joined.push_str(eol);
    }
    joined
}
