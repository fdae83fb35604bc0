//! Append-only submission log and the `-l` viewer.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// One `timestamp | job id | job name | work dir` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub job_id: String,
    pub job_name: String,
    pub work_dir: String,
}

impl LogEntry {
    pub fn new(job_id: &str, job_name: &str, cwd: &Path, jobs_root: &str) -> Self {
        Self::at(Utc::now(), job_id, job_name, cwd, jobs_root)
    }

    pub fn at(time: DateTime<Utc>, job_id: &str, job_name: &str, cwd: &Path, jobs_root: &str) -> Self {
        Self {
            timestamp: time.format("%d/%m - %H:%M").to_string(),
            // qsub prints a single id, keep the record on one line regardless
            job_id: job_id.split_whitespace().collect::<Vec<_>>().join(" "),
            job_name: job_name.to_string(),
            work_dir: relative_work_dir(cwd, jobs_root),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} | {} | {} | {}",
            self.timestamp, self.job_id, self.job_name, self.work_dir
        )
    }
}

/// Working directory with the jobs root stripped, or the full path outside it.
pub fn relative_work_dir(cwd: &Path, jobs_root: &str) -> String {
    if jobs_root.is_empty() {
        return cwd.to_string_lossy().to_string();
    }
    match cwd.strip_prefix(jobs_root) {
        Ok(rest) => rest.to_string_lossy().to_string(),
        Err(_) => cwd.to_string_lossy().to_string(),
    }
}

/// The primary (`.wlog`) and full (`.wulog`) submission logs.
#[derive(Debug, Clone)]
pub struct JobLog {
    primary: PathBuf,
    full: PathBuf,
}

impl JobLog {
    pub fn new(primary: impl Into<PathBuf>, full: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            full: full.into(),
        }
    }

    /// Append an entry to both log files.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let line = entry.to_line();
        for path in [&self.primary, &self.full] {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log {}", path.display()))?;
            writeln!(file, "{}", line)
                .with_context(|| format!("Failed to write log {}", path.display()))?;
        }
        log::info!("logged submission: {}", line);
        Ok(())
    }

    /// Print the whole primary log for `all`, otherwise the lines containing `selector`.
    pub fn show<W: Write>(&self, selector: &str, out: &mut W) -> Result<()> {
        let content = match fs::read_to_string(&self.primary) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.primary.display()))
            }
        };

        let selector = selector.trim();
        if selector.eq_ignore_ascii_case("all") {
            out.write_all(content.as_bytes())?;
        } else {
            for line in content.lines().filter(|line| line.contains(selector)) {
                writeln!(out, "{}", line)?;
            }
        }
        Ok(())
    }
}
