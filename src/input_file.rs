//! Gaussian input (`.com`) resolution and Link0 directive correction.

use crate::config::ResourceConfig;
use crate::error::GfError;
use crate::utils::join_lines;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, NoExpand, Regex};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

static MEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)%mem=\S*").unwrap());
static NPROC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)%nprocshared=\S*").unwrap());
static CHK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)%chk=(\S*[/\\])?[^/\\\s]*").unwrap());
static MAXDISK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)maxdisk=\S*").unwrap());

/// Rewrite the first match on every matching line. Returns whether any line matched.
fn rewrite(lines: &mut [String], re: &Regex, replacement: &str) -> bool {
    let mut found = false;
    for line in lines.iter_mut().filter(|line| re.is_match(line.as_str())) {
        *line = re.replace(line.as_str(), NoExpand(replacement)).into_owned();
        found = true;
    }
    found
}

/// Apply the resolved resources to the text of a job file named `stem`.
pub fn correct_input(content: &str, stem: &str, config: &ResourceConfig) -> String {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let mem = format!("%mem={}MB", config.safe_memory_mb());
    let nproc = format!("%nprocshared={}", config.cores);

    let mut missing = Vec::new();
    if !rewrite(&mut lines, &MEM_RE, &mem) {
        missing.push(mem);
    }
    if !rewrite(&mut lines, &NPROC_RE, &nproc) {
        missing.push(nproc);
    }
    if !missing.is_empty() {
        log::debug!("inserting {:?} at the top", missing);
        lines.splice(0..0, missing);
    }

    for line in lines.iter_mut().filter(|line| CHK_RE.is_match(line.as_str())) {
        *line = CHK_RE
            .replace(line.as_str(), |caps: &Captures| {
                let dir = caps.get(1).map_or("", |m| m.as_str());
                format!("%chk={}{}.chk", dir, stem)
            })
            .into_owned();
    }

    if let Some(maxdisk) = config.maxdisk_mb {
        if !rewrite(&mut lines, &MAXDISK_RE, &format!("maxdisk={}MB", maxdisk)) {
            log::debug!("no maxdisk keyword in {}, left as is", stem);
        }
    }

    join_lines(&lines, content)
}

/// A validated Gaussian job file.
#[derive(Debug, Clone)]
pub struct JobFile {
    path: PathBuf,
}

impl JobFile {
    /// Resolve a command-line argument, trying `<name>.com` when `name` is missing.
    pub fn resolve(raw: &Path) -> Result<Self, GfError> {
        let path = if raw.exists() {
            raw.to_path_buf()
        } else {
            let mut with_ext = OsString::from(raw.as_os_str());
            with_ext.push(".com");
            let with_ext = PathBuf::from(with_ext);
            if with_ext.exists() {
                with_ext
            } else {
                return Err(GfError::JobFileNotFound(raw.to_path_buf()));
            }
        };

        let is_com = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("com"))
            .unwrap_or(false);
        if !is_com {
            return Err(GfError::NotComFile(path));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without the `.com` extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    /// Rewrite the job's resource directives in place.
    pub fn correct(&self, config: &ResourceConfig) -> Result<()> {
        let content = self.read()?;
        let corrected = correct_input(&content, &self.stem(), config);
        if corrected != content {
            fs::write(&self.path, corrected)
                .with_context(|| format!("Failed to update {}", self.path.display()))?;
        }
        log::debug!("corrected {}", self.path.display());
        Ok(())
    }
}
