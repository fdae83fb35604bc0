//! Keeps the PBS directives of the submission template in line with the resolved resources.

use crate::config::ResourceConfig;
use crate::utils::join_lines;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

const RESOURCES_PREFIX: &str = "#PBS -lselect=";
const WALLTIME_PREFIX: &str = "#PBS -l walltime=";
const QUEUE_PREFIX: &str = "#PBS -q ";
const DIRECTIVE_PREFIX: &str = "#PBS";
const MODULE_PREFIX: &str = "module load gaussian/";

/// Line index where a missing queue directive is inserted (0-based).
pub const QUEUE_LINE_INDEX: usize = 13;

fn is_directive(line: &str, prefix: &str) -> bool {
    line.trim_start().starts_with(prefix)
}

/// Index right after the last `#PBS` line, or the queue slot if there is none.
fn directive_anchor(lines: &[String]) -> usize {
    lines
        .iter()
        .rposition(|line| is_directive(line, DIRECTIVE_PREFIX))
        .map(|i| i + 1)
        .unwrap_or_else(|| QUEUE_LINE_INDEX.min(lines.len()))
}

/// Replace the first matching line and drop any further ones, inserting if absent.
fn upsert(lines: &mut Vec<String>, prefix: &str, replacement: String, insert_at: usize) {
    let mut found = false;
    lines.retain_mut(|line| {
        if !is_directive(line, prefix) {
            return true;
        }
        if found {
            return false;
        }
        *line = replacement.clone();
        found = true;
        true
    });

    if !found {
        let at = insert_at.min(lines.len());
        log::debug!("inserting '{}' at line {}", replacement, at + 1);
        lines.insert(at, replacement);
    }
}

/// Render the resource request line.
pub fn resources_line(config: &ResourceConfig) -> String {
    match config.maxdisk_mb {
        Some(maxdisk) => format!(
            "#PBS -lselect=1:ncpus={}:mem={}MB:tmpspace={}MB",
            config.cores, config.memory_mb, maxdisk
        ),
        None => format!(
            "#PBS -lselect=1:ncpus={}:mem={}MB",
            config.cores, config.memory_mb
        ),
    }
}

/// Apply the resolved resources to template text.
pub fn correct_template(content: &str, config: &ResourceConfig) -> String {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let anchor = directive_anchor(&lines);
    upsert(&mut lines, RESOURCES_PREFIX, resources_line(config), anchor);

    let anchor = directive_anchor(&lines);
    upsert(
        &mut lines,
        WALLTIME_PREFIX,
        format!("#PBS -l walltime={}", config.walltime),
        anchor,
    );

    if config.is_public_queue() {
        lines.retain(|line| !is_directive(line, QUEUE_PREFIX));
    } else {
        // must stay inside the #PBS block
        let slot = QUEUE_LINE_INDEX.min(directive_anchor(&lines));
        upsert(
            &mut lines,
            QUEUE_PREFIX,
            format!("#PBS -q {}", config.queue),
            slot,
        );
    }

    if let Some(version) = &config.gaussian_version {
        let replacement = format!("module load gaussian/g09-{}", version);
        match lines.iter_mut().find(|line| is_directive(line.as_str(), MODULE_PREFIX)) {
            Some(line) => *line = replacement,
            None => log::warn!("template has no '{}' line, version not set", MODULE_PREFIX),
        }
    }

    join_lines(&lines, content)
}

/// The shared submission template under the gf home directory.
#[derive(Debug, Clone)]
pub struct TemplateCorrector {
    path: PathBuf,
}

impl TemplateCorrector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn apply(&self, config: &ResourceConfig) -> Result<()> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read template {}", self.path.display()))?;
        let corrected = correct_template(&content, config);
        if corrected != content {
            fs::write(&self.path, corrected)
                .with_context(|| format!("Failed to update template {}", self.path.display()))?;
        }
        log::debug!("template {} corrected", self.path.display());
        Ok(())
    }
}
