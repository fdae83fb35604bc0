//! Preset store: semicolon-delimited resource bundles kept in `~/bin/.presets`.

use crate::error::GfError;
use crate::utils::{format_mb, parse_size_mb, validate_walltime};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Number of commentary lines before the first record.
pub const PRESET_HEADER_LINES: usize = 9;

/// One saved set of resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub queue: String,
    pub cores: u32,
    pub memory_mb: u64,
    pub walltime: String,
    pub gaussian_version: Option<String>,
    pub maxdisk_mb: Option<u64>,
}

impl Preset {
    /// Parse `queue;cores;memory;walltime;version;maxdisk`.
    ///
    /// `line_no` is only used for error reporting.
    pub fn parse(line: &str, line_no: usize) -> Result<Self, GfError> {
        let malformed = |reason: String| GfError::MalformedPreset {
            line: line_no,
            reason,
        };

        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        let [queue, cores, memory, walltime, version, maxdisk] = fields[..] else {
            return Err(malformed(format!(
                "expected 6 fields separated by ';', found {}",
                fields.len()
            )));
        };

        if queue.is_empty() {
            return Err(malformed("empty queue".to_string()));
        }
        let cores = cores
            .parse::<u32>()
            .map_err(|_| malformed(format!("invalid core count '{}'", cores)))?;
        let memory_mb = parse_size_mb(memory).map_err(|e| malformed(e.to_string()))?;
        let walltime = validate_walltime(walltime).map_err(|e| malformed(e.to_string()))?;
        let maxdisk_mb = if maxdisk.is_empty() {
            None
        } else {
            Some(parse_size_mb(maxdisk).map_err(|e| malformed(e.to_string()))?)
        };

        Ok(Self {
            queue: queue.to_string(),
            cores,
            memory_mb,
            walltime,
            gaussian_version: (!version.is_empty()).then(|| version.to_string()),
            maxdisk_mb,
        })
    }

    /// Render the preset back in file format.
    pub fn to_line(&self) -> String {
        [
            self.queue.clone(),
            self.cores.to_string(),
            format_mb(self.memory_mb),
            self.walltime.clone(),
            self.gaussian_version.clone().unwrap_or_default(),
            self.maxdisk_mb.map(format_mb).unwrap_or_default(),
        ]
        .join(";")
    }

    pub fn describe(&self) -> String {
        format!(
            "cue: {} cores:{} memory: {} walltime: {} gaussian version: {} max disk: {}",
            self.queue,
            self.cores,
            format_mb(self.memory_mb),
            self.walltime,
            self.gaussian_version.as_deref().unwrap_or(""),
            self.maxdisk_mb.map(format_mb).unwrap_or_default()
        )
    }
}

/// Interpretation of the `-p` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetAction {
    Load(usize),
    Show,
    Edit,
    Ignore,
}

impl PresetAction {
    pub fn from_arg(arg: &str) -> Self {
        let arg = arg.trim();
        match arg.to_lowercase().as_str() {
            "show" => PresetAction::Show,
            "set" => PresetAction::Edit,
            _ => match arg.parse::<usize>() {
                Ok(index) => PresetAction::Load(index),
                Err(_) => PresetAction::Ignore,
            },
        }
    }
}

/// Reads and edits the preset file.
#[derive(Debug, Clone)]
pub struct PresetStore {
    path: PathBuf,
}

impl PresetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data lines after the header, with their 1-based file line numbers.
    fn data_lines(&self) -> Result<Vec<(usize, String)>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read presets from {}", self.path.display()))?;

        Ok(content
            .lines()
            .enumerate()
            .skip(PRESET_HEADER_LINES)
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| (i + 1, line.to_string()))
            .collect())
    }

    /// Load the preset at a 1-based index.
    pub fn load(&self, index: usize) -> Result<Preset> {
        let lines = self.data_lines()?;
        if index == 0 || index > lines.len() {
            return Err(GfError::PresetOutOfRange {
                index,
                count: lines.len(),
            }
            .into());
        }

        let (line_no, line) = &lines[index - 1];
        let preset = Preset::parse(line, *line_no)?;
        log::debug!("loaded preset {}: {}", index, preset.to_line());
        Ok(preset)
    }

    /// Write the numbered preset listing.
    pub fn list<W: Write>(&self, out: &mut W) -> Result<()> {
        for (index, (line_no, line)) in self.data_lines()?.iter().enumerate() {
            match Preset::parse(line, *line_no) {
                Ok(preset) => writeln!(out, "{} - {}", index + 1, preset.describe())?,
                Err(err) => writeln!(out, "{} - {} ({})", index + 1, line.trim(), err)?,
            }
        }
        Ok(())
    }

    /// Open the preset file in an interactive editor.
    pub fn edit(&self, editor: &str) -> Result<()> {
        let status = Command::new(editor)
            .arg(&self.path)
            .status()
            .with_context(|| format!("Failed to launch editor '{}'", editor))?;
        if !status.success() {
            log::warn!("editor '{}' exited with {}", editor, status);
        }
        Ok(())
    }
}
