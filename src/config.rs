//! Resource configuration, settings and support file management.

use crate::error::GfError;
use crate::preset::Preset;
use crate::utils::{format_mb, parse_size_or, validate_walltime};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Queue name that means "no queue directive at all".
pub const PUBLIC_QUEUE: &str = "PUBLIC";

/// Resources and switches for one `gf` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    pub queue: String,
    pub cores: u32,
    /// Memory in megabytes
    pub memory_mb: u64,
    pub walltime: String,
    pub gaussian_version: Option<String>,
    /// Scratch disk in megabytes
    pub maxdisk_mb: Option<u64>,
    pub correction_enabled: bool,
    pub force_priority: bool,
    pub quiet: bool,
    pub dry_run: bool,
    pub show_summary: bool,
    pub preset_loaded: Option<usize>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            queue: "pqph".to_string(),
            cores: 12,
            memory_mb: 47988,
            walltime: "119:59:00".to_string(),
            gaussian_version: None,
            maxdisk_mb: None,
            correction_enabled: true,
            force_priority: false,
            quiet: false,
            dry_run: false,
            show_summary: false,
            preset_loaded: None,
        }
    }
}

impl ResourceConfig {
    /// Memory handed to Gaussian, leaving a quarter for the node.
    pub fn safe_memory_mb(&self) -> u64 {
        self.memory_mb * 15 / 20
    }

    pub fn is_public_queue(&self) -> bool {
        self.queue.eq_ignore_ascii_case(PUBLIC_QUEUE)
    }

    /// One-line summary of the resolved resources.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("Cores: {}", self.cores),
            format!("Memory: {}", format_mb(self.memory_mb)),
            format!("Cue: {}", self.queue),
            format!("Walltime: {}", self.walltime),
        ];
        if let Some(version) = &self.gaussian_version {
            parts.push(format!("Gaussian-version: {}", version));
        }
        if let Some(maxdisk) = self.maxdisk_mb {
            parts.push(format!("Maxdisk: {}", format_mb(maxdisk)));
        }
        parts.join("; ")
    }

    /// Banner shown when the resources came from a preset.
    pub fn preset_banner(&self) -> Option<String> {
        self.preset_loaded?;
        let banner = format!(
            "Charged preset : {} {} {} {} {} {}",
            self.queue,
            self.cores,
            format_mb(self.memory_mb),
            self.walltime,
            self.gaussian_version.as_deref().unwrap_or(""),
            self.maxdisk_mb.map(format_mb).unwrap_or_default()
        );
        Some(banner.trim_end().to_string())
    }
}

/// Accumulates overrides on top of the defaults.
///
/// Callers apply sources in command-line order, so a later override wins.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: ResourceConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, queue: &str) -> &mut Self {
        let queue = queue.trim();
        if !queue.is_empty() {
            self.config.queue = queue.to_string();
        }
        self
    }

    pub fn cores(&mut self, cores: u32) -> &mut Self {
        self.config.cores = cores;
        self
    }

    pub fn memory(&mut self, memory: &str) -> Result<&mut Self, GfError> {
        if let Some(mb) = parse_size_or(memory, Some(self.config.memory_mb))? {
            self.config.memory_mb = mb;
        }
        Ok(self)
    }

    pub fn walltime(&mut self, walltime: &str) -> Result<&mut Self, GfError> {
        if !walltime.trim().is_empty() {
            self.config.walltime = validate_walltime(walltime)?;
        }
        Ok(self)
    }

    pub fn gaussian_version(&mut self, version: &str) -> &mut Self {
        let version = version.trim();
        self.config.gaussian_version = (!version.is_empty()).then(|| version.to_string());
        self
    }

    pub fn maxdisk(&mut self, maxdisk: &str) -> Result<&mut Self, GfError> {
        self.config.maxdisk_mb = parse_size_or(maxdisk, self.config.maxdisk_mb)?;
        Ok(self)
    }

    /// Replace all six resource fields with those of a preset.
    pub fn preset(&mut self, index: usize, preset: &Preset) -> &mut Self {
        self.config.queue = preset.queue.clone();
        self.config.cores = preset.cores;
        self.config.memory_mb = preset.memory_mb;
        self.config.walltime = preset.walltime.clone();
        self.config.gaussian_version = preset.gaussian_version.clone();
        self.config.maxdisk_mb = preset.maxdisk_mb;
        self.config.preset_loaded = Some(index);
        self
    }

    pub fn no_correction(&mut self) -> &mut Self {
        self.config.correction_enabled = false;
        self
    }

    pub fn force_priority(&mut self) -> &mut Self {
        self.config.force_priority = true;
        self
    }

    pub fn quiet(&mut self) -> &mut Self {
        self.config.quiet = true;
        self
    }

    pub fn dry_run(&mut self) -> &mut Self {
        self.config.dry_run = true;
        self.config.show_summary = true;
        self
    }

    pub fn show_summary(&mut self) -> &mut Self {
        self.config.show_summary = true;
        self
    }

    pub fn build(&self) -> ResourceConfig {
        self.config.clone()
    }
}

/// Locations and external programs, overridable through `GF_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory holding the template, presets and logs
    pub home: PathBuf,
    /// Prefix stripped from working directories in log entries
    pub jobs_root: String,
    pub submit_command: String,
    pub editor: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let home = BaseDirs::new()
            .map(|dirs| dirs.home_dir().join("bin"))
            .unwrap_or_else(|| PathBuf::from("bin"));
        let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

        let settings = ::config::Config::builder()
            .set_default("home", home.to_string_lossy().to_string())?
            .set_default("jobs_root", format!("/work/{}/jobs/", whoami::username()))?
            .set_default("submit_command", "qsub")?
            .set_default("editor", editor)?
            // GF_HOME=/tmp/gf overrides `home`
            .add_source(::config::Environment::with_prefix("GF"))
            .build()
            .context("Failed to read gf settings")?;

        settings
            .try_deserialize::<Settings>()
            .context("Failed to parse gf settings")
    }

    pub fn template_file(&self) -> PathBuf {
        self.home.join(".rng")
    }

    pub fn presets_file(&self) -> PathBuf {
        self.home.join(".presets")
    }

    pub fn log_file(&self) -> PathBuf {
        self.home.join(".wlog")
    }

    pub fn full_log_file(&self) -> PathBuf {
        self.home.join(".wulog")
    }

    /// Create the support directory and seed any missing files.
    pub fn ensure_support_files(&self) -> Result<()> {
        fs::create_dir_all(&self.home)
            .with_context(|| format!("Failed to create {}", self.home.display()))?;

        seed_file(&self.template_file(), DEFAULT_SCRIPT_TEMPLATE)?;
        seed_file(&self.presets_file(), DEFAULT_PRESET_TEMPLATE)?;
        seed_file(&self.log_file(), "")?;
        seed_file(&self.full_log_file(), "")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let template = self.template_file();
            let mut perms = fs::metadata(&template)?.permissions();
            if perms.mode() & 0o111 == 0 {
                perms.set_mode(0o755);
                fs::set_permissions(&template, perms)?;
            }
        }

        Ok(())
    }
}

fn seed_file(path: &Path, content: &str) -> Result<()> {
    if !path.exists() {
        log::info!("creating default {}", path.display());
        fs::write(path, content).with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

pub const DEFAULT_SCRIPT_TEMPLATE: &str = r#"#!/bin/sh

# submit jobs to the que with this script using the following command:
# rng4 is this script
# jobname is a name you will see in the qstat command
# name is the actual file minus .com etc it is passed into this script as ${in%.com}
#
# qsub rng -N jobname -v in=name

# batch processing commands
#PBS -l walltime=119:59:00
#PBS -lselect=1:ncpus=12:mem=48000MB:tmpspace=400gb
#PBS -j oe
#PBS -q pqph
#PBS -m ae

# load modules
#
module load gaussian/g09-d01

# check for a checkpoint file
#
# variable PBS_O_WORKDIR=directory from which the job was submited.
   test -r $PBS_O_WORKDIR/${in%.com}.chk
   if [ $? -eq 0 ]
   then
     echo "located $PBS_O_WORKDIR/${in%.com}.chk"
     cp $PBS_O_WORKDIR/${in%.com}.chk $TMPDIR/.
   else
     echo "no checkpoint file $PBS_O_WORKDIR/${in%.com}.chk"
   fi
#
# run gaussian
#
  g09 $PBS_O_WORKDIR/${in}
  cp $TMPDIR/${in%.com}.chk /$PBS_O_WORKDIR/.
  cp $TMPDIR/${in%.com}.wfx /$PBS_O_WORKDIR/.
# exit
"#;

pub const DEFAULT_PRESET_TEMPLATE: &str = "\
##     Here is where to list the preset for gaussian calculations
##     Each line is a preset and it is written in this way :
##             [CUE];[CORES];[MEMORY];[WALLTIME];[GAUSSIAN VERSION];[MAXDISK]
##     e.g      pqph;8;14400MB;119:59:00;d01;800GB
##
##
##-----------------------------------------------------------------------------
##
##     presets starts from next line
pqph;12;48000MB;119:59:00;d01;400GB
";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn preset() -> Preset {
        Preset {
            queue: "pqmb".to_string(),
            cores: 8,
            memory_mb: 14400,
            walltime: "72:00:00".to_string(),
            gaussian_version: Some("e01".to_string()),
            maxdisk_mb: Some(800000),
        }
    }

    #[test]
    fn test_defaults() {
        let config = ConfigBuilder::new().build();
        assert_eq!(config.queue, "pqph");
        assert_eq!(config.cores, 12);
        assert_eq!(config.memory_mb, 47988);
        assert!(config.correction_enabled);
        assert!(!config.quiet);
        assert!(!config.force_priority);
    }

    #[test]
    fn test_safe_memory() {
        let mut builder = ConfigBuilder::new();
        builder.memory("16000MB").unwrap();
        assert_eq!(builder.build().safe_memory_mb(), 12000);
        builder.memory("47988").unwrap();
        assert_eq!(builder.build().safe_memory_mb(), 35991);
    }

    #[test]
    fn test_empty_values_keep_current() {
        let mut builder = ConfigBuilder::new();
        builder.memory("").unwrap().walltime("").unwrap();
        builder.queue("  ");
        let config = builder.build();
        assert_eq!(config, ResourceConfig::default());
    }

    #[test]
    fn test_later_override_wins() {
        let mut builder = ConfigBuilder::new();
        builder.memory("8GB").unwrap();
        builder.preset(2, &preset());
        assert_eq!(builder.build().memory_mb, 14400);

        builder.memory("32GB").unwrap();
        let config = builder.build();
        assert_eq!(config.memory_mb, 32000);
        assert_eq!(config.queue, "pqmb");
        assert_eq!(config.preset_loaded, Some(2));
    }

    #[test]
    fn test_preset_replaces_all_fields() {
        let mut builder = ConfigBuilder::new();
        builder.gaussian_version("d01");
        builder.maxdisk("100GB").unwrap();
        builder.preset(
            1,
            &Preset {
                gaussian_version: None,
                maxdisk_mb: None,
                ..preset()
            },
        );
        let config = builder.build();
        assert_eq!(config.gaussian_version, None);
        assert_eq!(config.maxdisk_mb, None);
        assert_eq!(config.walltime, "72:00:00");
    }

    #[test]
    fn test_summary_and_banner() {
        let mut builder = ConfigBuilder::new();
        builder.preset(1, &preset());
        let config = builder.build();
        assert_eq!(
            config.summary(),
            "Cores: 8; Memory: 14400MB; Cue: pqmb; Walltime: 72:00:00; Gaussian-version: e01; Maxdisk: 800GB"
        );
        assert_eq!(
            config.preset_banner().unwrap(),
            "Charged preset : pqmb 8 14400MB 72:00:00 e01 800GB"
        );
        assert!(ResourceConfig::default().preset_banner().is_none());
    }

    #[test]
    fn test_public_queue() {
        let mut builder = ConfigBuilder::new();
        builder.queue("public");
        assert!(builder.build().is_public_queue());
    }

    #[test]
    fn test_ensure_support_files() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            home: dir.path().join("bin"),
            jobs_root: "/work/user/jobs/".to_string(),
            submit_command: "qsub".to_string(),
            editor: "vi".to_string(),
        };
        settings.ensure_support_files().unwrap();

        assert!(fs::read_to_string(settings.template_file())
            .unwrap()
            .contains("#PBS -q pqph"));
        assert_eq!(
            fs::read_to_string(settings.presets_file()).unwrap().lines().count(),
            10
        );
        assert!(settings.log_file().exists());
        assert!(settings.full_log_file().exists());

        // Existing files are left alone
        fs::write(settings.log_file(), "entry\n").unwrap();
        settings.ensure_support_files().unwrap();
        assert_eq!(fs::read_to_string(settings.log_file()).unwrap(), "entry\n");
    }
}
