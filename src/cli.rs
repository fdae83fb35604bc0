//! CLI entry point and option definitions.

use crate::config::{ConfigBuilder, ResourceConfig, Settings};
use crate::job_log::JobLog;
use crate::job_manager::{JobManager, Outcome, Qsub};
use crate::preset::{PresetAction, PresetStore};
use anyhow::{Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::io::{self, Write};
use std::path::PathBuf;

const DESCRIPTION: &str = "\
Sends Gaussian jobs to the HPC queue and keeps their settings consistent.
Before submission the PBS template (~/bin/.rng) is rewritten with the requested
cores, memory, scratch disk, walltime, queue and Gaussian version. Each input
file gets a matching %mem (75% of the requested memory), %nprocshared and a
checkpoint file named after the input. Disable the input correction with -n.

Options given after -p override the preset, options given before it are
overridden by it. Locations can be changed with GF_HOME, GF_JOBS_ROOT,
GF_SUBMIT_COMMAND and GF_EDITOR.";

/// gaussian function - correct and submit Gaussian jobs to PBS.
#[derive(Parser, Debug)]
#[command(name = "gf")]
#[command(version)]
#[command(about = "Correct and submit Gaussian jobs to the PBS queue")]
#[command(after_help = DESCRIPTION)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Queue for the job [default: pqph], PUBLIC drops the queue directive
    #[arg(short, long, visible_alias = "cue", value_name = "CUE")]
    pub queue: Option<String>,

    /// Number of cores [default: 12]
    #[arg(short, long)]
    pub cores: Option<u32>,

    /// Memory in MB or GB, e.g. 48GB [default: 47988MB]
    #[arg(short, long)]
    pub memory: Option<String>,

    /// Walltime as HH:MM:SS [default: 119:59:00]
    #[arg(short, long)]
    pub walltime: Option<String>,

    /// Gaussian version in use, e.g. d01
    #[arg(short = 'g', long = "gaussian-version", value_name = "VERSION")]
    pub gaussian_version: Option<String>,

    /// Load preset N, 'show' to list presets, 'set' to edit them
    #[arg(short, long, value_name = "PRESET")]
    pub preset: Option<String>,

    /// Scratch disk in MB or GB
    #[arg(short = 'd', long)]
    pub maxdisk: Option<String>,

    /// Print the submission log: 'all' or a filter such as a job id
    #[arg(short, long, value_name = "SELECT")]
    pub logs: Option<String>,

    /// Do not correct the input files
    #[arg(short, long)]
    pub no_correction: bool,

    /// Submit without reviewing the input
    #[arg(short = 's', long)]
    pub quiet: bool,

    /// Submit with priority (qsub -p 100)
    #[arg(short, long)]
    pub force: bool,

    /// Show the qsub command instead of submitting
    #[arg(short = 'r', long)]
    pub dry_run: bool,

    /// Print a job overview even in quiet mode
    #[arg(long)]
    pub show_summary: bool,

    /// Gaussian input files (.com)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

/// A value that changes the resolved resources.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Override<'a> {
    Queue(&'a str),
    Cores(u32),
    Memory(&'a str),
    Walltime(&'a str),
    Version(&'a str),
    Maxdisk(&'a str),
    Preset(usize),
}

/// Resource overrides sorted by their position on the command line.
fn ordered_overrides<'a>(cli: &'a Cli, matches: &ArgMatches) -> Vec<(usize, Override<'a>)> {
    let index = |id: &str| matches.index_of(id).unwrap_or(0);
    let mut overrides = Vec::new();

    if let Some(queue) = &cli.queue {
        overrides.push((index("queue"), Override::Queue(queue)));
    }
    if let Some(cores) = cli.cores {
        overrides.push((index("cores"), Override::Cores(cores)));
    }
    if let Some(memory) = &cli.memory {
        overrides.push((index("memory"), Override::Memory(memory)));
    }
    if let Some(walltime) = &cli.walltime {
        overrides.push((index("walltime"), Override::Walltime(walltime)));
    }
    if let Some(version) = &cli.gaussian_version {
        overrides.push((index("gaussian_version"), Override::Version(version)));
    }
    if let Some(maxdisk) = &cli.maxdisk {
        overrides.push((index("maxdisk"), Override::Maxdisk(maxdisk)));
    }
    if let Some(PresetAction::Load(n)) = cli.preset.as_deref().map(PresetAction::from_arg) {
        overrides.push((index("preset"), Override::Preset(n)));
    }

    overrides.sort_by_key(|(i, _)| *i);
    overrides
}

/// Resolve defaults, presets and flags into the final configuration.
pub fn resolve_config(
    cli: &Cli,
    matches: &ArgMatches,
    presets: &PresetStore,
) -> Result<ResourceConfig> {
    let mut builder = ConfigBuilder::new();

    for (_, item) in ordered_overrides(cli, matches) {
        match item {
            Override::Queue(queue) => {
                builder.queue(queue);
            }
            Override::Cores(cores) => {
                builder.cores(cores);
            }
            Override::Memory(memory) => {
                builder.memory(memory)?;
            }
            Override::Walltime(walltime) => {
                builder.walltime(walltime)?;
            }
            Override::Version(version) => {
                builder.gaussian_version(version);
            }
            Override::Maxdisk(maxdisk) => {
                builder.maxdisk(maxdisk)?;
            }
            Override::Preset(n) => {
                let preset = presets
                    .load(n)
                    .with_context(|| format!("Failed to load preset {}", n))?;
                builder.preset(n, &preset);
            }
        }
    }

    if cli.no_correction {
        builder.no_correction();
    }
    if cli.quiet {
        builder.quiet();
    }
    if cli.force {
        builder.force_priority();
    }
    if cli.show_summary {
        builder.show_summary();
    }
    if cli.dry_run {
        builder.dry_run();
    }

    Ok(builder.build())
}

/// Parse the command line and dispatch.
pub fn run() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let settings = Settings::load()?;
    settings.ensure_support_files()?;

    if let Some(selector) = &cli.logs {
        return handle_logs(&settings, selector);
    }

    let presets = PresetStore::new(settings.presets_file());
    match cli.preset.as_deref().map(PresetAction::from_arg) {
        Some(PresetAction::Show) => return handle_preset_show(&presets),
        Some(PresetAction::Edit) => return handle_preset_edit(&presets, &settings.editor),
        Some(PresetAction::Ignore) => {
            log::warn!("ignoring preset argument {:?}", cli.preset);
        }
        _ => {}
    }

    if cli.files.is_empty() {
        Cli::command().print_help()?;
        return Ok(());
    }

    let config = resolve_config(&cli, &matches, &presets)?;
    handle_submit(settings, &cli.files, &config)
}

/// Handle `-l`.
pub fn handle_logs(settings: &Settings, selector: &str) -> Result<()> {
    let log = JobLog::new(settings.log_file(), settings.full_log_file());
    let mut stdout = io::stdout().lock();
    log.show(selector, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Handle `-p show`.
pub fn handle_preset_show(presets: &PresetStore) -> Result<()> {
    let mut stdout = io::stdout().lock();
    presets.list(&mut stdout)?;
    Ok(())
}

/// Handle `-p set`.
pub fn handle_preset_edit(presets: &PresetStore, editor: &str) -> Result<()> {
    log::debug!("editing {} with {}", presets.path().display(), editor);
    presets.edit(editor)
}

/// Correct and submit every job file.
pub fn handle_submit(settings: Settings, files: &[PathBuf], config: &ResourceConfig) -> Result<()> {
    let mut manager = JobManager::new(settings, Qsub);
    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();

    let outcomes = manager.process_jobs(files, config, &mut input, &mut output)?;
    let submitted = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Submitted { .. }))
        .count();
    log::info!("{} of {} job(s) submitted", submitted, outcomes.len());
    Ok(())
}
