//! Job Manager for correcting, confirming and submitting Gaussian jobs.

use crate::config::{ResourceConfig, Settings};
use crate::error::GfError;
use crate::input_file::JobFile;
use crate::job_log::{JobLog, LogEntry};
use crate::template::TemplateCorrector;
use crate::utils::{run_command, truncate_job_name};
use anyhow::{Context, Result};
use chrono::Utc;
use crossterm::style::Stylize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const RULE: &str =
    "--------------------------------------------------------------------------------";

/// A fully assembled scheduler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SubmitCommand {
    /// `qsub [-p 100] -N <name> -v in=<stem> <template>`
    pub fn build(program: &str, config: &ResourceConfig, job: &JobFile, template: &Path) -> Self {
        let stem = job.stem();
        let mut args = Vec::new();
        if config.force_priority {
            args.extend(["-p".to_string(), "100".to_string()]);
        }
        args.extend([
            "-N".to_string(),
            truncate_job_name(&stem),
            "-v".to_string(),
            format!("in={}", stem),
            template.to_string_lossy().to_string(),
        ]);
        Self {
            program: program.to_string(),
            args,
        }
    }
}

impl std::fmt::Display for SubmitCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Something that accepts a job and returns its scheduler id.
pub trait Scheduler {
    fn submit(&self, command: &SubmitCommand) -> Result<String, GfError>;
}

/// PBS `qsub` run as an external process.
#[derive(Debug, Default)]
pub struct Qsub;

impl Scheduler for Qsub {
    fn submit(&self, command: &SubmitCommand) -> Result<String, GfError> {
        let result = run_command(&command.program, &command.args)?;
        if !result.success() {
            return Err(GfError::SubmitFailed {
                exit_code: result.return_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        let job_id = result.stdout.trim();
        if job_id.is_empty() {
            return Err(GfError::EmptySubmitOutput);
        }
        Ok(job_id.to_string())
    }
}

/// What happened to a single job file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Submitted { job_id: String },
    Declined,
    DryRun,
    Failed(String),
}

/// Corrects the template and job files, then hands each job to the scheduler.
pub struct JobManager<S: Scheduler> {
    settings: Settings,
    scheduler: S,
    template: TemplateCorrector,
    log: JobLog,
    template_corrected: bool,
}

impl<S: Scheduler> JobManager<S> {
    pub fn new(settings: Settings, scheduler: S) -> Self {
        let template = TemplateCorrector::new(settings.template_file());
        let log = JobLog::new(settings.log_file(), settings.full_log_file());
        Self {
            settings,
            scheduler,
            template,
            log,
            template_corrected: false,
        }
    }

    /// Process every job file in order.
    ///
    /// A missing or non-`.com` file stops the whole run; a declined or failed
    /// submission only skips that file.
    pub fn process_jobs<R: BufRead, W: Write>(
        &mut self,
        files: &[PathBuf],
        config: &ResourceConfig,
        input: &mut R,
        out: &mut W,
    ) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(files.len());
        for raw in files {
            let job = JobFile::resolve(raw)?;
            outcomes.push(self.process_job(&job, config, input, out)?);
        }
        Ok(outcomes)
    }

    fn process_job<R: BufRead, W: Write>(
        &mut self,
        job: &JobFile,
        config: &ResourceConfig,
        input: &mut R,
        out: &mut W,
    ) -> Result<Outcome> {
        if !self.template_corrected {
            self.template.apply(config)?;
            self.template_corrected = true;
        }
        if config.correction_enabled {
            job.correct(config)?;
        }

        let command = SubmitCommand::build(
            &self.settings.submit_command,
            config,
            job,
            &self.settings.template_file(),
        );
        log::debug!("submit command: {}", command);

        if config.quiet {
            if config.show_summary {
                print_overview(out, job, config, &command)?;
            }
        } else {
            print_preview(out, job)?;
            print_overview(out, job, config, &command)?;
            if !confirm(input, out)? {
                writeln!(out, "{}", "\n Work aborted \n".yellow())?;
                return Ok(Outcome::Declined);
            }
        }

        if config.dry_run {
            writeln!(out, "Dry-run: {} not executed.", self.settings.submit_command)?;
            return Ok(Outcome::DryRun);
        }

        match self.scheduler.submit(&command) {
            Ok(job_id) => {
                writeln!(out, "{}", job_id)?;
                let cwd = std::env::current_dir().context("Failed to read working directory")?;
                let entry = LogEntry::new(&job_id, &job.stem(), &cwd, &self.settings.jobs_root);
                self.log.append(&entry)?;
                writeln!(
                    out,
                    "{}",
                    format!("\n {} - Work sent \n", Utc::now().format("%H:%M")).yellow()
                )?;
                Ok(Outcome::Submitted { job_id })
            }
            Err(err) => {
                log::warn!("submission of {} failed: {}", job.name(), err);
                writeln!(out, "{}", format!("\n Submission failed: {} \n", err).yellow())?;
                Ok(Outcome::Failed(err.to_string()))
            }
        }
    }
}

fn print_preview<W: Write>(out: &mut W, job: &JobFile) -> Result<()> {
    writeln!(out, "{}\n", RULE.red())?;
    write!(out, "{}", job.read()?)?;
    writeln!(out, "\n{}\n", RULE.red())?;
    Ok(())
}

fn print_overview<W: Write>(
    out: &mut W,
    job: &JobFile,
    config: &ResourceConfig,
    command: &SubmitCommand,
) -> Result<()> {
    writeln!(out, "{}", format!("Job overview for {}", job.name()).yellow())?;
    writeln!(out, "Input file : {}", job.path().display())?;
    if let Some(index) = config.preset_loaded {
        writeln!(out, "Preset loaded: {}", index)?;
    }
    if let Some(banner) = config.preset_banner() {
        writeln!(out, "{}", banner.yellow())?;
    }
    writeln!(out, "{}", config.summary())?;
    let mode = if config.dry_run {
        "Dry-run (no submission)"
    } else {
        "Queued submission"
    };
    writeln!(out, "Mode       : {}", mode)?;
    writeln!(out, "Command    : {}", command)?;
    Ok(())
}

/// Ask for confirmation; anything but `y`/`yes` declines.
fn confirm<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<bool> {
    writeln!(
        out,
        "{}",
        "------------------------------Are you sure? [y/N]-------------------------------".red()
    )?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use std::cell::RefCell;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Records submissions and replies with a canned result.
    struct FakeScheduler {
        reply: fn() -> Result<String, GfError>,
        calls: RefCell<Vec<SubmitCommand>>,
    }

    impl FakeScheduler {
        fn replying(reply: fn() -> Result<String, GfError>) -> Self {
            Self {
                reply,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Scheduler for &FakeScheduler {
        fn submit(&self, command: &SubmitCommand) -> Result<String, GfError> {
            self.calls.borrow_mut().push(command.clone());
            (self.reply)()
        }
    }

    fn ok_reply() -> Result<String, GfError> {
        Ok("7197851.cx1".to_string())
    }

    struct Fixture {
        dir: TempDir,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let settings = Settings {
                home: dir.path().join("bin"),
                jobs_root: "/work/user/jobs/".to_string(),
                submit_command: "qsub".to_string(),
                editor: "vi".to_string(),
            };
            settings.ensure_support_files().unwrap();
            Self { dir, settings }
        }

        fn job(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn log(&self) -> String {
            fs::read_to_string(self.settings.log_file()).unwrap()
        }
    }

    fn quiet() -> ResourceConfig {
        let mut builder = ConfigBuilder::new();
        builder.quiet();
        builder.build()
    }

    fn run(
        fixture: &Fixture,
        scheduler: &FakeScheduler,
        files: &[PathBuf],
        config: &ResourceConfig,
        answer: &str,
    ) -> (Result<Vec<Outcome>>, String) {
        let mut manager = JobManager::new(fixture.settings.clone(), scheduler);
        let mut input = Cursor::new(answer.as_bytes().to_vec());
        let mut out = Vec::new();
        let result = manager.process_jobs(files, config, &mut input, &mut out);
        (result, String::from_utf8_lossy(&out).to_string())
    }

    #[test]
    fn test_build_command() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a_very_long_gaussian_job_name.com");
        fs::write(&path, "").unwrap();
        let job = JobFile::resolve(&path).unwrap();

        let command =
            SubmitCommand::build("qsub", &ResourceConfig::default(), &job, Path::new("/h/.rng"));
        assert_eq!(
            command.to_string(),
            "qsub -N a_very_long_gau -v in=a_very_long_gaussian_job_name /h/.rng"
        );
    }

    #[test]
    fn test_force_priority_only_with_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.com");
        fs::write(&path, "").unwrap();
        let job = JobFile::resolve(&path).unwrap();

        let plain = SubmitCommand::build("qsub", &ResourceConfig::default(), &job, Path::new("t"));
        assert!(!plain.args.contains(&"-p".to_string()));

        let mut builder = ConfigBuilder::new();
        builder.force_priority();
        let forced = SubmitCommand::build("qsub", &builder.build(), &job, Path::new("t"));
        assert_eq!(forced.args[..2], ["-p".to_string(), "100".to_string()]);
    }

    #[test]
    fn test_quiet_submission_logs() {
        let fixture = Fixture::new();
        let job = fixture.job("water.com", "%mem=1GB\n# sp\n");
        let scheduler = FakeScheduler::replying(ok_reply);

        let (result, out) = run(&fixture, &scheduler, &[job.clone()], &quiet(), "");
        assert_eq!(
            result.unwrap(),
            vec![Outcome::Submitted {
                job_id: "7197851.cx1".to_string()
            }]
        );
        assert!(out.contains("Work sent"));
        assert!(fixture.log().contains("| 7197851.cx1 | water |"));
        assert_eq!(
            fs::read_to_string(fixture.settings.full_log_file()).unwrap(),
            fixture.log()
        );
        assert_eq!(
            fs::read_to_string(&job).unwrap(),
            "%nprocshared=12\n%mem=35991MB\n# sp\n"
        );

        let calls = scheduler.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args[1], "water");
    }

    #[test]
    fn test_declined_skips_to_next_file() {
        let fixture = Fixture::new();
        let first = fixture.job("first.com", "# sp\n");
        let second = fixture.job("second.com", "# sp\n");
        let scheduler = FakeScheduler::replying(ok_reply);

        let (result, out) = run(
            &fixture,
            &scheduler,
            &[first, second],
            &ResourceConfig::default(),
            "n\nyes\n",
        );
        let outcomes = result.unwrap();
        assert_eq!(outcomes[0], Outcome::Declined);
        assert!(matches!(outcomes[1], Outcome::Submitted { .. }));
        assert!(out.contains("Work aborted"));
        assert!(out.contains("Are you sure?"));
        assert!(out.contains("%nprocshared=12"));
        assert_eq!(fixture.log().lines().count(), 1);
        assert!(fixture.log().contains("second"));
    }

    #[test]
    fn test_empty_answer_declines() {
        let fixture = Fixture::new();
        let job = fixture.job("job.com", "# sp\n");
        let scheduler = FakeScheduler::replying(ok_reply);

        let (result, _) = run(&fixture, &scheduler, &[job], &ResourceConfig::default(), "");
        assert_eq!(result.unwrap(), vec![Outcome::Declined]);
        assert!(scheduler.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_file_stops_run_without_changes() {
        let fixture = Fixture::new();
        let template_before = fs::read_to_string(fixture.settings.template_file()).unwrap();
        let scheduler = FakeScheduler::replying(ok_reply);
        let mut builder = ConfigBuilder::new();
        builder.quiet().cores(2);

        let later = fixture.job("later.com", "# sp\n");
        let missing = fixture.dir.path().join("missing");
        let (result, _) = run(&fixture, &scheduler, &[missing, later.clone()], &builder.build(), "");

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GfError>(),
            Some(GfError::JobFileNotFound(_))
        ));
        assert_eq!(
            fs::read_to_string(fixture.settings.template_file()).unwrap(),
            template_before
        );
        assert_eq!(fs::read_to_string(later).unwrap(), "# sp\n");
        assert_eq!(fixture.log(), "");
        assert!(scheduler.calls.borrow().is_empty());
    }

    #[test]
    fn test_failed_submission_not_logged() {
        let fixture = Fixture::new();
        let first = fixture.job("first.com", "# sp\n");
        let second = fixture.job("second.com", "# sp\n");
        let scheduler = FakeScheduler::replying(|| {
            Err(GfError::SubmitFailed {
                exit_code: Some(38),
                stderr: "qsub: Unknown queue".to_string(),
            })
        });

        let (result, out) = run(&fixture, &scheduler, &[first, second], &quiet(), "");
        let outcomes = result.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], Outcome::Failed(msg) if msg.contains("Unknown queue")));
        assert!(out.contains("Submission failed"));
        assert_eq!(fixture.log(), "");
    }

    #[test]
    fn test_empty_output_not_logged() {
        let fixture = Fixture::new();
        let job = fixture.job("job.com", "# sp\n");
        let scheduler = FakeScheduler::replying(|| Err(GfError::EmptySubmitOutput));

        let (result, _) = run(&fixture, &scheduler, &[job], &quiet(), "");
        assert!(matches!(result.unwrap()[0], Outcome::Failed(_)));
        assert_eq!(fixture.log(), "");
    }

    #[test]
    fn test_dry_run_does_not_submit() {
        let fixture = Fixture::new();
        let job = fixture.job("job.com", "# sp\n");
        let scheduler = FakeScheduler::replying(ok_reply);
        let mut builder = ConfigBuilder::new();
        builder.quiet().dry_run();

        let (result, out) = run(&fixture, &scheduler, &[job], &builder.build(), "");
        assert_eq!(result.unwrap(), vec![Outcome::DryRun]);
        assert!(out.contains("Command    : qsub -N job -v in=job"));
        assert!(out.contains("Dry-run"));
        assert!(scheduler.calls.borrow().is_empty());
        assert_eq!(fixture.log(), "");
    }

    #[test]
    fn test_no_correction_leaves_file() {
        let fixture = Fixture::new();
        let job = fixture.job("job.com", "%nprocshared=2\n# sp\n");
        let scheduler = FakeScheduler::replying(ok_reply);
        let mut builder = ConfigBuilder::new();
        builder.quiet().no_correction().cores(16);

        let (result, _) = run(&fixture, &scheduler, &[job.clone()], &builder.build(), "");
        assert!(result.is_ok());
        assert_eq!(fs::read_to_string(&job).unwrap(), "%nprocshared=2\n# sp\n");
        assert!(fs::read_to_string(fixture.settings.template_file())
            .unwrap()
            .contains("ncpus=16"));
    }

    #[test]
    fn test_qsub_checks_exit_status() {
        let failing = SubmitCommand {
            program: "false".to_string(),
            args: vec![],
        };
        assert!(matches!(
            Qsub.submit(&failing),
            Err(GfError::SubmitFailed { exit_code: Some(1), .. })
        ));

        let silent = SubmitCommand {
            program: "true".to_string(),
            args: vec![],
        };
        assert!(matches!(Qsub.submit(&silent), Err(GfError::EmptySubmitOutput)));

        let echo = SubmitCommand {
            program: "echo".to_string(),
            args: vec!["7197851.cx1".to_string()],
        };
        assert_eq!(Qsub.submit(&echo).unwrap(), "7197851.cx1");
    }
}
