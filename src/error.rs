//! Error kinds raised while preparing and submitting jobs.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GfError {
    #[error("\"{}\" does not exist.", .0.display())]
    JobFileNotFound(PathBuf),
    #[error("\"{}\" is not a com file.", .0.display())]
    NotComFile(PathBuf),
    #[error("invalid size '{value}': {reason}")]
    InvalidSize { value: String, reason: String },
    #[error("invalid walltime '{0}', expected HH:MM:SS")]
    InvalidWalltime(String),
    #[error("malformed preset on line {line}: {reason}")]
    MalformedPreset { line: usize, reason: String },
    #[error("preset {index} not found (valid presets: 1-{count})")]
    PresetOutOfRange { index: usize, count: usize },
    #[error("could not run '{program}': {source}")]
    SubmitLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("submission command failed (exit_code={exit_code:?}): {stderr}")]
    SubmitFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("submission command produced no output")]
    EmptySubmitOutput,
}
