mod cli;
mod config;
mod error;
mod input_file;
mod job_log;
mod job_manager;
mod preset;
mod template;
mod utils;

use anyhow::Result;

fn main() -> Result<()> {
    env_logger::init();
    cli::run()
}
