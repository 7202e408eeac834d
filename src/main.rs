use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use arithmetic_pipeline::Pipeline;
use arithmetic_pipeline::config::MainConfig;
use clap::Parser;
use env_logger::{Env, Target};

#[derive(Parser, Debug)]
#[command(about = "Run a file through a chain of arithmetic coding stages", long_about = None)]
struct Args {
    /// The main config file, naming the src, dst, conf and (optional) log files.
    config: PathBuf,
}

/// Log to `log` when the config names one, to standard output otherwise.
fn init_logger(log: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    match log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.target(Target::Pipe(Box::new(file)));
        }
        None => {
            builder.target(Target::Stdout);
        }
    }
    builder.try_init()?;
    Ok(())
}

fn run(config: &MainConfig) -> Result<()> {
    let mut pipeline = Pipeline::load(&config.conf, &config.src)
        .with_context(|| format!("cannot set up pipeline {}", config.conf.display()))?;
    pipeline
        .run_files(&config.src, &config.dst)
        .with_context(|| format!("cannot code {}", config.src.display()))?;
    Ok(())
}

pub fn main() -> ExitCode {
    let args = Args::parse();

    let config = match MainConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            println!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logger(config.log.as_deref()) {
        println!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
