mod activities;
mod cli;
mod clock;
mod config;
mod error;
mod eventlog;
mod ids;
mod logging;
mod orchestrator;
mod premis;
mod state_machine;
mod steps;
mod ui;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::OsRng;
use tracing::error;

use cli::{Cli, Command};
use clock::SystemClock;
use config::PreprocessingConfig;
use error::PreprocessingError;
use ids::IdGenerator;
use orchestrator::PreprocessingWorkflow;
use state_machine::WorkflowParams;
use steps::LocalExecutor;
use ui::{DocumentSummary, RunProgress};

const EXIT_FAILED_RUN: u8 = 1;
const EXIT_REJECTED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "preprocessing aborted");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_REJECTED)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = PreprocessingConfig::load(cli.config.as_deref())?;
    logging::init_tracing(config.log_json, logging::level_for(cli.verbose));

    match cli.command {
        Command::Run { relative_path } => run(&config, relative_path, cli.json).await,
        Command::Inspect { premis_file } => inspect(&premis_file, cli.json),
    }
}

async fn run(config: &PreprocessingConfig, relative_path: String, json: bool) -> Result<ExitCode> {
    let executor = LocalExecutor::new(
        config.validation.command.clone(),
        config.bagging.command.clone(),
        Arc::new(IdGenerator::new(OsRng)),
        Arc::new(SystemClock),
    );
    let workflow = PreprocessingWorkflow::new(config.shared_path.clone(), executor, SystemClock)
        .with_agent(config.agent.clone())
        .with_step_timeout(config.step_timeout());

    let progress = (!json).then(|| RunProgress::start(&relative_path));
    let params = WorkflowParams { relative_path };
    let result = match workflow.execute(&params).await {
        Ok(result) => result,
        Err(e) => {
            if let Some(progress) = &progress {
                progress.abandon();
            }
            error!(error = %e, retryable = e.is_retryable(), "run rejected");
            eprintln!("error: {e}");
            return Ok(ExitCode::from(EXIT_REJECTED));
        }
    };

    match &progress {
        Some(progress) => progress.complete(&result),
        None => ui::print_json(&result)?,
    }

    if result.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILED_RUN))
    }
}

fn inspect(premis_file: &Path, json: bool) -> Result<ExitCode> {
    let xml = std::fs::read_to_string(premis_file)
        .with_context(|| format!("reading {}", premis_file.display()))?;
    let doc = premis::parse(&xml)
        .map_err(PreprocessingError::from)
        .with_context(|| format!("parsing {}", premis_file.display()))?;

    let summary = DocumentSummary::of(&doc);
    if json {
        ui::print_json(&summary)?;
    } else {
        summary.print();
    }
    Ok(ExitCode::SUCCESS)
}
