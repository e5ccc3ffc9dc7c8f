use clap::Parser;

use drive_shorts::cli::{run, Cli};
use drive_shorts::error::{exit_code, PipelineError};
use drive_shorts::pipeline::PipelineOutcome;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing for the CLI.
    tracing_subscriber::fmt::init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(PipelineOutcome::Completed(_)) => {
            tracing::info!("CLI completed successfully");
            std::process::exit(exit_code::SUCCESS);
        }
        Ok(PipelineOutcome::NothingToDo) => {
            tracing::info!("CLI completed with nothing to do");
            std::process::exit(exit_code::NOTHING_TO_DO);
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("[ERROR] Pipeline failed: {e:#}");
            let code = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(exit_code::FAILURE);
            std::process::exit(code);
        }
    }
}
