use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::auth::{CredentialStore, InstalledFlow};
use crate::drive::DriveClient;
use crate::error::PipelineError;
use crate::load_config::load_config;
use crate::pipeline::{self, PipelineOutcome};
use crate::youtube::YouTubeClient;

/// CLI for drive-shorts: drain a cloud storage folder and publish the
/// videos as public shorts.
#[derive(Parser)]
#[clap(
    name = "drive-shorts",
    version,
    about = "Download videos from a cloud storage folder and publish them as short-form videos"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the download → delete-remote → publish pipeline once
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<PipelineOutcome> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(config)?;
            let credentials = CredentialStore::new(InstalledFlow::new());

            let storage_credential = credentials
                .acquire(&config.storage)
                .await
                .map_err(PipelineError::from)?;
            let storage = DriveClient::new(storage_credential);

            println!("Pipeline starting...");
            let publish_service = config.publish.clone();
            let credentials_ref = &credentials;
            let outcome = pipeline::run(&config, &storage, move || async move {
                let credential = credentials_ref.acquire(&publish_service).await?;
                Ok::<_, PipelineError>(YouTubeClient::new(credential))
            })
            .await?;

            match &outcome {
                PipelineOutcome::Completed(report) => {
                    println!("Pipeline complete.\nReport:");
                    println!("{report:#?}");
                }
                PipelineOutcome::NothingToDo => {
                    println!("Nothing to do: remote folder is missing or empty.");
                }
            }
            Ok(outcome)
        }
    }
}
