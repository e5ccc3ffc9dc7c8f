//! Error taxonomy for the pipeline and its process exit codes.
//!
//! [`AuthError`] covers everything that can go wrong while obtaining a
//! credential; [`PipelineError`] wraps it together with the transfer and
//! remote-API failures of the run itself. The CLI maps a failed run onto a
//! stable exit code via [`PipelineError::exit_code`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while acquiring or refreshing an OAuth credential.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("client secret at {path:?} is unusable: {reason}")]
    ClientSecret { path: PathBuf, reason: String },

    /// The interactive consent flow failed or was denied.
    #[error("authorization consent failed: {0}")]
    Consent(String),

    /// The token endpoint rejected a refresh-token grant.
    #[error("token refresh rejected: {0}")]
    Refresh(String),

    #[error("token cache at {path:?} could not be written: {source}")]
    TokenCache { path: PathBuf, source: io::Error },

    #[error("authorization request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Any failure that aborts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The HTTP transport failed mid-operation; `context` names the
    /// operation or file involved.
    #[error("transfer failed during {context}: {source}")]
    Transfer {
        context: String,
        source: reqwest::Error,
    },

    /// The remote service answered with a non-success status.
    #[error("remote API returned {status}: {body}")]
    RemoteApi {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Process exit codes the CLI reports.
pub mod exit_code {
    /// At least one video was published.
    pub const SUCCESS: i32 = 0;
    /// The run failed for a reason outside the pipeline taxonomy.
    pub const FAILURE: i32 = 1;
    /// The remote folder was missing or empty; nothing was done.
    pub const NOTHING_TO_DO: i32 = 2;
    /// Credential acquisition failed.
    pub const AUTH: i32 = 10;
    /// An HTTP transfer failed mid-flight.
    pub const TRANSFER: i32 = 11;
    /// A remote service rejected a request.
    pub const REMOTE_API: i32 = 12;
}

impl PipelineError {
    /// The exit code a run aborted by this error reports.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Auth(_) => exit_code::AUTH,
            PipelineError::Transfer { .. } => exit_code::TRANSFER,
            PipelineError::RemoteApi { .. } => exit_code::REMOTE_API,
            PipelineError::Io(_) => exit_code::FAILURE,
        }
    }
}
