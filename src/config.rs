use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-service authentication settings: where the OAuth client secret lives,
/// where the cached token record goes, and which scopes to request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub client_secret_path: PathBuf,
    pub token_cache_path: PathBuf,
    pub scopes: Vec<String>,
}

/// Full configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Credentials for the cloud storage service the videos are fetched from.
    pub storage: ServiceConfig,
    /// Credentials for the publishing service the videos are uploaded to.
    pub publish: ServiceConfig,
    /// Name of the remote folder holding the videos.
    pub folder_name: String,
    /// Local directory the videos are staged in between download and upload.
    pub staging_dir: PathBuf,
}

impl PipelineConfig {
    pub fn trace_loaded(&self) {
        info!(
            folder_name = %self.folder_name,
            staging_dir = %self.staging_dir.display(),
            storage_token_cache = %self.storage.token_cache_path.display(),
            publish_token_cache = %self.publish.token_cache_path.display(),
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
