use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{error, info};

use crate::config::PipelineConfig;

/// Loads the static YAML config file describing both services, the remote
/// folder and the local staging directory. Secrets themselves stay out of
/// the file: it only carries the paths they are read from.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: PipelineConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    config.trace_loaded();
    Ok(config)
}
