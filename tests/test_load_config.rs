use std::fs::write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use drive_shorts::load_config::load_config;

#[test]
fn load_config_parses_both_services_and_pipeline_settings() {
    let config_yaml = r#"
storage:
  client_secret_path: ./secrets/drive_client.json
  token_cache_path: ./tokens/drive.json
  scopes:
    - "https://www.googleapis.com/auth/drive"
publish:
  client_secret_path: ./secrets/youtube_client.json
  token_cache_path: ./tokens/youtube.json
  scopes:
    - "https://www.googleapis.com/auth/youtube.upload"
folder_name: Shorts
staging_dir: ./videos
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path()).expect("config should load");

    assert_eq!(config.folder_name, "Shorts");
    assert_eq!(config.staging_dir, PathBuf::from("./videos"));
    assert_eq!(
        config.storage.client_secret_path,
        PathBuf::from("./secrets/drive_client.json")
    );
    assert_eq!(
        config.storage.scopes,
        vec!["https://www.googleapis.com/auth/drive"]
    );
    assert_eq!(
        config.publish.token_cache_path,
        PathBuf::from("./tokens/youtube.json")
    );
    assert_eq!(
        config.publish.scopes,
        vec!["https://www.googleapis.com/auth/youtube.upload"]
    );
}

#[test]
fn load_config_errors_for_invalid_yaml() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "storage: [not, a, mapping").unwrap();

    let err = load_config(config_file.path()).unwrap_err();
    assert!(
        err.to_string().contains("parse"),
        "error should mention parsing, got: {err}"
    );
}

#[test]
fn load_config_errors_for_missing_required_fields() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "folder_name: Shorts\n").unwrap();

    assert!(load_config(config_file.path()).is_err());
}

#[test]
fn load_config_errors_for_missing_file() {
    let err = load_config("/definitely/not/a/real/config.yaml").unwrap_err();
    assert!(
        err.to_string().contains("Failed to read config file"),
        "error should mention the unreadable file, got: {err}"
    );
}
