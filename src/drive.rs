//! Storage client for the cloud drive the videos are fetched from.
//!
//! Talks to the Drive v3 REST surface: folder lookup by name, file listing,
//! streamed content download and deletion by id. The [`StorageClient`] trait
//! is the seam the pipeline is written against; tests substitute a mock.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use mockall::automock;
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::auth::Credential;
use crate::error::PipelineError;
use crate::transfer::TransferProgress;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// One file as enumerated in the remote folder. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

/// Remote storage operations the pipeline depends on.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Resolve a non-trashed folder by exact name. If several folders carry
    /// the same name the first one the API returns wins.
    async fn resolve_folder(&self, name: &str) -> Result<Option<String>, PipelineError>;

    /// List the non-folder, non-trashed children of a folder.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, PipelineError>;

    /// Download one file's content to `dest`, overwriting silently. The
    /// write is atomic: a partial transfer never lands at `dest`. Returns
    /// the number of bytes written.
    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<u64, PipelineError>;

    /// Delete one file by id.
    async fn delete_file(&self, file_id: &str) -> Result<(), PipelineError>;
}

/// Real client against the Drive REST API.
pub struct DriveClient {
    http: reqwest::Client,
    credential: Credential,
}

impl DriveClient {
    pub fn new(credential: Credential) -> Self {
        Self {
            http: reqwest::Client::new(),
            credential,
        }
    }

    /// Streamed download with a caller-observable progress event per chunk.
    pub async fn download_file_with_progress(
        &self,
        file: &RemoteFile,
        dest: &Path,
        mut on_progress: impl FnMut(TransferProgress) + Send,
    ) -> Result<u64, PipelineError> {
        let url = format!("{API_BASE}/files/{}", file.id);
        let response = self
            .http
            .get(&url)
            .query(&[("alt", "media")])
            .bearer_auth(&self.credential.access_token)
            .send()
            .await
            .map_err(|e| transfer_error(&file.name, e))?;
        let response = check_status(response).await?;
        let total_bytes = response.content_length();

        let dest_dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut staged = NamedTempFile::new_in(dest_dir)?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transfer_error(&file.name, e))?;
            staged.write_all(&chunk)?;
            written += chunk.len() as u64;
            on_progress(TransferProgress {
                bytes_transferred: written,
                total_bytes,
                complete: false,
            });
        }
        staged.flush()?;
        staged.persist(dest).map_err(|e| e.error)?;
        on_progress(TransferProgress {
            bytes_transferred: written,
            total_bytes,
            complete: true,
        });

        info!(
            file_name = %file.name,
            bytes = written,
            dest = %dest.display(),
            "Downloaded remote file"
        );
        Ok(written)
    }
}

#[async_trait]
impl StorageClient for DriveClient {
    async fn resolve_folder(&self, name: &str) -> Result<Option<String>, PipelineError> {
        let query = format!(
            "name='{}' and mimeType='{FOLDER_MIME_TYPE}' and trashed=false",
            escape_query_value(name)
        );
        debug!(folder_name = name, "Resolving remote folder by name");
        let response = self
            .http
            .get(format!("{API_BASE}/files"))
            .query(&[("q", query.as_str()), ("fields", "files(id, name)")])
            .bearer_auth(&self.credential.access_token)
            .send()
            .await
            .map_err(|e| transfer_error("folder lookup", e))?;
        let list: FileList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| transfer_error("folder lookup", e))?;

        match list.files.into_iter().next() {
            Some(folder) => {
                info!(folder_name = name, folder_id = %folder.id, "Resolved remote folder");
                Ok(Some(folder.id))
            }
            None => {
                info!(folder_name = name, "Remote folder not found");
                Ok(None)
            }
        }
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, PipelineError> {
        let query = format!(
            "'{}' in parents and mimeType!='{FOLDER_MIME_TYPE}' and trashed=false",
            escape_query_value(folder_id)
        );
        let response = self
            .http
            .get(format!("{API_BASE}/files"))
            .query(&[("q", query.as_str()), ("fields", "files(id, name)")])
            .bearer_auth(&self.credential.access_token)
            .send()
            .await
            .map_err(|e| transfer_error("file listing", e))?;
        let list: FileList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| transfer_error("file listing", e))?;
        info!(folder_id, count = list.files.len(), "Listed remote folder");
        Ok(list.files)
    }

    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<u64, PipelineError> {
        let name = file.name.clone();
        self.download_file_with_progress(file, dest, move |progress| {
            debug!(
                file_name = %name,
                bytes = progress.bytes_transferred,
                percent = progress.percent(),
                complete = progress.complete,
                "Download progress"
            );
        })
        .await
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), PipelineError> {
        let response = self
            .http
            .delete(format!("{API_BASE}/files/{file_id}"))
            .bearer_auth(&self.credential.access_token)
            .send()
            .await
            .map_err(|e| transfer_error("file deletion", e))?;
        check_status(response).await?;
        info!(file_id, "Deleted remote file");
        Ok(())
    }
}

/// Escapes a value interpolated into a Drive search query string.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn transfer_error(context: &str, source: reqwest::Error) -> PipelineError {
    PipelineError::Transfer {
        context: context.to_string(),
        source,
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PipelineError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::RemoteApi { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_escaped() {
        assert_eq!(escape_query_value("plain"), "plain");
        assert_eq!(escape_query_value("it's"), "it\\'s");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
    }
}
