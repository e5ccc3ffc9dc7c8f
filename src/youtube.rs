//! Publish client for the media-publishing service.
//!
//! Every staged video is published as a public short-form video with a
//! fixed metadata policy: the title is the file's base name plus the
//! `#Shorts` marker, tags/category/visibility are compile-time constants.
//! Content moves over the service's resumable upload protocol in sequential
//! chunks; no session token is persisted, so a crashed upload restarts from
//! scratch on the next run.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use mockall::automock;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::Credential;
use crate::error::PipelineError;
use crate::transfer::{TransferProgress, UPLOAD_CHUNK_SIZE};

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// The only file extension the publish stage accepts.
pub const VIDEO_EXTENSION: &str = "mp4";

const SHORTS_MARKER: &str = "#Shorts";
const SHORT_TAGS: [&str; 3] = ["Shorts", "YouTube", "Viral"];
const SHORT_CATEGORY_ID: &str = "22";
const PRIVACY_PUBLIC: &str = "public";

/// Derives the display title from a staged file name: only a final `.mp4`
/// suffix is stripped before the marker is appended.
pub fn derive_title(file_name: &str) -> String {
    let base = file_name.strip_suffix(".mp4").unwrap_or(file_name);
    format!("{base} {SHORTS_MARKER}")
}

/// Fixed descriptive metadata for one short-form upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

impl ShortMetadata {
    /// Builds the uniform short-form metadata for a staged file.
    pub fn for_file(file_name: &str) -> Self {
        let title = derive_title(file_name);
        let description = format!("This is a YouTube Short titled: {title}");
        ShortMetadata {
            title,
            description,
            tags: SHORT_TAGS.iter().map(|t| t.to_string()).collect(),
            category_id: SHORT_CATEGORY_ID.to_string(),
            privacy_status: PRIVACY_PUBLIC.to_string(),
        }
    }
}

#[derive(Serialize)]
struct VideoResource<'a> {
    snippet: Snippet<'a>,
    status: Status<'a>,
}

#[derive(Serialize)]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    #[serde(rename = "categoryId")]
    category_id: &'a str,
}

#[derive(Serialize)]
struct Status<'a> {
    #[serde(rename = "privacyStatus")]
    privacy_status: &'a str,
}

#[derive(Deserialize)]
struct UploadedVideo {
    id: String,
}

/// Publishing operations the pipeline depends on.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PublishClient: Send + Sync {
    /// Upload one local video and return the new remote media id. On
    /// failure the local file is left untouched by this client.
    async fn upload_video(
        &self,
        path: &Path,
        metadata: &ShortMetadata,
    ) -> Result<String, PipelineError>;
}

/// Real client against the resumable upload API.
pub struct YouTubeClient {
    http: reqwest::Client,
    credential: Credential,
}

impl YouTubeClient {
    pub fn new(credential: Credential) -> Self {
        Self {
            http: reqwest::Client::new(),
            credential,
        }
    }

    /// Chunked resumable upload with a caller-observable progress event per
    /// accepted chunk.
    pub async fn upload_video_with_progress(
        &self,
        path: &Path,
        metadata: &ShortMetadata,
        mut on_progress: impl FnMut(TransferProgress) + Send,
    ) -> Result<String, PipelineError> {
        let total = std::fs::metadata(path)?.len();
        if total == 0 {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("refusing to upload empty file {}", path.display()),
            )));
        }
        let session_url = self.initiate_session(metadata, total).await?;
        debug!(path = %path.display(), total_bytes = total, "Resumable upload session opened");

        let mut file = File::open(path)?;
        let mut offset: u64 = 0;
        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        loop {
            let chunk_len = read_chunk(&mut file, &mut buffer)?;
            if chunk_len == 0 {
                // The file shrank underneath us mid-upload.
                return Err(PipelineError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("upload source ended prematurely at byte {offset} of {total}"),
                )));
            }

            let end = offset + chunk_len as u64 - 1;
            let response = self
                .http
                .put(&session_url)
                .bearer_auth(&self.credential.access_token)
                .header(CONTENT_LENGTH, chunk_len)
                .header(CONTENT_RANGE, format!("bytes {offset}-{end}/{total}"))
                .body(buffer[..chunk_len].to_vec())
                .send()
                .await
                .map_err(|e| transfer_error(path, e))?;

            let status = response.status();
            if status == StatusCode::PERMANENT_REDIRECT {
                // 308: chunk accepted, server wants more.
                offset = end + 1;
                on_progress(TransferProgress {
                    bytes_transferred: offset,
                    total_bytes: Some(total),
                    complete: false,
                });
                continue;
            }
            if status.is_success() {
                let uploaded: UploadedVideo = response
                    .json()
                    .await
                    .map_err(|e| transfer_error(path, e))?;
                on_progress(TransferProgress {
                    bytes_transferred: total,
                    total_bytes: Some(total),
                    complete: true,
                });
                info!(
                    path = %path.display(),
                    video_id = %uploaded.id,
                    title = %metadata.title,
                    "Upload complete"
                );
                return Ok(uploaded.id);
            }

            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::RemoteApi { status, body });
        }
    }

    async fn initiate_session(
        &self,
        metadata: &ShortMetadata,
        total: u64,
    ) -> Result<String, PipelineError> {
        let body = VideoResource {
            snippet: Snippet {
                title: &metadata.title,
                description: &metadata.description,
                tags: &metadata.tags,
                category_id: &metadata.category_id,
            },
            status: Status {
                privacy_status: &metadata.privacy_status,
            },
        };
        let response = self
            .http
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&self.credential.access_token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", total)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Transfer {
                context: "upload session initiation".to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::RemoteApi { status, body });
        }
        match response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
            Some(url) => Ok(url.to_string()),
            None => Err(PipelineError::RemoteApi {
                status,
                body: "resumable session response carried no location header".to_string(),
            }),
        }
    }
}

#[async_trait]
impl PublishClient for YouTubeClient {
    async fn upload_video(
        &self,
        path: &Path,
        metadata: &ShortMetadata,
    ) -> Result<String, PipelineError> {
        let title = metadata.title.clone();
        self.upload_video_with_progress(path, metadata, move |progress| {
            debug!(
                title = %title,
                bytes = progress.bytes_transferred,
                percent = progress.percent(),
                complete = progress.complete,
                "Upload progress"
            );
        })
        .await
    }
}

/// Fills as much of `buffer` as the file still holds. A short read only
/// happens on the final chunk.
fn read_chunk(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn transfer_error(path: &Path, source: reqwest::Error) -> PipelineError {
    PipelineError::Transfer {
        context: format!("upload of {}", path.display()),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_strips_only_final_mp4_suffix() {
        assert_eq!(derive_title("clip1.mp4"), "clip1 #Shorts");
        assert_eq!(derive_title("a.b.mp4"), "a.b #Shorts");
        assert_eq!(derive_title("no_extension"), "no_extension #Shorts");
        assert_eq!(derive_title("a.mp4.mp4"), "a.mp4 #Shorts");
    }

    #[tokio::test]
    async fn empty_staged_file_is_rejected_before_any_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.mp4");
        std::fs::write(&path, b"").expect("write staged file");

        let client = YouTubeClient::new(Credential {
            access_token: "token".into(),
        });
        let metadata = ShortMetadata::for_file("empty.mp4");
        let err = client
            .upload_video(&path, &metadata)
            .await
            .expect_err("an empty file must not start an upload");
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn metadata_policy_is_fixed() {
        let metadata = ShortMetadata::for_file("clip1.mp4");
        assert_eq!(metadata.title, "clip1 #Shorts");
        assert_eq!(
            metadata.description,
            "This is a YouTube Short titled: clip1 #Shorts"
        );
        assert_eq!(metadata.tags, vec!["Shorts", "YouTube", "Viral"]);
        assert_eq!(metadata.category_id, "22");
        assert_eq!(metadata.privacy_status, "public");
    }
}
