//! High-level pipeline: download → delete-remote → publish for one remote
//! folder of videos.
//!
//! The run is strictly sequential and fail-fast, with two exceptions:
//!   - an absent or empty remote folder is not an error: the run ends as
//!     [`PipelineOutcome::NothingToDo`] before the publish service is ever
//!     authenticated;
//!   - remote deletions are best-effort per file: one failed delete is
//!     logged and the remaining deletions still run.
//!
//! Every other failure (download, upload) aborts the remaining phases, and
//! partially completed side effects are left as-is with no rollback.
//!
//! Callable from the CLI crate and from integration tests, which substitute
//! mock [`StorageClient`]/[`PublishClient`] implementations.

use std::ffi::OsStr;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::drive::StorageClient;
use crate::error::PipelineError;
use crate::youtube::{PublishClient, ShortMetadata, VIDEO_EXTENSION};

/// One successfully published video, for the run report.
#[derive(Debug)]
pub struct PublishedVideo {
    pub video_id: String,
    pub title: String,
}

/// What a completed run did.
#[derive(Debug)]
pub struct PipelineReport {
    pub downloaded: usize,
    pub deleted: usize,
    pub published: Vec<PublishedVideo>,
}

/// Terminal state of a run that did not error.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The remote folder was missing or empty; nothing was mutated locally
    /// or remotely and the publish phase was skipped entirely.
    NothingToDo,
    Completed(PipelineReport),
}

/// Entrypoint: one full pipeline run.
///
/// `connect_publisher` is invoked lazily, only after a non-empty download,
/// so an empty folder never triggers a publish-service consent prompt.
pub async fn run<S, P, F, Fut>(
    config: &PipelineConfig,
    storage: &S,
    connect_publisher: F,
) -> Result<PipelineOutcome, PipelineError>
where
    S: StorageClient,
    P: PublishClient,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<P, PipelineError>>,
{
    info!(folder_name = %config.folder_name, "Starting pipeline run");

    let downloaded = download_all(storage, &config.folder_name, &config.staging_dir).await?;
    if downloaded == 0 {
        info!("Nothing to download, ending run before the publish phase");
        return Ok(PipelineOutcome::NothingToDo);
    }

    let deleted = delete_all(storage, &config.folder_name).await?;

    let publisher = connect_publisher().await?;
    let published = upload_all_pending(&publisher, &config.staging_dir).await?;

    info!(
        downloaded,
        deleted,
        published = published.len(),
        "Pipeline run complete"
    );
    Ok(PipelineOutcome::Completed(PipelineReport {
        downloaded,
        deleted,
        published,
    }))
}

/// Downloads every file in the named remote folder into `staging_dir`,
/// sequentially. Returns 0 without touching the local filesystem when the
/// folder is missing or empty; the staging directory is only created once
/// there is something to put in it.
pub async fn download_all<S: StorageClient>(
    storage: &S,
    folder_name: &str,
    staging_dir: &Path,
) -> Result<usize, PipelineError> {
    let folder_id = match storage.resolve_folder(folder_name).await? {
        Some(id) => id,
        None => {
            info!(folder_name, "Remote folder not found, nothing to download");
            return Ok(0);
        }
    };
    let files = storage.list_files(&folder_id).await?;
    if files.is_empty() {
        info!(folder_name, "Remote folder is empty, nothing to download");
        return Ok(0);
    }

    fs::create_dir_all(staging_dir)?;
    info!(
        folder_name,
        count = files.len(),
        staging_dir = %staging_dir.display(),
        "Downloading remote files into staging"
    );
    for file in &files {
        let dest = staged_destination(staging_dir, &file.name)?;
        storage.download_file(file, &dest).await?;
    }
    Ok(files.len())
}

/// Joins a remote-supplied file name under the staging directory. The name
/// must be a plain file name; anything carrying path separators or dot
/// components would escape the staging directory and is rejected.
fn staged_destination(staging_dir: &Path, name: &str) -> Result<PathBuf, PipelineError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(PipelineError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("remote file name {name:?} is not a plain file name"),
        )));
    }
    Ok(staging_dir.join(name))
}

/// Deletes every file in the named remote folder, from a fresh listing (not
/// the one the download phase saw). Individual delete failures are logged
/// and skipped; returns the number actually deleted.
pub async fn delete_all<S: StorageClient>(
    storage: &S,
    folder_name: &str,
) -> Result<usize, PipelineError> {
    let folder_id = match storage.resolve_folder(folder_name).await? {
        Some(id) => id,
        None => {
            info!(folder_name, "Remote folder gone, nothing to delete");
            return Ok(0);
        }
    };
    let files = storage.list_files(&folder_id).await?;

    let mut deleted = 0;
    for file in &files {
        match storage.delete_file(&file.id).await {
            Ok(()) => {
                deleted += 1;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    file_name = %file.name,
                    file_id = %file.id,
                    "Failed to delete remote file, continuing with the rest"
                );
            }
        }
    }
    info!(folder_name, deleted, total = files.len(), "Remote deletion pass done");
    Ok(deleted)
}

/// Uploads every `.mp4` in the staging directory, removing each local file
/// only after its upload succeeded. The first upload failure propagates and
/// aborts the remaining uploads, leaving their files staged.
pub async fn upload_all_pending<P: PublishClient>(
    publisher: &P,
    staging_dir: &Path,
) -> Result<Vec<PublishedVideo>, PipelineError> {
    if !staging_dir.exists() {
        info!(staging_dir = %staging_dir.display(), "No staging directory, nothing to publish");
        return Ok(Vec::new());
    }

    let mut pending = pending_videos(staging_dir)?;
    pending.sort();
    info!(
        staging_dir = %staging_dir.display(),
        count = pending.len(),
        "Publishing staged videos"
    );

    let mut published = Vec::new();
    for path in pending {
        let file_name = match path.file_name().and_then(OsStr::to_str) {
            Some(name) => name.to_string(),
            None => {
                warn!(path = %path.display(), "Skipping staged file with non-UTF-8 name");
                continue;
            }
        };
        let metadata = ShortMetadata::for_file(&file_name);
        let video_id = publisher.upload_video(&path, &metadata).await?;
        fs::remove_file(&path)?;
        info!(
            file_name = %file_name,
            video_id = %video_id,
            "Published video and removed local copy"
        );
        published.push(PublishedVideo {
            video_id,
            title: metadata.title,
        });
    }
    Ok(published)
}

fn pending_videos(staging_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut videos = Vec::new();
    for entry in fs::read_dir(staging_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(OsStr::to_str) == Some(VIDEO_EXTENSION) {
            videos.push(path);
        }
    }
    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_stage_under_the_staging_directory() {
        let dest = staged_destination(Path::new("staging"), "clip1.mp4")
            .expect("plain name is accepted");
        assert_eq!(dest, Path::new("staging").join("clip1.mp4"));
    }

    #[test]
    fn names_that_escape_staging_are_rejected() {
        for name in ["../evil.mp4", "a/b.mp4", "a\\b.mp4", "..", ".", ""] {
            assert!(
                staged_destination(Path::new("staging"), name).is_err(),
                "{name:?} should be rejected"
            );
        }
    }
}
