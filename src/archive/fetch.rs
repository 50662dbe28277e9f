// src/archive/fetch.rs

//! Archive fetcher with cache reuse and bounded retries

use super::client::{Transport, download_progress_bar};
use super::verify::verify_file;
use super::{ArchiveReference, LocalArchive};
use crate::error::{Error, Result, Stage};
use crate::filesystem::remove_path;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of download attempts
const DEFAULT_RETRIES: u32 = 3;

/// Default base delay between attempts
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Resolves archive references to files in a download directory
pub struct Fetcher<T: Transport> {
    transport: T,
    dest_dir: PathBuf,
    retries: u32,
    retry_delay: Duration,
    progress: bool,
}

impl<T: Transport> Fetcher<T> {
    /// Create a fetcher storing archives in `dest_dir`
    pub fn new(transport: T, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            dest_dir: dest_dir.into(),
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            progress: false,
        }
    }

    /// Total attempts per download (at least one)
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Base delay; attempt `n` waits `n * delay` before the next one
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Show a progress bar while downloading
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Local path an archive is cached under
    pub fn dest_path(&self, reference: &ArchiveReference) -> PathBuf {
        self.dest_dir.join(reference.file_name())
    }

    /// Return a local copy of the referenced archive
    ///
    /// A file already at the destination is reused only if it matches the
    /// expected digest; otherwise it is deleted and downloaded again.
    pub fn fetch(&self, reference: &ArchiveReference) -> Result<LocalArchive> {
        let dest = self.dest_path(reference);

        if fs::symlink_metadata(&dest).is_ok() {
            match verify_file(&dest, reference.digest()) {
                Ok(_) => {
                    info!("Reusing cached archive {}", dest.display());
                    return Ok(LocalArchive::new(dest, reference.clone(), false));
                }
                Err(e) => {
                    warn!("Discarding cached archive: {}", e);
                    remove_path(&dest).map_err(|e| Error::io(Stage::Fetch, &dest, e))?;
                }
            }
        }

        fs::create_dir_all(&self.dest_dir)
            .map_err(|e| Error::io(Stage::Fetch, &self.dest_dir, e))?;

        info!("Downloading {}", reference.uri());
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_download(reference, &dest) {
                Ok(Ok(bytes)) => {
                    debug!("Downloaded {} bytes to {}", bytes, dest.display());
                    return Ok(LocalArchive::new(dest, reference.clone(), true));
                }
                Ok(Err(e)) => {
                    if !e.is_transient() || attempt >= self.retries {
                        return Err(Error::Fetch {
                            url: reference.uri().to_string(),
                            reason: if attempt > 1 {
                                format!("{} (after {} attempts)", e, attempt)
                            } else {
                                e.to_string()
                            },
                        });
                    }
                    warn!(
                        "Download attempt {} of {} failed: {}, retrying...",
                        attempt, self.retries, e
                    );
                    std::thread::sleep(self.retry_delay * attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One download attempt into a temporary file next to `dest`
    ///
    /// The outer result carries local failures, which are never retried; the
    /// inner one carries transport failures. The temporary file is removed
    /// on drop unless the attempt completes and it is renamed over `dest`.
    fn try_download(
        &self,
        reference: &ArchiveReference,
        dest: &Path,
    ) -> Result<std::result::Result<u64, super::TransportError>> {
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", reference.file_name()))
            .suffix(".part")
            .tempfile_in(&self.dest_dir)
            .map_err(|e| Error::io(Stage::Fetch, &self.dest_dir, e))?;

        let progress = self
            .progress
            .then(|| download_progress_bar(reference.file_name()));

        let outcome = self
            .transport
            .download(reference.uri(), temp.as_file_mut(), progress.as_ref());

        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }

        let bytes = match outcome {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Err(e)),
        };

        temp.as_file_mut()
            .flush()
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| Error::io(Stage::Fetch, temp.path(), e))?;
        temp.persist(dest)
            .map_err(|e| Error::io(Stage::Fetch, dest, e.error))?;

        Ok(Ok(bytes))
    }
}
