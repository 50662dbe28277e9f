// src/archive/client.rs

//! Transport for archive downloads
//!
//! [`Transport`] is the seam between the fetcher and the network. The
//! production implementation, [`RemoteClient`], wraps a blocking reqwest
//! client and also serves `file://` URIs; tests substitute a fake that
//! counts calls.

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Buffer size for streaming downloads
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Errors reported by a transport for a single attempt
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection, TLS, timeout or truncated body
    #[error("{0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// The location does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Writing the received data locally failed
    #[error("local write failed: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            Self::NotFound(_) | Self::Io(_) => false,
        }
    }
}

/// Source of archive bytes and index pages
pub trait Transport {
    /// Stream the resource at `url` into `sink`, returning the byte count
    ///
    /// Implementations must fail rather than return a short count when the
    /// body ends early.
    fn download(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        progress: Option<&ProgressBar>,
    ) -> Result<u64, TransportError>;

    /// Fetch a small text resource such as a directory listing
    fn fetch_text(&self, url: &Url) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn download(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        progress: Option<&ProgressBar>,
    ) -> Result<u64, TransportError> {
        (**self).download(url, sink, progress)
    }

    fn fetch_text(&self, url: &Url) -> Result<String, TransportError> {
        (**self).fetch_text(url)
    }
}

/// HTTP client wrapper serving `http`, `https` and `file` URIs
pub struct RemoteClient {
    client: Client,
}

impl RemoteClient {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("repack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    fn get(&self, url: &Url) -> Result<reqwest::blocking::Response, TransportError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response)
    }

    fn open_local(url: &Url) -> Result<File, TransportError> {
        let path = url
            .to_file_path()
            .map_err(|()| TransportError::NotFound(url.to_string()))?;
        File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TransportError::NotFound(path.display().to_string()),
            _ => TransportError::Io(e),
        })
    }
}

impl Transport for RemoteClient {
    fn download(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        progress: Option<&ProgressBar>,
    ) -> Result<u64, TransportError> {
        if url.scheme() == "file" {
            let mut file = Self::open_local(url)?;
            let expected = file.metadata().ok().map(|m| m.len());
            return stream_body(&mut file, sink, expected, progress);
        }

        let mut response = self.get(url)?;
        let expected = response.content_length();
        if let (Some(pb), Some(len)) = (progress, expected) {
            pb.set_length(len);
        }
        stream_body(&mut response, sink, expected, progress)
    }

    fn fetch_text(&self, url: &Url) -> Result<String, TransportError> {
        if url.scheme() == "file" {
            let mut text = String::new();
            Self::open_local(url)?.read_to_string(&mut text)?;
            return Ok(text);
        }

        self.get(url)?
            .text()
            .map_err(|e| TransportError::Network(format!("failed to read body: {e}")))
    }
}

/// Copy a response body to `sink` in chunks, never buffering it whole
///
/// Read failures are network errors (retryable); write failures are local.
fn stream_body(
    body: &mut dyn Read,
    sink: &mut dyn Write,
    expected: Option<u64>,
    progress: Option<&ProgressBar>,
) -> Result<u64, TransportError> {
    let mut downloaded: u64 = 0;
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];

    loop {
        let bytes_read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Network(format!("failed to read body: {e}"))),
        };

        sink.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;

        if let Some(pb) = progress {
            pb.set_position(downloaded);
        }
    }

    if let Some(len) = expected
        && downloaded != len
    {
        return Err(TransportError::Network(format!(
            "body truncated: received {downloaded} of {len} bytes"
        )));
    }

    debug!("Streamed {} bytes", downloaded);
    Ok(downloaded)
}

/// Create a styled progress bar for an archive download
pub fn download_progress_bar(name: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(name.to_string());
    pb
}
