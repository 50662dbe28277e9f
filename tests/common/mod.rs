// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use indicatif::ProgressBar;
use repack::{Config, Sha256Digest, Transport, TransportError};
use std::cell::Cell;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use url::Url;

pub const ARCHIVE_URL: &str =
    "https://downloads.example.org/2025-12/eclipse-cpp-2025-12-linux-gtk-x86_64.tar.gz";

/// One member of a test archive
pub enum Member<'a> {
    File(&'a str, u32, &'a [u8]),
    Dir(&'a str),
    Symlink(&'a str, &'a str),
}

/// Build a gzip-compressed tarball
pub fn tar_gz(members: &[Member]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for member in members {
        let mut header = tar::Header::new_gnu();
        match member {
            Member::File(path, mode, data) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(*mode);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, path, *data).unwrap();
            }
            Member::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
            Member::Symlink(path, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                header.set_link_name(target).unwrap();
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
        }
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Minimal PNG: signature plus an IHDR chunk declaring `size` x `size`
pub fn png(size: u32) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(&13u32.to_be_bytes());
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&size.to_be_bytes());
    data.extend_from_slice(&size.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0]);
    data
}

/// Archive shaped like a multi-platform IDE bundle
pub fn ide_bundle() -> Vec<u8> {
    let icon_16 = png(16);
    let icon_256 = png(256);
    tar_gz(&[
        Member::Dir("eclipse/"),
        Member::File("eclipse/eclipse", 0o755, b"#!/bin/sh\nexec java -jar plugins/launcher.jar\n"),
        Member::File("eclipse/eclipse.ini", 0o644, b"-vmargs\n-Xmx2g\n"),
        Member::Dir("eclipse/lib/linux/x86_64/"),
        Member::File("eclipse/lib/linux/x86_64/libswt-gtk.so", 0o755, b"\x7fELF-x86_64"),
        Member::Dir("eclipse/lib/linux/aarch64/"),
        Member::File("eclipse/lib/linux/aarch64/libswt-gtk.so", 0o755, b"\x7fELF-aarch64"),
        Member::Dir("eclipse/lib/win32/"),
        Member::File("eclipse/lib/win32/swt.dll", 0o644, b"MZ"),
        Member::Dir("eclipse/lib/macos/"),
        Member::File("eclipse/lib/macos/libswt.dylib", 0o644, b"\xcf\xfa\xed\xfe"),
        Member::Dir("eclipse/plugins/"),
        Member::File("eclipse/plugins/launcher.jar", 0o644, b"PK"),
        Member::File(
            "eclipse/plugins/org.eclipse.swt.win32.win32.x86_64_3.126.0.jar",
            0o644,
            b"PK",
        ),
        Member::Symlink("eclipse/swt-native", "lib/linux/x86_64/libswt-gtk.so"),
        Member::Symlink("eclipse/swt-windows", "lib/win32/swt.dll"),
        Member::Dir("eclipse/icon/"),
        Member::File("eclipse/icon/16.png", 0o644, &icon_16),
        Member::File("eclipse/icon/256.png", 0o644, &icon_256),
    ])
}

/// In-memory transport that counts requests
#[derive(Default)]
pub struct MemoryTransport {
    files: HashMap<String, Vec<u8>>,
    pages: HashMap<String, String>,
    downloads: Cell<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: &str, data: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), data);
        self
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Number of download requests served so far
    pub fn downloads(&self) -> usize {
        self.downloads.get()
    }
}

impl Transport for MemoryTransport {
    fn download(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        _progress: Option<&ProgressBar>,
    ) -> Result<u64, TransportError> {
        self.downloads.set(self.downloads.get() + 1);
        let data = self
            .files
            .get(url.as_str())
            .ok_or_else(|| TransportError::NotFound(url.to_string()))?;
        sink.write_all(data)?;
        Ok(data.len() as u64)
    }

    fn fetch_text(&self, url: &Url) -> Result<String, TransportError> {
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| TransportError::NotFound(url.to_string()))
    }
}

/// Configuration for the IDE bundle rooted at `work_dir`
pub fn ide_config(work_dir: &Path, archive: &[u8]) -> Config {
    let mut config = Config::new("eclipse-cpp", "eclipse")
        .with_work_dir(work_dir)
        .with_uri(ARCHIVE_URL)
        .with_sha256(repack::hash::hash_bytes(archive).to_string())
        .with_version("2025-12")
        .with_strip_components(1);
    config.package.summary = Some("Eclipse IDE for C/C++ Developers".to_string());
    config.package.license = "EPL-2.0".to_string();
    config.fetch.progress = false;
    config.fetch.retry_delay_ms = 0;
    config
}

/// Digest of `data`
pub fn digest(data: &[u8]) -> Sha256Digest {
    repack::hash::hash_bytes(data)
}
