// src/archive/discover.rs

//! Release discovery on an upstream download index
//!
//! The index is a plain directory listing with one sub-directory per
//! release (`2025-12/`). Each release holds its final builds under a fixed
//! sub-directory (`R/`), whose listing links the archives themselves.

use super::client::Transport;
use crate::config::DiscoverySection;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use url::Url;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"'#?]+)[^"']*["']"#).expect("valid href regex")
});

/// Newest release found on an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Archive location
    pub uri: Url,
    /// Release directory name (`2025-12`)
    pub version: String,
}

/// Extract link targets from an HTML listing, in document order
pub fn parse_hrefs(html: &str) -> Vec<String> {
    HREF_RE
        .captures_iter(html)
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// Release directory names on an index page, newest first
///
/// Names are compared as strings, which orders `YYYY-MM` correctly.
pub fn release_names(html: &str, pattern: &Regex) -> Vec<String> {
    let mut names: Vec<String> = parse_hrefs(html)
        .iter()
        .filter_map(|href| href.trim_end_matches('/').rsplit('/').next())
        .filter(|name| pattern.is_match(name))
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    names.reverse();
    names
}

fn fetch_error(url: &Url, reason: impl std::fmt::Display) -> Error {
    Error::Fetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Find the newest release that links an archive containing every fragment
///
/// Releases whose build directory is missing or has no matching archive are
/// skipped in favor of the next older one.
pub fn discover_latest(transport: &impl Transport, section: &DiscoverySection) -> Result<Release> {
    let index = Url::parse(&section.index_url)
        .map_err(|e| Error::Config(format!("discovery.index_url: {}", e)))?;
    let pattern = Regex::new(&section.release_pattern)
        .map_err(|e| Error::Config(format!("discovery.release_pattern: {}", e)))?;

    info!("Checking {} for releases", index);
    let listing = transport
        .fetch_text(&index)
        .map_err(|e| fetch_error(&index, e))?;

    let releases = release_names(&listing, &pattern);
    if releases.is_empty() {
        return Err(fetch_error(&index, "no release directories found"));
    }
    debug!("Found {} releases, newest {}", releases.len(), releases[0]);

    for release in &releases {
        let build_dir = index
            .join(&format!("{}/", release))
            .and_then(|u| u.join(&section.release_subdir))
            .map_err(|e| fetch_error(&index, e))?;

        let listing = match transport.fetch_text(&build_dir) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Skipping release {}: {}", release, e);
                continue;
            }
        };

        let matched = parse_hrefs(&listing).into_iter().find(|href| {
            section
                .match_fragments
                .iter()
                .all(|fragment| href.contains(fragment.as_str()))
        });

        match matched {
            Some(href) => {
                let uri = build_dir.join(&href).map_err(|e| fetch_error(&build_dir, e))?;
                info!("Found release {} at {}", release, uri);
                return Ok(Release {
                    uri,
                    version: release.clone(),
                });
            }
            None => warn!("Release {} has no matching archive", release),
        }
    }

    Err(fetch_error(
        &index,
        format!(
            "no release links an archive matching {}",
            section.match_fragments.join(", ")
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TransportError;
    use indicatif::ProgressBar;
    use std::collections::HashMap;
    use std::io::Write;

    struct Pages(HashMap<String, String>);

    impl Transport for Pages {
        fn download(
            &self,
            url: &Url,
            _sink: &mut dyn Write,
            _progress: Option<&ProgressBar>,
        ) -> std::result::Result<u64, TransportError> {
            Err(TransportError::NotFound(url.to_string()))
        }

        fn fetch_text(&self, url: &Url) -> std::result::Result<String, TransportError> {
            self.0
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| TransportError::NotFound(url.to_string()))
        }
    }

    const INDEX: &str = "https://download.example.org/release/";

    fn section() -> DiscoverySection {
        DiscoverySection {
            index_url: INDEX.to_string(),
            match_fragments: vec!["eclipse-cpp".to_string(), "linux-gtk-x86_64.tar.gz".to_string()],
            release_pattern: r"^\d{4}-\d{2}$".to_string(),
            release_subdir: "R/".to_string(),
        }
    }

    fn index_page() -> String {
        r#"<html><body>
        <a href="../">Parent</a>
        <a href="2025-09/">2025-09/</a>
        <a href='2025-12/'>2025-12/</a>
        <a href="/technology/epp/downloads/release/2025-06/">2025-06/</a>
        <a href="updates/">updates/</a>
        </body></html>"#
            .to_string()
    }

    #[test]
    fn test_release_names_newest_first() {
        let pattern = Regex::new(r"^\d{4}-\d{2}$").unwrap();
        assert_eq!(
            release_names(&index_page(), &pattern),
            vec!["2025-12", "2025-09", "2025-06"]
        );
    }

    #[test]
    fn test_discover_newest_release() {
        let pages = Pages(HashMap::from([
            (INDEX.to_string(), index_page()),
            (
                format!("{INDEX}2025-12/R/"),
                r#"<a href="eclipse-java-2025-12-R-linux-gtk-x86_64.tar.gz">java</a>
                   <a href="eclipse-cpp-2025-12-R-win32-x86_64.zip">win</a>
                   <a href="eclipse-cpp-2025-12-R-linux-gtk-x86_64.tar.gz">cpp</a>"#
                    .to_string(),
            ),
        ]));

        let release = discover_latest(&pages, &section()).unwrap();
        assert_eq!(release.version, "2025-12");
        assert_eq!(
            release.uri.as_str(),
            "https://download.example.org/release/2025-12/R/eclipse-cpp-2025-12-R-linux-gtk-x86_64.tar.gz"
        );
    }

    #[test]
    fn test_discover_falls_back_to_older_release() {
        let pages = Pages(HashMap::from([
            (INDEX.to_string(), index_page()),
            (
                format!("{INDEX}2025-09/R/"),
                r#"<a href="eclipse-cpp-2025-09-R-linux-gtk-x86_64.tar.gz?mirror=1">cpp</a>"#
                    .to_string(),
            ),
        ]));

        let release = discover_latest(&pages, &section()).unwrap();
        assert_eq!(release.version, "2025-09");
        assert!(release.uri.path().ends_with("eclipse-cpp-2025-09-R-linux-gtk-x86_64.tar.gz"));
    }

    #[test]
    fn test_discover_without_matches() {
        let pages = Pages(HashMap::from([(INDEX.to_string(), "<p>empty</p>".to_string())]));
        let err = discover_latest(&pages, &section()).unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
