// src/icon.rs

//! Icon discovery and installation
//!
//! Candidates are found by name and location inside the pruned tree, their
//! resolution is read from the image header where the format allows it, and
//! the winners are copied into an icon-theme layout:
//!
//! ```text
//! hicolor/<N>x<N>/apps/<name>.png
//! hicolor/scalable/apps/<name>.svg
//! pixmaps/<name>.<ext>
//! ```

use crate::config::IconSection;
use crate::error::{Error, Result, Stage};
use crate::filesystem::path::relative_slash_path;
use crate::filesystem::remove_path;
use crate::tree::PrunedTree;
use regex::Regex;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Bytes read from a file to find its dimensions
const HEADER_PROBE_LEN: u64 = 4096;

/// Larger numbers in a file name are versions or dates, not sizes
const MAX_NAME_RESOLUTION: u32 = 4096;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

static SVG_WIDTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<svg\b[^>]*?\swidth\s*=\s*["'](\d+)"#).expect("valid svg width regex")
});

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid digits regex"));

/// Supported icon formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IconFormat {
    Svg,
    Png,
    Xpm,
}

impl IconFormat {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            "xpm" => Some(Self::Xpm),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Xpm => "xpm",
        }
    }

    /// Tie-break preference between equal resolutions (higher wins)
    fn rank(&self) -> u8 {
        match self {
            Self::Svg => 3,
            Self::Png => 2,
            Self::Xpm => 1,
        }
    }

    fn is_raster(&self) -> bool {
        !matches!(self, Self::Svg)
    }
}

/// An icon file found in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconCandidate {
    /// `/`-separated path relative to the tree root
    pub relative: String,
    #[serde(skip)]
    pub path: PathBuf,
    /// Edge length in pixels, 0 when unknown
    pub resolution: u32,
    pub format: IconFormat,
    /// File name contains one of the configured icon names
    pub named: bool,
}

/// Total order used for selection: resolution, then name matches over
/// directory-only matches, then format, then the lexically smaller path
fn preference(a: &IconCandidate, b: &IconCandidate) -> Ordering {
    (a.resolution, a.named, a.format.rank(), Reverse(&a.relative))
        .cmp(&(b.resolution, b.named, b.format.rank(), Reverse(&b.relative)))
}

/// Non-fatal: the tree contains no usable icon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconWarning {
    pub root: PathBuf,
    pub fallback: String,
}

impl fmt::Display for IconWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "icon: {}: no icon found, using theme icon '{}'",
            self.root.display(),
            self.fallback
        )
    }
}

/// Icons copied into the theme layout
#[derive(Debug, Clone, Serialize)]
pub struct IconSet {
    /// Overall best candidate, also installed under `pixmaps/`
    pub primary: IconCandidate,
    /// Installed files relative to the icon directory, sorted
    pub installed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum IconOutcome {
    Installed(IconSet),
    Missing(IconWarning),
}

impl IconOutcome {
    pub fn icon_set(&self) -> Option<&IconSet> {
        match self {
            Self::Installed(set) => Some(set),
            Self::Missing(_) => None,
        }
    }
}

/// Find icon candidates below `root`, sorted by relative path
///
/// A regular file with a supported extension qualifies if its name contains
/// one of `names` or it lives in a top-level `icon` or `icons` directory.
/// Icon directories nested deeper belong to bundled components (plugin
/// glyphs) and are ignored.
pub fn discover(root: &Path, names: &[String]) -> Result<Vec<IconCandidate>> {
    let names: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            Error::io(Stage::Icon, path, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(format) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(IconFormat::from_extension)
        else {
            continue;
        };
        let Some(relative) = relative_slash_path(root, path) else {
            continue;
        };

        let file_name = entry.file_name().to_string_lossy().to_lowercase();
        let in_icon_dir = relative.split_once('/').is_some_and(|(top, _)| {
            top.eq_ignore_ascii_case("icon") || top.eq_ignore_ascii_case("icons")
        });
        let named = names.iter().any(|n| file_name.contains(n.as_str()));
        if !in_icon_dir && !named {
            continue;
        }

        let resolution = probe_resolution(path, format).unwrap_or(0);
        debug!("Icon candidate {} ({}px {})", relative, resolution, format.extension());
        candidates.push(IconCandidate {
            relative,
            path: path.to_path_buf(),
            resolution,
            format,
            named,
        });
    }

    Ok(candidates)
}

/// Pick the best candidate: highest resolution, then name matches, then
/// svg > png > xpm
pub fn select_best(candidates: &[IconCandidate]) -> Option<&IconCandidate> {
    candidates.iter().max_by(|a, b| preference(a, b))
}

/// Resolution from the file header, falling back to the file name
fn probe_resolution(path: &Path, format: IconFormat) -> Option<u32> {
    let mut head = Vec::new();
    File::open(path)
        .and_then(|f| f.take(HEADER_PROBE_LEN).read_to_end(&mut head))
        .ok()?;

    let from_header = match format {
        IconFormat::Png => png_resolution(&head),
        IconFormat::Xpm => xpm_resolution(&head),
        IconFormat::Svg => svg_resolution(&head),
    };

    from_header.or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy())
            .and_then(|n| name_resolution(&n))
    })
}

/// Width and height from the IHDR chunk, which always comes first
fn png_resolution(head: &[u8]) -> Option<u32> {
    if head.len() < 24 || !head.starts_with(PNG_SIGNATURE) || &head[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(head[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(head[20..24].try_into().ok()?);
    Some(width.max(height)).filter(|&r| r > 0)
}

/// The first string literal of an XPM holds `"<width> <height> <colors> <cpp>"`
fn xpm_resolution(head: &[u8]) -> Option<u32> {
    let text = String::from_utf8_lossy(head);
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with('"'))?;
    let mut values = line.trim_matches(|c| c == '"' || c == ',').split_whitespace();
    let width: u32 = values.next()?.parse().ok()?;
    let height: u32 = values.next()?.parse().ok()?;
    Some(width.max(height)).filter(|&r| r > 0)
}

fn svg_resolution(head: &[u8]) -> Option<u32> {
    let text = String::from_utf8_lossy(head);
    SVG_WIDTH_RE
        .captures(&text)
        .and_then(|c| c[1].parse().ok())
        .filter(|&r| r > 0)
}

/// Largest plausible size embedded in a file name (`eclipse256.png`)
fn name_resolution(name: &str) -> Option<u32> {
    DIGITS_RE
        .find_iter(name)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .filter(|&n| n > 0 && n <= MAX_NAME_RESOLUTION)
        .max()
}

/// Copy the selected icons of `tree` into `dest` as `<name>.<ext>`
///
/// `dest` is rebuilt from scratch on every run. Finding no icon is reported
/// as [`IconOutcome::Missing`], not as an error.
pub fn extract_icons(
    tree: &PrunedTree,
    section: &IconSection,
    name: &str,
    dest: &Path,
) -> Result<IconOutcome> {
    remove_path(dest).map_err(|e| Error::io(Stage::Icon, dest, e))?;

    let candidates = discover(tree.root(), &section.names)?;
    let Some(primary) = select_best(&candidates) else {
        let warning = IconWarning {
            root: tree.root().to_path_buf(),
            fallback: section.fallback.clone(),
        };
        warn!("{}", warning);
        return Ok(IconOutcome::Missing(warning));
    };

    let mut installed = Vec::new();

    let mut sizes = section.sizes.clone();
    sizes.sort_unstable();
    sizes.dedup();
    for size in sizes {
        let best = candidates
            .iter()
            .filter(|c| c.format.is_raster() && c.resolution == size)
            .max_by(|a, b| preference(a, b));
        if let Some(icon) = best {
            let target = format!("hicolor/{size}x{size}/apps/{name}.{}", icon.format.extension());
            install(icon, dest, &target)?;
            installed.push(target);
        }
    }

    if let Some(svg) = candidates
        .iter()
        .filter(|c| c.format == IconFormat::Svg)
        .max_by(|a, b| preference(a, b))
    {
        let target = format!("hicolor/scalable/apps/{name}.svg");
        install(svg, dest, &target)?;
        installed.push(target);
    }

    let target = format!("pixmaps/{name}.{}", primary.format.extension());
    install(primary, dest, &target)?;
    installed.push(target);
    installed.sort();

    info!(
        "Selected icon {} ({}px {}), installed {} files",
        primary.relative,
        primary.resolution,
        primary.format.extension(),
        installed.len()
    );
    Ok(IconOutcome::Installed(IconSet {
        primary: primary.clone(),
        installed,
    }))
}

fn install(icon: &IconCandidate, dest: &Path, relative: &str) -> Result<()> {
    let target = dest.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(Stage::Icon, parent, e))?;
    }
    fs::copy(&icon.path, &target).map_err(|e| Error::io(Stage::Icon, &icon.path, e))?;
    fs::set_permissions(&target, fs::Permissions::from_mode(0o644))
        .map_err(|e| Error::io(Stage::Icon, &target, e))?;
    Ok(())
}
