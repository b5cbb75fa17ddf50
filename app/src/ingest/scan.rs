use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::SystemTime,
};

use once_cell::sync::Lazy;
use quoteclip_core::identifiers::EpisodeId;
use regex::Regex;

static EPISODE_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]+)-S(\d+)E(\d+)\.srt$").expect("static regex")
});

const VIDEO_EXTENSION: &str = "webm";

/// An `*.srt` file found in the media directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtFile {
    pub path: PathBuf,
    /// Manifest key: the path relative to the media directory.
    pub key: String,
    pub mtime: SystemTime,
}

/// Episode identity from a file name like `xfm-S01E02.srt`.
pub fn parse_episode_filename(name: &str) -> Option<EpisodeId> {
    let caps = EPISODE_FILE_RE.captures(name)?;
    let series = caps.get(2)?.as_str().parse().ok()?;
    let episode = caps.get(3)?.as_str().parse().ok()?;
    EpisodeId::new(caps.get(1)?.as_str(), series, episode).ok()
}

/// The companion video shares the stem.
pub fn video_file_name(srt_name: &str) -> String {
    let stem = srt_name.strip_suffix(".srt").unwrap_or(srt_name);
    format!("{}.{}", stem, VIDEO_EXTENSION)
}

fn is_srt(p: &Path) -> bool {
    p.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("srt"))
        .unwrap_or(false)
}

/// Every srt file under `root`, sorted by path.
pub fn scan_srt_files(root: &Path) -> std::io::Result<Vec<SrtFile>> {
    let mut content = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_srt(entry.path()) {
            continue;
        }
        log::trace!("scanned: {:?}", entry.path());
        let key = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        content.push(SrtFile {
            path: entry.path().to_owned(),
            key,
            mtime: entry.metadata()?.modified()?,
        });
    }
    content.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(content)
}

/// Files that are new, or newer than the manifest says.
pub fn pending_files(
    files: Vec<SrtFile>,
    manifest: &HashMap<String, SystemTime>,
) -> Vec<SrtFile> {
    files
        .into_iter()
        .filter(|f| match manifest.get(&f.key) {
            Some(seen) => f.mtime > *seen,
            None => true,
        })
        .collect()
}
