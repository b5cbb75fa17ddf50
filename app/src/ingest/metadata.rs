use std::{
    io::Write,
    path::{Path, PathBuf},
};

use quoteclip_core::{identifiers::EpisodeId, Episode};

use super::IngestError;

pub fn metadata_file(dir: &Path, id: &EpisodeId) -> PathBuf {
    dir.join(format!("{}.json", id))
}

/// Pretty printed, so the same episode always produces the same bytes.
pub fn render_metadata(episode: &Episode) -> Result<Vec<u8>, IngestError> {
    let mut out = serde_json::to_vec_pretty(episode)?;
    out.push(b'\n');
    Ok(out)
}

/// Replace the episode's metadata file. Written next to the target and
/// renamed into place, readers never see half a file. Unchanged content is
/// not rewritten.
pub fn write_metadata(dir: &Path, episode: &Episode) -> Result<PathBuf, IngestError> {
    std::fs::create_dir_all(dir)?;
    let path = metadata_file(dir, &episode.id);
    let data = render_metadata(episode)?;
    if std::fs::read(&path).map(|old| old == data).unwrap_or(false) {
        log::trace!("metadata unchanged: {:?}", path);
        return Ok(path);
    }
    let mut tmp = tempfile::Builder::new()
        .prefix(".episode")
        .tempfile_in(dir)?;
    tmp.write_all(&data)?;
    tmp.as_file().sync_data()?;
    tmp.persist(&path).map_err(|e| IngestError::Io(e.error))?;
    log::debug!("wrote metadata {:?}", path);
    Ok(path)
}
