use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod clean_sub;
pub mod duration;
pub mod identifiers;
pub mod srt;

use identifiers::{EpisodeId, MediaId};

/// A single subtitle cue within an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub pos: u32,
    #[serde(with = "duration::serde_millis")]
    pub start: Duration,
    #[serde(with = "duration::serde_millis")]
    pub end: Duration,
    pub content: String,
}

impl Dialog {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// The canonical record for one episode of a publication.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(flatten)]
    pub id: EpisodeId,
    pub srt_file: String,
    pub video_file: String,
    pub dialog: Vec<Dialog>,
}

impl std::fmt::Debug for Episode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Episode")
            .field("id", &format_args!("{}", self.id))
            .field("srt_file", &self.srt_file)
            .field("video_file", &self.video_file)
            .field("dialog", &self.dialog.len())
            .finish()
    }
}

impl Episode {
    /// The media id covering every line of the episode, if it has any.
    pub fn full_range(&self) -> Option<MediaId> {
        let first = self.dialog.first()?;
        let last = self.dialog.last()?;
        MediaId::new(self.id.clone(), first.pos, last.pos).ok()
    }
}

/// A publication and the series that have been ingested for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub name: String,
    pub series: Vec<u32>,
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use std::time::Duration;

    use crate::Dialog;

    /// Two seconds per line, one second gap between lines.
    pub fn generate_dialog(lines: &[&str]) -> Vec<Dialog> {
        lines
            .iter()
            .enumerate()
            .map(|(idx, text)| Dialog {
                pos: idx as u32 + 1,
                start: Duration::from_secs(idx as u64 * 3),
                end: Duration::from_secs(idx as u64 * 3 + 2),
                content: text.to_string(),
            })
            .collect()
    }
}
