use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaIdError {
    #[error("invalid publication name: {0:?}")]
    Publication(String),
    #[error("invalid episode identity: {0:?}")]
    Episode(String),
    #[error("invalid dialog position: {0:?}")]
    Position(String),
    #[error("range end {end} is before start {start}")]
    Range { start: u32, end: u32 },
    #[error("malformed media id: {0:?}")]
    Malformed(String),
}

fn valid_publication(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// `publication-S##E##`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpisodeId {
    pub publication: String,
    pub series: u32,
    pub episode: u32,
}

impl EpisodeId {
    pub fn new(publication: &str, series: u32, episode: u32) -> Result<EpisodeId, MediaIdError> {
        if !valid_publication(publication) {
            return Err(MediaIdError::Publication(publication.to_owned()));
        }
        Ok(EpisodeId {
            publication: publication.to_ascii_lowercase(),
            series,
            episode,
        })
    }

    /// The short `S##E##` label.
    pub fn label(&self) -> String {
        format!("S{:02}E{:02}", self.series, self.episode)
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.publication, self.label())
    }
}

/// Parse the `S##E##` part of an identity, case insensitive.
fn parse_series_episode(s: &str) -> Option<(u32, u32)> {
    let lower = s.to_ascii_lowercase();
    let rest = lower.strip_prefix('s')?;
    let (series, episode) = rest.split_once('e')?;
    if series.is_empty() || episode.is_empty() {
        return None;
    }
    if !series.bytes().all(|b| b.is_ascii_digit()) || !episode.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some((series.parse().ok()?, episode.parse().ok()?))
}

impl FromStr for EpisodeId {
    type Err = MediaIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (publication, se) = s
            .split_once('-')
            .ok_or_else(|| MediaIdError::Episode(s.to_owned()))?;
        let (series, episode) =
            parse_series_episode(se).ok_or_else(|| MediaIdError::Episode(s.to_owned()))?;
        EpisodeId::new(publication, series, episode)
    }
}

/// An inclusive range of dialog positions inside one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionRange {
    pub start: u32,
    pub end: u32,
}

impl PositionRange {
    pub fn new(start: u32, end: u32) -> Result<PositionRange, MediaIdError> {
        if end < start {
            return Err(MediaIdError::Range { start, end });
        }
        Ok(PositionRange { start, end })
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains_pos(&self, pos: u32) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// True when `other` lies entirely within `self`.
    pub fn contains(&self, other: &PositionRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end > self.start {
            write!(f, "{}_{}", self.start, self.end)
        } else {
            write!(f, "{}", self.start)
        }
    }
}

impl FromStr for PositionRange {
    type Err = MediaIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_pos = |p: &str| {
            if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(MediaIdError::Position(p.to_owned()));
            }
            p.parse::<u32>()
                .map_err(|_| MediaIdError::Position(p.to_owned()))
        };
        match s.split_once('_') {
            Some((start, end)) => PositionRange::new(parse_pos(start)?, parse_pos(end)?),
            None => {
                let pos = parse_pos(s)?;
                Ok(PositionRange {
                    start: pos,
                    end: pos,
                })
            }
        }
    }
}

/// A reference to one line, or a contiguous run of lines, in an episode.
///
/// Canonical form is `publication-S##E##-START[_END]`, where `_END` is only
/// present when the range spans more than one line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaId {
    pub episode: EpisodeId,
    pub range: PositionRange,
}

impl MediaId {
    pub fn new(episode: EpisodeId, start: u32, end: u32) -> Result<MediaId, MediaIdError> {
        Ok(MediaId {
            episode,
            range: PositionRange::new(start, end)?,
        })
    }

    pub fn single(episode: EpisodeId, pos: u32) -> MediaId {
        MediaId {
            episode,
            range: PositionRange {
                start: pos,
                end: pos,
            },
        }
    }

    pub fn start(&self) -> u32 {
        self.range.start
    }

    pub fn end(&self) -> u32 {
        self.range.end
    }

    /// Same episode, different range.
    pub fn with_range(&self, start: u32, end: u32) -> Result<MediaId, MediaIdError> {
        MediaId::new(self.episode.clone(), start, end)
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.episode, self.range)
    }
}

impl FromStr for MediaId {
    type Err = MediaIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (episode, range) = s
            .rsplit_once('-')
            .ok_or_else(|| MediaIdError::Malformed(s.to_owned()))?;
        Ok(MediaId {
            episode: episode.parse()?,
            range: range.parse()?,
        })
    }
}

impl Serialize for MediaId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MediaId {
    fn deserialize<D>(deserializer: D) -> Result<MediaId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_range_media_id() {
        let id = MediaId::from_str("peepshow-S08E06-1_4").unwrap();
        assert_eq!(id.episode.publication, "peepshow");
        assert_eq!(id.episode.series, 8);
        assert_eq!(id.episode.episode, 6);
        assert_eq!(id.start(), 1);
        assert_eq!(id.end(), 4);
        assert_eq!(id.to_string(), "peepshow-S08E06-1_4");
    }

    #[test]
    fn single_line_has_no_end() {
        let id = MediaId::single(EpisodeId::new("xfm", 1, 2).unwrap(), 12);
        assert_eq!(id.to_string(), "xfm-S01E02-12");
        assert_eq!(MediaId::from_str("xfm-S01E02-12").unwrap(), id);
    }

    #[test]
    fn equal_start_end_formats_as_single() {
        let id = MediaId::from_str("xfm-S01E02-3_3").unwrap();
        assert_eq!(id.to_string(), "xfm-S01E02-3");
    }

    #[test]
    fn media_id_round_trips() {
        for s in ["a-S01E01-1", "show-S12E99-100_120", "x9-S00E00-7_8"] {
            let id = MediaId::from_str(s).unwrap();
            assert_eq!(MediaId::from_str(&id.to_string()).unwrap(), id);
            assert_eq!(id.to_string(), s);
        }
    }

    #[test]
    fn reject_backwards_range() {
        assert_eq!(
            MediaId::from_str("xfm-S01E02-5_4"),
            Err(MediaIdError::Range { start: 5, end: 4 })
        );
    }

    #[test]
    fn reject_garbage() {
        assert!(MediaId::from_str("").is_err());
        assert!(MediaId::from_str("xfm").is_err());
        assert!(MediaId::from_str("xfm-S01-1").is_err());
        assert!(MediaId::from_str("xfm-S01E02-").is_err());
        assert!(MediaId::from_str("xfm-S01E02-a").is_err());
        assert!(MediaId::from_str("x_y-S01E02-1").is_err());
    }

    #[test]
    fn episode_identity_is_zero_padded() {
        let id = EpisodeId::new("Simpsons", 3, 7).unwrap();
        assert_eq!(id.to_string(), "simpsons-S03E07");
        assert_eq!(id.label(), "S03E07");
    }

    #[test]
    fn serde_as_string() {
        let id = MediaId::from_str("peepshow-S08E06-1_4").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"peepshow-S08E06-1_4\"");
        assert_eq!(serde_json::from_str::<MediaId>(&json).unwrap(), id);
    }

    #[test]
    fn range_containment() {
        let outer = PositionRange::new(2, 6).unwrap();
        assert!(outer.contains(&PositionRange::new(3, 4).unwrap()));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&PositionRange::new(1, 4).unwrap()));
        assert_eq!(outer.len(), 5);
    }
}
