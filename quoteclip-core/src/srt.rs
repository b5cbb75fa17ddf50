//! SubRip reader.
//!
//! The parser is a three state loop: a position line, a timestamp line, then
//! content lines until a blank line resets it. HTML-like tags are removed
//! from content, explicit newlines inside an entry are kept.
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::Dialog;

pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30);

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SrtError {
    #[error("failed to scan position at entry {entry}: {line:?}")]
    Position { entry: usize, line: String },
    #[error("failed to scan timestamps at entry {entry}: {line:?}")]
    Timestamps { entry: usize, line: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrtOptions {
    /// No entry may last longer than this.
    pub max_duration: Duration,
    /// Stretch each entry until the next one begins.
    pub eliminate_gaps: bool,
}

impl Default for SrtOptions {
    fn default() -> Self {
        SrtOptions {
            max_duration: DEFAULT_MAX_DURATION,
            eliminate_gaps: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    ExpectPosition,
    ExpectTimestamps,
    AccumulateContent,
}

#[derive(Debug, Default)]
struct PartialEntry {
    start: Duration,
    end: Duration,
    lines: Vec<String>,
}

/// Clip `end` so the entry lasts at most `max`. An end before the start is
/// pulled up to the start.
pub fn limit_duration(start: Duration, end: Duration, max: Duration) -> Duration {
    if end < start {
        return start;
    }
    if end - start > max {
        start + max
    } else {
        end
    }
}

fn strip_tags(line: &str) -> String {
    TAG_RE.replace_all(line, "").into_owned()
}

/// `HH:MM:SS,mmm` where the millisecond field may have 1 to 3 digits.
fn parse_timestamp(s: &str) -> Option<Duration> {
    let (hms, ms) = s.split_once([',', '.'])?;
    if ms.is_empty() || ms.len() > 3 || !ms.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut parts = hms.split(':');
    let h: u64 = parts.next()?.trim().parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let s: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || m >= 60 || s >= 60 {
        return None;
    }
    let ms: u64 = ms.parse().ok()?;
    Some(Duration::from_millis(
        h * 3_600_000 + m * 60_000 + s * 1000 + ms,
    ))
}

fn parse_timestamp_line(line: &str) -> Option<(Duration, Duration)> {
    let (start, end) = line.split_once("-->")?;
    let start = parse_timestamp(start.trim())?;
    // anything after the end timestamp (positioning hints) is ignored
    let end = parse_timestamp(end.split_whitespace().next()?)?;
    Some((start, end))
}

/// Decode and parse SRT bytes. A leading byte order mark is skipped.
pub fn read_srt(data: &[u8], opts: &SrtOptions) -> Result<Vec<Dialog>, SrtError> {
    let text = String::from_utf8_lossy(data);
    parse_srt(&text, opts)
}

/// Parse SRT text into dialog lines numbered 1..N in file order.
///
/// Entries that are empty after tag stripping are dropped, so the emitted
/// positions can differ from the numbers written in the file.
pub fn parse_srt(text: &str, opts: &SrtOptions) -> Result<Vec<Dialog>, SrtError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut state = ReadState::ExpectPosition;
    let mut entry_count = 0usize;
    let mut current = PartialEntry::default();
    let mut out: Vec<Dialog> = Vec::new();

    let finish = |entry: PartialEntry, out: &mut Vec<Dialog>| {
        let content = entry.lines.join("\n").trim().to_owned();
        if content.is_empty() {
            log::trace!("dropping empty srt entry at {:?}", entry.start);
            return;
        }
        out.push(Dialog {
            pos: out.len() as u32 + 1,
            start: entry.start,
            end: limit_duration(entry.start, entry.end, opts.max_duration),
            content,
        });
    };

    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        let blank = line.trim().is_empty();
        match state {
            ReadState::ExpectPosition => {
                if blank {
                    continue;
                }
                entry_count += 1;
                if line.trim().trim_start_matches('\u{feff}').parse::<u64>().is_err() {
                    return Err(SrtError::Position {
                        entry: entry_count,
                        line: line.to_owned(),
                    });
                }
                state = ReadState::ExpectTimestamps;
            }
            ReadState::ExpectTimestamps => {
                if blank {
                    state = ReadState::ExpectPosition;
                    continue;
                }
                let (start, end) =
                    parse_timestamp_line(line).ok_or_else(|| SrtError::Timestamps {
                        entry: entry_count,
                        line: line.to_owned(),
                    })?;
                current = PartialEntry {
                    start,
                    end,
                    lines: Vec::new(),
                };
                state = ReadState::AccumulateContent;
            }
            ReadState::AccumulateContent => {
                if blank {
                    finish(std::mem::take(&mut current), &mut out);
                    state = ReadState::ExpectPosition;
                } else {
                    current.lines.push(strip_tags(line));
                }
            }
        }
    }
    if state == ReadState::AccumulateContent {
        finish(current, &mut out);
    }

    if opts.eliminate_gaps {
        eliminate_gaps(&mut out, opts.max_duration);
    }
    Ok(out)
}

/// Extend every entry to the start of the next one, still bounded by `max`.
pub fn eliminate_gaps(dialog: &mut [Dialog], max: Duration) {
    for idx in 1..dialog.len() {
        let next_start = dialog[idx].start;
        let d = &mut dialog[idx - 1];
        if next_start > d.start {
            d.end = limit_duration(d.start, next_start, max);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const THREE: &str = "1\n00:00:00,498 --> 00:00:02,827\nHello <i>there</i>\n\n2\n00:00:02,827 --> 00:00:04,383\n- Who's that?\n- Me.\n\n3\n00:00:06,383 --> 00:00:09,427\n<font color=\"red\">Bye</font>\n";

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn parse_basic_entries() {
        let subs = parse_srt(THREE, &SrtOptions::default()).unwrap();
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].content, "Hello there");
        assert_eq!(subs[0].start, ms(498));
        assert_eq!(subs[0].end, ms(2827));
        assert_eq!(subs[1].content, "- Who's that?\n- Me.");
        assert_eq!(subs[1].end, ms(4383));
        assert_eq!(subs[2].content, "Bye");
        assert_eq!(
            subs.iter().map(|d| d.pos).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn gaps_are_eliminated() {
        let opts = SrtOptions {
            eliminate_gaps: true,
            ..Default::default()
        };
        let subs = parse_srt(THREE, &opts).unwrap();
        assert_eq!(subs[0].end, ms(2827));
        assert_eq!(subs[1].end, ms(6383));
        assert_eq!(subs[2].end, ms(9427));
    }

    #[test]
    fn gap_elimination_respects_max() {
        let srt = "1\n00:00:00,000 --> 00:00:01,000\na\n\n2\n00:01:00,000 --> 00:01:01,000\nb\n";
        let opts = SrtOptions {
            eliminate_gaps: true,
            max_duration: Duration::from_secs(5),
        };
        let subs = parse_srt(srt, &opts).unwrap();
        assert_eq!(subs[0].end, Duration::from_secs(5));
    }

    #[test]
    fn long_entries_are_clipped() {
        let srt = "1\n00:00:01,000 --> 00:01:00,000\nlong\n";
        let subs = parse_srt(srt, &SrtOptions::default()).unwrap();
        assert_eq!(subs[0].end, Duration::from_secs(31));
    }

    #[test]
    fn lenient_milliseconds() {
        let srt = "1\n00:00:01,5 --> 00:00:02,50\nshort ms\n";
        let subs = parse_srt(srt, &SrtOptions::default()).unwrap();
        assert_eq!(subs[0].start, ms(1005));
        assert_eq!(subs[0].end, ms(2050));
    }

    #[test]
    fn bom_and_crlf() {
        let srt = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nwindows\r\n\r\n";
        let subs = read_srt(srt.as_bytes(), &SrtOptions::default()).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].content, "windows");
    }

    #[test]
    fn empty_entries_are_dropped_and_renumbered() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\n<i></i>\n\n2\n00:00:03,000 --> 00:00:04,000\nkept\n";
        let subs = parse_srt(srt, &SrtOptions::default()).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].pos, 1);
        assert_eq!(subs[0].content, "kept");
    }

    #[test]
    fn bad_position_fails_whole_file() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nok\n\nnope\n00:00:03,000 --> 00:00:04,000\nx\n";
        assert_eq!(
            parse_srt(srt, &SrtOptions::default()),
            Err(SrtError::Position {
                entry: 2,
                line: "nope".to_owned()
            })
        );
    }

    #[test]
    fn bad_timestamp_fails_whole_file() {
        let srt = "1\n00:00:01 --> 00:00:02,000\nx\n";
        let err = parse_srt(srt, &SrtOptions::default()).unwrap_err();
        assert!(matches!(err, SrtError::Timestamps { entry: 1, .. }));
        assert!(err.to_string().starts_with("failed to scan timestamps at entry 1"));
    }

    #[test]
    fn limit_duration_bounds() {
        let max = Duration::from_secs(20);
        assert_eq!(limit_duration(ms(0), ms(25_000), max), ms(20_000));
        assert_eq!(limit_duration(ms(0), ms(5_000), max), ms(5_000));
        assert_eq!(limit_duration(ms(5_000), ms(1_000), max), ms(5_000));
    }
}
