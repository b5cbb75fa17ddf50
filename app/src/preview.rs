//! Per-interaction preview state.
//!
//! The chat gateway keeps nothing for us between button presses, so the
//! state rides along in the preview message itself as `||{json}||`. Every
//! button or modal maps to a [`StateUpdate`], and [`PreviewState::apply`] is
//! a pure function from one state to the next.
use std::time::Duration;

use quoteclip_core::{
    duration::SignedDuration,
    identifiers::{MediaId, PositionRange},
};
use search::Terms;
use serde::{Deserialize, Serialize};

use crate::render::{ClipSettings, Mode, OutputFormat, StickerOptions};

pub const STATE_VERSION: u32 = 1;
const DELIMITER: &str = "||";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("message does not contain a preview state")]
    Missing,
    #[error("preview state version {0} is not supported")]
    Version(u32),
    #[error("preview state is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized form of anything that gets embedded in a message or id.
fn embedded_json<T: Serialize>(value: &T) -> Result<String, StateError> {
    Ok(serde_json::to_string(value)?)
}

fn current_version() -> u32 {
    STATE_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewState {
    #[serde(rename = "v", default = "current_version")]
    pub version: u32,
    pub id: MediaId,
    #[serde(default, skip_serializing_if = "ClipSettings::is_default")]
    pub settings: ClipSettings,
    /// The query that found this clip, for next/previous result.
    #[serde(default, skip_serializing_if = "Terms::is_empty")]
    pub original_terms: Terms,
    /// Where the selected result sits, so it can be found again in a re-run
    /// of the query after the range has been edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_position: Option<PositionRange>,
}

/// Bounds that depend on the lines behind the state, not the state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateLimits {
    pub max_clip: Duration,
    /// From the first line's start to the last line's end.
    pub span: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum StateUpdate {
    UpdateMediaId(MediaId),
    ResetMediaId(MediaId),
    SetExtendOrTrim(SignedDuration),
    SetShift(SignedDuration),
    SetMode(Mode),
    SetOutputFormat(OutputFormat),
    SetCaption(String),
    SetSubs(Vec<String>),
    SetSubsEnabled(bool),
}

impl StateUpdate {
    pub fn try_encode(&self) -> Result<String, StateError> {
        embedded_json(self)
    }

    /// Like [`StateUpdate::try_encode`], logging a failure and leaving an
    /// empty payload that will not decode.
    pub fn encode(&self) -> String {
        self.try_encode().unwrap_or_else(|e| {
            log::error!("unable to encode state update {:?}: {}", self, e);
            String::new()
        })
    }

    pub fn decode(s: &str) -> Result<StateUpdate, StateError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Clamp an extend/trim so the clip lasts at most `max` and at least a
/// second.
pub fn clamp_extend(requested: SignedDuration, limits: UpdateLimits) -> SignedDuration {
    let span = SignedDuration::from_duration(limits.span);
    let max = SignedDuration::from_duration(limits.max_clip);
    let total = span + requested;
    if total > max {
        max - span
    } else if total.as_millis() <= 0 {
        SignedDuration::from_secs(1) - span
    } else {
        requested
    }
}

/// Keep overrides lined up with their lines when the range moves. Lines that
/// fall out are dropped, lines that come in have no override.
fn realign_overrides(
    overrides: Vec<Option<String>>,
    old: PositionRange,
    new: PositionRange,
) -> Vec<Option<String>> {
    (new.start..=new.end)
        .map(|pos| {
            if old.contains_pos(pos) {
                overrides
                    .get((pos - old.start) as usize)
                    .cloned()
                    .flatten()
            } else {
                None
            }
        })
        .collect()
}

impl PreviewState {
    pub fn new(id: MediaId, terms: Terms) -> PreviewState {
        PreviewState {
            version: STATE_VERSION,
            original_position: Some(id.range),
            id,
            settings: ClipSettings::default(),
            original_terms: terms,
        }
    }

    pub fn apply(mut self, update: StateUpdate, limits: UpdateLimits) -> PreviewState {
        let settings = &mut self.settings;
        match update {
            StateUpdate::UpdateMediaId(id) => {
                let (old, new) = (self.id.range, id.range);
                let nested = old.contains(&new) || new.contains(&old);
                settings.override_subtitles = match settings.override_subtitles.take() {
                    Some(o) if nested && id.episode == self.id.episode => {
                        Some(realign_overrides(o, old, new))
                    }
                    _ => None,
                };
                self.id = id;
            }
            StateUpdate::ResetMediaId(id) => {
                return PreviewState {
                    version: STATE_VERSION,
                    original_position: Some(id.range),
                    id,
                    settings: ClipSettings::default(),
                    original_terms: self.original_terms,
                };
            }
            StateUpdate::SetExtendOrTrim(d) => {
                settings.extend_or_trim = clamp_extend(d, limits);
            }
            StateUpdate::SetShift(d) => settings.shift = d,
            StateUpdate::SetMode(mode) => {
                if mode == Mode::Sticker && settings.mode != Mode::Sticker {
                    settings.sticker = Some(StickerOptions::default());
                } else if mode != Mode::Sticker {
                    settings.sticker = None;
                }
                settings.mode = mode;
            }
            StateUpdate::SetOutputFormat(format) => settings.format = format,
            StateUpdate::SetCaption(caption) => {
                let caption = caption.trim();
                settings.caption = (!caption.is_empty()).then(|| caption.to_owned());
            }
            StateUpdate::SetSubs(subs) => {
                settings.override_subtitles =
                    Some(subs.iter().map(|s| Some(s.trim().to_owned())).collect());
            }
            StateUpdate::SetSubsEnabled(enabled) => settings.subs_enabled = enabled,
        }
        self
    }

    /// `||{json}||`. Pipes inside the json are written as `\u007c`, which
    /// keeps the delimiters unambiguous.
    pub fn try_encode(&self) -> Result<String, StateError> {
        let json = embedded_json(self)?;
        Ok(format!(
            "{}{}{}",
            DELIMITER,
            json.replace('|', "\\u007c"),
            DELIMITER
        ))
    }

    /// [`PreviewState::try_encode`] for message bodies. A failure is logged
    /// and leaves the delimiters around nothing, which decodes as missing.
    pub fn encode(&self) -> String {
        self.try_encode().unwrap_or_else(|e| {
            log::error!("unable to encode preview state for {}: {}", self.id, e);
            format!("{}{}", DELIMITER, DELIMITER)
        })
    }

    /// Find and decode the state embedded anywhere in `text`.
    pub fn decode(text: &str) -> Result<PreviewState, StateError> {
        let end = text.rfind(DELIMITER).ok_or(StateError::Missing)?;
        let start = text[..end].rfind(DELIMITER).ok_or(StateError::Missing)?;
        let json = &text[start + DELIMITER.len()..end];
        if json.is_empty() {
            return Err(StateError::Missing);
        }
        let state: PreviewState = serde_json::from_str(json)?;
        if state.version != STATE_VERSION {
            return Err(StateError::Version(state.version));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn id(s: &str) -> MediaId {
        MediaId::from_str(s).unwrap()
    }

    fn limits(span_secs: u64) -> UpdateLimits {
        UpdateLimits {
            max_clip: Duration::from_secs(20),
            span: Duration::from_secs(span_secs),
        }
    }

    fn state() -> PreviewState {
        PreviewState::new(id("xfm-S01E01-3_4"), "monkey news ~xfm".parse().unwrap())
    }

    #[test]
    fn unserializable_payload_is_an_error() {
        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), 3u8);
        assert!(matches!(embedded_json(&bad), Err(StateError::Json(_))));
        assert!(matches!(
            PreviewState::decode("||||"),
            Err(StateError::Missing)
        ));
        let s = state();
        assert_eq!(s.try_encode().unwrap(), s.encode());
    }

    #[test]
    fn encode_decode() {
        let mut s = state().apply(StateUpdate::SetCaption("a || b".to_owned()), limits(4));
        s = s.apply(StateUpdate::SetMode(Mode::Sticker), limits(4));
        s = s.apply(
            StateUpdate::SetSubs(vec![" one ".to_owned(), "two|".to_owned()]),
            limits(4),
        );
        let encoded = s.encode();
        assert!(encoded.starts_with("||{"));
        assert!(encoded.ends_with("}||"));
        assert_eq!(encoded.matches("||").count(), 2);
        let body = format!("**S01E01** monkey news\n{}", encoded);
        assert_eq!(PreviewState::decode(&body).unwrap(), s);
    }

    #[test]
    fn default_state_is_compact() {
        let s = PreviewState::new(id("xfm-S01E01-3"), Terms::default());
        assert_eq!(
            s.encode(),
            r#"||{"v":1,"id":"xfm-S01E01-3","original_position":{"start":3,"end":3}}||"#
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            PreviewState::decode("no state here"),
            Err(StateError::Missing)
        ));
        assert!(matches!(
            PreviewState::decode("||not json||"),
            Err(StateError::Json(_))
        ));
        assert!(matches!(
            PreviewState::decode(r#"||{"v":9,"id":"xfm-S01E01-3"}||"#),
            Err(StateError::Version(9))
        ));
    }

    #[test]
    fn extend_is_clamped_to_max_clip() {
        let s = state().apply(StateUpdate::SetExtendOrTrim(SignedDuration::from_secs(5)), limits(18));
        assert_eq!(s.settings.extend_or_trim, SignedDuration::from_secs(2));
    }

    #[test]
    fn trim_past_start_leaves_one_second() {
        let s = state().apply(StateUpdate::SetExtendOrTrim(SignedDuration::from_secs(-9)), limits(4));
        assert_eq!(s.settings.extend_or_trim, SignedDuration::from_secs(-3));
        let s = state().apply(StateUpdate::SetExtendOrTrim(SignedDuration::from_secs(-1)), limits(4));
        assert_eq!(s.settings.extend_or_trim, SignedDuration::from_secs(-1));
    }

    #[test]
    fn shift_is_not_clamped() {
        let s = state().apply(StateUpdate::SetShift(SignedDuration::from_secs(-90)), limits(4));
        assert_eq!(s.settings.shift, SignedDuration::from_secs(-90));
    }

    #[test]
    fn sticker_options_follow_mode() {
        let s = state().apply(StateUpdate::SetMode(Mode::Sticker), limits(4));
        assert_eq!(s.settings.sticker, Some(StickerOptions::default()));
        let s = s.apply(StateUpdate::SetMode(Mode::Caption), limits(4));
        assert_eq!(s.settings.sticker, None);
        assert_eq!(s.settings.mode, Mode::Caption);
    }

    #[test]
    fn nested_range_keeps_overrides() {
        let s = state().apply(
            StateUpdate::SetSubs(vec!["three".to_owned(), "four".to_owned()]),
            limits(4),
        );
        let grown = s
            .clone()
            .apply(StateUpdate::UpdateMediaId(id("xfm-S01E01-2_4")), limits(4));
        assert_eq!(
            grown.settings.override_subtitles,
            Some(vec![None, Some("three".to_owned()), Some("four".to_owned())])
        );
        let shrunk = s
            .clone()
            .apply(StateUpdate::UpdateMediaId(id("xfm-S01E01-4")), limits(4));
        assert_eq!(
            shrunk.settings.override_subtitles,
            Some(vec![Some("four".to_owned())])
        );
        let moved = s.apply(StateUpdate::UpdateMediaId(id("xfm-S01E01-4_5")), limits(4));
        assert_eq!(moved.settings.override_subtitles, None);
        assert_eq!(moved.id, id("xfm-S01E01-4_5"));
        assert_eq!(moved.original_position, Some(PositionRange::new(3, 4).unwrap()));
    }

    #[test]
    fn reset_keeps_only_terms() {
        let s = state()
            .apply(StateUpdate::SetShift(SignedDuration::from_secs(1)), limits(4))
            .apply(StateUpdate::SetOutputFormat(OutputFormat::Webm), limits(4))
            .apply(StateUpdate::ResetMediaId(id("xfm-S01E02-7")), limits(4));
        assert!(s.settings.is_default());
        assert_eq!(s.id, id("xfm-S01E02-7"));
        assert_eq!(s.original_position, Some(PositionRange::new(7, 7).unwrap()));
        assert_eq!(s.original_terms.to_string(), "monkey news ~xfm");
    }

    #[test]
    fn empty_caption_clears() {
        let s = state()
            .apply(StateUpdate::SetCaption("  hi ".to_owned()), limits(4))
            .apply(StateUpdate::SetSubsEnabled(false), limits(4));
        assert_eq!(s.settings.caption.as_deref(), Some("hi"));
        assert!(!s.settings.subs_enabled);
        let s = s.apply(StateUpdate::SetCaption("   ".to_owned()), limits(4));
        assert_eq!(s.settings.caption, None);
    }

    #[test]
    fn updates_encode_as_json() {
        let u = StateUpdate::SetShift(SignedDuration::from_millis(500));
        assert_eq!(u.encode(), r#"{"op":"set_shift","arg":500}"#);
        assert_eq!(StateUpdate::decode(&u.encode()).unwrap(), u);
        let u = StateUpdate::UpdateMediaId(id("xfm-S01E01-2_3"));
        assert_eq!(
            u.encode(),
            r#"{"op":"update_media_id","arg":"xfm-S01E01-2_3"}"#
        );
    }
}
