//! Button and modal identifiers, and the preview's button rows.
//!
//! Custom ids are `<action>:<payload>`. Pure state changes carry the encoded
//! [`StateUpdate`] as payload, everything else carries the media id the
//! preview showed when it was drawn.
use std::{collections::HashMap, fmt, str::FromStr};

use quoteclip_core::{
    duration::{DurationParseError, SignedDuration},
    identifiers::{MediaId, MediaIdError},
};

use super::gateway::{Button, ButtonRow, ButtonStyle, Modal, ModalField};
use crate::{
    preview::{PreviewState, StateError, StateUpdate},
    render::Mode,
};

const SHIFT_STEP: SignedDuration = SignedDuration::from_millis(500);
const EXTEND_STEP: SignedDuration = SignedDuration::from_secs(1);

pub const FIELD_SUBS: &str = "subs";
pub const FIELD_CAPTION: &str = "caption";
pub const FIELD_SHIFT: &str = "shift";
pub const FIELD_EXTEND: &str = "extend";

#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("malformed component id {0:?}")]
    Malformed(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    MediaId(#[from] MediaIdError),
    #[error("{field}: {source}")]
    Duration {
        field: &'static str,
        #[source]
        source: DurationParseError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    UpdateState,
    NextResult,
    PrevResult,
    Post,
    EditSubs,
    EditCaption,
    EditTiming,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::UpdateState => "update_state",
            Action::NextResult => "next_result",
            Action::PrevResult => "prev_result",
            Action::Post => "post",
            Action::EditSubs => "edit_subs",
            Action::EditCaption => "edit_caption",
            Action::EditTiming => "edit_timing",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "update_state" => Action::UpdateState,
            "next_result" => Action::NextResult,
            "prev_result" => Action::PrevResult,
            "post" => Action::Post,
            "edit_subs" => Action::EditSubs,
            "edit_caption" => Action::EditCaption,
            "edit_timing" => Action::EditTiming,
            _ => return Err(ComponentError::UnknownAction(s.to_owned())),
        })
    }
}

/// A decoded component id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Update(StateUpdate),
    Act(Action, MediaId),
}

impl Command {
    pub fn custom_id(&self) -> String {
        match self {
            Command::Update(u) => format!("{}:{}", Action::UpdateState, u.encode()),
            Command::Act(action, id) => format!("{}:{}", action, id),
        }
    }
}

impl FromStr for Command {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, payload) = s
            .split_once(':')
            .ok_or_else(|| ComponentError::Malformed(s.to_owned()))?;
        match action.parse()? {
            Action::UpdateState => Ok(Command::Update(StateUpdate::decode(payload)?)),
            action => Ok(Command::Act(action, payload.parse()?)),
        }
    }
}

/// Whether the episode has lines on either side of the current range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineContext {
    pub has_before: bool,
    pub has_after: bool,
}

fn button(cmd: Command, label: impl Into<String>, style: ButtonStyle) -> Button {
    Button {
        custom_id: cmd.custom_id(),
        label: label.into(),
        style,
        disabled: false,
    }
}

fn disabled(mut b: Button) -> Button {
    b.disabled = true;
    b
}

/// A button that moves the range, disabled when the move leaves the episode.
/// Disabled buttons still need distinct ids.
fn range_button(
    state: &PreviewState,
    label: &str,
    slot: usize,
    range: Option<(u32, u32)>,
    enabled: bool,
) -> Button {
    match range.filter(|_| enabled).map(|(s, e)| state.id.with_range(s, e)) {
        Some(Ok(id)) => button(
            Command::Update(StateUpdate::UpdateMediaId(id)),
            label,
            ButtonStyle::Secondary,
        ),
        _ => Button {
            custom_id: format!("disabled:{}", slot),
            label: label.to_owned(),
            style: ButtonStyle::Secondary,
            disabled: true,
        },
    }
}

/// The five rows under every preview.
pub fn preview_rows(state: &PreviewState, lines: LineContext) -> Vec<ButtonRow> {
    let id = &state.id;
    let settings = &state.settings;
    let (start, end) = (id.start(), id.end());

    let mut prev = button(
        Command::Act(Action::PrevResult, id.clone()),
        "◀ result",
        ButtonStyle::Secondary,
    );
    let mut next = button(
        Command::Act(Action::NextResult, id.clone()),
        "result ▶",
        ButtonStyle::Secondary,
    );
    if state.original_terms.is_empty() {
        prev = disabled(prev);
        next = disabled(next);
    }
    let results = vec![
        prev,
        next,
        button(Command::Act(Action::Post, id.clone()), "Post", ButtonStyle::Success),
    ];

    let line_nav = vec![
        range_button(
            state,
            "⏪ line",
            0,
            (start > 1).then(|| (start - 1, end - 1)),
            lines.has_before,
        ),
        range_button(state, "line ⏩", 1, Some((start + 1, end + 1)), lines.has_after),
        range_button(
            state,
            "+ previous",
            2,
            (start > 1).then(|| (start - 1, end)),
            lines.has_before,
        ),
        range_button(state, "+ next", 3, Some((start, end + 1)), lines.has_after),
        range_button(
            state,
            "- last",
            4,
            end.checked_sub(1).map(|e| (start, e)),
            end > start,
        ),
    ];

    let timing = vec![
        button(
            Command::Update(StateUpdate::SetShift(settings.shift - SHIFT_STEP)),
            "shift -0.5s",
            ButtonStyle::Secondary,
        ),
        button(
            Command::Update(StateUpdate::SetShift(settings.shift + SHIFT_STEP)),
            "shift +0.5s",
            ButtonStyle::Secondary,
        ),
        button(
            Command::Update(StateUpdate::SetExtendOrTrim(
                settings.extend_or_trim + EXTEND_STEP,
            )),
            "extend +1s",
            ButtonStyle::Secondary,
        ),
        button(
            Command::Update(StateUpdate::SetExtendOrTrim(
                settings.extend_or_trim - EXTEND_STEP,
            )),
            "trim -1s",
            ButtonStyle::Secondary,
        ),
    ];

    let subs_label = if settings.subs_enabled {
        "subs: on"
    } else {
        "subs: off"
    };
    let style = vec![
        button(
            Command::Update(StateUpdate::SetMode(settings.mode.cycle())),
            format!("mode: {}", settings.mode),
            ButtonStyle::Primary,
        ),
        button(
            Command::Update(StateUpdate::SetOutputFormat(settings.format.cycle())),
            format!("format: {}", settings.format),
            ButtonStyle::Primary,
        ),
        button(
            Command::Update(StateUpdate::SetSubsEnabled(!settings.subs_enabled)),
            subs_label,
            ButtonStyle::Primary,
        ),
    ];

    let mut caption = button(
        Command::Act(Action::EditCaption, id.clone()),
        "caption…",
        ButtonStyle::Secondary,
    );
    if settings.mode != Mode::Caption {
        caption = disabled(caption);
    }
    let modals = vec![
        button(
            Command::Act(Action::EditSubs, id.clone()),
            "edit subs…",
            ButtonStyle::Secondary,
        ),
        caption,
        button(
            Command::Act(Action::EditTiming, id.clone()),
            "timing…",
            ButtonStyle::Secondary,
        ),
    ];

    vec![results, line_nav, timing, style, modals]
}

fn field(id: &str, label: &str, value: String, multiline: bool) -> ModalField {
    ModalField {
        id: id.to_owned(),
        label: label.to_owned(),
        value,
        multiline,
    }
}

/// One subtitle per line, prefilled with what the clip currently shows.
pub fn subs_modal(state: &PreviewState, originals: &[String]) -> Modal {
    let current = state.settings.subtitle_text(originals).join("\n");
    Modal {
        custom_id: Command::Act(Action::EditSubs, state.id.clone()).custom_id(),
        title: "Edit subtitles".to_owned(),
        fields: vec![field(FIELD_SUBS, "One line per subtitle", current, true)],
    }
}

pub fn caption_modal(state: &PreviewState) -> Modal {
    Modal {
        custom_id: Command::Act(Action::EditCaption, state.id.clone()).custom_id(),
        title: "Caption".to_owned(),
        fields: vec![field(
            FIELD_CAPTION,
            "Caption",
            state.settings.caption.clone().unwrap_or_default(),
            true,
        )],
    }
}

pub fn timing_modal(state: &PreviewState) -> Modal {
    Modal {
        custom_id: Command::Act(Action::EditTiming, state.id.clone()).custom_id(),
        title: "Timing".to_owned(),
        fields: vec![
            field(
                FIELD_SHIFT,
                "Shift (e.g. -0.5s)",
                state.settings.shift.to_string(),
                false,
            ),
            field(
                FIELD_EXTEND,
                "Extend or trim (e.g. 2s)",
                state.settings.extend_or_trim.to_string(),
                false,
            ),
        ],
    }
}

fn parse_duration_field(
    fields: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<SignedDuration>, ComponentError> {
    match fields.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|source| ComponentError::Duration {
                field: name,
                source,
            }),
    }
}

/// The state updates a submitted modal stands for.
pub fn modal_updates(
    action: Action,
    fields: &HashMap<String, String>,
) -> Result<Vec<StateUpdate>, ComponentError> {
    let updates = match action {
        Action::EditSubs => {
            let text = fields.get(FIELD_SUBS).map(String::as_str).unwrap_or("");
            vec![StateUpdate::SetSubs(
                text.lines().map(str::to_owned).collect(),
            )]
        }
        Action::EditCaption => vec![StateUpdate::SetCaption(
            fields.get(FIELD_CAPTION).cloned().unwrap_or_default(),
        )],
        Action::EditTiming => {
            let mut updates = Vec::new();
            if let Some(shift) = parse_duration_field(fields, FIELD_SHIFT)? {
                updates.push(StateUpdate::SetShift(shift));
            }
            if let Some(extend) = parse_duration_field(fields, FIELD_EXTEND)? {
                updates.push(StateUpdate::SetExtendOrTrim(extend));
            }
            updates
        }
        other => return Err(ComponentError::UnknownAction(other.to_string())),
    };
    Ok(updates)
}

#[cfg(test)]
mod test {
    use search::Terms;

    use super::*;
    use crate::render::OutputFormat;

    fn state(id: &str) -> PreviewState {
        PreviewState::new(id.parse().unwrap(), "monkey".parse().unwrap())
    }

    fn find<'a>(rows: &'a [ButtonRow], label: &str) -> &'a Button {
        rows.iter()
            .flatten()
            .find(|b| b.label == label)
            .unwrap_or_else(|| panic!("no button {:?}", label))
    }

    fn command(b: &Button) -> Command {
        b.custom_id.parse().unwrap()
    }

    #[test]
    fn custom_ids_parse_back() {
        let id: MediaId = "xfm-S01E02-5_7".parse().unwrap();
        let cmd = Command::Act(Action::Post, id);
        assert_eq!(cmd.custom_id(), "post:xfm-S01E02-5_7");
        assert_eq!(cmd.custom_id().parse::<Command>().unwrap(), cmd);

        let cmd = Command::Update(StateUpdate::SetMode(Mode::Sticker));
        assert!(cmd.custom_id().starts_with("update_state:{"));
        assert_eq!(cmd.custom_id().parse::<Command>().unwrap(), cmd);
    }

    #[test]
    fn bad_custom_ids() {
        assert!(matches!(
            "nope:xfm-S01E02-5".parse::<Command>(),
            Err(ComponentError::UnknownAction(_))
        ));
        assert!(matches!(
            "post".parse::<Command>(),
            Err(ComponentError::Malformed(_))
        ));
        assert!(matches!(
            "post:xfm".parse::<Command>(),
            Err(ComponentError::MediaId(_))
        ));
        assert!(matches!(
            "update_state:{".parse::<Command>(),
            Err(ComponentError::State(_))
        ));
    }

    #[test]
    fn five_rows_with_unique_ids() {
        let rows = preview_rows(
            &state("xfm-S01E02-5_7"),
            LineContext {
                has_before: true,
                has_after: true,
            },
        );
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| !r.is_empty() && r.len() <= 5));
        let mut ids = rows
            .iter()
            .flatten()
            .map(|b| b.custom_id.clone())
            .collect::<Vec<_>>();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(ids.iter().all(|id| id.len() <= 100));
    }

    #[test]
    fn line_buttons_move_the_range() {
        let rows = preview_rows(
            &state("xfm-S01E02-5_7"),
            LineContext {
                has_before: true,
                has_after: true,
            },
        );
        let expect = |label: &str, id: &str| {
            assert_eq!(
                command(find(&rows, label)),
                Command::Update(StateUpdate::UpdateMediaId(id.parse().unwrap())),
                "{}",
                label
            );
        };
        expect("⏪ line", "xfm-S01E02-4_6");
        expect("line ⏩", "xfm-S01E02-6_8");
        expect("+ previous", "xfm-S01E02-4_7");
        expect("+ next", "xfm-S01E02-5_8");
        expect("- last", "xfm-S01E02-5_6");
    }

    #[test]
    fn line_buttons_stop_at_episode_edges() {
        let rows = preview_rows(&state("xfm-S01E02-1"), LineContext::default());
        for label in ["⏪ line", "line ⏩", "+ previous", "+ next", "- last"] {
            assert!(find(&rows, label).disabled, "{}", label);
        }
    }

    #[test]
    fn timing_buttons_are_relative_to_current() {
        let mut s = state("xfm-S01E02-5");
        s.settings.shift = SignedDuration::from_millis(1500);
        s.settings.extend_or_trim = SignedDuration::from_secs(-2);
        let rows = preview_rows(&s, LineContext::default());
        assert_eq!(
            command(find(&rows, "shift +0.5s")),
            Command::Update(StateUpdate::SetShift(SignedDuration::from_secs(2)))
        );
        assert_eq!(
            command(find(&rows, "trim -1s")),
            Command::Update(StateUpdate::SetExtendOrTrim(SignedDuration::from_secs(-3)))
        );
    }

    #[test]
    fn cycling_buttons() {
        let rows = preview_rows(&state("xfm-S01E02-5"), LineContext::default());
        assert_eq!(
            command(find(&rows, "mode: normal")),
            Command::Update(StateUpdate::SetMode(Mode::Normal.cycle()))
        );
        assert_eq!(
            command(find(&rows, "format: gif")),
            Command::Update(StateUpdate::SetOutputFormat(OutputFormat::Gif.cycle()))
        );
        assert_eq!(
            command(find(&rows, "subs: on")),
            Command::Update(StateUpdate::SetSubsEnabled(false))
        );
        assert!(find(&rows, "caption…").disabled);
    }

    #[test]
    fn result_navigation_needs_a_query() {
        let mut s = state("xfm-S01E02-5");
        s.original_terms = Terms::default();
        let rows = preview_rows(&s, LineContext::default());
        assert!(find(&rows, "◀ result").disabled);
        assert!(find(&rows, "result ▶").disabled);
        assert!(!find(&rows, "Post").disabled);
    }

    #[test]
    fn timing_modal_updates() {
        let fields = HashMap::from([
            (FIELD_SHIFT.to_owned(), "-0.5s".to_owned()),
            (FIELD_EXTEND.to_owned(), " ".to_owned()),
        ]);
        assert_eq!(
            modal_updates(Action::EditTiming, &fields).unwrap(),
            vec![StateUpdate::SetShift(SignedDuration::from_millis(-500))]
        );
        let fields = HashMap::from([(FIELD_EXTEND.to_owned(), "soon".to_owned())]);
        assert!(matches!(
            modal_updates(Action::EditTiming, &fields),
            Err(ComponentError::Duration { field: FIELD_EXTEND, .. })
        ));
    }

    #[test]
    fn subs_modal_round_trip() {
        let s = state("xfm-S01E02-5_6");
        let originals = vec!["one".to_owned(), "two".to_owned()];
        let modal = subs_modal(&s, &originals);
        assert_eq!(modal.fields[0].value, "one\ntwo");
        let fields = HashMap::from([(FIELD_SUBS.to_owned(), "uno\ndos".to_owned())]);
        assert_eq!(
            modal_updates(Action::EditSubs, &fields).unwrap(),
            vec![StateUpdate::SetSubs(vec!["uno".to_owned(), "dos".to_owned()])]
        );
    }
}
