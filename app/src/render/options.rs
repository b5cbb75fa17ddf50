use std::{fmt, str::FromStr};

use quoteclip_core::duration::SignedDuration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Caption,
    Sticker,
}

impl Mode {
    pub fn is_normal(&self) -> bool {
        *self == Mode::Normal
    }

    /// The next mode in button order.
    pub fn cycle(self) -> Mode {
        match self {
            Mode::Normal => Mode::Caption,
            Mode::Caption => Mode::Sticker,
            Mode::Sticker => Mode::Normal,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Normal => "normal",
            Mode::Caption => "caption",
            Mode::Sticker => "sticker",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Gif,
    Webp,
    Webm,
}

impl OutputFormat {
    pub fn is_gif(&self) -> bool {
        *self == OutputFormat::Gif
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "gif",
            OutputFormat::Webp => "webp",
            OutputFormat::Webm => "webm",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "image/gif",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Webm => "video/webm",
        }
    }

    pub fn cycle(self) -> OutputFormat {
        match self {
            OutputFormat::Gif => OutputFormat::Webp,
            OutputFormat::Webp => OutputFormat::Webm,
            OutputFormat::Webm => OutputFormat::Gif,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gif" => Ok(OutputFormat::Gif),
            "webp" => Ok(OutputFormat::Webp),
            "webm" => Ok(OutputFormat::Webm),
            _ => Err(format!("unknown output format: {:?}", s)),
        }
    }
}

/// Where the sticker square is cut from, in pixels of the scaled frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StickerOptions {
    #[serde(default)]
    pub pan_x: i32,
    #[serde(default)]
    pub pan_y: i32,
    #[serde(default)]
    pub width_offset: i32,
}

fn is_true(b: &bool) -> bool {
    *b
}

fn default_true() -> bool {
    true
}

/// Everything about a clip other than which lines it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSettings {
    #[serde(default, skip_serializing_if = "SignedDuration::is_zero")]
    pub extend_or_trim: SignedDuration,
    #[serde(default, skip_serializing_if = "SignedDuration::is_zero")]
    pub shift: SignedDuration,
    #[serde(default, skip_serializing_if = "Mode::is_normal")]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Parallel to the dialog lines. `None` entries keep the original text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_subtitles: Option<Vec<Option<String>>>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub subs_enabled: bool,
    #[serde(default, skip_serializing_if = "OutputFormat::is_gif")]
    pub format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<StickerOptions>,
}

impl Default for ClipSettings {
    fn default() -> Self {
        ClipSettings {
            extend_or_trim: SignedDuration::ZERO,
            shift: SignedDuration::ZERO,
            mode: Mode::Normal,
            caption: None,
            override_subtitles: None,
            subs_enabled: true,
            format: OutputFormat::Gif,
            sticker: None,
        }
    }
}

impl ClipSettings {
    pub fn is_default(&self) -> bool {
        *self == ClipSettings::default()
    }

    /// Settings that change the pixels beyond what the media id implies.
    pub fn is_customized(&self) -> bool {
        self.override_subtitles.is_some()
            || !self.extend_or_trim.is_zero()
            || !self.shift.is_zero()
            || self.mode != Mode::Normal
            || !self.subs_enabled
    }

    /// The text to draw for each line, overrides first.
    pub fn subtitle_text<'a>(&'a self, originals: &'a [String]) -> Vec<&'a str> {
        originals
            .iter()
            .enumerate()
            .map(|(idx, original)| {
                self.override_subtitles
                    .as_ref()
                    .and_then(|o| o.get(idx))
                    .and_then(|o| o.as_deref())
                    .unwrap_or(original.as_str())
            })
            .collect()
    }
}

/// Number of cells along each side of the overlay grid.
pub const OVERLAY_GRID: u8 = 3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OverlayParseError {
    #[error("overlay must look like NAME@CELL: {0:?}")]
    Format(String),
    #[error("overlay cell must be 0 to 8: {0:?}")]
    Cell(String),
    #[error("overlay name may only contain letters, digits, '-' and '_': {0:?}")]
    Name(String),
}

/// An image stamped onto one cell of a 3x3 grid, cells numbered row major.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Overlay {
    pub name: String,
    pub cell: u8,
}

impl Overlay {
    pub fn row(&self) -> u8 {
        self.cell / OVERLAY_GRID
    }

    pub fn column(&self) -> u8 {
        self.cell % OVERLAY_GRID
    }
}

impl FromStr for Overlay {
    type Err = OverlayParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, cell) = s
            .split_once('@')
            .ok_or_else(|| OverlayParseError::Format(s.to_owned()))?;
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(OverlayParseError::Name(name.to_owned()));
        }
        let cell: u8 = cell
            .parse()
            .ok()
            .filter(|c| *c < OVERLAY_GRID * OVERLAY_GRID)
            .ok_or_else(|| OverlayParseError::Cell(cell.to_owned()))?;
        Ok(Overlay {
            name: name.to_owned(),
            cell,
        })
    }
}
