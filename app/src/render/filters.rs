//! The ffmpeg filter graph for a clip.
//!
//! Each `*_part` function looks at the request and contributes a fragment of
//! the chain or nothing. [`assemble_chain`] drops the empty ones and joins
//! the rest, so a mode only has to know about its own fragment.
use std::{path::Path, time::Duration};

use quoteclip_core::{clean_sub::wrap_text, Dialog};

use super::options::{ClipSettings, Mode, Overlay, OutputFormat, OVERLAY_GRID};

pub const BASE_FPS: u32 = 12;
pub const BASE_WIDTH: u32 = 596;
pub const BASE_HEIGHT: u32 = 336;
pub const WRAP_CHARS: usize = 56;
pub const SUB_FONT_SIZE: u32 = 24;

pub const STICKER_SQUARE: u32 = 336;
pub const STICKER_SIZE: u32 = 160;

pub const CAPTION_VIDEO_WIDTH: u32 = 421;
pub const CAPTION_VIDEO_HEIGHT: u32 = 238;
pub const CAPTION_TOP_OFFSET: u32 = 30;
pub const CAPTION_LINE_HEIGHT: u32 = 28;
pub const CAPTION_FONT_SIZE: u32 = 24;

const SIMPSONS: &str = "simpsons";
const SIMPSONS_FONT: &str = "akbar.ttf";

/// The absolute span of video to cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindow {
    pub start: Duration,
    pub end: Duration,
}

impl ClipWindow {
    /// Apply shift and extend/trim to the lines' own bounds, then hold the
    /// result to `(0, max]`.
    pub fn compute(dialog: &[Dialog], settings: &ClipSettings, max: Duration) -> Option<ClipWindow> {
        let first = dialog.first()?;
        let last = dialog.last()?;
        let start = settings.shift.offset(first.start);
        let mut end = (settings.shift + settings.extend_or_trim).offset(last.end);
        if end.saturating_sub(start) > max {
            end = start + max;
        }
        if end <= start {
            end = start + Duration::from_secs(1).min(max);
        }
        Some(ClipWindow { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// What the filter parts need to know about one render.
pub struct FilterInput<'a> {
    pub publication: &'a str,
    pub dialog: &'a [Dialog],
    pub settings: &'a ClipSettings,
    pub window: ClipWindow,
    pub font_dir: &'a Path,
}

/// Escape text for a drawtext option inside a filter graph: once for the
/// option parser, once more for the graph parser.
pub fn escape_filter_text(text: &str) -> String {
    let mut option = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | ':' | '%') {
            option.push('\\');
        }
        option.push(c);
    }
    let mut graph = String::with_capacity(option.len());
    for c in option.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph.push('\\');
        }
        graph.push(c);
    }
    graph
}

fn font_option(publication: &str, font_dir: &Path) -> String {
    if publication == SIMPSONS {
        let font = font_dir.join(SIMPSONS_FONT);
        format!(
            ":fontfile={}",
            escape_filter_text(&font.to_string_lossy())
        )
    } else {
        String::new()
    }
}

fn secs(d: f64) -> String {
    format!("{:.3}", d)
}

fn base_part(_input: &FilterInput<'_>) -> Option<String> {
    Some(format!("fps={},scale={}:-2", BASE_FPS, BASE_WIDTH))
}

fn drawtext_part(input: &FilterInput<'_>) -> Option<String> {
    let settings = input.settings;
    if settings.mode == Mode::Sticker || !settings.subs_enabled {
        return None;
    }
    let originals = input
        .dialog
        .iter()
        .map(|d| quoteclip_core::clean_sub::CleanDialog(d).to_string())
        .collect::<Vec<_>>();
    let text = settings.subtitle_text(&originals);
    let offset = input.window.start.as_secs_f64();
    let font = font_option(input.publication, input.font_dir);
    let shift = settings.shift.as_millis() as f64 / 1000.0;

    let filters = input
        .dialog
        .iter()
        .zip(text)
        .filter_map(|(line, text)| {
            let wrapped = wrap_text(text, WRAP_CHARS);
            if wrapped.is_empty() {
                return None;
            }
            let from = line.start.as_secs_f64() + shift - offset;
            let to = line.end.as_secs_f64() + shift - offset;
            Some(format!(
                "drawtext=text={}{}:fontsize={}:fontcolor=white:borderw=2:bordercolor=black:x=(w-text_w)/2:y=h-text_h-12:enable=between(t\\,{}\\,{})",
                escape_filter_text(&wrapped.join("\n")),
                font,
                SUB_FONT_SIZE,
                secs(from),
                secs(to),
            ))
        })
        .collect::<Vec<_>>();
    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

fn sticker_part(input: &FilterInput<'_>) -> Option<String> {
    if input.settings.mode != Mode::Sticker {
        return None;
    }
    let sticker = input.settings.sticker.unwrap_or_default();
    let width = (STICKER_SQUARE as i64 + sticker.width_offset as i64).max(1);
    Some(format!(
        "crop={}:{}:(iw-ow)/2+{}:{},scale={}:{}",
        width, STICKER_SQUARE, sticker.pan_x, sticker.pan_y, STICKER_SIZE, STICKER_SIZE
    ))
}

fn caption_scale_part(input: &FilterInput<'_>) -> Option<String> {
    if input.settings.mode != Mode::Caption {
        return None;
    }
    Some(format!(
        "scale={}:{}:force_original_aspect_ratio=decrease,pad={}:{}:(ow-iw)/2:{}",
        CAPTION_VIDEO_WIDTH,
        CAPTION_VIDEO_HEIGHT,
        BASE_WIDTH,
        BASE_HEIGHT,
        CAPTION_TOP_OFFSET
    ))
}

fn caption_text_part(input: &FilterInput<'_>) -> Option<String> {
    if input.settings.mode != Mode::Caption {
        return None;
    }
    let caption = input.settings.caption.as_deref()?;
    let font = font_option(input.publication, input.font_dir);
    let lines = wrap_text(caption, WRAP_CHARS);
    if lines.is_empty() {
        return None;
    }
    Some(
        lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                format!(
                    "drawtext=text={}{}:fontsize={}:fontcolor=white:x=(w-text_w)/2:y={}",
                    escape_filter_text(line),
                    font,
                    CAPTION_FONT_SIZE,
                    2 + idx as u32 * CAPTION_LINE_HEIGHT,
                )
            })
            .collect::<Vec<_>>()
            .join(","),
    )
}

type FilterPart = fn(&FilterInput<'_>) -> Option<String>;

const PARTS: &[FilterPart] = &[
    base_part,
    drawtext_part,
    sticker_part,
    caption_scale_part,
    caption_text_part,
];

/// The video chain for input 0, without labels.
pub fn assemble_chain(input: &FilterInput<'_>) -> String {
    PARTS
        .iter()
        .filter_map(|part| part(input))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Size of the frame the chain produces.
pub fn frame_size(mode: Mode) -> (u32, u32) {
    match mode {
        Mode::Sticker => (STICKER_SIZE, STICKER_SIZE),
        Mode::Normal | Mode::Caption => (BASE_WIDTH, BASE_HEIGHT),
    }
}

/// The whole graph: the chain, overlays composited onto it (one extra input
/// each, starting at input 1), and the gif palette. The result is `[out]`.
pub fn filter_graph(input: &FilterInput<'_>, overlays: &[Overlay], format: OutputFormat) -> String {
    let mut graph = vec![format!("[0:v]{}[base0]", assemble_chain(input))];
    let (width, height) = frame_size(input.settings.mode);
    let (cell_w, cell_h) = (
        width / OVERLAY_GRID as u32,
        height / OVERLAY_GRID as u32,
    );

    let mut current = "base0".to_owned();
    for (idx, overlay) in overlays.iter().enumerate() {
        let n = idx + 1;
        graph.push(format!(
            "[{}:v]scale={}:{}:force_original_aspect_ratio=decrease[ov{}]",
            n, cell_w, cell_h, n
        ));
        let next = format!("base{}", n);
        graph.push(format!(
            "[{}][ov{}]overlay=x={}+({}-w)/2:y={}+({}-h)/2[{}]",
            current,
            n,
            overlay.column() as u32 * cell_w,
            cell_w,
            overlay.row() as u32 * cell_h,
            cell_h,
            next
        ));
        current = next;
    }

    if format == OutputFormat::Gif {
        graph.push(format!(
            "[{}]split[pa][pb];[pa]palettegen=stats_mode=diff[pal];[pb][pal]paletteuse[out]",
            current
        ));
    } else {
        graph.push(format!("[{}]null[out]", current));
    }
    graph.join(";")
}

/// Output encoder arguments, ending with the stdout target.
pub fn output_args(format: OutputFormat) -> Vec<String> {
    let args: &[&str] = match format {
        OutputFormat::Gif => &["-f", "gif"],
        OutputFormat::Webp => &[
            "-c:v", "libwebp", "-loop", "0", "-quality", "90", "-f", "webp",
        ],
        OutputFormat::Webm => &["-c:v", "libvpx-vp9", "-map_metadata", "-1", "-f", "webm"],
    };
    let mut out = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    out.push("pipe:1".to_owned());
    out
}
