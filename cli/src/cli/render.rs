use std::path::PathBuf;

use anyhow::Context;
use app::render::{ClipSettings, Mode, OutputFormat, Overlay, RenderRequest};
use clap::Parser;
use quoteclip_core::{duration::SignedDuration, identifiers::MediaId};

use super::argparse::AppConfig;

const CLI_USER: &str = "cli";

#[derive(Parser, Debug)]
pub struct RenderCommand {
    /// Dialog lines to render, e.g. `xfm-S01E02-10_12`
    pub media_id: MediaId,

    /// gif, webp, or webm
    #[arg(long, default_value = "gif")]
    pub format: OutputFormat,

    /// Move the whole clip, e.g. `-0.5s`
    #[arg(long, allow_hyphen_values = true)]
    pub shift: Option<SignedDuration>,

    /// Lengthen (or with a negative value, trim) the end of the clip
    #[arg(long, allow_hyphen_values = true)]
    pub extend: Option<SignedDuration>,

    /// Draw this text above the clip
    #[arg(long, conflicts_with = "sticker")]
    pub caption: Option<String>,

    /// Crop to a square sticker without subtitles
    #[arg(long)]
    pub sticker: bool,

    /// Leave the subtitles off
    #[arg(long)]
    pub no_subs: bool,

    /// Place an image from the overlay dir in a 3x3 grid cell, e.g. `logo@8`
    #[arg(long = "overlay")]
    pub overlays: Vec<Overlay>,

    /// Skip the clip cache
    #[arg(long)]
    pub no_cache: bool,

    /// Where to write the clip; defaults to the clip's own name
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

impl RenderCommand {
    fn settings(&self) -> ClipSettings {
        let mode = if self.sticker {
            Mode::Sticker
        } else if self.caption.is_some() {
            Mode::Caption
        } else {
            Mode::Normal
        };
        ClipSettings {
            extend_or_trim: self.extend.unwrap_or(SignedDuration::ZERO),
            shift: self.shift.unwrap_or(SignedDuration::ZERO),
            mode,
            caption: self.caption.clone(),
            subs_enabled: !self.no_subs,
            format: self.format,
            sticker: self.sticker.then(Default::default),
            ..ClipSettings::default()
        }
    }

    pub(crate) async fn run(&self, cfg: &AppConfig) -> anyhow::Result<()> {
        let app = cfg.build_app().await?;
        let dialog = app.db.get_dialog(&self.media_id).await?;
        if dialog.is_empty() {
            anyhow::bail!("no dialog found for {}", self.media_id);
        }
        let video_file = app
            .db
            .episode_video(&self.media_id.episode)
            .await?
            .with_context(|| format!("no video recorded for {}", self.media_id.episode))?;

        let renderer = app.renderer(app.transcoder())?;
        let settings = self.settings();
        let clip = renderer
            .render(&RenderRequest {
                user_id: CLI_USER,
                media_id: &self.media_id,
                video_file: &video_file,
                dialog: &dialog,
                settings: &settings,
                overlays: &self.overlays,
                disable_cache: self.no_cache,
            })
            .await
            .with_context(|| format!("could not render {}", self.media_id))?;
        log::debug!("{} is {} bytes ({:?})", clip.file_name(), clip.bytes.len(), clip.cache);

        let out = self
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(clip.file_name()));
        tokio::fs::write(&out, &clip.bytes)
            .await
            .with_context(|| format!("could not write {:?}", out))?;
        println!("{}", out.display());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> RenderCommand {
        let mut argv = vec!["render"];
        argv.extend_from_slice(args);
        RenderCommand::try_parse_from(argv).unwrap()
    }

    #[test]
    fn plain_render_uses_defaults() {
        let cmd = parse(&["xfm-S01E02-3"]);
        assert!(cmd.settings().is_default());
    }

    #[test]
    fn caption_implies_caption_mode() {
        let cmd = parse(&["xfm-S01E02-3_4", "--caption", "hello", "--shift", "-0.5s"]);
        let settings = cmd.settings();
        assert_eq!(settings.mode, Mode::Caption);
        assert_eq!(settings.caption.as_deref(), Some("hello"));
        assert_eq!(settings.shift, "-0.5s".parse().unwrap());
        assert!(settings.is_customized());
    }

    #[test]
    fn sticker_and_overlays() {
        let cmd = parse(&[
            "xfm-S01E02-3",
            "--sticker",
            "--format",
            "webp",
            "--overlay",
            "logo@8",
        ]);
        let settings = cmd.settings();
        assert_eq!(settings.mode, Mode::Sticker);
        assert_eq!(settings.format, OutputFormat::Webp);
        assert!(settings.sticker.is_some());
        assert_eq!(cmd.overlays[0].cell, 8);
    }

    #[test]
    fn bad_overlay_is_rejected() {
        assert!(RenderCommand::try_parse_from(["render", "xfm-S01E02-3", "--overlay", "logo@9"]).is_err());
    }
}
