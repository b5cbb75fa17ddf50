pub mod argparse;
mod ingest;
mod render;
mod search;

pub use argparse::get_args;

use argparse::{AppConfig, CliOpts, SubCommand};

impl CliOpts {
    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        match &self.subcmd {
            SubCommand::Ingest(opts) => opts.run(&self.cfg).await,
            SubCommand::Search(opts) => opts.run(&self.cfg).await,
            SubCommand::Render(opts) => opts.run(&self.cfg).await,
            SubCommand::Publications => list_publications(&self.cfg).await,
            SubCommand::ShowConfig => show_config(&self.cfg),
        }
    }
}

async fn list_publications(cfg: &AppConfig) -> anyhow::Result<()> {
    let app = cfg.build_app().await?;
    let publications = app.db.list_publications().await?;
    if publications.is_empty() {
        log::warn!("no publications in {}", app.config.database_path());
    }
    for p in publications {
        let series = p
            .series
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        println!("{}\t{}", p.name, series);
    }
    Ok(())
}

fn show_config(cfg: &AppConfig) -> anyhow::Result<()> {
    let config = cfg.build_config()?;
    println!("{}", serde_json::to_string_pretty(config.settings())?);
    println!("database: {}", config.database_path());
    println!("fonts: {}", config.font_path().display());
    println!("overlays: {}", config.overlay_path().display());
    Ok(())
}
