use clap::Parser;

use super::argparse::AppConfig;

#[derive(Parser, Debug)]
pub struct IngestCommand {
    /// Keep running, reacting to filesystem events instead of polling
    #[arg(long, conflicts_with = "once")]
    pub watch: bool,

    /// Make a single pass over the media directory and exit
    #[arg(long)]
    pub once: bool,
}

impl IngestCommand {
    pub(crate) async fn run(&self, cfg: &AppConfig) -> anyhow::Result<()> {
        let app = cfg.build_app_with_watch(self.watch).await?;
        let ingester = app.ingester();
        if self.once {
            let report = ingester.run_once().await?;
            println!("{}", report);
            if report.failed > 0 {
                anyhow::bail!("{} subtitle files could not be ingested", report.failed);
            }
            return Ok(());
        }
        log::info!(
            "ingesting from {:?} ({})",
            ingester.media_path(),
            if app.config.watch() { "watch" } else { "poll" }
        );
        ingester.run(app.config.watch()).await?;
        Ok(())
    }
}
