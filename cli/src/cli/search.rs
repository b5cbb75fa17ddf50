use anyhow::Context;
use clap::Parser;

use super::argparse::AppConfig;

#[derive(Parser, Debug)]
pub struct SearchCommand {
    /// The search query, e.g. `"monkey news" ~xfm s1`
    #[arg(required = true)]
    pub query: Vec<String>,

    /// How many results to print
    #[arg(long, default_value_t = search::DEFAULT_PAGE_SIZE)]
    pub limit: usize,
}

impl SearchCommand {
    pub(crate) async fn run(&self, cfg: &AppConfig) -> anyhow::Result<()> {
        let app = cfg.build_app().await?;
        let query = self.query.join(" ");
        log::info!("query: {:?}", query);
        let results = app
            .index
            .search_text(&query, self.limit)
            .with_context(|| format!("search failed: {:?}", query))?;
        if results.is_empty() {
            println!("no results");
        }
        for r in results {
            println!(
                "{:>6.2} {} {} [{}-{}] {}",
                r.score,
                r.id,
                r.label(),
                r.start_timestamp(),
                r.end_timestamp(),
                r.content.replace('\n', " / ")
            );
        }
        Ok(())
    }
}
