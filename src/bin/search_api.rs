use anyhow::{Context, Result};
use clap::Parser;
use lemmacrawl::{
    api, Cli, CrawlControls, DictionaryMorphology, HttpFetcher, MemoryStore, PostgresStore,
    SearchService, SitesList, Storage, TextNormalizer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let sites = SitesList::load(&cli.sites)
        .with_context(|| format!("failed to load site list {}", cli.sites.display()))?;
    let morphology = match &cli.dictionary {
        Some(path) => DictionaryMorphology::load(path)
            .with_context(|| format!("failed to load dictionary {}", path.display()))?,
        None => {
            warn!("no dictionary configured, unknown words fall back to the Russian stemmer");
            DictionaryMorphology::builtin()
        }
    };
    info!(entries = morphology.len(), sites = sites.sites().len(), "configuration loaded");

    let normalizer = TextNormalizer::new(Arc::new(morphology));
    let controls = cli.build_controls();
    let fetcher = HttpFetcher::new(&controls).context("failed to build http client")?;

    match &cli.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            serve(cli.bind, store, fetcher, normalizer, sites, controls).await
        }
        None => {
            warn!("DATABASE_URL not set, index lives in memory");
            serve(cli.bind, MemoryStore::new(), fetcher, normalizer, sites, controls).await
        }
    }
}

async fn serve<S: Storage>(
    addr: SocketAddr,
    store: S,
    fetcher: HttpFetcher,
    normalizer: TextNormalizer,
    sites: SitesList,
    controls: CrawlControls,
) -> Result<()> {
    let service = SearchService::new(
        Arc::new(store),
        Arc::new(fetcher),
        normalizer,
        sites,
        controls,
    );
    let app = api::router(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "lemmacrawl-api listening");
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}
