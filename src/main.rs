use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use song_resolver::config::AppConfig;
use song_resolver::http_pool::{HttpPool, PageFetcher};
use song_resolver::spotify::{CatalogApi, SpotifyApi, SpotifyResolver};
use song_resolver::{
    find_urls, ExtractOptions, ExtractionWorker, ExtractorRegistry, PreloadCache, Resolver,
    SongSource,
};

/// Resolve URLs, search phrases and Spotify links into playable songs.
#[derive(Parser, Debug)]
#[command(name = "song-resolver", version)]
struct Cli {
    /// Config file to use instead of the one in the user config directory.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// After resolving, make sure every song has a fresh stream URL.
    #[arg(long)]
    preload: bool,

    /// Treat the arguments as free text and resolve every URL found in it.
    #[arg(long)]
    scan: bool,

    /// Print up to N search results per phrase instead of resolving;
    /// 0 uses the configured default.
    #[arg(long, value_name = "N")]
    search: Option<usize>,

    #[arg(required = true)]
    references: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::error!("Failed to load configuration: {}", e);
            AppConfig::default()
        }),
    };
    info!("Configuration loaded");

    let registry = Arc::new(ExtractorRegistry::standard(&config)?);
    let worker = Arc::new(ExtractionWorker::start(
        config.worker_threads,
        ExtractOptions::from_config(&config),
    )?);

    let pool = HttpPool::new(&config.http)?;
    let catalog = config.spotify.pair().map(|(id, secret)| {
        info!("🎵 Spotify API enabled");
        Arc::new(SpotifyApi::new(pool.clone(), id, secret)) as Arc<dyn CatalogApi>
    });
    let pages: Arc<dyn PageFetcher> = Arc::new(pool);
    let spotify = SpotifyResolver::new(
        pages,
        catalog,
        Duration::from_secs(config.title_cache_ttl_secs),
    );

    let resolver = Arc::new(Resolver::new(
        registry,
        worker,
        spotify,
        config.supported_extensions.clone(),
    ));

    let references = if cli.scan {
        find_urls(&cli.references.join(" "))
    } else {
        cli.references.clone()
    };

    if let Some(count) = cli.search {
        let count = if count == 0 { config.search_results } else { count };
        for phrase in &references {
            match resolver.search(phrase, count).await {
                Ok(songs) => println!("{}", serde_json::to_string_pretty(&songs)?),
                Err(e) => log::error!("❌ {}: {}", phrase, e),
            }
        }
        return Ok(());
    }

    let preload = PreloadCache::new(resolver.clone());
    let mut failures = 0;
    for reference in &references {
        let mut songs = match resolver.resolve(reference).await {
            Ok(resolved) => resolved.into_songs(),
            Err(e) => {
                log::error!("❌ {}: {}", reference, e);
                failures += 1;
                continue;
            }
        };

        if cli.preload {
            for song in songs.iter_mut() {
                if !preload.ensure_fresh(song).await {
                    log::warn!("⚠️ Could not preload {}", song.webpage_url());
                }
            }
        }

        println!("{}", serde_json::to_string_pretty(&songs)?);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} references could not be resolved", failures, references.len());
    }
    Ok(())
}
