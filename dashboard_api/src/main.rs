use anyhow::{Context, Result};
use clap::Parser;
use dashboard_api::{
    api::{create_router, AppState},
    cache::{CacheStore, MemoryCache, RedisCache},
    config::{CacheConfig, Config},
    upstream::{CoingeckoClient, CovalentClient, EthersChainClient},
};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Dashboard API Arguments
#[derive(Parser)]
#[clap(name = "dashboard_api")]
#[clap(about = "Cached transparency, bond and governance API for the protocol dashboard")]
struct Args {
    /// Path to the YAML configuration file
    #[clap(long, default_value = "config/dashboard.yaml")]
    config_path: PathBuf,

    /// API port to listen on, overrides the config file
    #[clap(long)]
    api_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting dashboard API...");
    info!("Config path: {:?}", args.config_path);

    let mut config = if args.config_path.exists() {
        Config::from_file(&args.config_path)
            .with_context(|| format!("loading {}", args.config_path.display()))?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };
    config.apply_env();
    config.validate()?;
    if let Some(port) = args.api_port {
        config.api_port = port;
    }

    let cache: Arc<dyn CacheStore> = match &config.cache {
        CacheConfig::Memory => {
            info!("Using in-memory cache");
            Arc::new(MemoryCache::new())
        }
        CacheConfig::Redis { url } => Arc::new(RedisCache::connect(url).await?),
    };

    let timeout = config.upstream_timeout();
    let chain = Arc::new(EthersChainClient::from_config(&config)?);
    let state = AppState {
        cache,
        indexer: Arc::new(CovalentClient::new(&config.indexer, timeout)?),
        prices: Arc::new(CoingeckoClient::new(&config.prices, timeout)?),
        interest_models: chain.clone(),
        bond_markets: chain.clone(),
        governance: chain,
        config: Arc::new(config),
    };

    let addr = format!("0.0.0.0:{}", state.config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
