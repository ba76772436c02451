//! bts-daemon entry point.
//!
//! Intentionally thin: parse CLI args, load layered config, build the feed
//! and snapshot store, wire middleware, serve.  Exits non-zero when the
//! config is missing or the port cannot be bound.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use bts_daemon::{routes, state::AppState};
use bts_feed::{Feed, FeedTimeout, FileFeed};

#[derive(Parser)]
#[command(name = "bts-daemon")]
#[command(about = "Backtesting brokerage counter", long_about = None)]
struct Cli {
    /// Config files in merge order (base first, overrides later).
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,

    /// Override the bind address from config.
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    let path_refs: Vec<&str> = cli.config_paths.iter().map(|s| s.as_str()).collect();
    let cfg = bts_config::load_layered_yaml(&path_refs)?;

    let feed = build_feed(&cfg)?;
    let store = Arc::new(bts_broker::FileStore::new(cfg.persist.dir.clone()));
    let shared = Arc::new(AppState::new(&cfg, feed, store));

    let app = routes::build_router(Arc::clone(&shared), &cfg.server.prefix)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = cli
        .addr
        .or_else(|| std::env::var("BTS_DAEMON_ADDR").ok())
        .unwrap_or_else(|| cfg.server.addr.clone())
        .parse()
        .context("invalid bind address")?;

    info!("bts-daemon listening on http://{}{}", addr, cfg.server.prefix);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app).await.context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn build_feed(cfg: &bts_config::ServerConfig) -> anyhow::Result<Arc<dyn Feed>> {
    match cfg.feed.interface.as_str() {
        "file" => {
            let inner = FileFeed::load(std::path::Path::new(&cfg.feed.data_dir))
                .with_context(|| format!("load feed fixtures from {}", cfg.feed.data_dir))?;
            Ok(Arc::new(FeedTimeout::new(
                Arc::new(inner),
                Duration::from_secs(cfg.feed.timeout_secs),
            )))
        }
        other => anyhow::bail!("unsupported feed interface: {other}"),
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
