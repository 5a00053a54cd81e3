mod auth;
mod config;
mod forge;
mod health;
mod http;
mod metrics;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fred::clients::Pool;
use fred::interfaces::ClientLike;
use fred::types::config::{Config as FredConfig, ReconnectPolicy, ServerConfig, TlsConnector};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::auth::{AuthCache, KeyDbAuthCache, MemoryAuthCache, TokenVerifier};
use crate::config::{CacheBackend, Config, KeyDbConfig};
use crate::metrics::MetricsRegistry;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "coveritup-auth", about = "Commit-scoped GitHub token verification")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/coveritup-auth/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub cache: Arc<dyn AuthCache>,
    pub forge: Arc<dyn forge::ForgeBackend>,
    pub metrics: MetricsRegistry,
}

// ---------------------------------------------------------------------------
// Cache setup
// ---------------------------------------------------------------------------

async fn build_keydb_pool(config: &KeyDbConfig) -> Result<Pool> {
    let auth_token = std::env::var(&config.auth_token_env).ok();

    let endpoint = config
        .endpoint
        .trim_start_matches("rediss://")
        .trim_start_matches("redis://");
    let (host, port) = parse_host_port(endpoint)?;
    let server_config = ServerConfig::new_centralized(host, port);

    let mut fred_config = FredConfig {
        server: server_config,
        ..FredConfig::default()
    };

    if config.tls {
        fred_config.tls = Some(TlsConnector::default_rustls()?.into());
    }

    if let Some(token) = auth_token {
        fred_config.password = Some(token);
    }

    let mut builder = fred::types::Builder::from_config(fred_config);
    builder.set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2));

    let pool = builder.build_pool(3)?;
    pool.init().await.context("failed to connect to KeyDB")?;

    tracing::info!("KeyDB pool initialised");
    Ok(pool)
}

/// Split `host:port`, defaulting the port to 6379.
fn parse_host_port(endpoint: &str) -> Result<(String, u16)> {
    let endpoint = endpoint.trim_end_matches('/');
    match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("invalid KeyDB port in endpoint: {endpoint}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((endpoint.to_string(), 6379)),
    }
}

async fn build_cache(config: &Config) -> Result<Arc<dyn AuthCache>> {
    let cache: Arc<dyn AuthCache> = match config.cache.backend {
        CacheBackend::Memory => {
            tracing::info!(max_entries = config.cache.max_entries, "using in-memory auth cache");
            Arc::new(MemoryAuthCache::new(config.cache.max_entries))
        }
        CacheBackend::Keydb => {
            let pool = build_keydb_pool(&config.cache.keydb).await?;
            Arc::new(KeyDbAuthCache::new(pool, config.cache.keydb.key_prefix.clone()))
        }
    };
    Ok(cache)
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState, listen: &str) -> Result<()> {
    let app = http::handler::create_router(Arc::new(state));

    let listen_addr: std::net::SocketAddr = listen.parse().context("invalid http_listen address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        config_path = %cli.config,
        api_url = %config.upstream.api_url,
        "starting coveritup-auth"
    );

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- Cache ----
    let cache = build_cache(&config).await?;

    // ---- Forge backend ----
    let forge: Arc<dyn forge::ForgeBackend> = Arc::from(forge::build_backend(&config.upstream)?);
    tracing::info!("forge backend initialised");

    // ---- Verifier ----
    let verifier = TokenVerifier::new(Arc::clone(&cache), Arc::clone(&forge), metrics.clone())
        .with_ttl(config.auth.cache_ttl())
        .with_policy(config.auth.status_policy);
    tracing::info!(
        cache_ttl_secs = config.auth.cache_ttl,
        policy = ?config.auth.status_policy,
        "token verifier initialised"
    );

    // ---- App state ----
    let state = AppState {
        verifier: Arc::new(verifier),
        cache: Arc::clone(&cache),
        forge,
        metrics,
    };

    // ---- Serve until shutdown ----
    let served = run_http_server(state, &config.server.http_listen).await;

    if let Err(e) = cache.shutdown().await {
        tracing::warn!(error = %e, "cache shutdown failed");
    }

    served?;
    tracing::info!("coveritup-auth shut down cleanly");
    Ok(())
}
