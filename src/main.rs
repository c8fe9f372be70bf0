use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{info, warn};

mod config;
mod crypto;
mod error;
mod gateway;
mod memory;
mod providers;
mod router;
mod traffic;
mod types;

pub use config::AppConfig;
pub use error::AppError;
pub use traffic::TrafficLog;

use gateway::rate_limit::RateLimiter;
use gateway::GatewayState;
use memory::MemoryEngine;
use providers::ProviderRegistry;
use router::RouterHandle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When invoked as a Docker HEALTHCHECK, hit /health and exit immediately.
    // This avoids needing any external tool (curl/wget) in the container image.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_runtime=info,tower_http=warn".into()),
        )
        .init();

    let config_path = std::env::var("AGENT_RUNTIME_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/agent-runtime/config.toml"));

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!(port = config.gateway.port, "agent-runtime starting");

    let memory = Arc::new(MemoryEngine::with_params(
        config.memory.chunk_size,
        config.memory.top_k,
        config.memory.min_score,
        config.memory.cache_capacity,
    ));

    let providers = build_provider_registry(&config)?;
    let default_cloud = config.default_cloud_provider().unwrap_or("local").to_string();

    let router = RouterHandle::spawn(
        Arc::clone(&memory),
        Arc::new(providers),
        config.router_config(),
        config.queue.max_depth,
        default_cloud,
    );

    let rate_limiter = if config.gateway.rate_limit_rpm > 0 {
        Some(RateLimiter::new(config.gateway.rate_limit_rpm))
    } else {
        None
    };

    let bot_api_base = config.gateway.bot_api_base.clone();
    let poll_interval = Duration::from_millis(config.gateway.poll_interval_ms);
    let port = config.gateway.port;
    let config = Arc::new(RwLock::new(config));

    let state = Arc::new(GatewayState {
        router,
        memory,
        config: Arc::clone(&config),
        traffic: Arc::new(TrafficLog::new(1_000)),
        rate_limiter,
        started_at: chrono::Utc::now(),
    });

    tokio::spawn(config_watcher(Arc::clone(&state), config_path.clone()));

    if let Some(base_url) = bot_api_base {
        tokio::spawn(gateway::botpoll::run(Arc::clone(&state), base_url, poll_interval));
    }

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = gateway::build_router(Arc::clone(&state)).layer(
        tower_http::trace::TraceLayer::new_for_http()
            .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
            .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
    );

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.context("gateway server error")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

/// Registers every configured provider, resolving credentials eagerly for
/// anything with an `api_key_env` — spec §4.3 providers are looked up by ID
/// at dispatch time, never re-resolved per request.
fn build_provider_registry(config: &AppConfig) -> anyhow::Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for (id, provider) in &config.providers {
        match provider.api_key()? {
            Some(credential) => {
                registry.register_with_credential(id.clone(), &provider.kind, provider.base_url.clone(), provider.timeout_ms, credential);
            }
            None => {
                registry.register(id.clone(), &provider.kind, provider.base_url.clone(), provider.timeout_ms);
            }
        }
    }
    Ok(registry)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Lightweight healthcheck: GET /health and exit 0 on 200, 1 otherwise.
/// Invoked via `agent-runtime --healthcheck` from Docker HEALTHCHECK.
async fn healthcheck() -> anyhow::Result<()> {
    let port = std::env::var("AGENT_RUNTIME_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{port}/health");
    let resp = reqwest::get(&url).await?;

    if resp.status().is_success() {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}

/// Background task: polls the config file every 5 seconds and hot-reloads
/// routing/memory/queue/provider settings on change, the way the teacher's
/// `config_watcher` polls mtime rather than relying on inotify/kqueue.
async fn config_watcher(state: Arc<GatewayState>, path: PathBuf) {
    let mut last_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();

    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.tick().await;

    loop {
        interval.tick().await;

        let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        if mtime == last_mtime {
            continue;
        }

        match AppConfig::load(&path) {
            Ok(new_config) => {
                state.router.update_config(new_config.router_config()).await;
                *state.config.write().await = new_config;
                info!(path = %path.display(), "config hot-reloaded");
                last_mtime = mtime;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config reload failed — keeping previous config");
            }
        }
    }
}
