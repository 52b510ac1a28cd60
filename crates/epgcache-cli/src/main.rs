//! epgcache - hourly Red Bee EPG fetcher serving a cached XMLTV file.

/// Application configuration (TOML).
mod config;
/// Hourly refresh schedule.
mod schedule;
/// Refresh cycle and its driver.
mod scheduler;
/// HTTP endpoint.
mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{ArgAction, Parser};
use epgcache_api::redbee::{DEFAULT_BASE_URL, RedbeeClient};
use epgcache_store::{CacheStore, FileCacheStore};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
#[cfg(not(feature = "otel"))]
use tracing_subscriber::fmt;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

use crate::config::{AppConfig, resolve_config_path};
use crate::schedule::RefreshSchedule;
use crate::scheduler::{RefreshOptions, RefreshScheduler, RetryPolicy};
use crate::server::{AppState, router};

/// CLI arguments. Every flag can also be set through its environment variable.
#[derive(Parser, Debug)]
#[command(about, version)]
struct Cli {
    /// Upstream API root.
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: Url,

    /// Minute of the local hour at which the guide is refreshed.
    #[arg(
        long,
        env = "REFRESH_OFFSET_MINUTES",
        default_value_t = 45,
        value_parser = clap::value_parser!(u32).range(0..60)
    )]
    refresh_offset_minutes: u32,

    /// Canonical path of the cached XMLTV file.
    #[arg(long, env = "EPG_FILE", default_value = "/data/epg.xml")]
    epg_file: PathBuf,

    /// HTTP bind address.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:34455")]
    listen_addr: SocketAddr,

    /// Per-request upstream timeout in seconds.
    #[arg(
        long,
        env = "UPSTREAM_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    upstream_timeout_secs: u64,

    /// Upstream attempts per refresh on transient errors.
    #[arg(
        long,
        env = "REFRESH_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    refresh_max_attempts: u32,

    /// Run one refresh immediately at startup.
    #[arg(long, env = "REFRESH_ON_START", default_value_t = true, action = ArgAction::Set)]
    refresh_on_start: bool,

    /// Enable `POST /refresh`.
    #[arg(long, env = "REFRESH_ENDPOINT", default_value_t = false, action = ArgAction::Set)]
    refresh_endpoint: bool,

    /// Config file (default: ~/.config/epgcache/config.toml).
    #[arg(long, env = "EPGCACHE_CONFIG")]
    config: Option<PathBuf>,
}

/// Loads the optional config file. A missing `HOME` only disables the default path.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match resolve_config_path(explicit) {
        Ok(path) => {
            let config = AppConfig::load(&path)?;
            tracing::debug!(path = %path.display(), "Config loaded");
            Ok(config)
        }
        Err(e) => {
            tracing::warn!(error = %e, "No config path, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Builds the Red Bee client from CLI flags and the `[upstream]` section.
///
/// # Errors
///
/// Returns an error if the client fails to build.
#[instrument(skip_all)]
fn build_redbee_client(cli: &Cli, config: &AppConfig) -> Result<RedbeeClient> {
    let mut builder = RedbeeClient::builder()
        .base_url(cli.base_url.clone())
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .timeout(Duration::from_secs(cli.upstream_timeout_secs));
    if let Some(customer) = &config.upstream.customer {
        builder = builder.customer(customer.clone());
    }
    if let Some(business_unit) = &config.upstream.business_unit {
        builder = builder.business_unit(business_unit.clone());
    }
    if let Some(component) = &config.upstream.listing_component {
        builder = builder.listing_component(component.clone());
    }
    builder.build().context("failed to build Red Bee API client")
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Opens the cache, starts the refresh loop and serves until shutdown.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the cache cannot be opened,
/// the listener cannot be bound, or the server fails.
async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    let local_offset = Local::now().offset().local_minus_utc();
    let schedule = RefreshSchedule::from_local_minute(cli.refresh_offset_minutes, local_offset)?;

    // The persisted artifact must be loaded before the first request is accepted.
    let store = FileCacheStore::open(&cli.epg_file)
        .with_context(|| format!("failed to open cache at {}", cli.epg_file.display()))?;
    let store: Arc<dyn CacheStore> = Arc::new(store);

    let client = build_redbee_client(&cli, &config)?;
    let (past, future) = config.window.extents();
    let options = RefreshOptions {
        channels: config.channel_set(),
        past,
        future,
        retry: RetryPolicy {
            max_attempts: cli.refresh_max_attempts,
            ..RetryPolicy::default()
        },
    };
    let scheduler = Arc::new(RefreshScheduler::new(client, Arc::clone(&store), options));
    let trigger = Arc::new(Notify::new());

    let state = AppState {
        store,
        status: scheduler.status(),
        trigger: cli.refresh_endpoint.then(|| Arc::clone(&trigger)),
    };

    let listener = TcpListener::bind(cli.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen_addr))?;
    tracing::info!(
        addr = %cli.listen_addr,
        epg_file = %cli.epg_file.display(),
        utc_minute = schedule.utc_minute(),
        refresh_endpoint = cli.refresh_endpoint,
        "epgcache listening"
    );

    let refresh = tokio::spawn(Arc::clone(&scheduler).run(
        schedule,
        trigger,
        cli.refresh_on_start,
    ));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    refresh.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if startup fails or the server stops with an error.
#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(not(feature = "otel"))]
    {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    #[cfg(feature = "otel")]
    {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

        let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|_| {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .ok()?;

                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_batch_exporter(exporter)
                    .build();

                let tracer = opentelemetry::trace::TracerProvider::tracer(
                    &tracer_provider,
                    env!("CARGO_PKG_NAME"),
                );
                opentelemetry::global::set_tracer_provider(tracer_provider);

                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    }

    let cli = Cli::parse();
    run(cli).await
}
