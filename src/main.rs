//! CORDAL composition root: loads configuration, builds the registry and
//! supporting services, assembles [`AppState`](cordal::http::state::AppState),
//! and serves the HTTP surface.

use clap::Parser;
use cordal::cache::{spawn_cleaner, CacheManager};
use cordal::config::app_config::{AppConfig, ConfigSource};
use cordal::config::loader::{ConfigLoader, FilesystemLoader, StoreLoader};
use cordal::config::loader::filesystem::FilesystemLoaderConfig;
use cordal::config::registry::ConfigRegistry;
use cordal::events::EventBus;
use cordal::health::HealthMonitor;
use cordal::http::state::AppState;
use cordal::invalidation::InvalidationEngine;
use cordal::pool::PoolRegistry;
use cordal::query::QueryExecutor;
use cordal::stats::Statistics;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration-Orchestrated REST Dynamic API Layer.
#[derive(Parser)]
#[command(name = "cordal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the service bootstrap configuration (TOML).
    #[arg(short, long, default_value = "cordal.toml", env = "CORDAL_CONFIG")]
    config: PathBuf,

    /// Validate the descriptor set and exit, regardless of `validation.runOnStartup`.
    #[arg(long)]
    validate_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "cordal=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "fatal configuration load error");
            ExitCode::from(3)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("cordal v{}", env!("CARGO_PKG_VERSION"));

    let app_config = AppConfig::load(&cli.config)?;
    app_config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let pools = Arc::new(PoolRegistry::new());

    let fs_loader: Arc<dyn ConfigLoader> = Arc::new(FilesystemLoader::new(FilesystemLoaderConfig {
        directories: app_config.config.directories.iter().map(PathBuf::from).collect(),
        database_patterns: app_config.config.patterns.databases.clone(),
        query_patterns: app_config.config.patterns.queries.clone(),
        endpoint_patterns: app_config.config.patterns.endpoints.clone(),
    }));

    // The store loader is constructed whenever a store URL is configured,
    // even if the live registry is filesystem-backed, so the migration
    // endpoints always have both sides of the comparison available.
    let store_loader: Option<Arc<dyn ConfigLoader>> = match &app_config.config.store_url {
        Some(url) => {
            let store_pool = PgPoolOptions::new().max_connections(5).connect(&cordal::config::env::substitute(url)).await?;
            pools.set_store_pool(store_pool.clone());
            Some(Arc::new(StoreLoader::new(store_pool)))
        }
        None => None,
    };

    let active_loader: Arc<dyn ConfigLoader> = match app_config.config.source {
        ConfigSource::Filesystem => Arc::clone(&fs_loader),
        ConfigSource::Store => store_loader
            .clone()
            .ok_or_else(|| anyhow::anyhow!("config.store_url is required when config.source = \"store\""))?,
    };
    let fs_loader = Some(fs_loader);

    let (registry, report) = ConfigRegistry::load_and_publish(active_loader.as_ref()).await?;

    if !report.errors.is_empty() {
        for error in &report.errors {
            tracing::error!(%error, "configuration validation error");
        }
    }
    for warning in &report.warnings {
        tracing::warn!(%warning, "configuration validation warning");
    }

    if cli.validate_only {
        return Ok(ExitCode::from(if report.is_valid() { 0 } else { 2 }));
    }
    if app_config.validation.validate_only {
        return Ok(ExitCode::from(if report.is_valid() { 0 } else { 2 }));
    }
    if app_config.validation.run_on_startup && !report.is_valid() {
        return Ok(ExitCode::from(2));
    }

    let registry = Arc::new(registry);
    let cache = Arc::new(CacheManager::new(app_config.cache.max_size));
    spawn_cleaner(Arc::clone(&cache), Duration::from_secs(app_config.cache.cleanup_interval_seconds));

    let event_bus = Arc::new(EventBus::new());
    let invalidation = Arc::new(InvalidationEngine::new(Arc::clone(&event_bus), Arc::clone(&cache)));
    let rules: Vec<_> = registry
        .all_queries()
        .into_values()
        .filter_map(|query| query.cache)
        .flat_map(|cache_spec| cache_spec.invalidation_rules)
        .collect();
    invalidation.register_rules(rules);

    let stats = Arc::new(Statistics::new());
    let executor = Arc::new(QueryExecutor::new(Arc::clone(&pools), Arc::clone(&cache), Arc::clone(&stats)));
    let health = Arc::new(HealthMonitor::new(Arc::clone(&pools)));

    let state = Arc::new(AppState {
        config: app_config.clone(),
        registry,
        pools,
        cache,
        event_bus,
        invalidation,
        executor,
        stats,
        health,
        fs_loader,
        store_loader,
    });

    let pools_for_shutdown = Arc::clone(&state.pools);
    let router = cordal::http::build_router(state);
    let address = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("closing connection pools");
    pools_for_shutdown.shutdown().await;

    Ok(ExitCode::SUCCESS)
}

/// Resolves once the process receives Ctrl+C or, on Unix, SIGTERM — the
/// trigger for `axum::serve`'s graceful shutdown and the pool-closing pass
/// that follows it (spec.md §4.3 "Shutdown closes all pools").
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
