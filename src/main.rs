//! feed-translator binary entrypoint.
//! Registers the configured feeds, arms the polling loop, serves the status API and
//! the feed files, and flushes the task queue on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_translator::{
    api::{self, AppState},
    config::AppConfig,
    fetch::HttpFetcher,
    files::FeedFiles,
    metrics::Metrics,
    queue::TaskQueue,
    registry,
    store::JsonFeedStore,
    translate::TranslatorSet,
    FeedSyncer,
};

/// `RUST_LOG` filter (default `feed_translator=info,warn`); `LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_translator=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    tracing::info!(data_root = %cfg.data_root.display(), bind = %cfg.server.bind, "config loaded");

    let metrics = match Metrics::init() {
        Ok(m) => Some(m.handle),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };

    let store = Arc::new(JsonFeedStore::open(cfg.store_path())?);
    let registration = registry::register_feeds(store.as_ref(), &cfg).await?;

    let files = FeedFiles::new(&cfg.data_root);
    files
        .ensure_dir()
        .await
        .with_context(|| format!("creating {}", files.dir().display()))?;

    let fetcher = Arc::new(HttpFetcher::new(&cfg.fetch)?);
    let translators = TranslatorSet::from_config(&cfg.translators)?;

    let mut queue = TaskQueue::new(cfg.queue.clone());
    let syncer = Arc::new(
        FeedSyncer::new(
            store,
            fetcher,
            Arc::new(translators),
            files,
            Arc::new(queue.handle()),
        )
        .with_cascade_delay(cfg.queue.cascade_delay()),
    );
    syncer.schedule_all().await?;
    syncer.schedule_derive(&registration.stale_derived);
    queue.start(syncer.clone());

    let app = api::router(AppState {
        syncer,
        queue: queue.handle(),
        metrics,
    });
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    queue.shutdown().await;
    Ok(())
}
