use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use http::HeaderValue;

mod commands;
mod config;
mod db;
mod error;
mod middleware;
mod routes;
mod services;

use config::Config;
use db::store::KvStore;
use services::clock::{Clock, SystemClock};
use services::event_cache::{store_retry_policy, EventCache};
use services::init;
use services::scraper::{EventSource, LumaScraper};
use services::sync::LumaSyncManager;

#[derive(Parser)]
#[command(name = "luma-events", version)]
#[command(about = "Luma calendar sync and cached event API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and the scheduled sync worker (default)
    Serve,
    /// Write the app:* bootstrap keys
    Init,
    /// Test the store connection
    Ping,
    /// List all keys with type and size
    Overview,
    /// Show stored Luma events and sync stats
    Events,
    /// Delete keys matching a pattern (all keys when omitted)
    Clear { pattern: Option<String> },
    /// Dump the keyspace (with TTLs) to a JSON file
    Backup {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a JSON file written by `backup`
    Restore { input: PathBuf },
    /// Sync Luma events now
    Sync,
    /// Sync Luma events if the interval has passed
    ScheduledSync,
}

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn KvStore>,
    pub clock: Arc<dyn Clock>,
    pub scraper: Arc<dyn EventSource>,
    pub events: EventCache,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        scraper: Arc<dyn EventSource>,
    ) -> Self {
        let events = EventCache::new(
            store.clone(),
            clock.clone(),
            config.cache.duration,
            store_retry_policy(
                config.cache.retry_max_attempts,
                Duration::from_millis(config.cache.retry_base_delay_ms),
            ),
        );

        Self {
            config,
            store,
            clock,
            scraper,
            events,
        }
    }

    pub fn sync_manager(&self) -> LumaSyncManager<'_> {
        LumaSyncManager::new(
            self.store.as_ref(),
            self.scraper.as_ref(),
            self.clock.as_ref(),
            self.config.sync.event_ttl,
        )
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "luma_events=debug,tower_http=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = init::init_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let scraper = Arc::new(LumaScraper::new(&config.luma)?);
            let state = Arc::new(AppState::new(config, store, clock, scraper));
            serve(state).await
        }
        Commands::Init => commands::init::run(store.as_ref(), clock.now()).await,
        Commands::Ping => commands::ping::run(store.as_ref()).await,
        Commands::Overview => commands::overview::run(store.as_ref()).await,
        Commands::Events => commands::events::run(store.as_ref(), clock.now()).await,
        Commands::Clear { pattern } => {
            commands::clear::run(store.as_ref(), pattern.as_deref(), &config.admin).await
        }
        Commands::Backup { output } => {
            commands::backup::run(store.as_ref(), output.as_deref(), clock.now()).await
        }
        Commands::Restore { input } => commands::backup::run_restore(store.as_ref(), &input).await,
        Commands::Sync => {
            let scraper = LumaScraper::new(&config.luma)?;
            let manager = LumaSyncManager::new(
                store.as_ref(),
                &scraper,
                clock.as_ref(),
                config.sync.event_ttl,
            );
            commands::sync::run(&manager).await
        }
        Commands::ScheduledSync => {
            let scraper = LumaScraper::new(&config.luma)?;
            let manager = LumaSyncManager::new(
                store.as_ref(),
                &scraper,
                clock.as_ref(),
                config.sync.event_ttl,
            );
            commands::sync::run_scheduled(&manager, config.sync.interval).await
        }
    }
}

async fn serve(app_state: Arc<AppState>) -> anyhow::Result<()> {
    let config = &app_state.config;
    tracing::info!("Starting Luma events service");

    // Create shutdown notifier for background workers and std threads
    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let thread_shutdown = Arc::new(AtomicBool::new(false));

    let bg_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    // Manual sync trigger is rate limited per IP; its cleaner thread stops
    // with the other std threads.
    let (sync_router, sync_cleaner) = middleware::rate_limit::limit_sync_trigger(
        routes::sync::router(),
        &config.rate_limit,
        thread_shutdown.clone(),
    )?;

    let frontend_origin = config
        .server
        .frontend_url
        .parse::<HeaderValue>()
        .map_err(|_| anyhow::anyhow!("Invalid FRONTEND_URL for CORS"))?;

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/events", routes::events::router())
        .nest("/api/sync-events", sync_router)
        .fallback(|| async { error::AppError::NotFound("No such route".to_string()) })
        .with_state(app_state.clone())
        .layer(axum::middleware::from_fn(
            middleware::security_headers::security_headers,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(frontend_origin)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT]),
        );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    // Select between the server and the signal listener. On a signal the
    // workers and threads are notified and the server future is dropped.
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_tx_clone = shutdown_tx.clone();
    let thread_shutdown_clone = thread_shutdown.clone();

    let signal_fut = async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received, notifying background workers and threads");
        let _ = shutdown_tx_clone.send(());
        thread_shutdown_clone.store(true, Ordering::SeqCst);
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Signal handler completed; server stopped accepting connections");
        }
    }

    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );

    let bg_wait = async {
        for h in bg_handles {
            let _ = h.await;
        }
    };
    if tokio::time::timeout(shutdown_wait, bg_wait).await.is_err() {
        tracing::warn!("Background workers did not exit in time");
    }

    thread_shutdown.store(true, Ordering::SeqCst);
    if sync_cleaner.join().is_err() {
        tracing::warn!("Sync rate limiter cleanup thread panicked");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to bind SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
