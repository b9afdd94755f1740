//! Vitrine Kiosk (vitrine-kiosk) - Main entry point
//!
//! Pairs the device on first start, then runs the playback timeline and
//! its background tasks until Ctrl+C / SIGTERM.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitrine_common::config::{BootstrapConfig, LoggingConfig, TomlConfig};
use vitrine_common::db::init_database;
use vitrine_common::events::EventBus;
use vitrine_kiosk::api::{self, AppContext};
use vitrine_kiosk::backend::HttpBackend;
use vitrine_kiosk::cache::{self, Downloader, HttpMediaSource, MediaCache};
use vitrine_kiosk::config::RuntimeSettings;
use vitrine_kiosk::db::settings::{clear_terminal_id, ensure_hardware_id, load_terminal_id};
use vitrine_kiosk::feed::{FeedCache, HttpFeedFetcher, NewsFeedProvider};
use vitrine_kiosk::pairing::PairingAgent;
use vitrine_kiosk::playback::{
    HeadlessRenderer, PlaybackLog, PlaybackScheduler, SchedulerDeps, SchedulerSettings,
    SlotCycleModel, TokioClock,
};
use vitrine_kiosk::playlist::PlaylistSync;
use vitrine_kiosk::reporter::spawn_reporter;
use vitrine_kiosk::SharedState;

const MEDIA_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const FEED_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Command-line arguments for vitrine-kiosk
#[derive(Parser, Debug)]
#[command(name = "vitrine-kiosk")]
#[command(about = "Digital signage kiosk playback engine")]
#[command(version)]
struct Args {
    /// Path to the TOML bootstrap configuration
    #[arg(short, long, env = "VITRINE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (database and media cache)
    #[arg(long, env = "VITRINE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Backend API base URL
    #[arg(long, env = "VITRINE_BACKEND_URL")]
    backend_url: Option<String>,

    /// Port of the local status endpoint
    #[arg(long, env = "VITRINE_STATUS_PORT")]
    status_port: Option<u16>,

    /// Forget the stored terminal identity and pair again
    #[arg(long)]
    reset_pairing: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    let mut config = BootstrapConfig::resolve(toml, args.data_dir.clone());
    if let Some(url) = &args.backend_url {
        config.backend_url = url.trim_end_matches('/').to_string();
    }
    if let Some(port) = args.status_port {
        config.status_port = port;
    }

    init_tracing(&config.logging)?;

    info!(
        "Starting Vitrine Kiosk v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Data directory: {}", config.data_dir.display());
    info!("Backend: {}", config.backend_url);

    config
        .ensure_directories()
        .context("Failed to create data directories")?;
    let db = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    if args.reset_pairing {
        clear_terminal_id(&db).await?;
        info!("Stored terminal identity cleared");
    }

    let settings = RuntimeSettings::load(&db)
        .await
        .context("Failed to load runtime settings")?;
    let hardware_id = ensure_hardware_id(&db).await?;
    let events = EventBus::default();
    let backend = Arc::new(
        HttpBackend::new(
            &config.backend_url,
            config.backend_api_key.clone(),
            settings.sync_poll(),
        )
        .context("Failed to build backend client")?,
    );

    let terminal_id = match load_terminal_id(&db).await? {
        Some(terminal_id) => terminal_id,
        None => {
            let agent = PairingAgent::new(
                backend.clone(),
                db.clone(),
                events.clone(),
                hardware_id,
                settings.pairing_poll(),
            );
            info!("Terminal not paired; pairing code: {}", agent.code());

            tokio::select! {
                paired = agent.run() => {
                    paired.context("Pairing failed")?;
                    db.close().await;
                    return restart_process();
                }
                _ = shutdown_signal() => return Ok(()),
            }
        }
    };

    info!(terminal_id = %terminal_id, hardware_id = %hardware_id, "Terminal identity loaded");
    run_kiosk(config, settings, db, events, backend, terminal_id).await
}

async fn run_kiosk(
    config: BootstrapConfig,
    settings: RuntimeSettings,
    db: SqlitePool,
    events: EventBus,
    backend: Arc<HttpBackend>,
    terminal_id: String,
) -> Result<()> {
    let cycle = SlotCycleModel::from_config(&config.slot_cycle).context("Invalid slot cycle")?;
    info!("Slot cycle has {} positions", cycle.len());

    // Media cache and its download worker
    let (media_cache, download_rx) = MediaCache::new(&config.cache_dir, events.clone());
    let media_cache = Arc::new(media_cache);
    media_cache
        .rescan()
        .await
        .context("Failed to scan media cache")?;
    let source = Arc::new(HttpMediaSource::new(MEDIA_DOWNLOAD_TIMEOUT)?);
    Downloader::new(
        media_cache.clone(),
        source,
        events.clone(),
        settings.download_attempts,
    )
    .spawn(download_rx);

    // Proof-of-play buffer and diagnostics
    let log = Arc::new(PlaybackLog::new(db.clone(), settings.log_capacity, events.clone()));
    log.clone()
        .spawn_flusher(backend.clone(), settings.flush_interval());
    spawn_reporter(&events, backend.clone(), terminal_id.clone());

    // News feed
    let fetcher = Arc::new(HttpFeedFetcher::new(FEED_FETCH_TIMEOUT)?);
    let feeds = Arc::new(NewsFeedProvider::new(
        fetcher,
        FeedCache::new(),
        settings.feed_ttl(),
        config.default_feed_url.clone(),
    ));
    feeds.clone().spawn_refresher(settings.feed_refresh());

    // Playlist: prefetcher subscribes first so it sees the initial pull
    let playlist = Arc::new(PlaylistSync::new(
        backend.clone(),
        terminal_id.clone(),
        events.clone(),
    ));
    cache::spawn_prefetcher(media_cache.clone(), playlist.subscribe());
    if let Err(e) = playlist.refresh().await {
        warn!("Initial playlist pull failed; starting without content: {}", e);
    }
    playlist.clone().spawn(settings.sync_poll());

    // Local status endpoint
    let state = Arc::new(SharedState::new(terminal_id.clone()));
    let ctx = AppContext {
        state: state.clone(),
        log: log.clone(),
        cache: media_cache.clone(),
        playlist: playlist.clone(),
    };
    let status_port = config.status_port;
    tokio::spawn(async move {
        if let Err(e) = api::server::run(status_port, ctx, std::future::pending()).await {
            error!("Status server stopped: {}", e);
        }
    });

    let scheduler = PlaybackScheduler::new(
        SchedulerDeps {
            cycle,
            playlist: playlist.subscribe(),
            cache: media_cache,
            log: log.clone(),
            feeds,
            renderer: Arc::new(HeadlessRenderer::default()),
            clock: Arc::new(TokioClock),
            events,
            state,
        },
        SchedulerSettings::from(&settings),
        terminal_id,
        env!("CARGO_PKG_VERSION"),
    );

    tokio::select! {
        _ = scheduler.run() => {}
        _ = shutdown_signal() => {}
    }

    // Best effort; whatever is left is sent after the next start
    if let Err(e) = log.flush(backend.as_ref()).await {
        warn!("Final playback log flush failed: {}", e);
    }
    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the configured level. With `[logging] file` set,
/// output is also appended to that file without ANSI colors.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", logging.level)));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Replace this process with a fresh copy of itself
///
/// Used after pairing so every component starts against the new identity.
fn restart_process() -> Result<()> {
    let exe = std::env::current_exe().context("Cannot locate own executable")?;
    let args: Vec<OsString> = std::env::args_os()
        .skip(1)
        .filter(|arg| arg != "--reset-pairing")
        .collect();
    info!("Restarting {}", exe.display());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = std::process::Command::new(&exe).args(&args).exec();
        Err(err).context("Failed to re-exec")
    }

    #[cfg(not(unix))]
    {
        std::process::Command::new(&exe)
            .args(&args)
            .spawn()
            .context("Failed to relaunch")?;
        std::process::exit(0);
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
