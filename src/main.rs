#![forbid(unsafe_code)]

//! `daily-nudge` bot binary.
//!
//! Bootstraps configuration and storage, arms every subscriber's reminder,
//! then serves Slack direct messages and the health endpoint until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use daily_nudge::clock::{Clock, SystemClock};
use daily_nudge::config::GlobalConfig;
use daily_nudge::delivery::{LogOnlyChannel, PushChannel};
use daily_nudge::intent::IntentHandler;
use daily_nudge::orchestrator::{ReminderEngine, ReminderSettings, SubscriberStore};
use daily_nudge::persistence::{db, migration, RecordStore, SqliteRecordStore};
use daily_nudge::slack::client::SlackService;
use daily_nudge::slack::events::InboundState;
use daily_nudge::timer::TimerMultiplexer;
use daily_nudge::{http, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "daily-nudge", about = "Daily reminder bot", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the database file path from the configuration.
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("daily-nudge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::from_toml_str("")?,
    };
    if let Some(db_path) = args.db {
        config.db_path = db_path;
    }
    config.load_credentials().await;
    let settings = ReminderSettings::from_config(&config)?;
    info!(db_path = %config.db_path.display(), zone = %settings.zone, "configuration loaded");

    // ── Initialize storage ──────────────────────────────
    let pool = Arc::new(db::connect(&config.db_path).await?);
    let records: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(Arc::clone(&pool)));
    let rewritten = migration::migrate(records.as_ref()).await?;
    info!(rewritten, "database ready");

    // ── Timers and delivery ─────────────────────────────
    let ct = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let timers = TimerMultiplexer::spawn(Arc::clone(&clock), ct.child_token());

    let slack = if config.slack.bot_token.is_empty() {
        info!("slack not configured; running in local-only mode");
        None
    } else {
        let (svc, queue_task) =
            SlackService::start(&config.slack, config.reminder.delivery_timeout()).map_err(
                |err| {
                    error!(%err, "slack service start failed");
                    err
                },
            )?;
        Some((Arc::new(svc), queue_task))
    };
    let channel: Arc<dyn PushChannel> = match &slack {
        Some((svc, _)) => Arc::clone(svc) as Arc<dyn PushChannel>,
        None => Arc::new(LogOnlyChannel),
    };

    // ── Load subscribers ────────────────────────────────
    let engine = ReminderEngine::new(timers.clone(), channel, clock, settings);
    let store = Arc::new(SubscriberStore::new(records, engine));
    store.load().await?;

    // ── Start inbound listeners ─────────────────────────
    let listener_ct = CancellationToken::new();
    let socket_handle = slack.as_ref().map(|(svc, _)| {
        let state = Arc::new(InboundState {
            handler: IntentHandler::new(Arc::clone(&store)),
            slack: Arc::clone(svc),
        });
        svc.listen(state, listener_ct.clone())
    });

    let health_handle = (config.http_port != 0).then(|| {
        let health_ct = listener_ct.clone();
        let health_store = Arc::clone(&store);
        let port = config.http_port;
        tokio::spawn(async move {
            if let Err(err) = http::serve_health(port, health_store, health_ct).await {
                error!(%err, "health endpoint failed");
            }
        })
    });

    info!(subscribers = store.len(), "daily-nudge ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");

    async {
        listener_ct.cancel();
        for handle in [socket_handle, health_handle].into_iter().flatten() {
            if let Err(err) = handle.await {
                error!(%err, "listener task failed");
            }
        }

        ct.cancel();
        timers.shutdown().await;

        if let Some((_, queue_task)) = slack {
            queue_task.abort();
        }
        pool.close().await;
    }
    .instrument(info_span!("graceful_shutdown"))
    .await;

    info!("daily-nudge shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
