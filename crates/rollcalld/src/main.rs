//! rollcalld - The rollcall background service
//!
//! Wires together:
//! - Configuration loading
//! - The attendance store
//! - Calendar, messaging, browser and credential adapters
//! - The monitor that plans windows and supervises sessions

use anyhow::{Context, Result, bail};
use clap::Parser;
use rollcall_adapter_api::{BrowserDriver, CredentialProvider};
use rollcall_adapters::{EnvCredentials, GoogleCalendar, SlackMessaging, WebDriverBrowser};
use rollcall_config::{MonitorConfig, load_config};
use rollcall_core::{Collaborators, Monitor, SystemClock};
use rollcall_store::{AttendanceStore, SqliteStore};
use rollcall_util::{
    MOCK_TIME_ENV_VAR, default_config_path, format_datetime_full, is_mock_time_active, now,
    parse_local_datetime,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// rollcalld - Joins scheduled video sessions and takes attendance
#[derive(Parser, Debug)]
#[command(name = "rollcalld")]
#[command(about = "Joins scheduled video sessions, admits guests and posts attendance", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rollcall/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// End of the monitoring horizon, e.g. "2025-12-25 18:00:00" (overrides schedule.horizon_end)
    #[arg(short, long, env = "ROLLCALL_UNTIL")]
    until: Option<String>,

    /// Data directory override (or set ROLLCALL_DATA_DIR env var)
    #[arg(short, long, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(args: &Args) -> Result<MonitorConfig> {
    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(until) = &args.until {
        let horizon_end = parse_local_datetime(until)
            .with_context(|| format!("Invalid --until value {:?}", until))?;
        config.schedule.horizon_end = Some(horizon_end);
    }
    if let Some(data_dir) = &args.data_dir {
        config.service.data_dir = data_dir.clone();
    }

    info!(
        config_path = %args.config.display(),
        calendar = %config.calendar.calendar_id,
        channel = %config.messaging.channel_id,
        "Configuration loaded"
    );
    Ok(config)
}

fn open_store(config: &MonitorConfig) -> Result<Option<Arc<dyn AttendanceStore>>> {
    if !config.service.record_attendance {
        info!("Attendance recording disabled");
        return Ok(None);
    }

    let db_path = config.service.data_dir.join("rollcall.db");
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;
    if !store.is_healthy() {
        bail!("Database {:?} is not usable", db_path);
    }
    info!(db_path = %db_path.display(), "Store initialized");
    Ok(Some(Arc::new(store)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");
    if is_mock_time_active() {
        warn!(
            var = MOCK_TIME_ENV_VAR,
            now = %format_datetime_full(&now()),
            "Mock time is active"
        );
    }

    let config = load(&args)?;
    let Some(horizon_end) = config.schedule.horizon_end else {
        bail!("No monitoring horizon: set schedule.horizon_end or pass --until");
    };
    if horizon_end <= now() {
        warn!(horizon_end = %format_datetime_full(&horizon_end), "Horizon is already in the past");
    }

    if args.check {
        println!("Configuration is valid");
        println!("  Horizon end: {}", format_datetime_full(&horizon_end));
        return Ok(());
    }

    let store = open_store(&config)?;
    let credentials = Arc::new(EnvCredentials::new(&config.credentials));
    if config.credentials.interactive {
        // Ask now, while someone is at the terminal; every session reuses the answer
        credentials
            .credentials()
            .await
            .context("Failed to read sign-in credentials")?;
    }

    let browser = Arc::new(WebDriverBrowser::new(&config.browser));
    let collaborators = Collaborators {
        calendar: Arc::new(GoogleCalendar::new(&config.calendar)),
        browser: browser.clone(),
        messaging: Arc::new(SlackMessaging::new(&config.messaging)),
        credentials,
        store,
    };
    let clock = Arc::new(SystemClock::new(config.schedule.sleep_slice));
    let monitor =
        Monitor::new(&config, collaborators, clock).context("Failed to initialize monitor")?;

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    info!(horizon_end = %format_datetime_full(&monitor.horizon_end()), "Monitoring started");

    tokio::select! {
        summary = monitor.run() => {
            info!(
                sessions = summary.sessions_run,
                closed = summary.sessions_closed,
                failed = summary.sessions_failed,
                windows_failed = summary.windows_failed,
                "rollcalld finished"
            );
            return Ok(());
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    // Dropping the monitor aborts every pending trigger and supervisor
    drop(monitor);
    let closed = browser.close_all().await;
    if browser.open_sessions() > 0 {
        error!(
            remaining = browser.open_sessions(),
            "Some browser contexts could not be closed"
        );
    }
    info!(closed, "Run interrupted");
    Ok(())
}
