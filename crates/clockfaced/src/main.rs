use anyhow::{Context, Result};
use clockface_core::schedule::ScheduleBook;
use clockface_core::DescriptorMatcher;
use clockface_store::{AttendanceStore, DescriptorCipher};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::Config;
use dbus_interface::TimeclockService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("clockfaced starting");

    let config = Config::from_env();

    // Fail fast: key, database, and schedule configuration must all be
    // usable before the service goes on the bus.
    let cipher = DescriptorCipher::from_key_file(&config.key_path)
        .with_context(|| format!("descriptor key at {}", config.key_path.display()))?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let store = AttendanceStore::open(&config.db_path, cipher)
        .await
        .with_context(|| format!("attendance store at {}", config.db_path.display()))?;

    let raw = std::fs::read_to_string(&config.schedule_path)
        .with_context(|| format!("schedule file at {}", config.schedule_path.display()))?;
    let schedules: ScheduleBook = toml::from_str(&raw)
        .with_context(|| format!("parsing {}", config.schedule_path.display()))?;
    schedules.validate().context("schedule validation")?;
    tracing::info!(
        default = schedules.has_default(),
        overrides = schedules.override_count(),
        "schedule configuration loaded"
    );

    let matcher = DescriptorMatcher::new(config.matcher_config());
    let engine = engine::spawn_engine(store, schedules, matcher, config.liveness_config());

    let _conn = zbus::connection::Builder::system()?
        .name("io.clockface.Timeclock1")?
        .serve_at("/io/clockface/Timeclock1", TimeclockService::new(engine))?
        .build()
        .await
        .context("registering on the system bus")?;

    tracing::info!("clockfaced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("clockfaced shutting down");

    Ok(())
}
