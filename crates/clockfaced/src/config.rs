use chrono::Duration;
use clockface_core::{LivenessConfig, MatcherConfig};
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the descriptor encryption key file (created on first run).
    pub key_path: PathBuf,
    /// Path to the TOML work-schedule configuration.
    pub schedule_path: PathBuf,
    /// Euclidean distance threshold for an accepted match.
    pub distance_threshold: f32,
    /// Minimum distance gap to the runner-up candidate (0 disables).
    pub separation_margin: f32,
    /// Centroid displacement that counts as voluntary motion, in the
    /// coordinate space of the landmark stream.
    pub movement_threshold: f32,
    /// Hard timeout for a liveness session, in seconds.
    pub liveness_timeout_secs: i64,
    /// Consecutive no-face ticks tolerated before a liveness session fails.
    pub max_missed_ticks: u32,
}

impl Config {
    /// Load configuration from `CLOCKFACE_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("clockface");

        let db_path = std::env::var("CLOCKFACE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));
        let key_path = std::env::var("CLOCKFACE_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("descriptor.key"));
        let schedule_path = std::env::var("CLOCKFACE_SCHEDULE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/etc/clockface/schedules.toml"));

        Self {
            db_path,
            key_path,
            schedule_path,
            distance_threshold: env_f32("CLOCKFACE_DISTANCE_THRESHOLD", 0.5),
            separation_margin: env_f32("CLOCKFACE_SEPARATION_MARGIN", 0.1),
            movement_threshold: env_f32("CLOCKFACE_MOVEMENT_THRESHOLD", 20.0),
            liveness_timeout_secs: env_i64("CLOCKFACE_LIVENESS_TIMEOUT_SECS", 20),
            max_missed_ticks: env_u32("CLOCKFACE_MAX_MISSED_TICKS", 30),
        }
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            distance_threshold: self.distance_threshold,
            separation_margin: self.separation_margin,
        }
    }

    pub fn liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            movement_threshold: self.movement_threshold,
            timeout: Duration::seconds(self.liveness_timeout_secs),
            max_missed_ticks: self.max_missed_ticks,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
