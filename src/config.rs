use chrono::NaiveTime;
use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// 09:00 — the fixed lateness threshold. There is no per-employee shift
/// schedule; `WORK_START` overrides it globally.
static DEFAULT_WORK_START: Lazy<NaiveTime> =
    Lazy::new(|| NaiveTime::from_hms_opt(9, 0, 0).unwrap());

#[derive(Clone)]
pub struct Config {
    pub database_url: String,

    /// Check-ins strictly after this local time count as late.
    pub work_start: NaiveTime,

    /// Fixed metrics recompute interval (open sessions keep growing).
    pub tick_interval: Duration,
    /// Full-reload poll interval while the event feed is disconnected.
    pub reload_interval: Duration,

    /// Roster cache TTL.
    pub roster_cache_ttl: Duration,

    /// Roster role that receives clock-in/out notifications.
    pub supervisor_role: String,

    /// How many recent clock-in/out entries to keep for display.
    pub activity_log_len: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),

            work_start: env::var("WORK_START")
                .map(|s| s.parse().expect("WORK_START must be HH:MM:SS"))
                .unwrap_or(*DEFAULT_WORK_START),

            tick_interval: Duration::from_secs(
                env::var("METRICS_TICK_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap(),
            ),
            reload_interval: Duration::from_secs(
                env::var("RELOAD_POLL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap(),
            ),
            roster_cache_ttl: Duration::from_secs(
                env::var("ROSTER_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap(),
            ),

            supervisor_role: env::var("SUPERVISOR_ROLE").unwrap_or_else(|_| "hr".to_string()),

            activity_log_len: env::var("ACTIVITY_LOG_LEN")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            work_start: *DEFAULT_WORK_START,
            tick_interval: Duration::from_secs(30),
            reload_interval: Duration::from_secs(60),
            roster_cache_ttl: Duration::from_secs(300),
            supervisor_role: "hr".to_string(),
            activity_log_len: 10,
        }
    }
}
