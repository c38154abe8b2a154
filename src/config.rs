use std::path::PathBuf;

use chrono_tz::Tz;
use tracing::debug;

use crate::overview::DEFAULT_DUE_SOON_DAYS;
use crate::{AppError, AppResult};

pub const DATA_DIR_ENV: &str = "SUBMON_DATA_DIR";
pub const TZ_ENV: &str = "SUBMON_TZ";
pub const DUE_SOON_DAYS_ENV: &str = "SUBMON_DUE_SOON_DAYS";
pub const LOG_ENV: &str = "SUBMON_LOG";
pub const LOG_FORMAT_ENV: &str = "SUBMON_LOG_FORMAT";
pub const LOG_DIR_ENV: &str = "SUBMON_LOG_DIR";

pub const DEFAULT_LOG_FILTER: &str = "submon=info";
pub const APP_DIR_NAME: &str = "subscription-monitor";

pub const CONFIG_TIMEZONE_UNKNOWN: &str = "CONFIG/TIMEZONE_UNKNOWN";
pub const CONFIG_INVALID_NUMBER: &str = "CONFIG/INVALID_NUMBER";
pub const CONFIG_NO_DATA_DIR: &str = "CONFIG/NO_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
    pub file_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
            file_dir: None,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            filter: non_empty(lookup(LOG_ENV))
                .or_else(|| non_empty(lookup("RUST_LOG")))
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json: lookup(LOG_FORMAT_ENV)
                .map(|v| v.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            file_dir: non_empty(lookup(LOG_DIR_ENV)).map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub timezone: Tz,
    pub due_soon_days: i64,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match non_empty(lookup(DATA_DIR_ENV)) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let timezone = match non_empty(lookup(TZ_ENV)) {
            Some(name) => parse_timezone(&name)?,
            None => device_timezone(),
        };

        let due_soon_days = match non_empty(lookup(DUE_SOON_DAYS_ENV)) {
            Some(raw) => raw.trim().parse::<i64>().map_err(|err| {
                AppError::new(CONFIG_INVALID_NUMBER, "Expected a whole number of days")
                    .with_context("variable", DUE_SOON_DAYS_ENV)
                    .with_context("value", raw.clone())
                    .with_context("error", err.to_string())
            })?,
            None => DEFAULT_DUE_SOON_DAYS,
        };

        Ok(Self {
            data_dir,
            timezone,
            due_soon_days,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_data_dir() -> AppResult<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| {
            AppError::new(
                CONFIG_NO_DATA_DIR,
                format!("No platform data directory; set {DATA_DIR_ENV}"),
            )
        })
}

pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.trim().parse::<Tz>().map_err(|_| {
        AppError::new(
            CONFIG_TIMEZONE_UNKNOWN,
            "Timezone identifier could not be resolved to a known location.",
        )
        .with_context("timezone", name.to_string())
    })
}

/// The device zone when it can be determined and parsed, otherwise UTC.
pub fn device_timezone() -> Tz {
    match iana_time_zone::get_timezone() {
        Ok(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            debug!(target: "submon", event = "device_tz_unparsed", tz = %name);
            Tz::UTC
        }),
        Err(err) => {
            debug!(target: "submon", event = "device_tz_unavailable", error = %err);
            Tz::UTC
        }
    }
}
