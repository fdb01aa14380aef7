use crate::error::{config_error, env_error, DashResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default location of the timetable file served by the host application
pub const DEFAULT_RESOURCE_PATH: &str = "timetable/timetable.ics";

/// Path of the component configuration file
const COMPONENTS_FILE: &str = "config/components.toml";

/// Main configuration structure for the dashboard core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,
    /// IANA timezone used for "today" and day grouping
    pub timezone: String,
    /// Base URL of the host application serving static files
    pub timetable_base_url: String,
    /// Relative path of the timetable file under the base URL
    pub timetable_resource_path: String,
    /// Remote export endpoint for identifier-keyed fetches
    pub timetable_export_url: Option<String>,
    /// Value of the `type` query parameter sent to the export endpoint
    pub timetable_export_type: String,
    /// Poll the static endpoint periodically
    pub auto_refresh: bool,
    /// Seconds between static endpoint polls
    pub poll_interval: u64,
    /// Hours after which a snapshot is considered stale
    pub stale_after_hours: i64,
    /// Seconds between staleness checks
    pub staleness_check_interval: u64,
    /// Map of component names to their enabled status
    pub components: HashMap<String, bool>,
}

impl Default for Config {
    fn default() -> Self {
        let mut components = HashMap::new();
        components.insert("timetable".to_string(), true);

        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            timezone: "UTC".to_string(),
            timetable_base_url: "http://127.0.0.1:3000/".to_string(),
            timetable_resource_path: DEFAULT_RESOURCE_PATH.to_string(),
            timetable_export_url: None,
            timetable_export_type: "csv".to_string(),
            auto_refresh: true,
            poll_interval: 300,
            stale_after_hours: 24,
            staleness_check_interval: 3600,
            components,
        }
    }
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> DashResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let redis_url = env::var("REDIS_URL").unwrap_or(defaults.redis_url);
        let timezone = env::var("TIMEZONE").unwrap_or(defaults.timezone);
        let timetable_base_url =
            env::var("TIMETABLE_BASE_URL").unwrap_or(defaults.timetable_base_url);
        let timetable_resource_path =
            env::var("TIMETABLE_RESOURCE_PATH").unwrap_or(defaults.timetable_resource_path);
        let timetable_export_url = env::var("TIMETABLE_EXPORT_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let timetable_export_type =
            env::var("TIMETABLE_EXPORT_TYPE").unwrap_or(defaults.timetable_export_type);

        let auto_refresh = parse_var("TIMETABLE_AUTO_REFRESH", defaults.auto_refresh)?;
        let poll_interval = parse_var("TIMETABLE_POLL_INTERVAL", defaults.poll_interval)?;
        let stale_after_hours =
            parse_var("TIMETABLE_STALE_AFTER_HOURS", defaults.stale_after_hours)?;
        let staleness_check_interval = parse_var(
            "TIMETABLE_STALENESS_CHECK_INTERVAL",
            defaults.staleness_check_interval,
        )?;

        // Load components configuration from file if it exists
        let mut components = defaults.components;
        merge_components_file(Path::new(COMPONENTS_FILE), &mut components)?;

        let config = Config {
            redis_url,
            timezone,
            timetable_base_url,
            timetable_resource_path,
            timetable_export_url,
            timetable_export_type,
            auto_refresh,
            poll_interval,
            stale_after_hours,
            staleness_check_interval,
            components,
        };

        // Fail early on an unknown timezone
        config.tz()?;

        Ok(config)
    }

    /// Parsed timezone
    pub fn tz(&self) -> DashResult<Tz> {
        Tz::from_str(&self.timezone)
            .map_err(|_| config_error(&format!("Unknown timezone: {}", self.timezone)))
    }

    /// Check if a component is enabled
    pub fn is_component_enabled(&self, name: &str) -> bool {
        *self.components.get(name).unwrap_or(&false)
    }
}

/// Read an optional environment variable, falling back to a default
fn parse_var<T: FromStr>(name: &str, default: T) -> DashResult<T> {
    match env::var(name) {
        Ok(value) => value.trim().parse::<T>().map_err(|_| env_error(name)),
        Err(_) => Ok(default),
    }
}

/// Override component switches from a TOML file; a missing file changes nothing
fn merge_components_file(path: &Path, components: &mut HashMap<String, bool>) -> DashResult<()> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let file_components: HashMap<String, bool> = toml::from_str(&content)?;
    components.extend(file_components);
    Ok(())
}
