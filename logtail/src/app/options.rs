//! Application configuration options

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::app::settings::Settings;
use crate::errors::LogsError;
use crate::models::log::{parse_timestamp, Filters, LogType};
use crate::query::retry::RetryOptions;
use crate::viewer::coordinator::LogParams;

/// How lines are written to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Raw text, terminal styling kept
    #[default]
    Text,
    Html,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "html" => Ok(OutputFormat::Html),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Backend API base URL
    pub backend_base_url: String,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Organization used for the retention lookup
    pub organization_id: Option<String>,

    /// Fixed retention, bypassing the lookup
    pub logs_retention_days: Option<u32>,

    /// History query options
    pub query: QueryOptions,

    /// What to read
    pub params: LogParams,

    /// Output options
    pub output: OutputOptions,
}

/// History query options
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub page_size: u32,
    pub cache_capacity: u64,
    pub retry: RetryOptions,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            page_size: crate::viewer::history::PAGE_SIZE,
            cache_capacity: 64,
            retry: RetryOptions::default(),
        }
    }
}

/// Output options
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub format: OutputFormat,

    /// Older pages to load before printing history
    pub previous_pages: u32,
}

/// Default history span when no start is given
pub const DEFAULT_SINCE_MINUTES: i64 = 60;

impl AppOptions {
    /// Combine CLI arguments (`--key=value` pairs) with the settings file
    pub fn from_args(
        args: &HashMap<String, String>,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<Self, LogsError> {
        let deployment_id = args
            .get("deployment")
            .cloned()
            .ok_or_else(|| LogsError::ConfigError("--deployment=<id> is required".to_string()))?;

        let log_type = match args.get("type") {
            Some(value) => value.parse::<LogType>().map_err(LogsError::ConfigError)?,
            None => LogType::default(),
        };

        let end = match args.get("end") {
            Some(value) => parse_timestamp(value)?,
            None => now,
        };
        let start = match (args.get("start"), args.get("since")) {
            (Some(value), _) => parse_timestamp(value)?,
            (None, Some(value)) => {
                let minutes: i64 = value
                    .parse()
                    .map_err(|_| LogsError::ConfigError(format!("Invalid --since: {}", value)))?;
                minutes_before(end, minutes)
                    .ok_or_else(|| LogsError::ConfigError(format!("--since out of range: {}", value)))?
            }
            (None, None) => minutes_before(end, DEFAULT_SINCE_MINUTES).ok_or_else(|| {
                LogsError::ConfigError("--end is too early for the default window".to_string())
            })?,
        };

        let filters = Filters {
            log_type,
            deployment_id,
            instance_id: args.get("instance").cloned(),
            start,
            end,
        };
        filters.validate()?;

        let format = match args.get("format") {
            Some(value) => value.parse::<OutputFormat>().map_err(LogsError::ConfigError)?,
            None => OutputFormat::default(),
        };
        let previous_pages = match args.get("previous") {
            Some(value) => value
                .parse()
                .map_err(|_| LogsError::ConfigError(format!("Invalid --previous: {}", value)))?,
            None => 0,
        };

        // A bare --tail is stored as "true"
        let tail = match args.get("tail") {
            Some(value) => value
                .parse::<bool>()
                .map_err(|_| LogsError::ConfigError(format!("Invalid --tail: {}", value)))?,
            None => false,
        };

        Ok(Self {
            backend_base_url: settings.backend.base_url.clone(),
            request_timeout: Duration::from_secs(settings.backend.timeout_secs),
            organization_id: settings.organization_id.clone(),
            logs_retention_days: settings.logs_retention_days,
            query: QueryOptions {
                page_size: settings.page_size,
                cache_capacity: settings.cache_capacity,
                retry: settings.retry.clone(),
            },
            params: LogParams {
                tail,
                filters,
            },
            output: OutputOptions {
                format,
                previous_pages,
            },
        })
    }
}

fn minutes_before(end: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    chrono::Duration::try_minutes(minutes).and_then(|span| end.checked_sub_signed(span))
}
