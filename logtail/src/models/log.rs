//! Log line, filter and window models

use chrono::{DateTime, SecondsFormat, Utc};
use openapi_client::models::{RawLogLine, RawStream};
use serde::{Deserialize, Serialize};

use crate::errors::LogsError;
use crate::utils::generate_uuid;

/// Kind of logs to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Build,
    #[default]
    Runtime,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Build => "build",
            LogType::Runtime => "runtime",
        }
    }
}

impl std::str::FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(LogType::Build),
            "runtime" => Ok(LogType::Runtime),
            _ => Err(format!("Invalid log type: {}", s)),
        }
    }
}

/// Output stream a line was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogStream {
    #[serde(rename = "stdout")]
    Stdout,
    #[serde(rename = "stderr")]
    Stderr,
    #[serde(rename = "platform-internal")]
    Platform,
}

impl From<RawStream> for LogStream {
    fn from(raw: RawStream) -> Self {
        match raw {
            RawStream::Stdout => LogStream::Stdout,
            RawStream::Stderr => LogStream::Stderr,
            RawStream::Platform => LogStream::Platform,
        }
    }
}

/// A single log line, the unit of display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub id: String,
    pub date: DateTime<Utc>,
    pub stream: LogStream,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Raw message, may contain terminal styling sequences
    pub text: String,
}

impl LogLine {
    /// Map a wire line to a log line with a fresh local id
    pub fn from_raw(raw: RawLogLine) -> Result<Self, LogsError> {
        Ok(Self {
            id: generate_uuid(),
            date: parse_timestamp(&raw.created_at)?,
            stream: raw.labels.stream.into(),
            instance_id: raw.labels.instance_id,
            text: raw.msg,
        })
    }
}

/// Format a timestamp the way the backend expects it
pub fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp sent by the backend
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, LogsError> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| LogsError::ValidationError(format!("Invalid timestamp '{}': {}", value, e)))
}

/// A bounded time range, `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LogWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, LogsError> {
        if start > end {
            return Err(LogsError::ValidationError(format!(
                "Window start {} is after end {}",
                format_timestamp(&start),
                format_timestamp(&end)
            )));
        }
        Ok(Self { start, end })
    }
}

/// Position of the next (older) history page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Filters selecting which logs to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub log_type: LogType,
    pub deployment_id: String,
    pub instance_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Filters {
    /// Check the filters can drive a query
    pub fn validate(&self) -> Result<(), LogsError> {
        if self.deployment_id.trim().is_empty() {
            return Err(LogsError::ValidationError(
                "Deployment ID must not be empty".to_string(),
            ));
        }
        LogWindow::new(self.start, self.end)?;
        Ok(())
    }

    /// The requested window, before retention clamping
    pub fn window(&self) -> Result<LogWindow, LogsError> {
        LogWindow::new(self.start, self.end)
    }

    /// Canonical identity of the history query these filters produce
    pub fn history_key(&self) -> String {
        format!(
            "type={}&deployment_id={}&instance_id={}&start={}&end={}",
            self.log_type.as_str(),
            self.deployment_id,
            self.instance_id.as_deref().unwrap_or(""),
            format_timestamp(&self.start),
            format_timestamp(&self.end),
        )
    }

    /// Tail parameters starting at the requested end
    pub fn tail_params(&self) -> TailParams {
        TailParams {
            log_type: self.log_type,
            deployment_id: self.deployment_id.clone(),
            instance_id: self.instance_id.clone(),
            start: self.end,
        }
    }
}

/// Parameters of one live tail connection. There is no end: the tail is open-ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailParams {
    pub log_type: LogType,
    pub deployment_id: String,
    pub instance_id: Option<String>,
    pub start: DateTime<Utc>,
}

impl TailParams {
    /// Canonical identity; a different key means the connection must be replaced
    pub fn key(&self) -> String {
        format!(
            "type={}&deployment_id={}&instance_id={}&start={}",
            self.log_type.as_str(),
            self.deployment_id,
            self.instance_id.as_deref().unwrap_or(""),
            format_timestamp(&self.start),
        )
    }

    /// Query parameters sent when opening the stream
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("type", self.log_type.as_str().to_string()),
            ("deployment_id", self.deployment_id.clone()),
            ("start", format_timestamp(&self.start)),
        ];
        if let Some(instance_id) = &self.instance_id {
            pairs.push(("instance_id", instance_id.clone()));
        }
        pairs
    }
}
