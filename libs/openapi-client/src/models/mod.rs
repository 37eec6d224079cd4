//! API models

use serde::{Deserialize, Serialize};

/// Stream label attached to every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawStream {
    #[serde(rename = "stdout")]
    Stdout,
    #[serde(rename = "stderr")]
    Stderr,
    #[serde(rename = "platform-internal")]
    Platform,
}

/// Labels of a raw log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLabels {
    pub stream: RawStream,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// A log line as sent by the backend, both by the query endpoint and the tail stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogLine {
    /// ISO-8601 emission time
    pub created_at: String,
    pub labels: RawLabels,
    pub msg: String,
}

/// Pagination block of a logs query response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_end: Option<String>,
}

/// Response of `GET /v1/streams/logs/query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogsResponse {
    #[serde(default)]
    pub data: Vec<RawLogLine>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Error payload carried by a stream frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultFrame {
    pub result: RawLogLine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorFrame {
    pub error: FrameError,
}

/// One inbound frame of the tail stream. Exactly one of the two shapes is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamFrame {
    Result(ResultFrame),
    Error(ErrorFrame),
}

/// Organization quotas, only the fields the log viewer reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quotas {
    /// Log retention in days
    #[serde(default)]
    pub logs_retention: Option<u32>,
}

/// Response of `GET /v1/organizations/{id}/quotas`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotasResponse {
    #[serde(default)]
    pub quotas: Quotas,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
