//! Live tail over a supervised transport connection

use std::sync::Arc;

use openapi_client::models::StreamFrame;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::LogsError;
use crate::models::log::{format_timestamp, LogLine, TailParams};
use crate::transport::{Transport, TransportEvent, TransportHandle};

/// What a tail reports to its owner
#[derive(Debug)]
pub enum StreamEvent {
    Opened,
    Closed,
    Error(LogsError),
    Line(LogLine),
}

/// Parse one inbound frame.
///
/// Anything other than a well-formed `{result}` or `{error}` frame is a
/// protocol violation.
pub fn parse_frame(text: &str) -> Result<LogLine, LogsError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| LogsError::Protocol(format!("frame is not valid JSON: {}", e)))?;
    let frame: StreamFrame = serde_json::from_value(value).map_err(|_| {
        LogsError::Protocol(format!(
            "frame matches neither {{result}} nor {{error}}: {}",
            truncate(text, 200)
        ))
    })?;

    match frame {
        StreamFrame::Result(frame) => LogLine::from_raw(frame.result)
            .map_err(|e| LogsError::Protocol(format!("invalid log line: {}", e))),
        StreamFrame::Error(frame) => Err(LogsError::Stream(frame.error.message)),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Opens tails on a transport
#[derive(Clone)]
pub struct StreamTailer {
    transport: Arc<dyn Transport>,
}

impl StreamTailer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Open a tail. The connection starts at `params.start` and has no end.
    pub fn open(&self, params: TailParams) -> Tail {
        info!(
            deployment_id = %params.deployment_id,
            start = %format_timestamp(&params.start),
            "Opening logs tail"
        );
        let connection = self.transport.open(&params);
        Tail {
            key: params.key(),
            params,
            events: Some(connection.events),
            handle: Some(connection.handle),
        }
    }
}

/// One live connection. Performs no reconnection of its own.
pub struct Tail {
    params: TailParams,
    key: String,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    handle: Option<Box<dyn TransportHandle>>,
}

impl Tail {
    pub fn params(&self) -> &TailParams {
        &self.params
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next event. Never resolves once the tail is closed or the
    /// transport reported its close.
    pub async fn next_event(&mut self) -> StreamEvent {
        let Some(events) = self.events.as_mut() else {
            return std::future::pending().await;
        };

        match events.recv().await {
            Some(TransportEvent::Open) => {
                debug!(key = %self.key, "Logs tail open");
                StreamEvent::Opened
            }
            Some(TransportEvent::Message(text)) => match parse_frame(&text) {
                Ok(line) => StreamEvent::Line(line),
                Err(e) => {
                    warn!("Logs tail frame rejected: {}", e);
                    StreamEvent::Error(e)
                }
            },
            Some(TransportEvent::Error(message)) => StreamEvent::Error(LogsError::Transport(message)),
            Some(TransportEvent::Close) | None => {
                self.events = None;
                StreamEvent::Closed
            }
        }
    }

    /// Stop listening and close the connection. Idempotent.
    pub fn close(&mut self) {
        self.events = None;
        if let Some(mut handle) = self.handle.take() {
            debug!(key = %self.key, "Closing logs tail");
            handle.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }
}

impl Drop for Tail {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Tail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tail")
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}
