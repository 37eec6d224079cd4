//! Combines retention, history, live tail and formatting into one read model

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::errors::LogsError;
use crate::models::log::{format_timestamp, Filters, LogLine, LogWindow, TailParams};
use crate::viewer::ansi::HtmlCache;
use crate::viewer::history::{HistoryFetcher, LogPage, PageKind, PageRequest, PAGE_SIZE};
use crate::viewer::retention::clamp_window;
use crate::viewer::stream::{StreamEvent, StreamTailer, Tail};

/// Source of "now"
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What the viewer asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogParams {
    pub tail: bool,
    pub filters: Filters,
}

/// Coordinator state for the current `(tail, filters)` identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Retention quota or filters not known yet
    Idle,
    /// First history page requested
    HistoryLoading,
    /// First page settled; a tail is opening if requested
    Ready,
    /// Tail connected
    Streaming,
    /// Terminal: the hosting context is gone
    Disposed,
}

/// A line ready for display
#[derive(Debug, Clone, Serialize)]
pub struct DisplayLine {
    #[serde(flatten)]
    pub line: LogLine,
    #[serde(serialize_with = "serialize_str")]
    pub html: Arc<str>,
}

/// The read model exposed to the UI
#[derive(Debug, Clone, Serialize)]
pub struct LogsView {
    #[serde(serialize_with = "serialize_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<Arc<LogsError>>,
    pub lines: Vec<DisplayLine>,
    pub loading: bool,
    pub fetching: bool,
    pub has_previous: bool,
    /// Number of history pages loaded
    pub pages: usize,
    pub phase: Phase,
}

impl Default for LogsView {
    fn default() -> Self {
        Self {
            error: None,
            lines: Vec::new(),
            loading: true,
            fetching: false,
            has_previous: false,
            pages: 0,
            phase: Phase::Idle,
        }
    }
}

fn serialize_str<S: Serializer>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value)
}

fn serialize_error<S: Serializer>(
    value: &Option<Arc<LogsError>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Check that the tail picks up exactly where the history window ends
pub fn ensure_aligned(window: &LogWindow, tail: &TailParams) -> Result<(), LogsError> {
    if window.end != tail.start {
        return Err(LogsError::Misaligned {
            window_end: format_timestamp(&window.end),
            tail_start: format_timestamp(&tail.start),
        });
    }
    Ok(())
}

/// State machine behind the logs viewer.
///
/// Page I/O is performed by the caller: every method that needs a page
/// returns a [`PageRequest`] to execute and feed back through
/// [`LogCoordinator::resolve_page`]. The live tail is owned here and read
/// through [`LogCoordinator::next_stream_event`].
pub struct LogCoordinator {
    tailer: StreamTailer,
    clock: Clock,
    params: Option<LogParams>,
    retention_days: Option<u32>,
    history: HistoryFetcher,
    tail: Option<Tail>,
    connected: bool,
    /// Lines received from the current tail, append-only
    buffer: Vec<LogLine>,
    stream_error: Option<Arc<LogsError>>,
    quota_error: Option<Arc<LogsError>>,
    params_error: Option<Arc<LogsError>>,
    disposed: bool,
}

impl LogCoordinator {
    pub fn new(tailer: StreamTailer) -> Self {
        Self {
            tailer,
            clock: Arc::new(Utc::now),
            params: None,
            retention_days: None,
            history: HistoryFetcher::new(PAGE_SIZE),
            tail: None,
            connected: false,
            buffer: Vec::new(),
            stream_error: None,
            quota_error: None,
            params_error: None,
            disposed: false,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.history = HistoryFetcher::new(page_size);
        self
    }

    /// Apply new parameters. Tears down and restarts whatever their identity change invalidates.
    pub fn set_params(&mut self, params: LogParams) -> Option<PageRequest> {
        if self.disposed {
            return None;
        }

        if let Err(e) = params.filters.validate() {
            warn!("Rejecting log filters: {}", e);
            self.teardown_tail("invalid filters");
            self.history.reset();
            self.params = None;
            self.params_error = Some(Arc::new(e));
            return None;
        }
        self.params_error = None;

        let history_changed = self
            .params
            .as_ref()
            .map_or(true, |p| p.filters.history_key() != params.filters.history_key());
        self.params = Some(params);

        let request = if history_changed {
            self.teardown_tail("filters changed");
            self.start_history()
        } else {
            None
        };
        self.sync_tail();
        request
    }

    /// Record the organization's retention. `None` keeps fetching suppressed.
    pub fn set_retention(&mut self, retention_days: Option<u32>) -> Option<PageRequest> {
        if self.disposed {
            return None;
        }
        self.quota_error = None;
        if self.retention_days == retention_days && self.history.is_enabled() {
            return None;
        }

        info!(?retention_days, "Log retention resolved");
        self.retention_days = retention_days;
        self.params.as_ref()?;
        self.teardown_tail("retention changed");
        let request = self.start_history();
        self.sync_tail();
        request
    }

    /// The quota lookup failed; nothing will be fetched
    pub fn set_quota_error(&mut self, error: LogsError) {
        if self.disposed {
            return;
        }
        warn!("Log retention lookup failed: {}", error);
        self.quota_error = Some(Arc::new(error));
    }

    /// Request the next older page; ignored while a page is in flight
    pub fn load_previous(&mut self) -> Option<PageRequest> {
        if self.disposed {
            return None;
        }
        self.history.load_previous()
    }

    /// Fold in the result of a page request
    pub fn resolve_page(&mut self, generation: u64, result: Result<LogPage, LogsError>) {
        if self.disposed {
            return;
        }
        if self.history.resolve(generation, result) == Some(PageKind::First) {
            self.sync_tail();
        }
    }

    /// Wait for the next event of the current tail. Pending while there is none.
    pub async fn next_stream_event(&mut self) -> StreamEvent {
        match self.tail.as_mut() {
            Some(tail) => tail.next_event().await,
            None => std::future::pending().await,
        }
    }

    /// Apply an event read from [`LogCoordinator::next_stream_event`]
    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        if self.tail.is_none() {
            return;
        }
        match event {
            StreamEvent::Opened => {
                self.connected = true;
            }
            StreamEvent::Line(line) => {
                let previous = self.buffer.last().or_else(|| self.history.lines().last());
                if previous.is_some_and(|p| p.date > line.date) {
                    debug!(id = %line.id, "Live line is older than the previous line");
                }
                self.buffer.push(line);
            }
            StreamEvent::Error(e) => {
                self.stream_error = Some(Arc::new(e));
            }
            StreamEvent::Closed => {
                // No automatic reconnection: the tail stays down until its identity changes
                info!("Logs tail closed");
                self.connected = false;
            }
        }
    }

    /// Terminal teardown
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.teardown_tail("disposed");
        self.history.reset();
        self.disposed = true;
    }

    pub fn phase(&self) -> Phase {
        if self.disposed {
            Phase::Disposed
        } else if self.params.is_none() || !self.history.is_enabled() {
            Phase::Idle
        } else if !self.history.is_settled() {
            Phase::HistoryLoading
        } else if self.tail.is_some() && self.connected {
            Phase::Streaming
        } else {
            Phase::Ready
        }
    }

    /// Parameters of the open tail, if any
    pub fn tail_params(&self) -> Option<&TailParams> {
        self.tail.as_ref().map(Tail::params)
    }

    pub fn live_line_count(&self) -> usize {
        self.buffer.len()
    }

    /// Build the externally visible state. Each distinct text is formatted once.
    pub fn view(&self) -> LogsView {
        let mut cache = HtmlCache::new();
        let lines = self
            .history
            .lines()
            .chain(self.buffer.iter())
            .map(|line| DisplayLine {
                html: cache.html(&line.text),
                line: line.clone(),
            })
            .collect();

        let error = self
            .history
            .error()
            .or(self.stream_error.as_ref())
            .or(self.quota_error.as_ref())
            .or(self.params_error.as_ref())
            .cloned();

        let quota_pending = self.retention_days.is_none() && self.quota_error.is_none();
        LogsView {
            error,
            lines,
            loading: !self.disposed && (quota_pending || self.history.loading()),
            fetching: self.history.fetching(),
            has_previous: self.history.has_previous(),
            pages: self.history.page_count(),
            phase: self.phase(),
        }
    }

    fn start_history(&mut self) -> Option<PageRequest> {
        let params = self.params.as_ref()?;
        let window = match (self.retention_days, params.filters.window()) {
            (Some(days), Ok(window)) => Some(clamp_window(window, Some(days), (self.clock)())),
            _ => None,
        };
        self.history.fetch(&params.filters, window)
    }

    /// The tail that should be open right now, if any
    fn desired_tail(&self) -> Option<Result<TailParams, LogsError>> {
        let params = self.params.as_ref()?;
        if !params.tail || !self.history.is_settled() {
            return None;
        }
        // The tail starts at the requested end; history must have been fetched up to it
        let window = self.history.window()?;
        let tail = params.filters.tail_params();
        Some(ensure_aligned(&window, &tail).map(|_| tail))
    }

    fn sync_tail(&mut self) {
        match self.desired_tail() {
            Some(Ok(desired)) => {
                if self.tail.as_ref().is_some_and(|t| t.key() == desired.key()) {
                    return;
                }
                self.teardown_tail("tail identity changed");
                self.tail = Some(self.tailer.open(desired));
            }
            Some(Err(e)) => {
                warn!("Not opening logs tail: {}", e);
                self.teardown_tail("misaligned tail");
                self.stream_error = Some(Arc::new(e));
            }
            None => self.teardown_tail("tail not wanted"),
        }
    }

    /// Close the tail and forget its lines
    fn teardown_tail(&mut self, reason: &str) {
        if let Some(mut tail) = self.tail.take() {
            info!(key = %tail.key(), reason, "Tearing down logs tail");
            tail.close();
        }
        self.buffer.clear();
        self.connected = false;
        self.stream_error = None;
    }
}

impl Drop for LogCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}
