//! Fakes shared by the viewer tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;

use logtail::errors::LogsError;
use logtail::models::log::{Filters, LogLine, LogStream, LogType, PageCursor, TailParams};
use logtail::transport::{Transport, TransportConnection, TransportEvent, TransportHandle};
use logtail::viewer::coordinator::{LogCoordinator, LogParams};
use logtail::viewer::history::{LogPage, LogPageSource, PageQuery};
use logtail::viewer::stream::StreamTailer;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
}

/// Filters covering the hour before `end_offset_mins` relative to [`now`]
pub fn filters(end_offset_mins: i64) -> Filters {
    let end = now() + Duration::minutes(end_offset_mins);
    Filters {
        log_type: LogType::Runtime,
        deployment_id: "dep-1".to_string(),
        instance_id: None,
        start: end - Duration::hours(1),
        end,
    }
}

pub fn params(tail: bool, filters: Filters) -> LogParams {
    LogParams { tail, filters }
}

/// A line emitted `offset_secs` after one hour ago
pub fn line(id: &str, offset_secs: i64, text: &str) -> LogLine {
    LogLine {
        id: id.to_string(),
        date: now() - Duration::hours(1) + Duration::seconds(offset_secs),
        stream: LogStream::Stdout,
        instance_id: None,
        text: text.to_string(),
    }
}

/// A page holding `lines` newest first, the way the backend returns them
pub fn page(lines: Vec<LogLine>, next: Option<PageCursor>) -> LogPage {
    LogPage {
        lines,
        has_more: next.is_some(),
        next,
    }
}

pub fn result_frame(created_at: DateTime<Utc>, msg: &str) -> String {
    serde_json::json!({
        "result": {
            "created_at": created_at.to_rfc3339(),
            "labels": { "stream": "stdout" },
            "msg": msg,
        }
    })
    .to_string()
}

struct FakeHandle {
    closes: Arc<AtomicUsize>,
}

impl TransportHandle for FakeHandle {
    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct Connection {
    params: TailParams,
    sender: mpsc::UnboundedSender<TransportEvent>,
    closes: Arc<AtomicUsize>,
}

/// Records every connection and lets the test drive its events
#[derive(Default)]
pub struct FakeTransport {
    connections: Mutex<Vec<Connection>>,
}

impl FakeTransport {
    pub fn opened(&self) -> Vec<TailParams> {
        let connections = self.connections.lock().unwrap();
        connections.iter().map(|c| c.params.clone()).collect()
    }

    pub fn close_count(&self, index: usize) -> usize {
        self.connections.lock().unwrap()[index].closes.load(Ordering::SeqCst)
    }

    pub fn send(&self, index: usize, event: TransportEvent) {
        let connections = self.connections.lock().unwrap();
        let _ = connections[index].sender.send(event);
    }
}

impl Transport for FakeTransport {
    fn open(&self, params: &TailParams) -> TransportConnection {
        let (sender, events) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));
        self.connections.lock().unwrap().push(Connection {
            params: params.clone(),
            sender,
            closes: closes.clone(),
        });
        TransportConnection {
            events,
            handle: Box::new(FakeHandle { closes }),
        }
    }
}

pub fn coordinator(transport: &Arc<FakeTransport>) -> LogCoordinator {
    let transport: Arc<dyn Transport> = transport.clone();
    LogCoordinator::new(StreamTailer::new(transport)).with_clock(Arc::new(now))
}

/// Serves a fixed page and records the queries it was asked
pub struct FakeSource {
    page: LogPage,
    queries: Mutex<Vec<PageQuery>>,
}

impl FakeSource {
    pub fn new(page: LogPage) -> Self {
        Self {
            page,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<PageQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogPageSource for FakeSource {
    async fn query_page(&self, query: &PageQuery) -> Result<LogPage, LogsError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.page.clone())
    }
}
