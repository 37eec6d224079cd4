//! Backward pagination of historical log pages

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use openapi_client::models::QueryLogsResponse;
use tracing::{debug, warn};

use crate::errors::LogsError;
use crate::models::log::{
    format_timestamp, parse_timestamp, Filters, LogLine, LogType, LogWindow, PageCursor,
};

/// Number of lines requested per page
pub const PAGE_SIZE: u32 = 100;

/// One historical page query. Pages are always requested newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub log_type: LogType,
    pub deployment_id: String,
    pub instance_id: Option<String>,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
    pub limit: u32,
}

impl PageQuery {
    pub fn new(filters: &Filters, window: &LogWindow, limit: u32) -> Self {
        Self {
            log_type: filters.log_type,
            deployment_id: filters.deployment_id.clone(),
            instance_id: filters.instance_id.clone(),
            start: window.start,
            end: window.end,
            limit,
        }
    }

    /// Same query, moved to the given cursor
    pub fn at(&self, cursor: &PageCursor) -> Self {
        Self {
            start: cursor.start,
            end: cursor.end,
            ..self.clone()
        }
    }

    /// Request parameters, in the order the endpoint documents them
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("type", self.log_type.as_str().to_string()),
            ("deployment_id", self.deployment_id.clone()),
        ];
        if let Some(instance_id) = &self.instance_id {
            pairs.push(("instance_id", instance_id.clone()));
        }
        pairs.push(("start", format_timestamp(&self.start)));
        pairs.push(("end", format_timestamp(&self.end)));
        pairs.push(("order", "desc".to_string()));
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }

    /// Canonical cache key
    pub fn key(&self) -> String {
        self.query_pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// A page as returned by the backend, newest line first
#[derive(Debug, Clone)]
pub struct LogPage {
    pub lines: Vec<LogLine>,
    pub has_more: bool,
    pub next: Option<PageCursor>,
}

impl LogPage {
    pub fn from_response(response: QueryLogsResponse) -> Result<Self, LogsError> {
        let lines = response
            .data
            .into_iter()
            .map(LogLine::from_raw)
            .collect::<Result<Vec<_>, _>>()?;

        let pagination = response.pagination;
        let next = match (&pagination.next_start, &pagination.next_end) {
            (Some(start), Some(end)) => Some(PageCursor {
                start: parse_timestamp(start)?,
                end: parse_timestamp(end)?,
            }),
            _ => None,
        };
        if pagination.has_more && next.is_none() {
            warn!("Logs page reports more data without a cursor");
        }

        Ok(Self {
            lines,
            has_more: pagination.has_more,
            next,
        })
    }
}

/// Executes one historical page query
#[async_trait]
pub trait LogPageSource: Send + Sync {
    async fn query_page(&self, query: &PageQuery) -> Result<LogPage, LogsError>;
}

#[async_trait]
impl<T: LogPageSource + ?Sized> LogPageSource for Arc<T> {
    async fn query_page(&self, query: &PageQuery) -> Result<LogPage, LogsError> {
        (**self).query_page(query).await
    }
}

/// Which page a request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Newest page of the window
    First,
    /// Next older page
    Previous,
}

/// A page query to execute and hand back through [`HistoryFetcher::resolve`]
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub generation: u64,
    pub kind: PageKind,
    pub query: PageQuery,
}

/// Page state for one history window.
///
/// The fetcher never performs I/O itself: it hands out [`PageRequest`]s and
/// folds their results back in. Results tagged with an older generation are
/// dropped, and at most one request is outstanding at a time.
#[derive(Debug)]
pub struct HistoryFetcher {
    page_size: u32,
    base: Option<PageQuery>,
    /// Oldest page first, each in ascending time order
    pages: VecDeque<Vec<LogLine>>,
    cursor: Option<PageCursor>,
    has_more: bool,
    in_flight: Option<PageKind>,
    first_settled: bool,
    generation: u64,
    error: Option<Arc<LogsError>>,
}

impl HistoryFetcher {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            base: None,
            pages: VecDeque::new(),
            cursor: None,
            has_more: false,
            in_flight: None,
            first_settled: false,
            generation: 0,
            error: None,
        }
    }

    /// Start over on a new window.
    ///
    /// `None` means retention is not known yet: the fetcher stays disabled and
    /// nothing is requested.
    pub fn fetch(&mut self, filters: &Filters, window: Option<LogWindow>) -> Option<PageRequest> {
        self.reset();
        let window = window?;

        let query = PageQuery::new(filters, &window, self.page_size);
        debug!(
            start = %format_timestamp(&query.start),
            end = %format_timestamp(&query.end),
            "Requesting first logs page"
        );
        self.base = Some(query.clone());
        self.in_flight = Some(PageKind::First);
        Some(PageRequest {
            generation: self.generation,
            kind: PageKind::First,
            query,
        })
    }

    /// Request the next older page, unless one is already in flight or there is none
    pub fn load_previous(&mut self) -> Option<PageRequest> {
        if self.in_flight.is_some() {
            debug!("Ignoring load previous, a page is already in flight");
            return None;
        }
        if !self.has_previous() {
            return None;
        }
        let (Some(base), Some(cursor)) = (&self.base, &self.cursor) else {
            return None;
        };

        let query = base.at(cursor);
        self.in_flight = Some(PageKind::Previous);
        Some(PageRequest {
            generation: self.generation,
            kind: PageKind::Previous,
            query,
        })
    }

    /// Fold a page result in. Returns the kind of page applied, or `None` if stale.
    pub fn resolve(
        &mut self,
        generation: u64,
        result: Result<LogPage, LogsError>,
    ) -> Option<PageKind> {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Dropping stale logs page");
            return None;
        }
        let kind = self.in_flight.take()?;
        if kind == PageKind::First {
            self.first_settled = true;
        }

        match result {
            Ok(page) => {
                let mut lines = page.lines;
                lines.reverse();
                debug!(lines = lines.len(), has_more = page.has_more, ?kind, "Logs page resolved");
                match kind {
                    PageKind::First => {
                        self.pages.clear();
                        self.pages.push_back(lines);
                    }
                    PageKind::Previous => self.pages.push_front(lines),
                }
                self.has_more = page.has_more;
                self.cursor = page.next;
                self.error = None;
            }
            Err(e) => {
                warn!("Logs page request failed: {}", e);
                self.error = Some(Arc::new(e));
            }
        }
        Some(kind)
    }

    /// Drop all pages and invalidate anything in flight
    pub fn reset(&mut self) {
        self.generation += 1;
        self.base = None;
        self.pages.clear();
        self.cursor = None;
        self.has_more = false;
        self.in_flight = None;
        self.first_settled = false;
        self.error = None;
    }

    /// Lines of all loaded pages in ascending time order
    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.pages.iter().flatten()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn line_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    pub fn has_previous(&self) -> bool {
        self.has_more && self.cursor.is_some()
    }

    /// First page in flight
    pub fn loading(&self) -> bool {
        self.in_flight == Some(PageKind::First)
    }

    /// Any page in flight
    pub fn fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The first page has resolved, successfully or not
    pub fn is_settled(&self) -> bool {
        self.first_settled
    }

    pub fn is_enabled(&self) -> bool {
        self.base.is_some()
    }

    /// The window the first page was requested for
    pub fn window(&self) -> Option<LogWindow> {
        self.base.as_ref().map(|q| LogWindow {
            start: q.start,
            end: q.end,
        })
    }

    pub fn error(&self) -> Option<&Arc<LogsError>> {
        self.error.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for HistoryFetcher {
    fn default() -> Self {
        Self::new(PAGE_SIZE)
    }
}
