//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::app::output::Printer;
use crate::authn::token::TokenProvider;
use crate::errors::LogsError;
use crate::http::client::HttpClient;
use crate::http::logs::HttpLogSource;
use crate::http::quotas::HttpQuotaProvider;
use crate::query::cache::{CachedPageSource, PageCache};
use crate::query::retry::RetryingPageSource;
use crate::transport::websocket::WebSocketTransport;
use crate::viewer::coordinator::{LogCoordinator, LogsView, Phase};
use crate::viewer::history::LogPageSource;
use crate::viewer::quota::{FixedQuota, QuotaProvider};
use crate::viewer::session::LogSession;
use crate::viewer::stream::StreamTailer;

/// Collaborators a session is built from
pub struct Components {
    pub source: Arc<dyn LogPageSource>,
    pub quota: Arc<dyn QuotaProvider>,
    pub tailer: StreamTailer,
}

/// Build the HTTP and WebSocket collaborators
pub fn build_components(
    options: &AppOptions,
    tokens: Arc<dyn TokenProvider>,
) -> Result<Components, LogsError> {
    let client = Arc::new(HttpClient::new(
        &options.backend_base_url,
        options.request_timeout,
    )?);

    let source = CachedPageSource::new(
        RetryingPageSource::new(
            HttpLogSource::new(client.clone(), tokens.clone()),
            options.query.retry.clone(),
        ),
        Arc::new(PageCache::new(options.query.cache_capacity)),
    );

    let quota: Arc<dyn QuotaProvider> = match (options.logs_retention_days, &options.organization_id) {
        (Some(days), _) => Arc::new(FixedQuota(Some(days))),
        (None, Some(organization_id)) => Arc::new(HttpQuotaProvider::new(
            client,
            tokens.clone(),
            organization_id.clone(),
        )),
        (None, None) => {
            return Err(LogsError::ConfigError(
                "Either organization_id or logs_retention_days must be configured".to_string(),
            ))
        }
    };

    let transport = WebSocketTransport::new(&options.backend_base_url, tokens)?;

    Ok(Components {
        source: Arc::new(source),
        quota,
        tailer: StreamTailer::new(Arc::new(transport)),
    })
}

/// Print history, then follow the tail until `shutdown_signal` fires
pub async fn run(
    options: AppOptions,
    components: Components,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), LogsError> {
    info!("Starting log session with options: {:?}", options.params);

    let coordinator =
        LogCoordinator::new(components.tailer).with_page_size(options.query.page_size);
    let session = LogSession::spawn(coordinator, components.source, components.quota);
    session.set_params(options.params.clone());

    let mut printer = Printer::new(options.output.format, std::io::stdout());
    let mut views = session.subscribe();
    let mut follow = HistoryProgress::new(options.output.previous_pages);
    let mut printed = 0;
    let mut last_error: Option<String> = None;

    tokio::pin!(shutdown_signal);
    let result = loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received, closing log session...");
                break Ok(());
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
            }
        }
        let view = views.borrow_and_update().clone();

        if let Some(e) = &view.error {
            let message = e.to_string();
            if last_error.as_ref() != Some(&message) {
                error!("{}", message);
                last_error = Some(message);
            }
            if view.phase == Phase::Idle && !view.loading {
                // Retention or filters unusable, nothing will ever load
                break Err(LogsError::Internal(e.to_string()));
            }
        }

        if !follow.done {
            match follow.step(&view) {
                Step::Wait => continue,
                Step::LoadPrevious => {
                    session.load_previous();
                    continue;
                }
                Step::Print => {}
            }
        }

        if view.lines.len() < printed {
            warn!("Log lines were reset, reprinting");
            printed = 0;
        }
        if let Err(e) = printer.print_all(&view.lines[printed..]) {
            break Err(e);
        }
        printed = view.lines.len();

        if !options.params.tail {
            break match view.error {
                Some(e) => Err(LogsError::Internal(e.to_string())),
                None => Ok(()),
            };
        }
    };

    session.shutdown().await;
    result
}

enum Step {
    Wait,
    LoadPrevious,
    Print,
}

/// Loads the requested number of older pages before history is printed
struct HistoryProgress {
    remaining: u32,
    awaiting_pages: Option<usize>,
    done: bool,
}

impl HistoryProgress {
    fn new(previous_pages: u32) -> Self {
        Self {
            remaining: previous_pages,
            awaiting_pages: None,
            done: false,
        }
    }

    fn step(&mut self, view: &LogsView) -> Step {
        if view.loading || view.fetching || view.phase == Phase::Idle {
            return Step::Wait;
        }
        if let Some(expected) = self.awaiting_pages {
            // The request may not have been picked up yet
            if view.pages < expected && view.error.is_none() {
                return Step::Wait;
            }
            self.awaiting_pages = None;
        }
        if self.remaining > 0 && view.has_previous && view.error.is_none() {
            self.remaining -= 1;
            self.awaiting_pages = Some(view.pages + 1);
            return Step::LoadPrevious;
        }
        self.done = true;
        Step::Print
    }
}
