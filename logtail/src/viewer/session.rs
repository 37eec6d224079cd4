//! Runs a coordinator on a task and publishes its read model

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::LogsError;
use crate::viewer::coordinator::{LogCoordinator, LogParams, LogsView};
use crate::viewer::history::{LogPage, LogPageSource, PageRequest};
use crate::viewer::quota::QuotaProvider;

enum Command {
    SetParams(LogParams),
    LoadPrevious,
    Shutdown,
}

enum Completion {
    Page {
        generation: u64,
        result: Result<LogPage, LogsError>,
    },
    Quota(Result<Option<u32>, LogsError>),
}

/// Handle to a running log session
pub struct LogSession {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<LogsView>,
    task: Option<JoinHandle<()>>,
}

impl LogSession {
    /// Spawn the session on the current runtime. The quota is looked up once, right away.
    pub fn spawn(
        coordinator: LogCoordinator,
        source: Arc<dyn LogPageSource>,
        quota: Arc<dyn QuotaProvider>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(coordinator.view());
        let task = tokio::spawn(run(coordinator, source, quota, commands_rx, view_tx));
        Self {
            commands: commands_tx,
            view: view_rx,
            task: Some(task),
        }
    }

    pub fn set_params(&self, params: LogParams) {
        let _ = self.commands.send(Command::SetParams(params));
    }

    /// Ask for the next older page; a no-op while a page is in flight
    pub fn load_previous(&self) {
        let _ = self.commands.send(Command::LoadPrevious);
    }

    /// Latest published view
    pub fn view(&self) -> LogsView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LogsView> {
        self.view.clone()
    }

    /// Stop the session and close its tail
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        // Ends the run loop, which disposes the coordinator
        let _ = self.commands.send(Command::Shutdown);
    }
}

fn fetch_page(source: Arc<dyn LogPageSource>, request: PageRequest) -> BoxFuture<'static, Completion> {
    async move {
        let result = source.query_page(&request.query).await;
        Completion::Page {
            generation: request.generation,
            result,
        }
    }
    .boxed()
}

async fn run(
    mut coordinator: LogCoordinator,
    source: Arc<dyn LogPageSource>,
    quota: Arc<dyn QuotaProvider>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<LogsView>,
) {
    debug!("Log session started");
    let mut work: FuturesUnordered<BoxFuture<'static, Completion>> = FuturesUnordered::new();
    work.push(async move { Completion::Quota(quota.logs_retention().await) }.boxed());

    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(Command::SetParams(params)) => {
                    if let Some(request) = coordinator.set_params(params) {
                        work.push(fetch_page(source.clone(), request));
                    }
                }
                Some(Command::LoadPrevious) => {
                    if let Some(request) = coordinator.load_previous() {
                        work.push(fetch_page(source.clone(), request));
                    }
                }
                Some(Command::Shutdown) | None => break,
            },
            Some(completion) = work.next(), if !work.is_empty() => match completion {
                Completion::Page { generation, result } => coordinator.resolve_page(generation, result),
                Completion::Quota(Ok(retention_days)) => {
                    if let Some(request) = coordinator.set_retention(retention_days) {
                        work.push(fetch_page(source.clone(), request));
                    }
                }
                Completion::Quota(Err(e)) => coordinator.set_quota_error(e),
            },
            event = coordinator.next_stream_event() => coordinator.handle_stream_event(event),
        }
        view.send_replace(coordinator.view());
    }

    coordinator.dispose();
    view.send_replace(coordinator.view());
    info!("Log session stopped");
}
