//! Session tests

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

use logtail::errors::LogsError;
use logtail::transport::TransportEvent;
use logtail::viewer::coordinator::{LogsView, Phase};
use logtail::viewer::quota::{FixedQuota, QuotaProvider};
use logtail::viewer::session::LogSession;

use crate::support::{coordinator, filters, line, now, page, params, result_frame, FakeSource, FakeTransport};

struct FailingQuota;

#[async_trait::async_trait]
impl QuotaProvider for FailingQuota {
    async fn logs_retention(&self) -> Result<Option<u32>, LogsError> {
        Err(LogsError::QuotaError("organization not found".to_string()))
    }
}

async fn wait_for(view: &mut watch::Receiver<LogsView>, predicate: impl FnMut(&LogsView) -> bool) -> LogsView {
    timeout(StdDuration::from_secs(5), view.wait_for(predicate))
        .await
        .expect("timed out waiting for view")
        .expect("session stopped")
        .clone()
}

fn source() -> Arc<FakeSource> {
    Arc::new(FakeSource::new(page(
        vec![line("h2", 20, "second"), line("h1", 10, "first")],
        None,
    )))
}

#[tokio::test]
async fn test_session_loads_history() {
    let transport = Arc::new(FakeTransport::default());
    let source = source();
    let session = LogSession::spawn(coordinator(&transport), source.clone(), Arc::new(FixedQuota(Some(30))));
    let mut view = session.subscribe();

    session.set_params(params(false, filters(0)));
    let ready = wait_for(&mut view, |v| v.phase == Phase::Ready).await;

    let texts: Vec<_> = ready.lines.iter().map(|l| l.line.text.as_str()).collect();
    assert_eq!(texts, ["first", "second"]);
    assert!(!ready.loading);
    assert_eq!(source.queries().len(), 1);
    assert!(transport.opened().is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn test_session_streams_after_history() {
    let transport = Arc::new(FakeTransport::default());
    let session = LogSession::spawn(coordinator(&transport), source(), Arc::new(FixedQuota(Some(30))));
    let mut view = session.subscribe();

    session.set_params(params(true, filters(0)));
    wait_for(&mut view, |v| v.phase == Phase::Ready).await;
    assert_eq!(transport.opened().len(), 1);
    assert_eq!(transport.opened()[0].start, filters(0).end);

    transport.send(0, TransportEvent::Open);
    transport.send(0, TransportEvent::Message(result_frame(now() + Duration::seconds(1), "live")));
    let streaming = wait_for(&mut view, |v| v.phase == Phase::Streaming && v.lines.len() == 3).await;
    assert_eq!(streaming.lines[2].line.text, "live");

    session.shutdown().await;
    assert_eq!(transport.close_count(0), 1);
    assert_eq!(view.borrow().phase, Phase::Disposed);
}

#[tokio::test]
async fn test_session_reports_quota_failure() {
    let transport = Arc::new(FakeTransport::default());
    let source = source();
    let session = LogSession::spawn(coordinator(&transport), source.clone(), Arc::new(FailingQuota));
    let mut view = session.subscribe();

    session.set_params(params(true, filters(0)));
    let failed = wait_for(&mut view, |v| v.error.is_some()).await;
    assert!(!failed.loading);
    assert!(matches!(failed.error.as_deref(), Some(LogsError::QuotaError(_))));
    assert!(source.queries().is_empty());

    session.shutdown().await;
}
