//! Coordinator unit tests

use std::sync::Arc;
use std::task::Poll;

use chrono::Duration;
use tokio_test::task;

use logtail::errors::LogsError;
use logtail::models::log::{LogWindow, PageCursor};
use logtail::transport::TransportEvent;
use logtail::viewer::coordinator::{ensure_aligned, LogCoordinator, Phase};
use logtail::viewer::history::PageKind;

use crate::support::{coordinator, filters, line, now, page, params, result_frame, FakeTransport};

/// Apply every stream event that is ready right now
fn pump(coordinator: &mut LogCoordinator) -> usize {
    let mut handled = 0;
    loop {
        let event = {
            let mut next = task::spawn(coordinator.next_stream_event());
            match next.poll() {
                Poll::Ready(event) => event,
                Poll::Pending => return handled,
            }
        };
        coordinator.handle_stream_event(event);
        handled += 1;
    }
}

/// Coordinator with retention known and the first page of `filters(0)` resolved
fn ready(transport: &Arc<FakeTransport>, tail: bool) -> LogCoordinator {
    let mut coordinator = coordinator(transport);
    assert!(coordinator.set_params(params(tail, filters(0))).is_none());
    let request = coordinator.set_retention(Some(30)).unwrap();
    coordinator.resolve_page(
        request.generation,
        Ok(page(vec![line("h2", 20, "second"), line("h1", 10, "first")], None)),
    );
    coordinator
}

#[test]
fn test_nothing_fetched_until_retention_known() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);

    assert!(coordinator.set_params(params(true, filters(0))).is_none());
    let view = coordinator.view();
    assert!(view.loading);
    assert!(view.lines.is_empty());
    assert_eq!(view.phase, Phase::Idle);
    assert!(transport.opened().is_empty());

    let request = coordinator.set_retention(Some(30)).unwrap();
    assert_eq!(request.kind, PageKind::First);
    assert_eq!(request.query.start, filters(0).start);
    assert_eq!(request.query.end, filters(0).end);
    assert_eq!(coordinator.phase(), Phase::HistoryLoading);
}

#[test]
fn test_unknown_retention_keeps_loading() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);

    coordinator.set_params(params(false, filters(0)));
    assert!(coordinator.set_retention(None).is_none());
    assert!(coordinator.view().loading);
    assert_eq!(coordinator.phase(), Phase::Idle);
}

#[test]
fn test_quota_error_stops_loading() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);

    coordinator.set_params(params(false, filters(0)));
    coordinator.set_quota_error(LogsError::QuotaError("forbidden".to_string()));
    let view = coordinator.view();
    assert!(!view.loading);
    assert!(matches!(view.error.as_deref(), Some(LogsError::QuotaError(_))));
}

#[test]
fn test_window_clamped_to_retention() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);

    let mut old = filters(0);
    old.start = now() - Duration::days(45);
    coordinator.set_params(params(false, old));
    let request = coordinator.set_retention(Some(30)).unwrap();
    assert_eq!(request.query.start, now() - Duration::days(30));
    assert_eq!(request.query.end, now());
}

#[test]
fn test_invalid_filters_reported() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);
    coordinator.set_retention(Some(30));

    let mut invalid = filters(0);
    invalid.deployment_id = String::new();
    assert!(coordinator.set_params(params(true, invalid)).is_none());
    assert!(matches!(
        coordinator.view().error.as_deref(),
        Some(LogsError::ValidationError(_))
    ));

    assert!(coordinator.set_params(params(true, filters(0))).is_some());
    assert!(coordinator.view().error.is_none());
}

#[test]
fn test_first_page_in_ascending_order() {
    let transport = Arc::new(FakeTransport::default());
    let coordinator = ready(&transport, false);

    let view = coordinator.view();
    let ids: Vec<_> = view.lines.iter().map(|l| l.line.id.as_str()).collect();
    assert_eq!(ids, ["h1", "h2"]);
    assert!(!view.loading);
    assert!(!view.fetching);
    assert!(!view.has_previous);
    assert_eq!(view.phase, Phase::Ready);
}

#[test]
fn test_tail_opens_after_first_page_at_window_end() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);

    coordinator.set_params(params(true, filters(0)));
    let request = coordinator.set_retention(Some(30)).unwrap();
    assert!(transport.opened().is_empty());

    coordinator.resolve_page(request.generation, Ok(page(vec![], None)));
    let opened = transport.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].start, filters(0).end);
    assert_eq!(opened[0].deployment_id, "dep-1");
    assert_eq!(coordinator.phase(), Phase::Ready);

    transport.send(0, TransportEvent::Open);
    assert_eq!(pump(&mut coordinator), 1);
    assert_eq!(coordinator.phase(), Phase::Streaming);
}

#[test]
fn test_live_lines_follow_history() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, true);

    transport.send(0, TransportEvent::Open);
    transport.send(0, TransportEvent::Message(result_frame(now() + Duration::seconds(1), "live one")));
    transport.send(0, TransportEvent::Message(result_frame(now() + Duration::seconds(2), "live two")));
    assert_eq!(pump(&mut coordinator), 3);

    let view = coordinator.view();
    let texts: Vec<_> = view.lines.iter().map(|l| l.line.text.as_str()).collect();
    assert_eq!(texts, ["first", "second", "live one", "live two"]);
    assert!(view.lines.windows(2).all(|w| w[0].line.date <= w[1].line.date));
    assert!(view.error.is_none());
    assert_eq!(coordinator.live_line_count(), 2);
}

#[test]
fn test_filter_change_replaces_tail() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, true);

    transport.send(0, TransportEvent::Open);
    transport.send(0, TransportEvent::Message(result_frame(now(), "old line one")));
    transport.send(0, TransportEvent::Message(result_frame(now(), "old line two")));
    pump(&mut coordinator);
    assert_eq!(coordinator.live_line_count(), 2);

    let request = coordinator.set_params(params(true, filters(5))).unwrap();
    assert_eq!(transport.close_count(0), 1);
    assert_eq!(coordinator.live_line_count(), 0);
    assert!(coordinator.view().lines.is_empty());
    assert_eq!(transport.opened().len(), 1);

    coordinator.resolve_page(request.generation, Ok(page(vec![], None)));
    let opened = transport.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[1].start, filters(5).end);
    assert_eq!(transport.close_count(0), 1);
    assert_eq!(transport.close_count(1), 0);
}

#[test]
fn test_same_filters_keep_tail() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, true);

    assert!(coordinator.set_params(params(true, filters(0))).is_none());
    assert_eq!(transport.opened().len(), 1);
    assert_eq!(transport.close_count(0), 0);
}

#[test]
fn test_tail_toggle_clears_buffer() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, true);

    transport.send(0, TransportEvent::Message(result_frame(now(), "live")));
    pump(&mut coordinator);
    assert_eq!(coordinator.live_line_count(), 1);

    assert!(coordinator.set_params(params(false, filters(0))).is_none());
    assert_eq!(transport.close_count(0), 1);
    assert_eq!(coordinator.live_line_count(), 0);
    assert!(coordinator.tail_params().is_none());
    assert_eq!(coordinator.view().lines.len(), 2);

    assert!(coordinator.set_params(params(true, filters(0))).is_none());
    let opened = transport.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[1].start, filters(0).end);
}

#[test]
fn test_malformed_frame_is_an_error() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, true);

    transport.send(0, TransportEvent::Message(r#"{"unexpected":"shape"}"#.to_string()));
    pump(&mut coordinator);

    let view = coordinator.view();
    assert_eq!(view.lines.len(), 2);
    assert!(matches!(view.error.as_deref(), Some(LogsError::Protocol(_))));
}

#[test]
fn test_error_frame_is_an_error() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, true);

    transport.send(0, TransportEvent::Message(r#"{"error":{"message":"boom"}}"#.to_string()));
    pump(&mut coordinator);

    match coordinator.view().error.as_deref() {
        Some(LogsError::Stream(message)) => assert_eq!(message, "boom"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_closed_tail_is_not_reopened() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, true);

    transport.send(0, TransportEvent::Open);
    transport.send(0, TransportEvent::Close);
    assert_eq!(pump(&mut coordinator), 2);

    assert_eq!(coordinator.phase(), Phase::Ready);
    assert_eq!(transport.opened().len(), 1);
    let mut next = task::spawn(coordinator.next_stream_event());
    tokio_test::assert_pending!(next.poll());
}

#[test]
fn test_load_previous_prepends_older_page() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);
    coordinator.set_params(params(false, filters(0)));

    let cursor = PageCursor {
        start: filters(0).start,
        end: filters(0).start + Duration::seconds(5),
    };
    let first = coordinator.set_retention(Some(30)).unwrap();
    coordinator.resolve_page(
        first.generation,
        Ok(page(vec![line("n2", 30, "b"), line("n1", 20, "a")], Some(cursor.clone()))),
    );
    assert!(coordinator.view().has_previous);

    let previous = coordinator.load_previous().unwrap();
    assert_eq!(previous.kind, PageKind::Previous);
    assert_eq!(previous.query.start, cursor.start);
    assert_eq!(previous.query.end, cursor.end);
    assert!(coordinator.view().fetching);
    assert!(!coordinator.view().loading);

    // A page is already in flight
    assert!(coordinator.load_previous().is_none());

    coordinator.resolve_page(
        previous.generation,
        Ok(page(vec![line("o2", 4, "y"), line("o1", 2, "x")], None)),
    );
    let view = coordinator.view();
    let ids: Vec<_> = view.lines.iter().map(|l| l.line.id.as_str()).collect();
    assert_eq!(ids, ["o1", "o2", "n1", "n2"]);
    assert_eq!(view.pages, 2);
    assert!(!view.has_previous);
    assert!(coordinator.load_previous().is_none());
}

#[test]
fn test_stale_page_dropped() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);
    coordinator.set_params(params(false, filters(0)));
    let stale = coordinator.set_retention(Some(30)).unwrap();

    let current = coordinator.set_params(params(false, filters(5))).unwrap();
    coordinator.resolve_page(stale.generation, Ok(page(vec![line("old", 1, "old")], None)));
    assert!(coordinator.view().lines.is_empty());
    assert!(coordinator.view().loading);

    coordinator.resolve_page(current.generation, Ok(page(vec![line("new", 1, "new")], None)));
    let view = coordinator.view();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].line.id, "new");
}

#[test]
fn test_history_error_takes_precedence() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);
    coordinator.set_params(params(true, filters(0)));

    let cursor = PageCursor {
        start: filters(0).start,
        end: filters(0).start + Duration::seconds(5),
    };
    let first = coordinator.set_retention(Some(30)).unwrap();
    coordinator.resolve_page(first.generation, Ok(page(vec![line("n1", 20, "a")], Some(cursor))));

    transport.send(0, TransportEvent::Error("connection reset".to_string()));
    pump(&mut coordinator);
    assert!(matches!(
        coordinator.view().error.as_deref(),
        Some(LogsError::Transport(_))
    ));

    let previous = coordinator.load_previous().unwrap();
    coordinator.resolve_page(
        previous.generation,
        Err(LogsError::Api {
            status: 500,
            body: "oops".to_string(),
        }),
    );
    let view = coordinator.view();
    assert!(matches!(view.error.as_deref(), Some(LogsError::Api { status: 500, .. })));
    // Existing lines survive a failed page
    assert_eq!(view.lines.len(), 1);
}

#[test]
fn test_html_shared_between_identical_texts() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);
    coordinator.set_params(params(false, filters(0)));
    let request = coordinator.set_retention(Some(30)).unwrap();
    coordinator.resolve_page(
        request.generation,
        Ok(page(
            vec![
                line("c", 3, "\u{1b}[31mred\u{1b}[0m"),
                line("b", 2, "plain"),
                line("a", 1, "\u{1b}[31mred\u{1b}[0m"),
            ],
            None,
        )),
    );

    let view = coordinator.view();
    assert!(Arc::ptr_eq(&view.lines[0].html, &view.lines[2].html));
    assert!(view.lines[0].html.contains("red"));
    assert!(!view.lines[0].html.contains('\u{1b}'));
    assert_eq!(&*view.lines[1].html, "plain");
}

#[test]
fn test_dispose_closes_tail() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, true);

    coordinator.dispose();
    assert_eq!(transport.close_count(0), 1);
    assert_eq!(coordinator.phase(), Phase::Disposed);
    assert!(!coordinator.view().loading);
    assert!(coordinator.set_params(params(true, filters(5))).is_none());

    drop(coordinator);
    assert_eq!(transport.close_count(0), 1);
    assert_eq!(transport.opened().len(), 1);
}

#[test]
fn test_dropping_coordinator_closes_tail() {
    let transport = Arc::new(FakeTransport::default());
    let coordinator = ready(&transport, true);
    drop(coordinator);
    assert_eq!(transport.close_count(0), 1);
}

#[test]
fn test_tail_must_start_at_window_end() {
    let window = LogWindow::new(filters(0).start, filters(0).end).unwrap();
    let mut tail = filters(0).tail_params();
    assert!(ensure_aligned(&window, &tail).is_ok());

    tail.start = tail.start - Duration::seconds(1);
    assert!(matches!(
        ensure_aligned(&window, &tail),
        Err(LogsError::Misaligned { .. })
    ));
}

#[test]
fn test_tail_not_opened_when_end_predates_retention() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = coordinator(&transport);

    let mut old = filters(0);
    old.start = now() - Duration::days(20);
    old.end = now() - Duration::days(10);
    coordinator.set_params(params(true, old));
    let request = coordinator.set_retention(Some(7)).unwrap();
    assert_eq!(request.query.end, now() - Duration::days(7));

    coordinator.resolve_page(request.generation, Ok(page(vec![], None)));
    assert!(transport.opened().is_empty());
    assert!(coordinator.tail_params().is_none());
    assert!(matches!(
        coordinator.view().error.as_deref(),
        Some(LogsError::Misaligned { .. })
    ));
}

#[test]
fn test_quota_error_after_dispose_is_ignored() {
    let transport = Arc::new(FakeTransport::default());
    let mut coordinator = ready(&transport, false);

    coordinator.dispose();
    coordinator.set_quota_error(LogsError::QuotaError("late".to_string()));
    let view = coordinator.view();
    assert!(view.error.is_none());
    assert_eq!(view.phase, Phase::Disposed);
}
