//! WebSocket transport for the logs tail endpoint

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use http::header::{HeaderValue, AUTHORIZATION, USER_AGENT};
use secrecy::ExposeSecret;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::authn::token::TokenProvider;
use crate::errors::LogsError;
use crate::models::log::TailParams;
use crate::transport::{Transport, TransportConnection, TransportEvent, TransportHandle};

/// Path of the tail endpoint, relative to the API base URL
pub const TAIL_PATH: &str = "/v1/streams/logs/tail";

/// Opens one WebSocket per tail
pub struct WebSocketTransport {
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl WebSocketTransport {
    /// Create a transport for the given HTTP(S) API base URL
    pub fn new(backend_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self, LogsError> {
        let base_url = Url::parse(backend_url).map_err(|e| LogsError::ConfigError(e.to_string()))?;
        // Fail early on unsupported schemes
        build_tail_url(&base_url, &[])?;
        Ok(Self { base_url, tokens })
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, params: &TailParams) -> TransportConnection {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        let url = build_tail_url(&self.base_url, &params.query_pairs());
        let tokens = self.tokens.clone();
        let task = tokio::spawn(async move {
            match url {
                Ok(url) => run_socket(url, tokens, events_tx, close_rx).await,
                Err(e) => {
                    let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                    let _ = events_tx.send(TransportEvent::Close);
                }
            }
        });

        TransportConnection {
            events: events_rx,
            handle: Box::new(SocketHandle {
                close_tx: Some(close_tx),
                task: Some(task),
            }),
        }
    }
}

struct SocketHandle {
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle for SocketHandle {
    fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            // The task may already be gone; then there is nothing left to close
            let _ = close_tx.send(());
        }
        // Detach: the task finishes the close handshake on its own
        self.task.take();
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    url: Url,
    tokens: Arc<dyn TokenProvider>,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let request = tokio::select! {
        _ = &mut close_rx => return,
        request = build_request(&url, tokens.as_ref()) => request,
    };
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to prepare tail request: {}", e);
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Close);
            return;
        }
    };

    info!("Connecting to logs tail: {}", redact(&url));
    let connection = tokio::select! {
        _ = &mut close_rx => {
            debug!("Tail closed before the connection was established");
            return;
        }
        connection = connect_async(request) => connection,
    };

    let mut ws_stream = match connection {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!("Failed to connect to logs tail: {}", e);
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Close);
            return;
        }
    };

    let _ = events.send(TransportEvent::Open);

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                debug!("Closing logs tail");
                let _ = ws_stream.close(None).await;
                return;
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(TransportEvent::Message(text.as_str().to_string())).is_err() {
                            let _ = ws_stream.close(None).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        let _ = events.send(TransportEvent::Message(text));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Logs tail closed by the server");
                        let _ = events.send(TransportEvent::Close);
                        return;
                    }
                    Some(Err(e)) => {
                        error!("Logs tail WebSocket error: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        let _ = events.send(TransportEvent::Close);
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn build_request(
    url: &Url,
    tokens: &dyn TokenProvider,
) -> Result<http::Request<()>, LogsError> {
    let token = tokens.get_token().await?;
    let mut request = url.as_str().into_client_request()?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|e| LogsError::AuthError(format!("Invalid token: {}", e)))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    request
        .headers_mut()
        .insert(USER_AGENT, HeaderValue::from_static("logtail"));
    Ok(request)
}

/// Build the tail URL from the API base URL
pub fn build_tail_url(base_url: &Url, pairs: &[(&str, String)]) -> Result<Url, LogsError> {
    let mut url = base_url.clone();

    // Change http/https to ws/wss
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(LogsError::ConfigError("Invalid backend URL scheme".to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| LogsError::ConfigError("Failed to set scheme".to_string()))?;

    url.set_path(&format!("{}{}", url.path().trim_end_matches('/'), TAIL_PATH));
    url.set_query(None);
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url)
}

fn redact(url: &Url) -> String {
    format!("{}{}", url.origin().ascii_serialization(), url.path())
}
