//! Live transport abstraction
//!
//! A transport opens one connection for a set of tail parameters and reports
//! what happens on it as [`TransportEvent`]s over a channel. Closing goes
//! through the returned handle so the connection owner decides its lifetime.

pub mod websocket;

use tokio::sync::mpsc;

use crate::models::log::TailParams;

/// Something that happened on a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    /// One inbound text frame
    Message(String),
    Close,
    Error(String),
}

/// Closes the underlying connection
pub trait TransportHandle: Send {
    /// Idempotent, and safe before the connection finished opening
    fn close(&mut self);
}

/// An opened (or opening) connection
pub struct TransportConnection {
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub handle: Box<dyn TransportHandle>,
}

impl std::fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnection").finish_non_exhaustive()
    }
}

/// Opens live connections
pub trait Transport: Send + Sync {
    fn open(&self, params: &TailParams) -> TransportConnection;
}
