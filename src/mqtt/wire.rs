//! Contract between the session engine and the MQTT wire client.
//!
//! The session treats the wire client as a black box. It asks a
//! [`WireConnector`] for a handle, starts an asynchronous connect on it and
//! then issues subscribe/unsubscribe/send/disconnect requests. Everything the
//! wire client observes (connect outcome, arrivals, connection loss) flows back
//! as [`WireEvent`]s through a channel that the session owner drains.
//!
//! ```text
//! Session ──create_handle/connect──► WireHandle ──(network task)──┐
//!    ▲                                                           │
//!    └──── apply_event ◄── SessionEvents ◄── EventSink / ConnectNotifier
//! ```
//!
//! Every event carries the generation of the connect attempt that produced it,
//! so the session can drop callbacks from attempts it already abandoned.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use super::broker_address::BrokerEndpoint;
use super::error::WireError;

/// Options handed to [`WireHandle::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub use_tls: bool,
    pub reconnect: bool,
    pub timeout: Duration,
    pub keep_alive: Duration,
}

/// A message the session asks the wire client to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub destination_name: String,
    pub payload_string: String,
    pub retained: bool,
}

/// A message the wire client received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub destination_name: String,
    pub payload_string: String,
    pub retained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEventKind {
    Connected,
    ConnectFailed(String),
    MessageArrived(InboundMessage),
    ConnectionLost(String),
    Reconnected,
}

/// Callback delivery from the wire client, tagged with its connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEvent {
    pub generation: u64,
    pub kind: WireEventKind,
}

/// Creates wire handles for a broker endpoint.
pub trait WireConnector {
    type Handle: WireHandle;

    /// Builds a handle and registers the arrival/loss callbacks through `sink`.
    fn create_handle(
        &self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
        sink: EventSink,
    ) -> Result<Self::Handle, WireError>;
}

/// One broker connection as seen by the session.
///
/// All requests are non-blocking; an `Ok` only means the request was accepted.
pub trait WireHandle {
    /// Starts the asynchronous connect. Exactly one of the notifier's outcomes
    /// is reported later, unless this call itself fails.
    fn connect(&mut self, options: ConnectOptions, notifier: ConnectNotifier)
        -> Result<(), WireError>;
    fn subscribe(&mut self, topic: &str) -> Result<(), WireError>;
    fn unsubscribe(&mut self, topic: &str) -> Result<(), WireError>;
    fn send(&mut self, message: OutgoingMessage) -> Result<(), WireError>;
    fn disconnect(&mut self) -> Result<(), WireError>;
}

/// Callback registration for arrivals and connection changes.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<WireEvent>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<WireEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn message_arrived(&self, message: InboundMessage) {
        self.emit(WireEventKind::MessageArrived(message));
    }

    pub fn connection_lost(&self, reason: impl Into<String>) {
        self.emit(WireEventKind::ConnectionLost(reason.into()));
    }

    pub fn reconnected(&self) {
        self.emit(WireEventKind::Reconnected);
    }

    fn emit(&self, kind: WireEventKind) {
        let event = WireEvent {
            generation: self.generation,
            kind,
        };
        if let Err(e) = self.tx.send(event) {
            // session is gone, nobody left to observe this
            trace!("Dropping wire event {:?}", e.0);
        }
    }
}

/// Single-shot connect outcome. Both methods consume the notifier.
#[derive(Debug)]
pub struct ConnectNotifier {
    sink: EventSink,
}

impl ConnectNotifier {
    pub(crate) fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub fn succeeded(self) {
        self.sink.emit(WireEventKind::Connected);
    }

    pub fn failed(self, reason: impl Into<String>) {
        self.sink.emit(WireEventKind::ConnectFailed(reason.into()));
    }
}

/// Receiving side of the wire callbacks, drained by whoever owns the session.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<WireEvent>,
}

impl SessionEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<WireEvent>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<WireEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WireEvent> {
        self.rx.try_recv().ok()
    }
}
