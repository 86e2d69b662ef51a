//! # Session Store and Controller
//!
//! Owns everything that describes one observation session against a broker:
//! connection state, the wire handle, subscribed topics, the raw message log
//! and the last error.
//!
//! ## Why This Module Exists
//!
//! Every user action (connect, subscribe, publish, ...) and every wire callback
//! (connect outcome, arrival, connection loss) mutates the same small piece of
//! state. Keeping all of it in one explicitly constructed [`Session`] means there
//! is exactly one place where the invariants live:
//!
//! - subscribed topics are only non-empty while [`ConnectionState::Connected`]
//! - the error field reflects the most recent operation only
//! - callbacks from an abandoned connect attempt never touch state
//!
//! ## Event Flow
//!
//! ```text
//! caller ──connect/subscribe/publish──► Session ──► WireHandle
//!                                                     │ (async)
//! caller ◄──apply_event── SessionEvents ◄── EventSink ◄┘
//! ```
//!
//! The session never blocks. [`Session::connect`] returns as soon as the wire
//! client accepted the request; the outcome arrives later as a [`WireEvent`]
//! that the owner feeds back through [`Session::apply_event`]. Because the
//! owner is the only one mutating the session, no locking is required.
//!
//! ## Error Surfacing
//!
//! Operations never return errors. Each one clears the previous error on entry
//! and stores a [`SessionError`] on failure, overwriting whatever was there.

use chrono::Local;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::broker_address::BrokerEndpoint;
use super::config::SessionSettings;
use super::error::SessionError;
use super::log_processor::{self, LogView, ViewFilter};
use super::message_manager::{LogEntry, MessageLog};
use super::wire::{
    ConnectNotifier, EventSink, OutgoingMessage, SessionEvents, WireConnector, WireEvent,
    WireEventKind, WireHandle,
};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

fn generated_client_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("thatsapp-debugger-{suffix:06x}")
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// One observation session against a broker.
pub struct Session<C: WireConnector> {
    connector: C,
    settings: SessionSettings,
    handle: Option<C::Handle>,
    endpoint: Option<BrokerEndpoint>,
    client_id: Option<String>,
    state: ConnectionState,
    subscribed_topics: Vec<String>,
    log: MessageLog,
    last_error: Option<SessionError>,
    // bumped by every connect and disconnect, stale callbacks are dropped
    generation: u64,
    events_tx: mpsc::UnboundedSender<WireEvent>,
}

impl<C: WireConnector> Session<C> {
    /// Creates a disconnected session plus the event stream its owner must drain.
    pub fn new(connector: C, settings: SessionSettings) -> (Self, SessionEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            connector,
            settings,
            handle: None,
            endpoint: None,
            client_id: None,
            state: ConnectionState::Disconnected,
            subscribed_topics: Vec::new(),
            log: MessageLog::new(),
            last_error: None,
            generation: 0,
            events_tx,
        };
        (session, SessionEvents::new(events_rx))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn endpoint(&self) -> Option<&BrokerEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Subscribed topics in the order they were first subscribed.
    pub fn subscribed_topics(&self) -> &[String] {
        &self.subscribed_topics
    }

    pub fn messages(&self) -> &[LogEntry] {
        self.log.entries()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// The current error as display text, empty when there is none.
    pub fn error_message(&self) -> String {
        self.last_error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Derives the displayed message list from the raw log.
    pub fn view(&self, filter: &ViewFilter) -> LogView<'_> {
        log_processor::process(self.log.entries(), filter)
    }

    /// Starts connecting to `broker_address`. The outcome arrives as an event.
    ///
    /// An existing wire handle is disconnected and dropped first, its topics go
    /// with it. Logged messages stay until `disconnect` or `clear_messages`.
    /// A blank `client_id` is replaced with a generated one.
    pub fn connect(&mut self, broker_address: &str, client_id: &str) {
        self.last_error = None;
        let result = self.try_connect(broker_address, client_id);
        self.record(result);
    }

    fn try_connect(&mut self, broker_address: &str, client_id: &str) -> Result<(), SessionError> {
        let endpoint = BrokerEndpoint::resolve(broker_address, self.settings.secure_context)?;

        if self.handle.is_some() {
            info!("Replacing the running session before connecting again");
            self.release_handle();
        }

        let client_id = if is_blank(client_id) {
            generated_client_id()
        } else {
            client_id.to_string()
        };

        self.generation += 1;
        let sink = EventSink::new(self.generation, self.events_tx.clone());
        info!(
            "Connecting to {} with client ID {} (attempt {})",
            endpoint, client_id, self.generation
        );

        let mut handle = self
            .connector
            .create_handle(&endpoint, &client_id, sink.clone())
            .map_err(|e| SessionError::ConnectFailed(e.to_string()))?;

        let options = self.settings.connect_options(endpoint.secure);
        handle
            .connect(options, ConnectNotifier::new(sink))
            .map_err(|e| SessionError::ConnectFailed(e.to_string()))?;

        self.handle = Some(handle);
        self.endpoint = Some(endpoint);
        self.client_id = Some(client_id);
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Ends the session: handle, topics and message log are always cleared.
    pub fn disconnect(&mut self) {
        self.last_error = None;
        if let Some(mut handle) = self.handle.take() {
            match handle.disconnect() {
                Ok(()) => info!("Disconnected from MQTT broker"),
                Err(e) => {
                    error!("Error disconnecting from MQTT broker: {}", e);
                    self.last_error = Some(SessionError::OperationFailed(format!(
                        "Error disconnecting: {e}"
                    )));
                }
            }
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.release_handle();
        self.log.clear();
    }

    /// Drops the connection side of the session. The message log is kept.
    fn release_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.disconnect() {
                warn!("Ignoring disconnect failure of replaced session: {}", e);
            }
        }
        self.generation += 1;
        self.endpoint = None;
        self.client_id = None;
        self.state = ConnectionState::Disconnected;
        self.subscribed_topics.clear();
        debug!("Session reset, now at generation {}", self.generation);
    }

    pub fn subscribe(&mut self, topic: &str) {
        self.last_error = None;
        let result = self.try_subscribe(topic);
        self.record(result);
    }

    fn try_subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        if is_blank(topic) {
            return Err(SessionError::EmptyTopic);
        }
        let handle = self.connected_handle()?;
        handle.subscribe(topic).map_err(|e| {
            SessionError::OperationFailed(format!("Error subscribing to {topic}: {e}"))
        })?;

        if !self.subscribed_topics.iter().any(|t| t == topic) {
            self.subscribed_topics.push(topic.to_string());
        }
        info!("Subscribed to {}", topic);
        Ok(())
    }

    /// No-op while not connected.
    pub fn unsubscribe(&mut self, topic: &str) {
        self.last_error = None;
        let result = self.try_unsubscribe(topic);
        self.record(result);
    }

    fn try_unsubscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        let Ok(handle) = self.connected_handle() else {
            debug!("Not connected, ignoring unsubscribe from {}", topic);
            return Ok(());
        };
        handle.unsubscribe(topic).map_err(|e| {
            SessionError::OperationFailed(format!("Error unsubscribing from {topic}: {e}"))
        })?;

        self.subscribed_topics.retain(|t| t != topic);
        info!("Unsubscribed from {}", topic);
        Ok(())
    }

    pub fn publish(&mut self, topic: &str, payload: &str, retained: bool) {
        self.last_error = None;
        let result = self.try_publish(topic, payload, retained);
        self.record(result);
    }

    fn try_publish(&mut self, topic: &str, payload: &str, retained: bool) -> Result<(), SessionError> {
        if is_blank(topic) {
            return Err(SessionError::EmptyTopic);
        }
        if is_blank(payload) {
            return Err(SessionError::EmptyPayload);
        }
        let handle = self.connected_handle()?;
        handle
            .send(OutgoingMessage {
                destination_name: topic.to_string(),
                payload_string: payload.to_string(),
                retained,
            })
            .map_err(|e| {
                SessionError::OperationFailed(format!("Error publishing to {topic}: {e}"))
            })?;

        debug!("Published {} bytes to {} (retained: {})", payload.len(), topic, retained);
        Ok(())
    }

    /// Empties the raw log. Connection and subscriptions are untouched.
    pub fn clear_messages(&mut self) {
        self.log.clear();
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Applies a wire callback. Returns false when the event was stale and dropped.
    pub fn apply_event(&mut self, event: WireEvent) -> bool {
        if event.generation != self.generation || self.handle.is_none() {
            debug!(
                "Ignoring {:?} from attempt {} (current attempt {})",
                event.kind, event.generation, self.generation
            );
            return false;
        }

        match event.kind {
            WireEventKind::Connected => {
                info!("Connected to MQTT broker");
                self.state = ConnectionState::Connected;
                self.last_error = None;
            }
            WireEventKind::ConnectFailed(reason) => {
                error!("MQTT connection failed: {}", reason);
                self.handle = None;
                self.state = ConnectionState::Disconnected;
                self.last_error = Some(SessionError::ConnectFailed(reason));
            }
            WireEventKind::MessageArrived(message) => {
                self.log.ingest(message, Local::now());
            }
            WireEventKind::ConnectionLost(reason) => {
                warn!("MQTT connection lost: {}", reason);
                self.state = ConnectionState::Disconnected;
                // the broker forgets a clean session's subscriptions
                self.subscribed_topics.clear();
                self.last_error = Some(SessionError::ConnectionLost(reason));
                if !self.settings.reconnect {
                    self.handle = None;
                }
            }
            WireEventKind::Reconnected => {
                info!("Reconnected to MQTT broker");
                self.state = ConnectionState::Connected;
            }
        }
        true
    }

    fn connected_handle(&mut self) -> Result<&mut C::Handle, SessionError> {
        match self.handle.as_mut() {
            Some(handle) if self.state == ConnectionState::Connected => Ok(handle),
            _ => Err(SessionError::NotConnected),
        }
    }

    fn record(&mut self, result: Result<(), SessionError>) {
        if let Err(e) = result {
            warn!("{}", e);
            self.last_error = Some(e);
        }
    }
}
