//! Wire collaborator backed by rumqttc over WebSocket.
//!
//! Each handle owns one rumqttc [`AsyncClient`] and a tokio task driving its
//! event loop. The task is a small typestate machine:
//!
//! ```text
//! Dialing ──CONNACK──► Online ──error──► Reconnecting ──CONNACK──► Online
//!    │                   │                    │
//!    └─fail/timeout      └─error (no reconnect) └─cancelled
//! ```
//!
//! Requests from the session (`subscribe`, `send`, ...) go through the
//! client's non-blocking `try_*` calls, so the session never waits on I/O.

use std::fmt;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use statum::{machine, state};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::broker_address::BrokerEndpoint;
use super::error::WireError;
use super::wire::{
    ConnectNotifier, ConnectOptions, EventSink, InboundMessage, OutgoingMessage, WireConnector,
    WireHandle,
};

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const RETRY_PAUSE: Duration = Duration::from_secs(1);
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct RumqttConnector;

impl WireConnector for RumqttConnector {
    type Handle = RumqttHandle;

    fn create_handle(
        &self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
        sink: EventSink,
    ) -> Result<Self::Handle, WireError> {
        debug!(
            "Creating rumqttc handle for {} as {}",
            endpoint.websocket_url(),
            client_id
        );
        Ok(RumqttHandle {
            endpoint: endpoint.clone(),
            client_id: client_id.to_string(),
            sink,
            client: None,
            shutdown: CancellationToken::new(),
            task: None,
        })
    }
}

pub struct RumqttHandle {
    endpoint: BrokerEndpoint,
    client_id: String,
    sink: EventSink,
    client: Option<AsyncClient>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RumqttHandle {
    fn mqtt_options(&self, options: &ConnectOptions) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(
            self.client_id.clone(),
            self.endpoint.websocket_url(),
            self.endpoint.port,
        );
        mqtt_options
            .set_keep_alive(options.keep_alive.max(MIN_KEEP_ALIVE))
            .set_clean_session(true);

        if options.use_tls {
            mqtt_options.set_transport(Transport::wss_with_default_config());
        } else {
            mqtt_options.set_transport(Transport::Ws);
        }
        mqtt_options
    }

    fn client(&self) -> Result<&AsyncClient, WireError> {
        self.client.as_ref().ok_or(WireError::NotStarted)
    }
}

impl WireHandle for RumqttHandle {
    fn connect(
        &mut self,
        options: ConnectOptions,
        notifier: ConnectNotifier,
    ) -> Result<(), WireError> {
        if self.task.is_some() {
            return Err(WireError::Transport("connect already started".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WireError::Transport(format!("no async runtime: {e}")))?;

        let (client, eventloop) =
            AsyncClient::new(self.mqtt_options(&options), REQUEST_CHANNEL_CAPACITY);
        let link = WireLink::create(
            eventloop,
            self.sink.clone(),
            self.shutdown.clone(),
            options.reconnect,
        );

        info!(
            "Spawning MQTT link task for {} (attempt {})",
            self.endpoint,
            self.sink.generation()
        );
        let task = runtime.spawn(run_link(link, notifier, options.timeout));

        self.client = Some(client);
        self.task = Some(task);
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), WireError> {
        self.client()?
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| WireError::Request(e.to_string()))
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), WireError> {
        self.client()?
            .try_unsubscribe(topic)
            .map_err(|e| WireError::Request(e.to_string()))
    }

    fn send(&mut self, message: OutgoingMessage) -> Result<(), WireError> {
        self.client()?
            .try_publish(
                message.destination_name,
                QoS::AtMostOnce,
                message.retained,
                message.payload_string.into_bytes(),
            )
            .map_err(|e| WireError::Request(e.to_string()))
    }

    fn disconnect(&mut self) -> Result<(), WireError> {
        let result = match self.client.take() {
            Some(client) => client
                .try_disconnect()
                .map_err(|e| WireError::Request(e.to_string())),
            None => Ok(()),
        };
        // the link task still has to flush the DISCONNECT packet, so it is
        // cancelled instead of aborted
        self.shutdown.cancel();
        self.task.take();
        result
    }
}

impl Drop for RumqttHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// rumqttc's event loop, owned by the link task.
pub struct LinkIo(EventLoop);

impl fmt::Debug for LinkIo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("LinkIo")
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Dialing,
    Online,
    Reconnecting,
}

#[machine]
#[derive(Debug)]
pub struct WireLink<S: LinkState> {
    io: LinkIo,
    sink: EventSink,
    shutdown: CancellationToken,
    reconnect: bool,
}

impl WireLink<Dialing> {
    pub fn create(
        eventloop: EventLoop,
        sink: EventSink,
        shutdown: CancellationToken,
        reconnect: bool,
    ) -> Self {
        Self::new(LinkIo(eventloop), sink, shutdown, reconnect)
    }

    /// Polls until CONNACK, failure or timeout. Reports the outcome exactly once.
    async fn await_connack(
        mut self,
        notifier: ConnectNotifier,
        timeout: Duration,
    ) -> Option<WireLink<Online>> {
        let deadline = Instant::now() + timeout;
        loop {
            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Connect attempt cancelled");
                    notifier.failed("connect attempt cancelled");
                    return None;
                }
                polled = tokio::time::timeout_at(deadline, self.io.0.poll()) => polled,
            };

            match polled {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    debug!("Received CONNACK: {:?}", ack);
                    notifier.succeeded();
                    return Some(self.transition());
                }
                Ok(Ok(event)) => debug!("Event before CONNACK: {:?}", event),
                Ok(Err(e)) => {
                    error!("MQTT connect failed: {}", e);
                    notifier.failed(e.to_string());
                    return None;
                }
                Err(_) => {
                    error!("MQTT connect timed out after {}s", timeout.as_secs());
                    notifier.failed(format!("timed out after {}s", timeout.as_secs()));
                    return None;
                }
            }
        }
    }
}

impl WireLink<Online> {
    /// Forwards arrivals until the connection drops or the handle is closed.
    async fn pump(mut self) -> Option<WireLink<Reconnecting>> {
        loop {
            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    // give the queued DISCONNECT a chance to go out
                    let _ = tokio::time::timeout(RETRY_PAUSE, self.io.0.poll()).await;
                    debug!("MQTT link closed");
                    return None;
                }
                polled = self.io.0.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.sink.message_arrived(InboundMessage {
                        destination_name: publish.topic.clone(),
                        payload_string: String::from_utf8_lossy(&publish.payload).into_owned(),
                        retained: publish.retain,
                    });
                }
                Ok(event) => debug!("MQTT event: {:?}", event),
                Err(e) => {
                    warn!("MQTT connection lost: {}", e);
                    self.sink.connection_lost(e.to_string());
                    if !self.reconnect {
                        return None;
                    }
                    return Some(self.transition());
                }
            }
        }
    }
}

impl WireLink<Reconnecting> {
    async fn retry(mut self) -> Option<WireLink<Online>> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(RETRY_PAUSE) => {}
            }

            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                polled = self.io.0.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("MQTT link re-established");
                    self.sink.reconnected();
                    return Some(self.transition());
                }
                Ok(event) => debug!("Event while reconnecting: {:?}", event),
                Err(e) => debug!("Reconnect attempt failed: {}", e),
            }
        }
    }
}

async fn run_link(link: WireLink<Dialing>, notifier: ConnectNotifier, timeout: Duration) {
    let Some(mut online) = link.await_connack(notifier, timeout).await else {
        return;
    };

    loop {
        let Some(reconnecting) = online.pump().await else {
            break;
        };
        match reconnecting.retry().await {
            Some(next) => online = next,
            None => break,
        }
    }
    debug!("MQTT link task finished");
}
