//! # MQTT Session Engine
//!
//! Everything between the broker and the console: the session that owns the
//! connection and its raw message log, the wire collaborator that moves bytes,
//! and the pure pipeline that turns the log into what gets displayed.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── session.rs          - Session store and controller (all state lives here)
//! ├── wire.rs             - Collaborator contract, callbacks and event stream
//! ├── rumqtt_wire.rs      - Production collaborator on rumqttc over WebSocket
//! ├── broker_address.rs   - Broker URL validation and endpoint resolution
//! ├── message_manager.rs  - Log entries and the append-only message log
//! ├── log_processor.rs    - Filter, dedup, cap and classify for display
//! ├── config.rs           - Session tuning knobs from the config file
//! └── error.rs            - Session and wire error taxonomy
//! ```
//!
//! ## Data Flow
//!
//! Wire callbacks never touch the session directly. They are queued as
//! generation-tagged [`WireEvent`]s and applied by the session owner, which
//! keeps a single writer and lets callbacks from abandoned connections be
//! recognised and dropped.
//!
//! ```text
//! broker ─► rumqttc task ─► EventSink ─► SessionEvents ─► Session::apply_event
//!                                                             │
//!                                   MessageLog ◄──ingest──────┘
//!                                       │
//!                              log_processor::process ─► LogView
//! ```

pub mod broker_address;
pub mod config;
pub mod error;
pub mod log_processor;
pub mod message_manager;
pub mod rumqtt_wire;
pub mod session;
pub mod wire;

pub use broker_address::BrokerEndpoint;
pub use config::SessionSettings;
pub use error::{SessionError, WireError};
pub use log_processor::{DisplayedMessage, LogView, ViewFilter};
pub use message_manager::{LogEntry, MessageLog};
pub use rumqtt_wire::RumqttConnector;
pub use session::{ConnectionState, Session};
pub use wire::{SessionEvents, WireEvent, WireEventKind};
