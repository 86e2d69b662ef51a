use std::fmt;

use tracing::{debug, warn};
use url::Url;

use super::error::SessionError;

const DEFAULT_WS_PORT: u16 = 8000;
const DEFAULT_WSS_PORT: u16 = 443;
const DEFAULT_PATH: &str = "/mqtt";

/// Where the wire collaborator should dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub secure: bool,
}

impl BrokerEndpoint {
    /// Validates a broker address and fills in port and path defaults.
    ///
    /// With `secure_context` set, a `ws://` address is upgraded to `wss://`
    /// before resolving; host and path are kept.
    pub fn resolve(address: &str, secure_context: bool) -> Result<Self, SessionError> {
        let mut url = Url::parse(address.trim())
            .map_err(|e| SessionError::InvalidAddress(format!("{address}: {e}")))?;

        if secure_context && url.scheme() == "ws" {
            warn!("Upgrading insecure WebSocket to secure WebSocket for {}", address);
            url.set_scheme("wss").map_err(|_| {
                SessionError::InvalidAddress(format!("{address}: cannot switch scheme to wss"))
            })?;
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => {
                return Err(SessionError::InvalidAddress(format!(
                    "{address}: missing host"
                )))
            }
        };

        let secure = url.scheme() == "wss";
        let port = url.port().unwrap_or(if secure {
            DEFAULT_WSS_PORT
        } else {
            DEFAULT_WS_PORT
        });
        let path = match url.path() {
            "" | "/" => DEFAULT_PATH.to_string(),
            other => other.to_string(),
        };

        let endpoint = Self {
            host,
            port,
            path,
            secure,
        };
        debug!("Resolved broker address {} to {}", address, endpoint);
        Ok(endpoint)
    }

    /// Full WebSocket URL, as handed to the MQTT client.
    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}{}", self.host, self.port, self.path)
    }
}
