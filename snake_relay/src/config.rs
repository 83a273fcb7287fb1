// Relay configuration.
//
// `RelayConfig` is plain data with defaults for every field. The binary builds
// one from an optional JSON file and then applies command-line overrides;
// embedders and tests construct it directly.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RelayError;

/// Default listen port, shared with the game clients' defaults.
pub const DEFAULT_PORT: u16 = 7777;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-framed TCP, one reader thread per client.
    Tcp,
    /// One datagram per frame on a single socket.
    Udp,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub host: String,
    /// 0 lets the OS pick a free port.
    pub port: u16,
    pub transport: TransportKind,
    /// Seat TCP clients on connect instead of waiting for `JOIN`.
    pub auto_join: bool,
    /// Disconnect TCP clients that send nothing for this long.
    pub idle_timeout_secs: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            transport: TransportKind::Tcp,
            auto_join: false,
            idle_timeout_secs: None,
        }
    }
}

impl RelayConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, RelayError> {
        let text = std::fs::read_to_string(path).map_err(|source| RelayError::ConfigRead {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| RelayError::ConfigParse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, RelayError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| RelayError::BadAddress(format!("{}:{}", self.host, self.port)))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
