//! Connection and transport configuration
//!
//! Every knob has a default. Configs can be assembled with the builder or
//! read from a JSON file, where missing fields keep their defaults.

use crate::error::{NetworkError, Result};
use logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Size of the transport common header.
pub const COMMON_HEADER_LEN: usize = 12;
/// Size of a DATA chunk header, excluding payload.
pub const DATA_CHUNK_HEADER_LEN: usize = 16;

/// Which side of the connection this endpoint is.
///
/// The client initiates: it uses the client write key and allocates even
/// channel ids. The server allocates odd ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Server,
}

impl Role {
    pub fn is_initiator(self) -> bool {
        self == Role::Client
    }

    /// First channel id this role allocates.
    pub fn first_channel_id(self) -> u16 {
        match self {
            Role::Client => 0,
            Role::Server => 1,
        }
    }

    /// Whether `id` has this role's parity.
    pub fn owns_channel_id(self, id: u16) -> bool {
        id % 2 == self.first_channel_id()
    }
}

/// What `send` does when the outbound buffer is at its cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new message with `BufferFull`.
    #[default]
    RejectNewest,
    /// Evict never-sent chunks from the head of the buffer.
    DropOldest,
}

/// Transport layer tuning. Sizes are bytes, times milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mtu: usize,
    pub max_fragment_size: usize,
    pub initial_cwnd: usize,
    pub max_cwnd: usize,
    pub initial_ssthresh: usize,
    pub ssthresh_floor: usize,
    pub initial_rto_ms: u64,
    pub min_rto_ms: u64,
    pub max_rto_ms: u64,
    pub clock_granularity_ms: u64,
    /// Chunks admitted to flight per call.
    pub max_burst: usize,
    pub max_buffered_bytes: usize,
    pub overflow_policy: OverflowPolicy,
    /// Consecutive timeouts tolerated before giving up.
    pub max_retransmits: u32,
    pub local_port: u16,
    pub remote_port: u16,
    pub verification_tag: u32,
    /// First TSN used by both peers.
    pub initial_tsn: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mtu: 1200,
            max_fragment_size: 1024,
            initial_cwnd: 4800,
            max_cwnd: 256 * 1024,
            initial_ssthresh: 64 * 1024,
            ssthresh_floor: 4800,
            initial_rto_ms: 1000,
            min_rto_ms: 200,
            max_rto_ms: 60_000,
            clock_granularity_ms: 10,
            max_burst: 16,
            max_buffered_bytes: 1024 * 1024,
            overflow_policy: OverflowPolicy::RejectNewest,
            max_retransmits: 10,
            local_port: 5000,
            remote_port: 5000,
            verification_tag: 0,
            initial_tsn: 0,
        }
    }
}

impl TransportConfig {
    pub fn initial_rto(&self) -> Duration {
        Duration::from_millis(self.initial_rto_ms)
    }

    pub fn min_rto(&self) -> Duration {
        Duration::from_millis(self.min_rto_ms)
    }

    pub fn max_rto(&self) -> Duration {
        Duration::from_millis(self.max_rto_ms)
    }

    pub fn clock_granularity(&self) -> Duration {
        Duration::from_millis(self.clock_granularity_ms)
    }

    /// Rejects combinations the transport cannot run with.
    pub fn validate(&self) -> Result<()> {
        let overhead = COMMON_HEADER_LEN + DATA_CHUNK_HEADER_LEN;
        if self.mtu <= overhead {
            return Err(config_error(format!(
                "mtu {} leaves no room for payload (headers take {overhead})",
                self.mtu
            )));
        }
        if self.max_fragment_size == 0 || self.max_fragment_size + overhead > self.mtu {
            return Err(config_error(format!(
                "max_fragment_size {} must be in 1..={}",
                self.max_fragment_size,
                self.mtu - overhead
            )));
        }
        if self.max_fragment_size > self.initial_cwnd {
            return Err(config_error(format!(
                "max_fragment_size {} exceeds initial_cwnd {}",
                self.max_fragment_size, self.initial_cwnd
            )));
        }
        if self.initial_cwnd > self.max_cwnd {
            return Err(config_error(format!(
                "initial_cwnd {} exceeds max_cwnd {}",
                self.initial_cwnd, self.max_cwnd
            )));
        }
        if self.ssthresh_floor == 0 {
            return Err(config_error("ssthresh_floor must be positive"));
        }
        if self.min_rto_ms == 0
            || self.min_rto_ms > self.max_rto_ms
            || !(self.min_rto_ms..=self.max_rto_ms).contains(&self.initial_rto_ms)
        {
            return Err(config_error(format!(
                "rto bounds inconsistent: min {} initial {} max {}",
                self.min_rto_ms, self.initial_rto_ms, self.max_rto_ms
            )));
        }
        if self.max_burst == 0 {
            return Err(config_error("max_burst must be positive"));
        }
        if self.max_buffered_bytes < self.max_fragment_size {
            return Err(config_error(format!(
                "max_buffered_bytes {} smaller than one fragment",
                self.max_buffered_bytes
            )));
        }
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> NetworkError {
    NetworkError::Config(msg.into())
}

/// Everything a [`Connection`](crate::Connection) needs besides its clock and
/// random source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub role: Role,
    pub transport: TransportConfig,
    /// Consecutive failed record authentications before the caller is told
    /// to close.
    pub max_auth_failures: u32,
    pub logging: LoggingConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            role: Role::Client,
            transport: TransportConfig::default(),
            max_auth_failures: 8,
            logging: LoggingConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        if self.max_auth_failures == 0 {
            return Err(config_error("max_auth_failures must be positive"));
        }
        Ok(())
    }

    /// Loads and validates a JSON config file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ConnectionConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`ConnectionConfig`]
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    pub fn role(mut self, role: Role) -> Self {
        self.config.role = role;
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    pub fn mtu(mut self, mtu: usize) -> Self {
        self.config.transport.mtu = mtu;
        self
    }

    pub fn max_fragment_size(mut self, size: usize) -> Self {
        self.config.transport.max_fragment_size = size;
        self
    }

    pub fn max_buffered_bytes(mut self, bytes: usize) -> Self {
        self.config.transport.max_buffered_bytes = bytes;
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.transport.overflow_policy = policy;
        self
    }

    pub fn max_retransmits(mut self, attempts: u32) -> Self {
        self.config.transport.max_retransmits = attempts;
        self
    }

    pub fn ports(mut self, local: u16, remote: u16) -> Self {
        self.config.transport.local_port = local;
        self.config.transport.remote_port = remote;
        self
    }

    pub fn max_auth_failures(mut self, count: u32) -> Self {
        self.config.max_auth_failures = count;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    pub fn build(self) -> Result<ConnectionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ConnectionConfig::default().validate().is_ok());
        let t = TransportConfig::default();
        assert_eq!(t.max_buffered_bytes, 1024 * 1024);
        assert_eq!(t.overflow_policy, OverflowPolicy::RejectNewest);
    }

    #[test]
    fn test_fragment_larger_than_initial_cwnd_rejected() {
        let transport = TransportConfig {
            mtu: 9000,
            max_fragment_size: 8000,
            initial_cwnd: 4000,
            ..TransportConfig::default()
        };
        assert!(matches!(transport.validate(), Err(NetworkError::Config(_))));
    }

    #[test]
    fn test_rto_bounds_checked() {
        let transport = TransportConfig {
            min_rto_ms: 2000,
            initial_rto_ms: 1000,
            ..TransportConfig::default()
        };
        assert!(transport.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::builder()
            .role(Role::Server)
            .mtu(1400)
            .max_auth_failures(3)
            .build()
            .unwrap();
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.transport.mtu, 1400);
        assert_eq!(config.max_auth_failures, 3);
    }

    #[test]
    fn test_builder_validates() {
        let result = ConnectionConfig::builder().mtu(20).build();
        assert!(matches!(result, Err(NetworkError::Config(_))));
    }

    #[test]
    fn test_role_parity() {
        assert!(Role::Client.owns_channel_id(4));
        assert!(!Role::Client.owns_channel_id(5));
        assert!(Role::Server.owns_channel_id(5));
        assert_eq!(Role::Server.first_channel_id(), 1);
    }

    #[test]
    fn test_load_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"role": "server", "transport": {{"mtu": 1400, "overflow_policy": "drop_oldest"}}}}"#
        )
        .unwrap();

        let config = ConnectionConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.transport.mtu, 1400);
        assert_eq!(config.transport.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.transport.initial_cwnd, 4800);
        assert_eq!(config.max_auth_failures, 8);
    }

    #[test]
    fn test_load_from_file_missing() {
        let result = ConnectionConfig::load_from_file("/nonexistent/peerlink.json");
        assert!(matches!(result, Err(NetworkError::Io(_))));
    }

    #[test]
    fn test_load_from_file_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let result = ConnectionConfig::load_from_file(file.path());
        assert!(matches!(result, Err(NetworkError::Serialization(_))));
    }
}
