//! Network error types
//!
//! Every fallible operation in the crate returns [`NetworkError`]. Record-layer
//! failures are reported as [`SecurityError`] and wrapped on the way up.

use crate::datachannel::DataChannelState;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Record-layer (DTLS-style) failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// Authentication failed. Deliberately says nothing about the cause.
    #[error("bad record mac")]
    BadRecordMac,
    #[error("record too short: {len} bytes")]
    RecordTooShort { len: usize },
    #[error("record too long: {len} bytes")]
    RecordTooLong { len: usize },
    #[error("unsupported cipher suite 0x{0:04X}")]
    UnsupportedCipherSuite(u16),
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Network-related errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Security error: {0}")]
    Security(#[from] SecurityError),
    #[error("Connection not established")]
    NotConnected,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Channel {0} not found")]
    ChannelNotFound(u16),
    #[error("Channel {id} not open (state: {state:?})")]
    ChannelNotOpen { id: u16, state: DataChannelState },
    #[error("Send buffer full: {buffered} bytes buffered, limit {limit}")]
    BufferFull { buffered: usize, limit: usize },
    #[error("Retransmission limit exceeded after {attempts} timeouts")]
    RetransmitLimitExceeded { attempts: u32 },
    #[error("Too many authentication failures ({0}); close the connection")]
    TooManyAuthFailures(u32),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Logging error: {0}")]
    Logging(#[from] logging::LoggingError),
}

impl NetworkError {
    /// True for errors caused by a single bad inbound datagram; the
    /// connection stays usable after these.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NetworkError::InvalidPacket(_)
                | NetworkError::ProtocolViolation(_)
                | NetworkError::Security(_)
                | NetworkError::ChannelNotFound(_)
                | NetworkError::ChannelNotOpen { .. }
                | NetworkError::BufferFull { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = NetworkError::Config("mtu smaller than header".to_string());
        assert_eq!(err.to_string(), "Config error: mtu smaller than header");
    }

    #[test]
    fn test_security_error_is_opaque() {
        let err: NetworkError = SecurityError::BadRecordMac.into();
        assert_eq!(err.to_string(), "Security error: bad record mac");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_channel_not_open_display() {
        let err = NetworkError::ChannelNotOpen {
            id: 4,
            state: DataChannelState::Connecting,
        };
        assert_eq!(err.to_string(), "Channel 4 not open (state: Connecting)");
    }

    #[test]
    fn test_fatal_errors_not_recoverable() {
        assert!(!NetworkError::TooManyAuthFailures(8).is_recoverable());
        assert!(!NetworkError::RetransmitLimitExceeded { attempts: 10 }.is_recoverable());
        assert!(!NetworkError::NotConnected.is_recoverable());
    }

    #[test]
    fn test_unsupported_suite_display() {
        let err = SecurityError::UnsupportedCipherSuite(0x1301);
        assert_eq!(err.to_string(), "unsupported cipher suite 0x1301");
    }

    #[test]
    fn test_error_is_error_trait() {
        let err = NetworkError::Network("Test".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
