//! peerlink - reliable peer-to-peer messaging over UDP
//!
//! Three layers, each built on the one below:
//!
//! - [`security`]: DTLS 1.2 style record protection (AES-GCM, PRF key
//!   schedule, anti-replay) once a handshake has produced keying material.
//! - [`sctp`]: SCTP style reliable delivery with congestion control,
//!   retransmission timing, buffering and selective acks.
//! - [`datachannel`]: channel multiplexing with an in-band open handshake,
//!   message framing and a single message handler.
//!
//! [`Connection`] ties the three together. It performs no I/O of its own;
//! [`transport::UdpTransport`] is a ready-made socket for driving it.

pub mod config;
pub mod datachannel;
pub mod error;
pub mod sctp;
pub mod security;
pub mod transport;
pub mod utils;

pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, OverflowPolicy, Role, TransportConfig,
};
pub use datachannel::{
    ChannelStatus, Connection, ConnectionState, ConnectionStatus, DataChannel, DataChannelConfig,
    DataChannelEvent, DataChannelState, Message, MessageKind, stats_to_json,
};
pub use error::{NetworkError, Result, SecurityError};
pub use sctp::{SendOutcome, TransportStats};
pub use security::{CipherSuite, KeyMaterial, RandomSource, SecurityContext};
pub use transport::{DatagramSocket, UdpTransport};
pub use utils::{Clock, ManualClock, SystemClock};
