//! SCTP-style reliable transport
//!
//! ```text
//! ┌─────────────────────────────┐
//! │     Data channels           │
//! ├─────────────────────────────┤
//! │     Association             │  ← This module
//! ├─────────────────────────────┤
//! │     Record security         │
//! ├─────────────────────────────┤
//! │     UDP                     │
//! └─────────────────────────────┘
//! ```
//!
//! Implemented: DATA with fragmentation, SACK with gap blocks and duplicate
//! reports, ABORT, a reduced outgoing stream reset, congestion control and
//! retransmission timing.
//!
//! Not implemented: the INIT/COOKIE handshake (both peers share a configured
//! initial TSN), multi-homing, partial reliability.

pub mod association;
pub mod chunk;
pub mod congestion;
pub mod dcep;
pub mod packet;

pub use association::{AckSummary, Association, MAX_TSN_LOOKAHEAD, SendOutcome, TransportStats};
pub use chunk::{
    Chunk, ChunkType, DataChunk, GapBlock, SackChunk, StreamResetChunk, ppid, tsn_gt, tsn_gte,
};
pub use congestion::CongestionController;
pub use dcep::{ChannelType, DataChannelOpen, DcepMessage};
pub use packet::{COMMON_HEADER_SIZE, Packet, crc32c};
