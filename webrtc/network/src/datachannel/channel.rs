//! Individual data channel
//!
//! A data channel is one bidirectional message stream, carried on the
//! transport stream with the same id.

use crate::sctp::{DataChunk, ppid};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Data channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataChannelState {
    /// Open request sent, waiting for the peer's ack
    Connecting,
    Open,
    /// Reset sent, waiting for outstanding data to be acknowledged
    Closing,
    Closed,
}

/// Configuration for a data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelConfig {
    pub label: String,
    /// Whether messages are delivered in order
    pub ordered: bool,
    /// Both sides agreed on the id out of band; no open handshake.
    pub negotiated: bool,
    /// Explicit id, only for negotiated channels
    pub id: Option<u16>,
    pub protocol: String,
}

impl Default for DataChannelConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            ordered: true,
            negotiated: false,
            id: None,
            protocol: String::new(),
        }
    }
}

impl DataChannelConfig {
    /// Reliable ordered channel opened in-band
    pub fn reliable(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Pre-agreed channel. Both peers must use the same `id`.
    pub fn negotiated(label: impl Into<String>, id: u16) -> Self {
        Self {
            label: label.into(),
            negotiated: true,
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn unordered(mut self) -> Self {
        self.ordered = false;
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Binary,
}

/// A reassembled inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub data: Vec<u8>,
}

impl Message {
    /// Payload as text, if it was sent as text and is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => std::str::from_utf8(&self.data).ok(),
            MessageKind::Binary => None,
        }
    }
}

/// Result of feeding one fragment to a channel
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Reassembly {
    Complete(Message),
    Partial,
    /// Fragment did not continue a message, or the message grew too big.
    Discarded,
}

#[derive(Debug)]
pub struct DataChannel {
    id: u16,
    config: DataChannelConfig,
    state: DataChannelState,
    recv_queue: VecDeque<Message>,
    /// Fragmented message in progress: stream sequence, ppid and bytes
    partial: Option<(u16, u32, Vec<u8>)>,
    bytes_sent: u64,
    bytes_received: u64,
    messages_sent: u64,
    messages_received: u64,
}

impl DataChannel {
    pub(crate) fn new(id: u16, config: DataChannelConfig, state: DataChannelState) -> Self {
        Self {
            id,
            config,
            state,
            recv_queue: VecDeque::new(),
            partial: None,
            bytes_sent: 0,
            bytes_received: 0,
            messages_sent: 0,
            messages_received: 0,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn protocol(&self) -> &str {
        &self.config.protocol
    }

    pub fn state(&self) -> DataChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == DataChannelState::Open
    }

    pub fn is_ordered(&self) -> bool {
        self.config.ordered
    }

    pub fn is_negotiated(&self) -> bool {
        self.config.negotiated
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Messages waiting in [`recv`](Self::recv)
    pub fn pending_messages(&self) -> usize {
        self.recv_queue.len()
    }

    pub(crate) fn recv(&mut self) -> Option<Message> {
        self.recv_queue.pop_front()
    }

    pub(crate) fn on_open(&mut self) {
        if self.state == DataChannelState::Connecting {
            self.state = DataChannelState::Open;
        }
    }

    pub(crate) fn on_closing(&mut self) {
        if matches!(
            self.state,
            DataChannelState::Connecting | DataChannelState::Open
        ) {
            self.state = DataChannelState::Closing;
        }
    }

    pub(crate) fn on_closed(&mut self) {
        self.state = DataChannelState::Closed;
        self.partial = None;
    }

    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.messages_sent += 1;
    }

    /// Feeds one DATA chunk, in delivery order. `max_message_size` bounds
    /// reassembly memory.
    ///
    /// Single-chunk messages never touch a message in progress: on an
    /// unordered channel they may be delivered between its fragments.
    pub(crate) fn on_fragment(&mut self, chunk: DataChunk, max_message_size: usize) -> Reassembly {
        if chunk.beginning && chunk.ending {
            if chunk.data.len() > max_message_size {
                return Reassembly::Discarded;
            }
            return self.complete(chunk.ppid, chunk.data);
        }

        let mut data = if chunk.beginning {
            Vec::new()
        } else {
            match self.partial.take() {
                Some((seq, ppid, buf)) if seq == chunk.stream_seq && ppid == chunk.ppid => buf,
                other => {
                    self.partial = other;
                    return Reassembly::Discarded;
                }
            }
        };
        data.extend_from_slice(&chunk.data);
        if data.len() > max_message_size {
            return Reassembly::Discarded;
        }
        if !chunk.ending {
            self.partial = Some((chunk.stream_seq, chunk.ppid, data));
            return Reassembly::Partial;
        }
        self.complete(chunk.ppid, data)
    }

    fn complete(&mut self, protocol_id: u32, data: Vec<u8>) -> Reassembly {
        let (kind, data) = match protocol_id {
            ppid::STRING => (MessageKind::Text, data),
            ppid::STRING_EMPTY => (MessageKind::Text, Vec::new()),
            ppid::BINARY_EMPTY => (MessageKind::Binary, Vec::new()),
            _ => (MessageKind::Binary, data),
        };
        self.bytes_received += data.len() as u64;
        self.messages_received += 1;
        Reassembly::Complete(Message { kind, data })
    }

    pub(crate) fn push_received(&mut self, message: Message) {
        self.recv_queue.push_back(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(ppid: u32, data: &[u8], beginning: bool, ending: bool) -> DataChunk {
        let mut chunk = DataChunk::new(0, 0, 0, ppid, data.to_vec());
        chunk.beginning = beginning;
        chunk.ending = ending;
        chunk
    }

    #[test]
    fn test_channel_creation() {
        let channel = DataChannel::new(
            0,
            DataChannelConfig::reliable("test"),
            DataChannelState::Connecting,
        );
        assert_eq!(channel.id(), 0);
        assert_eq!(channel.label(), "test");
        assert_eq!(channel.state(), DataChannelState::Connecting);
        assert!(channel.is_ordered());
    }

    #[test]
    fn test_lifecycle() {
        let mut channel = DataChannel::new(
            2,
            DataChannelConfig::reliable("x"),
            DataChannelState::Connecting,
        );
        channel.on_open();
        assert!(channel.is_open());
        channel.on_closing();
        assert_eq!(channel.state(), DataChannelState::Closing);
        channel.on_open();
        assert_eq!(channel.state(), DataChannelState::Closing);
        channel.on_closed();
        channel.on_closing();
        assert_eq!(channel.state(), DataChannelState::Closed);
    }

    #[test]
    fn test_reassembly() {
        let mut channel = DataChannel::new(
            0,
            DataChannelConfig::reliable("x"),
            DataChannelState::Open,
        );
        assert_eq!(
            channel.on_fragment(fragment(ppid::STRING, b"hel", true, false), 100),
            Reassembly::Partial
        );
        let done = channel.on_fragment(fragment(ppid::STRING, b"lo", false, true), 100);
        let Reassembly::Complete(message) = done else {
            panic!("expected a complete message, got {done:?}");
        };
        assert_eq!(message.as_text(), Some("hello"));
        assert_eq!(channel.bytes_received(), 5);
        assert_eq!(channel.messages_received(), 1);
    }

    #[test]
    fn test_orphan_continuation_discarded() {
        let mut channel = DataChannel::new(
            0,
            DataChannelConfig::reliable("x"),
            DataChannelState::Open,
        );
        assert_eq!(
            channel.on_fragment(fragment(ppid::BINARY, b"tail", false, true), 100),
            Reassembly::Discarded
        );
    }

    #[test]
    fn test_single_chunk_message_between_fragments() {
        let mut channel = DataChannel::new(
            0,
            DataChannelConfig::reliable("x").unordered(),
            DataChannelState::Open,
        );
        let mut head = fragment(ppid::BINARY, b"big-", true, false);
        head.stream_seq = 4;
        let mut small = fragment(ppid::BINARY, b"b", true, true);
        small.stream_seq = 5;
        let mut tail = fragment(ppid::BINARY, b"message", false, true);
        tail.stream_seq = 4;

        assert_eq!(channel.on_fragment(head, 100), Reassembly::Partial);
        let Reassembly::Complete(first) = channel.on_fragment(small, 100) else {
            panic!("expected the single chunk message");
        };
        assert_eq!(first.data, b"b");
        let Reassembly::Complete(second) = channel.on_fragment(tail, 100) else {
            panic!("expected the fragmented message to complete");
        };
        assert_eq!(second.data, b"big-message");
        assert_eq!(channel.messages_received(), 2);
    }

    #[test]
    fn test_oversized_message_discarded() {
        let mut channel = DataChannel::new(
            0,
            DataChannelConfig::reliable("x"),
            DataChannelState::Open,
        );
        channel.on_fragment(fragment(ppid::BINARY, &[0; 8], true, false), 10);
        assert_eq!(
            channel.on_fragment(fragment(ppid::BINARY, &[0; 8], false, true), 10),
            Reassembly::Discarded
        );
    }

    #[test]
    fn test_empty_payload_markers() {
        let mut channel = DataChannel::new(
            0,
            DataChannelConfig::reliable("x"),
            DataChannelState::Open,
        );
        let done = channel.on_fragment(fragment(ppid::STRING_EMPTY, &[0], true, true), 10);
        assert_eq!(
            done,
            Reassembly::Complete(Message {
                kind: MessageKind::Text,
                data: Vec::new()
            })
        );
    }

    #[test]
    fn test_negotiated_config() {
        let config = DataChannelConfig::negotiated("chat", 6).with_protocol("json");
        assert!(config.negotiated);
        assert_eq!(config.id, Some(6));
        assert_eq!(config.protocol, "json");
        assert!(!DataChannelConfig::reliable("u").unordered().ordered);
    }
}
