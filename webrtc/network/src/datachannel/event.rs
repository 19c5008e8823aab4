/// Events queued by a [`Connection`](super::Connection)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChannelEvent {
    /// A channel became open, either opened by the peer or acked by it
    ChannelOpened { id: u16, label: String },
    ChannelClosed { id: u16 },
    /// The connection was closed locally or aborted by the peer
    ConnectionClosed,
    /// Inbound input was rejected; the connection is still usable
    Error { message: String },
}
