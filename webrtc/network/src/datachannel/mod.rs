//! Data channels over the reliable transport
//!
//! [`Connection`] owns the record layer, the association and the channel
//! table. Applications create channels, send text or binary messages and
//! receive them through a handler or by polling.
//!
//! ## Usage
//!
//! ```ignore
//! let mut conn = Connection::new(ConnectionConfig::default())?;
//! conn.connect()?;
//! let chat = conn.create_channel("chat", true)?;
//! conn.send_text(chat, "hi")?;
//! for datagram in conn.flush_outgoing()? {
//!     socket.send_to(&datagram, peer)?;
//! }
//! ```

mod channel;
mod connection;
mod event;
mod status;

pub use channel::{DataChannel, DataChannelConfig, DataChannelState, Message, MessageKind};
pub use connection::{Connection, MessageHandler};
pub use event::DataChannelEvent;
pub use status::{ChannelStatus, ConnectionState, ConnectionStatus, stats_to_json};
