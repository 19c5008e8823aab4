//! Serializable connection snapshots
//!
//! Everything here is a copy taken at one instant. Nothing reads it back.

use super::channel::{DataChannel, DataChannelState};
use crate::config::Role;
use crate::error::Result;
use crate::sctp::TransportStats;
use crate::security::CipherSuite;
use serde::{Deserialize, Serialize};

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub id: u16,
    pub label: String,
    pub protocol: String,
    pub state: DataChannelState,
    pub ordered: bool,
    pub negotiated: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl From<&DataChannel> for ChannelStatus {
    fn from(channel: &DataChannel) -> Self {
        Self {
            id: channel.id(),
            label: channel.label().to_string(),
            protocol: channel.protocol().to_string(),
            state: channel.state(),
            ordered: channel.is_ordered(),
            negotiated: channel.is_negotiated(),
            bytes_sent: channel.bytes_sent(),
            bytes_received: channel.bytes_received(),
            messages_sent: channel.messages_sent(),
            messages_received: channel.messages_received(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub role: Role,
    pub state: ConnectionState,
    pub connected: bool,
    pub encrypted: bool,
    pub cipher_suite: Option<CipherSuite>,
    pub channel_count: usize,
    pub open_channels: usize,
    pub auth_failures: u32,
    pub transport: TransportStats,
    pub channels: Vec<ChannelStatus>,
}

impl ConnectionStatus {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Transport counters as JSON.
pub fn stats_to_json(stats: &TransportStats) -> Result<String> {
    Ok(serde_json::to_string(stats)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datachannel::DataChannelConfig;

    fn sample_stats() -> TransportStats {
        TransportStats {
            cwnd: 4800,
            ssthresh: 65536,
            in_flight_bytes: 0,
            in_flight_count: 0,
            buffered_bytes: 0,
            buffered_count: 0,
            rto_ms: 1000,
            srtt_ms: None,
            next_tsn: 0,
            cumulative_tsn_ack: u32::MAX,
            peer_cumulative_tsn: u32::MAX,
            retransmissions: 0,
        }
    }

    #[test]
    fn test_stats_to_json() {
        let json = stats_to_json(&sample_stats()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["cwnd"], 4800);
        assert_eq!(value["rto_ms"], 1000);
        assert!(value["srtt_ms"].is_null());
    }

    #[test]
    fn test_channel_status_from_channel() {
        let channel = DataChannel::new(
            3,
            DataChannelConfig::reliable("files").with_protocol("raw"),
            DataChannelState::Open,
        );
        let status = ChannelStatus::from(&channel);
        assert_eq!(status.id, 3);
        assert_eq!(status.label, "files");
        assert_eq!(status.protocol, "raw");
        assert_eq!(status.state, DataChannelState::Open);
    }

    #[test]
    fn test_connection_status_json() {
        let status = ConnectionStatus {
            role: Role::Server,
            state: ConnectionState::Connected,
            connected: true,
            encrypted: false,
            cipher_suite: None,
            channel_count: 0,
            open_channels: 0,
            auth_failures: 0,
            transport: sample_stats(),
            channels: Vec::new(),
        };
        let value: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(value["role"], "server");
        assert_eq!(value["state"], "connected");
        assert_eq!(value["transport"]["ssthresh"], 65536);
    }
}
