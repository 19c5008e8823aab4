//! Channel establishment control messages (RFC 8832 layout)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Message Type |  Channel Type |            Priority           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Reliability Parameter                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Label Length          |       Protocol Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                             Label                             /
//! /                            Protocol                           /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The ack is the single byte `0x02`.

use crate::error::{NetworkError, Result};

const MSG_OPEN: u8 = 0x03;
const MSG_ACK: u8 = 0x02;
const OPEN_HEADER_LEN: usize = 12;

/// Delivery mode announced in an open request. Only fully reliable modes
/// exist here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelType {
    Reliable = 0x00,
    ReliableUnordered = 0x80,
}

impl ChannelType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Reliable),
            0x80 => Some(Self::ReliableUnordered),
            _ => None,
        }
    }

    pub fn from_ordered(ordered: bool) -> Self {
        if ordered {
            Self::Reliable
        } else {
            Self::ReliableUnordered
        }
    }

    pub fn is_ordered(self) -> bool {
        self == Self::Reliable
    }
}

/// DATA_CHANNEL_OPEN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelOpen {
    pub channel_type: ChannelType,
    pub priority: u16,
    pub reliability_param: u32,
    pub label: String,
    pub protocol: String,
}

impl DataChannelOpen {
    pub fn new(label: impl Into<String>, protocol: impl Into<String>, ordered: bool) -> Self {
        Self {
            channel_type: ChannelType::from_ordered(ordered),
            priority: 0,
            reliability_param: 0,
            label: label.into(),
            protocol: protocol.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let label = self.label.as_bytes();
        let protocol = self.protocol.as_bytes();
        let mut buf = Vec::with_capacity(OPEN_HEADER_LEN + label.len() + protocol.len());
        buf.push(MSG_OPEN);
        buf.push(self.channel_type as u8);
        buf.extend_from_slice(&self.priority.to_be_bytes());
        buf.extend_from_slice(&self.reliability_param.to_be_bytes());
        buf.extend_from_slice(&(label.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(protocol.len() as u16).to_be_bytes());
        buf.extend_from_slice(label);
        buf.extend_from_slice(protocol);
        buf
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < OPEN_HEADER_LEN {
            return Err(invalid("DATA_CHANNEL_OPEN too short"));
        }
        let channel_type = ChannelType::from_u8(data[1])
            .ok_or_else(|| invalid(format!("unsupported channel type 0x{:02X}", data[1])))?;
        let label_len = u16::from_be_bytes([data[8], data[9]]) as usize;
        let protocol_len = u16::from_be_bytes([data[10], data[11]]) as usize;
        let label_end = OPEN_HEADER_LEN + label_len;
        if data.len() < label_end + protocol_len {
            return Err(invalid("DATA_CHANNEL_OPEN truncated"));
        }

        let label = String::from_utf8(data[OPEN_HEADER_LEN..label_end].to_vec())
            .map_err(|_| invalid("label is not UTF-8"))?;
        let protocol = String::from_utf8(data[label_end..label_end + protocol_len].to_vec())
            .map_err(|_| invalid("protocol is not UTF-8"))?;

        Ok(Self {
            channel_type,
            priority: u16::from_be_bytes([data[2], data[3]]),
            reliability_param: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            label,
            protocol,
        })
    }
}

/// Decoded control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DcepMessage {
    Open(DataChannelOpen),
    Ack,
}

impl DcepMessage {
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data.first() {
            Some(&MSG_OPEN) => Ok(DcepMessage::Open(DataChannelOpen::parse(data)?)),
            Some(&MSG_ACK) => Ok(DcepMessage::Ack),
            Some(other) => Err(invalid(format!("unknown DCEP message type 0x{other:02X}"))),
            None => Err(invalid("empty DCEP message")),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            DcepMessage::Open(open) => open.to_bytes(),
            DcepMessage::Ack => vec![MSG_ACK],
        }
    }
}

fn invalid(msg: impl Into<String>) -> NetworkError {
    NetworkError::InvalidPacket(msg.into())
}
