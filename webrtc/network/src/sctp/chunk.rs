//! Transport chunk types
//!
//! A packet carries one or more chunks. Each is decoded once, at the packet
//! boundary, into the closed [`Chunk`] enum. Unknown types survive as
//! [`Chunk::Unknown`] and are skipped by the association.

use crate::error::{NetworkError, Result};

/// Chunk type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    Data = 0,
    Sack = 3,
    Abort = 6,
    /// Simplified outgoing stream reset
    ReConfig = 130,
}

impl ChunkType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            3 => Some(Self::Sack),
            6 => Some(Self::Abort),
            130 => Some(Self::ReConfig),
            _ => None,
        }
    }
}

/// Payload protocol identifiers carried in DATA chunks
pub mod ppid {
    /// Channel establishment control message
    pub const DCEP: u32 = 50;
    /// UTF-8 text
    pub const STRING: u32 = 51;
    pub const BINARY: u32 = 53;
    /// Empty text (one zero byte on the wire)
    pub const STRING_EMPTY: u32 = 56;
    /// Empty binary (one zero byte on the wire)
    pub const BINARY_EMPTY: u32 = 57;
}

pub const DATA_HEADER_LEN: usize = 16;
const SACK_HEADER_LEN: usize = 16;
const CHUNK_HEADER_LEN: usize = 4;

const FLAG_UNORDERED: u8 = 0x04;
const FLAG_BEGINNING: u8 = 0x02;
const FLAG_ENDING: u8 = 0x01;
const FLAG_RESET_RESPONSE: u8 = 0x01;

fn padding(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

fn invalid(msg: impl Into<String>) -> NetworkError {
    NetworkError::InvalidPacket(msg.into())
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// DATA chunk
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0    | Reserved|U|B|E|         Length                |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                              TSN                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Stream Identifier        |   Stream Sequence Number      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                  Payload Protocol Identifier                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                           User Data                           /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChunk {
    pub unordered: bool,
    /// First fragment of a message
    pub beginning: bool,
    /// Last fragment of a message
    pub ending: bool,
    pub tsn: u32,
    /// Channel id
    pub stream_id: u16,
    pub stream_seq: u16,
    pub ppid: u32,
    pub data: Vec<u8>,
}

impl DataChunk {
    /// Single-fragment chunk
    pub fn new(tsn: u32, stream_id: u16, stream_seq: u16, ppid: u32, data: Vec<u8>) -> Self {
        Self {
            unordered: false,
            beginning: true,
            ending: true,
            tsn,
            stream_id,
            stream_seq,
            ppid,
            data,
        }
    }

    /// Bytes this chunk occupies on the wire, padding included.
    pub fn wire_len(&self) -> usize {
        let len = DATA_HEADER_LEN + self.data.len();
        len + padding(len)
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(ChunkType::Data as u8);
        let mut flags = 0;
        if self.unordered {
            flags |= FLAG_UNORDERED;
        }
        if self.beginning {
            flags |= FLAG_BEGINNING;
        }
        if self.ending {
            flags |= FLAG_ENDING;
        }
        buf.push(flags);
        let length = (DATA_HEADER_LEN + self.data.len()) as u16;
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&self.tsn.to_be_bytes());
        buf.extend_from_slice(&self.stream_id.to_be_bytes());
        buf.extend_from_slice(&self.stream_seq.to_be_bytes());
        buf.extend_from_slice(&self.ppid.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf.extend(std::iter::repeat_n(0u8, padding(self.data.len())));
    }

    /// Parses a chunk whose declared length has already been checked
    /// against the buffer.
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DATA_HEADER_LEN {
            return Err(invalid("DATA chunk too short"));
        }
        let flags = data[1];
        Ok(Self {
            unordered: flags & FLAG_UNORDERED != 0,
            beginning: flags & FLAG_BEGINNING != 0,
            ending: flags & FLAG_ENDING != 0,
            tsn: read_u32(data, 4),
            stream_id: read_u16(data, 8),
            stream_seq: read_u16(data, 10),
            ppid: read_u32(data, 12),
            data: data[DATA_HEADER_LEN..].to_vec(),
        })
    }
}

/// Gap ack block, offsets relative to the cumulative TSN ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapBlock {
    pub start: u16,
    pub end: u16,
}

/// Selective acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SackChunk {
    pub cumulative_tsn: u32,
    /// Advertised receiver window
    pub a_rwnd: u32,
    pub gap_blocks: Vec<GapBlock>,
    pub duplicate_tsns: Vec<u32>,
}

impl SackChunk {
    pub fn new(cumulative_tsn: u32, a_rwnd: u32) -> Self {
        Self {
            cumulative_tsn,
            a_rwnd,
            gap_blocks: Vec::new(),
            duplicate_tsns: Vec::new(),
        }
    }

    pub fn wire_len(&self) -> usize {
        SACK_HEADER_LEN + 4 * (self.gap_blocks.len() + self.duplicate_tsns.len())
    }

    /// Whether `tsn` is covered by the cumulative ack or one of the gap
    /// blocks.
    pub fn acknowledges(&self, tsn: u32) -> bool {
        if !tsn_gt(tsn, self.cumulative_tsn) {
            return true;
        }
        let offset = tsn.wrapping_sub(self.cumulative_tsn);
        self.gap_blocks
            .iter()
            .any(|b| offset >= u32::from(b.start) && offset <= u32::from(b.end))
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(ChunkType::Sack as u8);
        buf.push(0);
        buf.extend_from_slice(&(self.wire_len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.cumulative_tsn.to_be_bytes());
        buf.extend_from_slice(&self.a_rwnd.to_be_bytes());
        buf.extend_from_slice(&(self.gap_blocks.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(self.duplicate_tsns.len() as u16).to_be_bytes());
        for block in &self.gap_blocks {
            buf.extend_from_slice(&block.start.to_be_bytes());
            buf.extend_from_slice(&block.end.to_be_bytes());
        }
        for tsn in &self.duplicate_tsns {
            buf.extend_from_slice(&tsn.to_be_bytes());
        }
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < SACK_HEADER_LEN {
            return Err(invalid("SACK chunk too short"));
        }
        let num_gaps = read_u16(data, 12) as usize;
        let num_dups = read_u16(data, 14) as usize;
        if data.len() < SACK_HEADER_LEN + 4 * (num_gaps + num_dups) {
            return Err(invalid(format!(
                "SACK declares {num_gaps} gaps and {num_dups} duplicates but has {} bytes",
                data.len()
            )));
        }

        let mut offset = SACK_HEADER_LEN;
        let mut gap_blocks = Vec::with_capacity(num_gaps);
        for _ in 0..num_gaps {
            gap_blocks.push(GapBlock {
                start: read_u16(data, offset),
                end: read_u16(data, offset + 2),
            });
            offset += 4;
        }
        let mut duplicate_tsns = Vec::with_capacity(num_dups);
        for _ in 0..num_dups {
            duplicate_tsns.push(read_u32(data, offset));
            offset += 4;
        }

        Ok(Self {
            cumulative_tsn: read_u32(data, 4),
            a_rwnd: read_u32(data, 8),
            gap_blocks,
            duplicate_tsns,
        })
    }
}

/// Outgoing stream reset request, or the peer's response to one.
///
/// A request says the sender will not send on `stream_ids` after
/// `last_tsn`. The receiver answers with `response` set and the same
/// `request_seq` once it has applied the reset. This is a reduced form of
/// the RE-CONFIG chunk with the response flagged in the chunk flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResetChunk {
    pub request_seq: u32,
    pub last_tsn: u32,
    pub stream_ids: Vec<u16>,
    pub response: bool,
}

impl StreamResetChunk {
    pub fn request(request_seq: u32, last_tsn: u32, stream_ids: Vec<u16>) -> Self {
        Self {
            request_seq,
            last_tsn,
            stream_ids,
            response: false,
        }
    }

    pub fn response(request_seq: u32) -> Self {
        Self {
            request_seq,
            last_tsn: 0,
            stream_ids: Vec::new(),
            response: true,
        }
    }

    pub fn wire_len(&self) -> usize {
        let len = CHUNK_HEADER_LEN + 8 + 2 * self.stream_ids.len();
        len + padding(len)
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        let length = CHUNK_HEADER_LEN + 8 + 2 * self.stream_ids.len();
        buf.push(ChunkType::ReConfig as u8);
        buf.push(if self.response { FLAG_RESET_RESPONSE } else { 0 });
        buf.extend_from_slice(&(length as u16).to_be_bytes());
        buf.extend_from_slice(&self.request_seq.to_be_bytes());
        buf.extend_from_slice(&self.last_tsn.to_be_bytes());
        for id in &self.stream_ids {
            buf.extend_from_slice(&id.to_be_bytes());
        }
        buf.extend(std::iter::repeat_n(0u8, padding(length)));
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CHUNK_HEADER_LEN + 8 || (data.len() - CHUNK_HEADER_LEN - 8) % 2 != 0 {
            return Err(invalid("RE-CONFIG chunk malformed"));
        }
        let stream_ids = data[CHUNK_HEADER_LEN + 8..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self {
            request_seq: read_u32(data, 4),
            last_tsn: read_u32(data, 8),
            stream_ids,
            response: data[1] & FLAG_RESET_RESPONSE != 0,
        })
    }
}

/// Every chunk the transport understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(DataChunk),
    Sack(SackChunk),
    /// Connection teardown
    Abort,
    StreamReset(StreamResetChunk),
    Unknown { chunk_type: u8, data: Vec<u8> },
}

impl Chunk {
    /// Parses one chunk starting at the front of `data` and returns it
    /// with the number of bytes consumed, padding included.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < CHUNK_HEADER_LEN {
            return Err(invalid("chunk header truncated"));
        }
        let chunk_type = data[0];
        let declared = read_u16(data, 2) as usize;
        if declared < CHUNK_HEADER_LEN || declared > data.len() {
            return Err(invalid(format!(
                "chunk type {chunk_type} declares length {declared}, {} available",
                data.len()
            )));
        }
        let body = &data[..declared];

        let chunk = match ChunkType::from_u8(chunk_type) {
            Some(ChunkType::Data) => Chunk::Data(DataChunk::parse(body)?),
            Some(ChunkType::Sack) => Chunk::Sack(SackChunk::parse(body)?),
            Some(ChunkType::Abort) => Chunk::Abort,
            Some(ChunkType::ReConfig) => Chunk::StreamReset(StreamResetChunk::parse(body)?),
            None => Chunk::Unknown {
                chunk_type,
                data: body[CHUNK_HEADER_LEN..].to_vec(),
            },
        };

        let consumed = (declared + padding(declared)).min(data.len());
        Ok((chunk, consumed))
    }

    pub fn wire_len(&self) -> usize {
        match self {
            Chunk::Data(chunk) => chunk.wire_len(),
            Chunk::Sack(chunk) => chunk.wire_len(),
            Chunk::Abort => CHUNK_HEADER_LEN,
            Chunk::StreamReset(chunk) => chunk.wire_len(),
            Chunk::Unknown { data, .. } => {
                let len = CHUNK_HEADER_LEN + data.len();
                len + padding(len)
            }
        }
    }

    /// Appends the chunk, padded to a 4-byte boundary.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Chunk::Data(chunk) => chunk.write_to(buf),
            Chunk::Sack(chunk) => chunk.write_to(buf),
            Chunk::Abort => buf.extend_from_slice(&[ChunkType::Abort as u8, 0, 0, 4]),
            Chunk::StreamReset(chunk) => chunk.write_to(buf),
            Chunk::Unknown { chunk_type, data } => {
                let length = CHUNK_HEADER_LEN + data.len();
                buf.push(*chunk_type);
                buf.push(0);
                buf.extend_from_slice(&(length as u16).to_be_bytes());
                buf.extend_from_slice(data);
                buf.extend(std::iter::repeat_n(0u8, padding(length)));
            }
        }
    }
}

/// Serial number comparison for TSNs (RFC 1982): true if `a` is after `b`.
pub fn tsn_gt(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000_0000
}

/// `a` is `b` or after it.
pub fn tsn_gte(a: u32, b: u32) -> bool {
    a == b || tsn_gt(a, b)
}
