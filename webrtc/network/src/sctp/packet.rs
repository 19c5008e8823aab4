//! Transport packet framing
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Source Port Number        |     Destination Port Number   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Verification Tag                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Checksum (CRC32c, LE)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                            Chunks                             /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use super::chunk::Chunk;
use crate::error::{NetworkError, Result};

pub const COMMON_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub source_port: u16,
    pub destination_port: u16,
    pub verification_tag: u32,
    pub chunks: Vec<Chunk>,
}

impl Packet {
    pub fn new(source_port: u16, destination_port: u16, verification_tag: u32) -> Self {
        Self {
            source_port,
            destination_port,
            verification_tag,
            chunks: Vec::new(),
        }
    }

    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Serialized size including the common header.
    pub fn wire_len(&self) -> usize {
        COMMON_HEADER_SIZE + self.chunks.iter().map(Chunk::wire_len).sum::<usize>()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_len());
        buf.extend_from_slice(&self.source_port.to_be_bytes());
        buf.extend_from_slice(&self.destination_port.to_be_bytes());
        buf.extend_from_slice(&self.verification_tag.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        for chunk in &self.chunks {
            chunk.write_to(&mut buf);
        }

        let checksum = crc32c(&buf);
        buf[8..12].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Verifies the checksum and decodes every chunk. Any malformed chunk
    /// rejects the whole packet.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < COMMON_HEADER_SIZE {
            return Err(NetworkError::InvalidPacket(format!(
                "packet too short: {} bytes",
                data.len()
            )));
        }
        if !verify_checksum(data) {
            return Err(NetworkError::InvalidPacket("checksum mismatch".to_string()));
        }

        let mut packet = Packet::new(
            u16::from_be_bytes([data[0], data[1]]),
            u16::from_be_bytes([data[2], data[3]]),
            u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        );

        let mut offset = COMMON_HEADER_SIZE;
        while offset < data.len() {
            let (chunk, consumed) = Chunk::parse(&data[offset..])?;
            packet.chunks.push(chunk);
            offset += consumed;
        }
        Ok(packet)
    }
}

/// Checks the CRC32c over `data` with the checksum field zeroed.
pub fn verify_checksum(data: &[u8]) -> bool {
    if data.len() < COMMON_HEADER_SIZE {
        return false;
    }
    let received = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let computed = crc32c_update(
        crc32c_update(crc32c_update(!0, &data[..8]), &[0u8; 4]),
        &data[COMMON_HEADER_SIZE..],
    );
    received == !computed
}

/// CRC32c (Castagnoli, RFC 3309)
pub fn crc32c(data: &[u8]) -> u32 {
    !crc32c_update(!0, data)
}

fn crc32c_update(mut crc: u32, data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = crc32c_table();
    for byte in data {
        crc = TABLE[((crc ^ u32::from(*byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc
}

const fn crc32c_table() -> [u32; 256] {
    const POLYNOMIAL: u32 = 0x82F6_3B78; // reflected 0x1EDC6F41
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}
