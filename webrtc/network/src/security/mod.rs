//! Record security for data channel traffic
//!
//! Authenticated encryption of transport packets once keying material from an
//! external DTLS handshake is available. No I/O happens here.

pub mod dtls;
pub mod random;

pub use dtls::{
    CipherSuite, KeyMaterial, PrfHash, RecordHeader, ReplayWindow, SecurityContext,
    derive_key_material, derive_master_secret,
};
pub use random::{RandomSource, generate_random, random_bytes};
