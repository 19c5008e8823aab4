//! DTLS 1.2 style record protection
//!
//! The handshake itself happens elsewhere. This module owns what comes after
//! it: the PRF-based key schedule, AES-GCM record encryption with an explicit
//! nonce, record header framing and the anti-replay window.

mod cipher_suite;
mod key_schedule;
mod record;
mod replay;

pub use cipher_suite::{CipherSuite, PrfHash};
pub use key_schedule::{
    KeyMaterial, MASTER_SECRET_LEN, derive_key_material, derive_master_secret, prf,
};
pub use record::{
    CONTENT_TYPE_APPLICATION_DATA, DTLS_1_2_VERSION, EXPLICIT_NONCE_LEN, GCM_TAG_LEN,
    MAX_SEQUENCE_NUMBER, RECORD_HEADER_LEN, RecordHeader, SecurityContext, build_aad,
};
pub use replay::ReplayWindow;
