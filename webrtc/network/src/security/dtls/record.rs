use super::cipher_suite::CipherSuite;
use super::key_schedule::{KeyMaterial, derive_key_material, derive_master_secret};
use crate::config::Role;
use crate::error::SecurityError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use std::fmt;
use zeroize::Zeroize;

pub const CONTENT_TYPE_APPLICATION_DATA: u8 = 23;
pub const DTLS_1_2_VERSION: u16 = 0xFEFD;
pub const RECORD_HEADER_LEN: usize = 13;
pub const EXPLICIT_NONCE_LEN: usize = 8;
pub const GCM_TAG_LEN: usize = 16;
/// Record sequence numbers are 48 bits on the wire.
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 48) - 1;

const AEAD_OVERHEAD: usize = EXPLICIT_NONCE_LEN + GCM_TAG_LEN;
const MAX_PLAINTEXT_LEN: usize = 16384;

/// 13-byte DTLS 1.2 record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: u8,
    pub version: u16,
    pub epoch: u16,
    pub sequence: u64,
    pub length: u16,
}

impl RecordHeader {
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut out = [0u8; RECORD_HEADER_LEN];
        out[0] = self.content_type;
        out[1..3].copy_from_slice(&self.version.to_be_bytes());
        out[3..5].copy_from_slice(&self.epoch.to_be_bytes());
        out[5..11].copy_from_slice(&(self.sequence & MAX_SEQUENCE_NUMBER).to_be_bytes()[2..]);
        out[11..13].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    /// Parses a header and returns it with its fragment.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), SecurityError> {
        if data.len() < RECORD_HEADER_LEN {
            return Err(SecurityError::RecordTooShort { len: data.len() });
        }

        let mut seq = [0u8; 8];
        seq[2..].copy_from_slice(&data[5..11]);
        let header = RecordHeader {
            content_type: data[0],
            version: u16::from_be_bytes([data[1], data[2]]),
            epoch: u16::from_be_bytes([data[3], data[4]]),
            sequence: u64::from_be_bytes(seq),
            length: u16::from_be_bytes([data[11], data[12]]),
        };

        let end = RECORD_HEADER_LEN + header.length as usize;
        if data.len() < end {
            return Err(SecurityError::RecordTooShort { len: data.len() });
        }
        Ok((header, &data[RECORD_HEADER_LEN..end]))
    }
}

/// `epoch(2) ‖ seq(6) ‖ content_type(1) ‖ version(2) ‖ length(2)`
pub fn build_aad(
    epoch: u16,
    seq: u64,
    content_type: u8,
    version: u16,
    length: u16,
) -> [u8; RECORD_HEADER_LEN] {
    RecordHeader {
        content_type,
        version,
        epoch,
        sequence: seq,
        length,
    }
    .aad_bytes()
}

impl RecordHeader {
    fn aad_bytes(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut aad = [0u8; RECORD_HEADER_LEN];
        aad[..2].copy_from_slice(&self.epoch.to_be_bytes());
        aad[2..8].copy_from_slice(&(self.sequence & MAX_SEQUENCE_NUMBER).to_be_bytes()[2..]);
        aad[8] = self.content_type;
        aad[9..11].copy_from_slice(&self.version.to_be_bytes());
        aad[11..13].copy_from_slice(&self.length.to_be_bytes());
        aad
    }
}

fn explicit_nonce(epoch: u16, seq: u64) -> [u8; EXPLICIT_NONCE_LEN] {
    let mut explicit = (seq & MAX_SEQUENCE_NUMBER).to_be_bytes();
    explicit[..2].copy_from_slice(&epoch.to_be_bytes());
    explicit
}

fn full_nonce(fixed_iv: &[u8; 4], explicit: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(fixed_iv);
    nonce[4..].copy_from_slice(explicit);
    nonce
}

enum RecordCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl RecordCipher {
    fn new(key: &[u8]) -> Result<Self, SecurityError> {
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(RecordCipher::Aes128)
                .map_err(|e| SecurityError::KeyDerivation(e.to_string())),
            32 => Aes256Gcm::new_from_slice(key)
                .map(RecordCipher::Aes256)
                .map_err(|e| SecurityError::KeyDerivation(e.to_string())),
            other => Err(SecurityError::InvalidKeyLength {
                expected: 16,
                actual: other,
            }),
        }
    }

    fn seal(&self, nonce: &[u8; 12], msg: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload { msg, aad };
        match self {
            RecordCipher::Aes128(cipher) => cipher.encrypt(nonce, payload).ok(),
            RecordCipher::Aes256(cipher) => cipher.encrypt(nonce, payload).ok(),
        }
    }

    fn open(&self, nonce: &[u8; 12], msg: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload { msg, aad };
        match self {
            RecordCipher::Aes128(cipher) => cipher.decrypt(nonce, payload).ok(),
            RecordCipher::Aes256(cipher) => cipher.decrypt(nonce, payload).ok(),
        }
    }
}

/// Per-endpoint record protection state.
///
/// Encrypt and decrypt are pure over `(self, epoch, seq, content_type,
/// version, data)`. Sequence uniqueness per direction is the caller's job.
/// Before keys are installed, or with the `Null` suite, both are identity.
pub struct SecurityContext {
    role: Role,
    suite: Option<CipherSuite>,
    keys: Option<KeyMaterial>,
    write: Option<RecordCipher>,
    read: Option<RecordCipher>,
}

impl SecurityContext {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            suite: None,
            keys: None,
            write: None,
            read: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.suite
    }

    pub fn has_keys(&self) -> bool {
        self.keys.is_some()
    }

    /// True once records are actually being encrypted.
    pub fn is_active(&self) -> bool {
        self.write.is_some()
    }

    /// Installs key material for `suite`, replacing any earlier keys.
    pub fn install_keys(
        &mut self,
        suite: CipherSuite,
        keys: KeyMaterial,
    ) -> Result<(), SecurityError> {
        for key in [&keys.client_write_key, &keys.server_write_key] {
            if key.len() != suite.key_len() {
                return Err(SecurityError::InvalidKeyLength {
                    expected: suite.key_len(),
                    actual: key.len(),
                });
            }
        }

        let (write_key, read_key) = match self.role {
            Role::Client => (&keys.client_write_key, &keys.server_write_key),
            Role::Server => (&keys.server_write_key, &keys.client_write_key),
        };
        let (write, read) = if suite.encrypts() {
            (
                Some(RecordCipher::new(write_key)?),
                Some(RecordCipher::new(read_key)?),
            )
        } else {
            (None, None)
        };

        self.suite = Some(suite);
        self.keys = Some(keys);
        self.write = write;
        self.read = read;
        Ok(())
    }

    /// Derives master secret and key block from handshake output and
    /// installs the result.
    pub fn establish(
        &mut self,
        suite: CipherSuite,
        pre_master_secret: &[u8],
        client_random: &[u8; 32],
        server_random: &[u8; 32],
    ) -> Result<(), SecurityError> {
        let mut master =
            derive_master_secret(pre_master_secret, client_random, server_random, suite)?;
        let keys = derive_key_material(&master, client_random, server_random, suite);
        master.zeroize();
        self.install_keys(suite, keys?)
    }

    fn write_iv(&self, keys: &KeyMaterial) -> [u8; 4] {
        match self.role {
            Role::Client => keys.client_write_iv,
            Role::Server => keys.server_write_iv,
        }
    }

    fn read_iv(&self, keys: &KeyMaterial) -> [u8; 4] {
        match self.role {
            Role::Client => keys.server_write_iv,
            Role::Server => keys.client_write_iv,
        }
    }

    /// Returns `explicit_nonce ‖ ciphertext ‖ tag`.
    pub fn encrypt_record(
        &self,
        epoch: u16,
        seq: u64,
        content_type: u8,
        version: u16,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SecurityError> {
        let (Some(cipher), Some(keys)) = (&self.write, &self.keys) else {
            return Ok(plaintext.to_vec());
        };
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(SecurityError::RecordTooLong {
                len: plaintext.len(),
            });
        }

        let explicit = explicit_nonce(epoch, seq);
        let nonce = full_nonce(&self.write_iv(keys), &explicit);
        let aad = build_aad(epoch, seq, content_type, version, plaintext.len() as u16);
        let sealed = cipher
            .seal(&nonce, plaintext, &aad)
            .ok_or(SecurityError::RecordTooLong {
                len: plaintext.len(),
            })?;

        let mut out = Vec::with_capacity(EXPLICIT_NONCE_LEN + sealed.len());
        out.extend_from_slice(&explicit);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Inverse of [`encrypt_record`](Self::encrypt_record). Any
    /// authentication failure is reported as `BadRecordMac`, with no output.
    pub fn decrypt_record(
        &self,
        epoch: u16,
        seq: u64,
        content_type: u8,
        version: u16,
        record: &[u8],
    ) -> Result<Vec<u8>, SecurityError> {
        let (Some(cipher), Some(keys)) = (&self.read, &self.keys) else {
            return Ok(record.to_vec());
        };
        if record.len() < AEAD_OVERHEAD {
            return Err(SecurityError::RecordTooShort { len: record.len() });
        }

        let (explicit, body) = record.split_at(EXPLICIT_NONCE_LEN);
        let plaintext_len = body.len() - GCM_TAG_LEN;
        let nonce = full_nonce(&self.read_iv(keys), explicit);
        let aad = build_aad(epoch, seq, content_type, version, plaintext_len as u16);

        cipher
            .open(&nonce, body, &aad)
            .ok_or(SecurityError::BadRecordMac)
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("role", &self.role)
            .field("suite", &self.suite)
            .field("active", &self.is_active())
            .finish()
    }
}
