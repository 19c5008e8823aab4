use crate::error::SecurityError;
use serde::{Deserialize, Serialize};

/// Hash used by the TLS 1.2 PRF for a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrfHash {
    Sha256,
    Sha384,
}

/// Cipher suites understood by the record layer.
///
/// The numeric codes are the IANA TLS codes of the ECDHE-ECDSA AES-GCM suites;
/// `Null` installs keys without protecting anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    Aes128GcmSha256,
    Aes256GcmSha384,
    Null,
}

impl CipherSuite {
    /// Length of the implicit (fixed) part of the AEAD nonce.
    pub const FIXED_IV_LEN: usize = 4;

    pub const fn code(self) -> u16 {
        match self {
            CipherSuite::Aes128GcmSha256 => 0xC02B,
            CipherSuite::Aes256GcmSha384 => 0xC02C,
            CipherSuite::Null => 0x0000,
        }
    }

    pub fn from_code(code: u16) -> Result<Self, SecurityError> {
        match code {
            0xC02B => Ok(CipherSuite::Aes128GcmSha256),
            0xC02C => Ok(CipherSuite::Aes256GcmSha384),
            0x0000 => Ok(CipherSuite::Null),
            other => Err(SecurityError::UnsupportedCipherSuite(other)),
        }
    }

    /// Symmetric key size in bytes (0 for `Null`).
    pub const fn key_len(self) -> usize {
        match self {
            CipherSuite::Aes128GcmSha256 => 16,
            CipherSuite::Aes256GcmSha384 => 32,
            CipherSuite::Null => 0,
        }
    }

    pub const fn prf_hash(self) -> PrfHash {
        match self {
            CipherSuite::Aes256GcmSha384 => PrfHash::Sha384,
            CipherSuite::Aes128GcmSha256 | CipherSuite::Null => PrfHash::Sha256,
        }
    }

    /// Whether records are actually encrypted under this suite.
    pub const fn encrypts(self) -> bool {
        self.key_len() > 0
    }

    /// Bytes of key block needed: two write keys and two fixed IVs.
    pub const fn key_block_len(self) -> usize {
        2 * self.key_len() + 2 * Self::FIXED_IV_LEN
    }
}

impl TryFrom<u16> for CipherSuite {
    type Error = SecurityError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        CipherSuite::from_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sizes() {
        assert_eq!(CipherSuite::Aes128GcmSha256.key_len(), 16);
        assert_eq!(CipherSuite::Aes256GcmSha384.key_len(), 32);
        assert_eq!(CipherSuite::Null.key_len(), 0);
        assert!(!CipherSuite::Null.encrypts());
    }

    #[test]
    fn test_code_mapping() {
        for suite in [
            CipherSuite::Aes128GcmSha256,
            CipherSuite::Aes256GcmSha384,
            CipherSuite::Null,
        ] {
            assert_eq!(CipherSuite::from_code(suite.code()), Ok(suite));
        }
        assert_eq!(
            CipherSuite::try_from(0x1301),
            Err(SecurityError::UnsupportedCipherSuite(0x1301))
        );
    }

    #[test]
    fn test_key_block_len() {
        assert_eq!(CipherSuite::Aes128GcmSha256.key_block_len(), 40);
        assert_eq!(CipherSuite::Aes256GcmSha384.key_block_len(), 72);
        assert_eq!(CipherSuite::Null.key_block_len(), 8);
    }
}
