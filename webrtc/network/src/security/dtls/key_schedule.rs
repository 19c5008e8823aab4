use super::cipher_suite::{CipherSuite, PrfHash};
use crate::error::SecurityError;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use std::fmt;
use zeroize::Zeroize;

pub const MASTER_SECRET_LEN: usize = 48;

/// TLS 1.2 PRF (RFC 5246 section 5).
///
/// `PRF(secret, label, seed) = P_<hash>(secret, label + seed)`. The label is
/// prepended here; `seed` is the bare seed.
pub fn prf(
    hash: PrfHash,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, SecurityError> {
    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label.as_bytes());
    full_seed.extend_from_slice(seed);

    match hash {
        PrfHash::Sha256 => p_hash::<Hmac<Sha256>>(secret, &full_seed, output_len),
        PrfHash::Sha384 => p_hash::<Hmac<Sha384>>(secret, &full_seed, output_len),
    }
}

fn p_hash<M>(secret: &[u8], full_seed: &[u8], output_len: usize) -> Result<Vec<u8>, SecurityError>
where
    M: Mac + KeyInit + Clone,
{
    let key = <M as Mac>::new_from_slice(secret)
        .map_err(|e| SecurityError::KeyDerivation(e.to_string()))?;
    let mut result = Vec::with_capacity(output_len);

    // A(1) = HMAC(secret, A(0)), A(0) = seed
    let mut a = {
        let mut mac = key.clone();
        mac.update(full_seed);
        mac.finalize().into_bytes()
    };

    while result.len() < output_len {
        let mut mac = key.clone();
        mac.update(&a);
        mac.update(full_seed);
        let block = mac.finalize().into_bytes();

        let to_copy = (output_len - result.len()).min(block.len());
        result.extend_from_slice(&block[..to_copy]);

        if result.len() < output_len {
            let mut mac = key.clone();
            mac.update(&a);
            a = mac.finalize().into_bytes();
        }
    }

    Ok(result)
}

/// master_secret = PRF(pre_master_secret, "master secret",
///                     client_random + server_random)[0..48]
///
/// The PRF hash is the one `suite` names.
pub fn derive_master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    suite: CipherSuite,
) -> Result<[u8; MASTER_SECRET_LEN], SecurityError> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);

    let mut block = prf(
        suite.prf_hash(),
        pre_master_secret,
        "master secret",
        &seed,
        MASTER_SECRET_LEN,
    )?;
    let mut master = [0u8; MASTER_SECRET_LEN];
    master.copy_from_slice(&block);
    block.zeroize();
    Ok(master)
}

/// Per-direction write keys and fixed IVs for one connection.
///
/// Wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: [u8; 4],
    pub server_write_iv: [u8; 4],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_len", &self.client_write_key.len())
            .finish_non_exhaustive()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.client_write_key.zeroize();
        self.server_write_key.zeroize();
        self.client_write_iv.zeroize();
        self.server_write_iv.zeroize();
    }
}

/// Key expansion (RFC 5246 section 6.3).
///
/// The key block is split as client key, server key, client IV, server IV;
/// no MAC keys are needed for AEAD suites.
pub fn derive_key_material(
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    suite: CipherSuite,
) -> Result<KeyMaterial, SecurityError> {
    if master_secret.len() != MASTER_SECRET_LEN {
        return Err(SecurityError::InvalidKeyLength {
            expected: MASTER_SECRET_LEN,
            actual: master_secret.len(),
        });
    }

    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);

    let mut block = prf(
        suite.prf_hash(),
        master_secret,
        "key expansion",
        &seed,
        suite.key_block_len(),
    )?;

    let key_len = suite.key_len();
    let iv_len = CipherSuite::FIXED_IV_LEN;
    let (client_key, rest) = block.split_at(key_len);
    let (server_key, rest) = rest.split_at(key_len);
    let (client_iv, server_iv) = rest.split_at(iv_len);

    let mut material = KeyMaterial {
        client_write_key: client_key.to_vec(),
        server_write_key: server_key.to_vec(),
        client_write_iv: [0u8; 4],
        server_write_iv: [0u8; 4],
    };
    material.client_write_iv.copy_from_slice(client_iv);
    material.server_write_iv.copy_from_slice(&server_iv[..iv_len]);
    block.zeroize();

    Ok(material)
}
