//! Key derivation and sealing primitives shared by issuer and validator.
//!
//! - PBKDF2-HMAC-SHA256 (100 000 iterations, 32-byte key) turns the shared
//!   secret plus a per-license salt into a symmetric key.
//! - AES-256-GCM seals the plaintext into a self-describing token.
//!
//! On-disk layout of a sealed license:
//!
//! ```text
//! salt (16 bytes, raw) || token
//! token = base64url( version (1 byte) || nonce (12 bytes) || ciphertext+tag )
//! ```

use std::num::NonZeroU32;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use base64::engine::general_purpose::URL_SAFE as B64;
use base64::Engine;

use rand::rngs::OsRng;
use rand::TryRngCore;

use ring::pbkdf2;

use crate::errors::{LicenseError, LicenseResult};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Salt prepended to every sealed license.
pub const SALT_SIZE: usize = 16;

/// Default PBKDF2 work factor. Changing it breaks every existing license.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Leading byte of every token.
const TOKEN_VERSION: u8 = 0x01;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

fn fill_random(buf: &mut [u8]) -> LicenseResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| LicenseError::EncryptionError(format!("system rng failure: {e}")))
}

/// Generate a fresh random salt. Never reuse one across licenses.
pub fn generate_salt() -> LicenseResult<[u8; SALT_SIZE]> {
    let mut salt = [0u8; SALT_SIZE];
    fill_random(&mut salt)?;
    Ok(salt)
}

/// Derive a 256-bit key from `secret` and `salt`.
pub fn derive_key(secret: &str, salt: &[u8], iterations: u32) -> LicenseResult<[u8; KEY_SIZE]> {
    let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
        LicenseError::ConfigError("pbkdf2 iterations must be greater than 0".to_string())
    })?;

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, secret.as_bytes(), &mut key);
    Ok(key)
}

/// Seal `plaintext` under `key`, returning an ASCII token.
pub fn seal(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> LicenseResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| LicenseError::EncryptionError(format!("encryption failed: {e}")))?;

    let mut raw = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
    raw.push(TOKEN_VERSION);
    raw.extend_from_slice(&nonce_bytes);
    raw.extend_from_slice(&ciphertext);

    Ok(B64.encode(raw).into_bytes())
}

/// Reverse of [`seal`].
///
/// Every failure (bad encoding, unknown version, truncated token,
/// authentication failure) is reported as the same
/// [`LicenseError::DecryptionFailure`].
pub fn unseal(token: &[u8], key: &[u8; KEY_SIZE]) -> LicenseResult<Vec<u8>> {
    let raw = B64
        .decode(token)
        .map_err(|_| LicenseError::DecryptionFailure)?;

    if raw.len() <= 1 + NONCE_SIZE || raw[0] != TOKEN_VERSION {
        return Err(LicenseError::DecryptionFailure);
    }

    let (nonce_bytes, ciphertext) = raw[1..].split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| LicenseError::DecryptionFailure)
}

/// Derive a key under a fresh salt and seal: `salt || token`.
pub fn seal_with_secret(plaintext: &[u8], secret: &str) -> LicenseResult<Vec<u8>> {
    let salt = generate_salt()?;
    let key = derive_key(secret, &salt, PBKDF2_ITERATIONS)?;
    let token = seal(plaintext, &key)?;

    let mut output = Vec::with_capacity(SALT_SIZE + token.len());
    output.extend_from_slice(&salt);
    output.extend_from_slice(&token);
    Ok(output)
}

/// Split `salt || token`, re-derive the key and unseal.
pub fn unseal_with_secret(sealed: &[u8], secret: &str) -> LicenseResult<Vec<u8>> {
    if sealed.len() <= SALT_SIZE {
        return Err(LicenseError::DecryptionFailure);
    }

    let (salt, token) = sealed.split_at(SALT_SIZE);
    let key = derive_key(secret, salt, PBKDF2_ITERATIONS)?;
    unseal(token, &key)
}
