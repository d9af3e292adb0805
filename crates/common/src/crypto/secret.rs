//! Symmetric key epochs using ChaCha20-Poly1305
//!
//! A `Secret` is one key epoch held by a node. Payloads are compressed with
//! zlib before sealing to keep redirect URLs short, and every seal uses a
//! fresh random nonce that is prepended to the output:
//! `nonce (12 bytes) || encrypted(zlib(plaintext)) || tag (16 bytes)`.
//!
//! The fixed-nonce path (`encrypt_with_nonce`) exists only for scrambling
//! short identifiers where a repeatable output is required.

use std::fmt;
use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of ChaCha20-Poly1305 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("data too short for nonce")]
    TooShort,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("encrypt error")]
    EncryptFailed,
    #[error("compress error: {0}")]
    CompressFailed(std::io::Error),
    #[error("decompress error: {0}")]
    DecompressFailed(std::io::Error),
    #[error("failed to generate random bytes: {0}")]
    Random(getrandom::Error),
}

/// A single key epoch: 256 bits of key material and the time it was created
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    key: [u8; SECRET_SIZE],
    time_stamp: DateTime<Utc>,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("time_stamp", &self.time_stamp)
            .finish_non_exhaustive()
    }
}

impl Secret {
    /// Generate a new random secret created now
    pub fn generate() -> Result<Self, SecretError> {
        let mut key = [0; SECRET_SIZE];
        getrandom::getrandom(&mut key).map_err(SecretError::Random)?;
        Ok(Self {
            key,
            time_stamp: Utc::now(),
        })
    }

    /// Create a secret from a base64url (no padding) encoded 32 byte key
    pub fn from_key(key: &str, created: DateTime<Utc>) -> Result<Self, SecretError> {
        let raw = URL_SAFE_NO_PAD
            .decode(key)
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        Self::from_slice(&raw, created)
    }

    /// Create a secret from raw key bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8], created: DateTime<Utc>) -> Result<Self, SecretError> {
        if data.len() != SECRET_SIZE {
            return Err(SecretError::InvalidKey(format!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )));
        }
        let mut key = [0; SECRET_SIZE];
        key.copy_from_slice(data);
        Ok(Self {
            key,
            time_stamp: created,
        })
    }

    /// The key in the same encoding accepted by [`Secret::from_key`]
    pub fn key_string(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.key)
    }

    pub fn time_stamp(&self) -> DateTime<Utc> {
        self.time_stamp
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }

    /// Seal `data` with a caller supplied nonce. The output is
    /// `nonce || ciphertext` and is identical for identical inputs.
    pub fn encrypt_with_nonce(
        &self,
        data: &[u8],
        nonce: &[u8; NONCE_SIZE],
    ) -> Result<Vec<u8>, SecretError> {
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(nonce), data)
            .map_err(|_| SecretError::EncryptFailed)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open `nonce || ciphertext` produced by either encryption path
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if data.len() < NONCE_SIZE {
            return Err(SecretError::TooShort);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::AuthenticationFailed)
    }

    /// Compress then seal with a random nonce
    pub fn compress_and_encrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(SecretError::CompressFailed)?;
        let compressed = encoder.finish().map_err(SecretError::CompressFailed)?;

        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce).map_err(SecretError::Random)?;
        self.encrypt_with_nonce(&compressed, &nonce)
    }

    /// Split the nonce from the front, open, then decompress
    pub fn decrypt_and_decompress(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let compressed = self.decrypt(data)?;
        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(SecretError::DecompressFailed)?;
        Ok(out)
    }
}
