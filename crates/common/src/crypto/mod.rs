//! Cryptographic primitives for Swift nodes
//!
//! - **Payload encryption**: ChaCha20-Poly1305 over zlib-compressed data with a
//!   random nonce per message
//! - **Scrambling**: the same cipher with a fixed per-node nonce, giving
//!   repeatable opaque tokens for short identifiers such as cookie names
//! - **Rotation**: a node holds several `Secret` epochs; new data is sealed
//!   under the newest and any held epoch may open old data

mod secret;

pub use secret::{Secret, SecretError, NONCE_SIZE, SECRET_SIZE};
