//! Cryptographic primitives for file encryption.
//!
//! Provides key derivation, IV generation, and incremental AES-CBC.

pub mod aes_cbc;
pub mod iv;
pub mod kdf;

pub use aes_cbc::{CbcDecryptor, CbcEncryptor};
pub use iv::{Iv, generate_iv};
pub use kdf::{DerivedKey, KdfParams, KeySize, KeySpec, derive, derive_key};

/// AES block size (16 bytes) for every key size.
pub const BLOCK_LEN: usize = 16;
/// Length of the initialization vector (16 bytes).
pub const IV_LEN: usize = 16;
