use getrandom::fill;

use super::IV_LEN;
use crate::error::{Error, Result};

/// Initialization vector, one per encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    pub fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

/// Fill buffer with cryptographically secure random bytes
fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| Error::EntropyUnavailable)
}

/// Generate a fresh IV from the OS random source.
pub fn generate_iv() -> Result<Iv> {
    let mut iv = [0u8; IV_LEN];
    secure_random(&mut iv)?;
    Ok(Iv(iv))
}
