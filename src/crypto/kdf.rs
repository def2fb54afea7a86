use scrypt::{Params, scrypt};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// scrypt cost parameters. Defaults match the common interactive setting
/// (N = 2^14, r = 8, p = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    log_n: u8,
    block_size: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            // N = 16384
            log_n: 14,
            block_size: 8,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    pub fn new(log_n: u8, block_size: u32, parallelism: u32) -> Result<Self> {
        let params = Self {
            log_n,
            block_size,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn log_n(&self) -> u8 {
        self.log_n
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_n < 1 {
            return Err(Error::Derivation("scrypt log_n must be >= 1".into()));
        }
        if self.block_size < 1 {
            return Err(Error::Derivation("scrypt block size must be >= 1".into()));
        }
        if self.parallelism < 1 {
            return Err(Error::Derivation("scrypt parallelism must be >= 1".into()));
        }
        if u32::from(self.log_n) >= self.block_size.saturating_mul(16) {
            return Err(Error::Derivation(
                "scrypt log_n must be below 16 * block size".into(),
            ));
        }
        self.scrypt_params(KeySize::Aes256.key_len()).map(|_| ())
    }

    fn scrypt_params(&self, key_len: usize) -> Result<Params> {
        Params::new(self.log_n, self.block_size, self.parallelism, key_len)
            .map_err(|e| Error::Derivation(format!("invalid scrypt params: {e}")))
    }
}

/// AES key width. Also selects the cipher variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl KeySize {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            128 => Ok(KeySize::Aes128),
            192 => Ok(KeySize::Aes192),
            256 => Ok(KeySize::Aes256),
            other => Err(Error::InvalidKeySize(other)),
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            KeySize::Aes128 => 128,
            KeySize::Aes192 => 192,
            KeySize::Aes256 => 256,
        }
    }

    /// Derived key length in bytes.
    pub fn key_len(&self) -> usize {
        self.bits() as usize / 8
    }
}

/// Inputs to key derivation for a single invocation.
pub struct KeySpec {
    password: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    key_size: KeySize,
    kdf: KdfParams,
}

impl KeySpec {
    pub fn new(
        password: impl AsRef<[u8]>,
        salt: impl AsRef<[u8]>,
        key_size_bits: u32,
        kdf: KdfParams,
    ) -> Result<Self> {
        let key_size = KeySize::from_bits(key_size_bits)?;
        Ok(Self {
            password: Zeroizing::new(password.as_ref().to_vec()),
            salt: salt.as_ref().to_vec(),
            key_size,
            kdf,
        })
    }

    pub fn key_size(&self) -> KeySize {
        self.key_size
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }
}

impl fmt::Debug for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySpec")
            .field("key_size", &self.key_size)
            .field("kdf", &self.kdf)
            .finish_non_exhaustive()
    }
}

/// Symmetric key owned by one pipeline invocation. Zeroed on drop.
pub struct DerivedKey {
    bytes: Zeroizing<Vec<u8>>,
    size: KeySize,
}

impl DerivedKey {
    pub fn size(&self) -> KeySize {
        self.size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey({} bits, redacted)", self.size.bits())
    }
}

pub fn derive_key(spec: &KeySpec) -> Result<DerivedKey> {
    stretch(&spec.password, &spec.salt, spec.key_size, spec.kdf)
}

/// Derives a key straight from raw inputs, checking the key size first.
pub fn derive(
    password: &[u8],
    salt: &[u8],
    key_size_bits: u32,
    kdf: KdfParams,
) -> Result<DerivedKey> {
    let size = KeySize::from_bits(key_size_bits)?;
    stretch(password, salt, size, kdf)
}

fn stretch(password: &[u8], salt: &[u8], size: KeySize, kdf: KdfParams) -> Result<DerivedKey> {
    kdf.validate()?;
    let params = kdf.scrypt_params(size.key_len())?;

    let mut bytes = Zeroizing::new(vec![0u8; size.key_len()]);
    scrypt(password, salt, &params, &mut bytes)
        .map_err(|e| Error::Derivation(format!("scrypt key derivation failed: {e}")))?;

    Ok(DerivedKey { bytes, size })
}
