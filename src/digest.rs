//! One-shot file digests and keyed digests.
//!
//! Files are read in [`CHUNK_LEN`] pieces, so large inputs are never held in
//! memory.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512, Sha512_224, Sha512_256};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pipeline::CHUNK_LEN;

/// Supported message digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha224 => "sha224",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
            Algorithm::Sha512_224 => "sha512-224",
            Algorithm::Sha512_256 => "sha512-256",
            Algorithm::Sha3_224 => "sha3-224",
            Algorithm::Sha3_256 => "sha3-256",
            Algorithm::Sha3_384 => "sha3-384",
            Algorithm::Sha3_512 => "sha3-512",
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // accepts the OpenSSL names plus their `RSA-` and dashed spellings
        let lower = s.to_ascii_lowercase();
        let name = lower.strip_prefix("rsa-").unwrap_or(&lower);
        match name {
            "md5" => Ok(Algorithm::Md5),
            "sha1" | "sha-1" => Ok(Algorithm::Sha1),
            "sha224" | "sha-224" => Ok(Algorithm::Sha224),
            "sha256" | "sha-256" => Ok(Algorithm::Sha256),
            "sha384" | "sha-384" => Ok(Algorithm::Sha384),
            "sha512" | "sha-512" => Ok(Algorithm::Sha512),
            "sha512-224" | "sha-512/224" => Ok(Algorithm::Sha512_224),
            "sha512-256" | "sha-512/256" => Ok(Algorithm::Sha512_256),
            "sha3-224" => Ok(Algorithm::Sha3_224),
            "sha3-256" => Ok(Algorithm::Sha3_256),
            "sha3-384" => Ok(Algorithm::Sha3_384),
            "sha3-512" => Ok(Algorithm::Sha3_512),
            _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Text encoding applied to the raw digest bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Hex,
    Base64,
    Base64Url,
    /// One char per byte, U+0000 to U+00FF.
    Latin1,
}

impl Encoding {
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Hex => hex::encode(bytes),
            Encoding::Base64 => STANDARD.encode(bytes),
            Encoding::Base64Url => URL_SAFE_NO_PAD.encode(bytes),
            Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "base64url" => Ok(Encoding::Base64Url),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            _ => Err(Error::UnsupportedEncoding(s.to_string())),
        }
    }
}

fn feed<R: Read + ?Sized>(reader: &mut R, mut update: impl FnMut(&[u8])) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_LEN];
    let mut total = 0u64;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                update(&buf[..n]);
                total += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn digest_with<D: Digest, R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let mut hasher = D::new();
    feed(reader, |chunk| hasher.update(chunk))?;
    Ok(hasher.finalize().to_vec())
}

macro_rules! hmac_with {
    ($hash:ty, $key:expr, $reader:expr) => {{
        let mut mac = <Hmac<$hash> as Mac>::new_from_slice($key)
            .map_err(|e| Error::InvalidMacKey(e.to_string()))?;
        feed($reader, |chunk| mac.update(chunk))?;
        mac.finalize().into_bytes().to_vec()
    }};
}

/// Digests everything `reader` yields and returns the encoded result.
pub fn hash_reader<R: Read + ?Sized>(
    algorithm: Algorithm,
    encoding: Encoding,
    reader: &mut R,
) -> Result<String> {
    let raw = match algorithm {
        Algorithm::Md5 => digest_with::<Md5, _>(reader)?,
        Algorithm::Sha1 => digest_with::<Sha1, _>(reader)?,
        Algorithm::Sha224 => digest_with::<Sha224, _>(reader)?,
        Algorithm::Sha256 => digest_with::<Sha256, _>(reader)?,
        Algorithm::Sha384 => digest_with::<Sha384, _>(reader)?,
        Algorithm::Sha512 => digest_with::<Sha512, _>(reader)?,
        Algorithm::Sha512_224 => digest_with::<Sha512_224, _>(reader)?,
        Algorithm::Sha512_256 => digest_with::<Sha512_256, _>(reader)?,
        Algorithm::Sha3_224 => digest_with::<Sha3_224, _>(reader)?,
        Algorithm::Sha3_256 => digest_with::<Sha3_256, _>(reader)?,
        Algorithm::Sha3_384 => digest_with::<Sha3_384, _>(reader)?,
        Algorithm::Sha3_512 => digest_with::<Sha3_512, _>(reader)?,
    };
    Ok(encoding.encode(&raw))
}

/// Keyed digest of everything `reader` yields, returned encoded.
pub fn hmac_reader<R: Read + ?Sized>(
    algorithm: Algorithm,
    key: &[u8],
    encoding: Encoding,
    reader: &mut R,
) -> Result<String> {
    // HMAC takes keys of any length, so key setup never fails in practice
    let raw = match algorithm {
        Algorithm::Md5 => hmac_with!(Md5, key, reader),
        Algorithm::Sha1 => hmac_with!(Sha1, key, reader),
        Algorithm::Sha224 => hmac_with!(Sha224, key, reader),
        Algorithm::Sha256 => hmac_with!(Sha256, key, reader),
        Algorithm::Sha384 => hmac_with!(Sha384, key, reader),
        Algorithm::Sha512 => hmac_with!(Sha512, key, reader),
        Algorithm::Sha512_224 => hmac_with!(Sha512_224, key, reader),
        Algorithm::Sha512_256 => hmac_with!(Sha512_256, key, reader),
        Algorithm::Sha3_224 => hmac_with!(Sha3_224, key, reader),
        Algorithm::Sha3_256 => hmac_with!(Sha3_256, key, reader),
        Algorithm::Sha3_384 => hmac_with!(Sha3_384, key, reader),
        Algorithm::Sha3_512 => hmac_with!(Sha3_512, key, reader),
    };
    Ok(encoding.encode(&raw))
}

/// Digest of the file at `input`.
pub fn hash(algorithm: Algorithm, encoding: Encoding, input: &Path) -> Result<String> {
    debug!(%algorithm, input = %input.display(), "hashing file");
    let mut file = File::open(input)?;
    hash_reader(algorithm, encoding, &mut file)
}

/// Keyed digest of the file at `input`.
pub fn hmac(algorithm: Algorithm, key: &[u8], encoding: Encoding, input: &Path) -> Result<String> {
    debug!(%algorithm, input = %input.display(), "computing hmac");
    let mut file = File::open(input)?;
    hmac_reader(algorithm, key, encoding, &mut file)
}
