//! On-disk frame of an encrypted file.
//!
//! ```text
//! IV (16) | CIPHERTEXT (AES-CBC, PKCS#7 padded)
//! ```
//!
//! There is no magic or version field. Password, salt, key size and KDF cost
//! must be supplied again at decryption time.

use std::io::{ErrorKind, Read};

use crate::crypto::{IV_LEN, Iv};
use crate::error::{Error, Result};

/// Length of the frame header.
pub const HEADER_LEN: usize = IV_LEN;

/// Appends the frame header for `iv` to `out`.
pub fn write_header(iv: &Iv, out: &mut Vec<u8>) {
    out.extend_from_slice(iv.as_bytes());
}

/// Reads exactly the frame header from `reader`, leaving it positioned at
/// the first ciphertext byte.
///
/// # Errors
///
/// Returns [`Error::TruncatedHeader`] if the stream ends before 16 bytes and
/// [`Error::Io`] for any other read failure.
pub fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<Iv> {
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;

    while filled < HEADER_LEN {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(Error::TruncatedHeader(filled)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Iv::from_bytes(buf))
}
