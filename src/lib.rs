pub mod codec;
pub mod crypto;
pub mod digest;
mod error;
pub mod format;
pub mod pipeline;
pub mod storage;

pub use crate::codec::{FrameDecoder, FrameEncoder};
pub use crate::crypto::{KdfParams, KeySize, KeySpec};
pub use crate::error::{Error, PipelineError, Result, Stage};
pub use crate::pipeline::{CancelToken, Completion, Sink};
pub use crate::storage::StagedFile;

use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::crypto::{derive_key, generate_iv};

/// Encrypts `source` into `sink` as `IV | ciphertext`. Returns the number of
/// bytes written, IV included.
///
/// The sink is closed on every path. Any error means its content must be
/// discarded.
pub fn encrypt<R: Read, S: Sink>(
    source: R,
    sink: S,
    spec: &KeySpec,
    cancel: &CancelToken,
) -> Result<u64> {
    let iv = match generate_iv() {
        Ok(iv) => iv,
        Err(e) => return Err(pipeline::abort(sink, e)),
    };
    let key = match derive_key(spec) {
        Ok(key) => key,
        Err(e) => return Err(pipeline::abort(sink, e)),
    };
    let encoder = match FrameEncoder::new(&key, iv) {
        Ok(encoder) => encoder,
        Err(e) => return Err(pipeline::abort(sink, e)),
    };
    drop(key);

    debug!(bits = spec.key_size().bits(), "encrypting stream");
    pipeline::run(source, encoder, sink, cancel)
}

/// Decrypts an `IV | ciphertext` stream from `source` into `sink`. Returns
/// the number of plaintext bytes written.
///
/// Plaintext reaches the sink before the final padding is checked, so on
/// error the sink may hold a prefix of the output. It must be discarded.
pub fn decrypt<R: Read, S: Sink>(
    mut source: R,
    sink: S,
    spec: &KeySpec,
    cancel: &CancelToken,
) -> Result<u64> {
    let iv = match format::read_header(&mut source) {
        Ok(iv) => iv,
        Err(e) => return Err(pipeline::abort(sink, e)),
    };
    let key = match derive_key(spec) {
        Ok(key) => key,
        Err(e) => return Err(pipeline::abort(sink, e)),
    };
    let decoder = match FrameDecoder::new(&key, iv) {
        Ok(decoder) => decoder,
        Err(e) => return Err(pipeline::abort(sink, e)),
    };
    drop(key);

    debug!(bits = spec.key_size().bits(), "decrypting stream");
    pipeline::run(source, decoder, sink, cancel)
}

/// Encrypts the file at `input` into `output`.
///
/// The key is derived before any file is touched. Output is staged next to
/// `output` and only renamed into place once the whole stream succeeded.
pub fn encrypt_file(
    input: &Path,
    output: &Path,
    spec: &KeySpec,
    cancel: &CancelToken,
) -> Result<u64> {
    let key = derive_key(spec)?;
    let iv = generate_iv()?;
    let encoder = FrameEncoder::new(&key, iv)?;
    drop(key);

    let source = File::open(input)?;
    let sink = StagedFile::create(output)?;

    info!(input = %input.display(), output = %output.display(), "encrypting file");
    pipeline::run(source, encoder, sink, cancel)
}

/// Decrypts the file at `input` into `output`.
///
/// Fails with [`Error::TruncatedHeader`] before deriving the key when the
/// input is shorter than the header. Output is staged like [`encrypt_file`],
/// so a failed run leaves nothing at `output`.
pub fn decrypt_file(
    input: &Path,
    output: &Path,
    spec: &KeySpec,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut source = File::open(input)?;
    let iv = format::read_header(&mut source)?;
    let key = derive_key(spec)?;
    let decoder = FrameDecoder::new(&key, iv)?;
    drop(key);

    let sink = StagedFile::create(output)?;

    info!(input = %input.display(), output = %output.display(), "decrypting file");
    pipeline::run(source, decoder, sink, cancel)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use tempfile::tempdir;

    use super::*;

    fn spec(password: &str) -> KeySpec {
        KeySpec::new(password, "salt", 256, KdfParams::new(4, 8, 1).unwrap()).unwrap()
    }

    #[test]
    fn encrypt_decrypt_in_memory_roundtrip() {
        let cancel = CancelToken::new();
        let mut framed = Vec::new();
        encrypt(&b"secret data"[..], &mut framed, &spec("pw"), &cancel).unwrap();
        assert_eq!(framed.len(), 16 + 16);

        let mut plain = Vec::new();
        let written = decrypt(&framed[..], &mut plain, &spec("pw"), &cancel).unwrap();
        assert_eq!(plain, b"secret data");
        assert_eq!(written, 11);
    }

    #[test]
    fn file_roundtrip_leaves_only_outputs() {
        let dir = tempdir().unwrap();
        let (plain, enc, dec) = (
            dir.path().join("plain.txt"),
            dir.path().join("plain.enc"),
            dir.path().join("plain.dec"),
        );
        fs::write(&plain, b"file contents").unwrap();

        let cancel = CancelToken::new();
        encrypt_file(&plain, &enc, &spec("pw"), &cancel).unwrap();
        decrypt_file(&enc, &dec, &spec("pw"), &cancel).unwrap();

        assert_eq!(fs::read(&dec).unwrap(), b"file contents");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn failed_decrypt_leaves_no_output() {
        let dir = tempdir().unwrap();
        let (enc, dec) = (dir.path().join("x.enc"), dir.path().join("x.dec"));
        fs::write(&enc, [0u8; 40]).unwrap();

        let err = decrypt_file(&enc, &dec, &spec("pw"), &CancelToken::new()).unwrap_err();
        assert!(matches!(err.root(), Error::InvalidPadding));
        assert!(!dec.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn truncated_file_is_rejected_before_output_is_created() {
        let dir = tempdir().unwrap();
        let (enc, dec) = (dir.path().join("short.enc"), dir.path().join("short.dec"));
        fs::write(&enc, [1u8; 10]).unwrap();

        let err = decrypt_file(&enc, &dec, &spec("pw"), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::TruncatedHeader(10)));
        assert!(!dec.exists());
    }

    #[test]
    fn cancelled_encrypt_publishes_nothing() {
        let dir = tempdir().unwrap();
        let (plain, enc) = (dir.path().join("p"), dir.path().join("p.enc"));
        fs::write(&plain, b"abc").unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = encrypt_file(&plain, &enc, &spec("pw"), &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(!enc.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_input_is_io_error() {
        let dir = tempdir().unwrap();
        let err = encrypt_file(
            &dir.path().join("missing"),
            &dir.path().join("out"),
            &spec("pw"),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!dir.path().join("out").exists());
    }
}
