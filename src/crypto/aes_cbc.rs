//! Incremental AES-CBC with PKCS#7 padding.
//!
//! Both directions accept input in arbitrary slices and buffer at most one
//! block between calls. The decryptor always holds back the latest full
//! block so padding can be checked once the input ends.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroize;

use super::{BLOCK_LEN, DerivedKey, Iv, KeySize};
use crate::error::{Error, Result};

macro_rules! with_variant {
    ($kind:ident, $value:expr, $c:ident => $body:expr) => {
        match $value {
            $kind::Aes128($c) => $body,
            $kind::Aes192($c) => $body,
            $kind::Aes256($c) => $body,
        }
    };
}

enum EncCipher {
    Aes128(cbc::Encryptor<Aes128>),
    Aes192(cbc::Encryptor<Aes192>),
    Aes256(cbc::Encryptor<Aes256>),
}

enum DecCipher {
    Aes128(cbc::Decryptor<Aes128>),
    Aes192(cbc::Decryptor<Aes192>),
    Aes256(cbc::Decryptor<Aes256>),
}

fn key_mismatch(key: &DerivedKey) -> Error {
    Error::InvalidKeySize((key.as_bytes().len() * 8) as u32)
}

impl EncCipher {
    fn new(key: &DerivedKey, iv: &Iv) -> Result<Self> {
        let (k, v) = (key.as_bytes(), iv.as_bytes().as_slice());
        let cipher = match key.size() {
            KeySize::Aes128 => cbc::Encryptor::new_from_slices(k, v).map(EncCipher::Aes128),
            KeySize::Aes192 => cbc::Encryptor::new_from_slices(k, v).map(EncCipher::Aes192),
            KeySize::Aes256 => cbc::Encryptor::new_from_slices(k, v).map(EncCipher::Aes256),
        };
        cipher.map_err(|_| key_mismatch(key))
    }

    fn encrypt_blocks(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(BLOCK_LEN) {
            with_variant!(EncCipher, self, c => {
                c.encrypt_block_mut(GenericArray::from_mut_slice(block))
            });
        }
    }

    /// Pads `buf[..msg_len]` in place and encrypts it, returning the output length.
    fn encrypt_final(self, buf: &mut [u8], msg_len: usize) -> Result<usize> {
        let padded = with_variant!(EncCipher, self, c => {
            c.encrypt_padded_mut::<Pkcs7>(buf, msg_len).map(|ct| ct.len())
        });
        padded.map_err(|_| Error::InvalidState("missing room for padding"))
    }
}

impl DecCipher {
    fn new(key: &DerivedKey, iv: &Iv) -> Result<Self> {
        let (k, v) = (key.as_bytes(), iv.as_bytes().as_slice());
        let cipher = match key.size() {
            KeySize::Aes128 => cbc::Decryptor::new_from_slices(k, v).map(DecCipher::Aes128),
            KeySize::Aes192 => cbc::Decryptor::new_from_slices(k, v).map(DecCipher::Aes192),
            KeySize::Aes256 => cbc::Decryptor::new_from_slices(k, v).map(DecCipher::Aes256),
        };
        cipher.map_err(|_| key_mismatch(key))
    }

    fn decrypt_blocks(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(BLOCK_LEN) {
            with_variant!(DecCipher, self, c => {
                c.decrypt_block_mut(GenericArray::from_mut_slice(block))
            });
        }
    }

    /// Decrypts the last block and strips its padding, returning the plaintext length.
    fn decrypt_final(self, block: &mut [u8]) -> Result<usize> {
        let unpadded = with_variant!(DecCipher, self, c => {
            c.decrypt_padded_mut::<Pkcs7>(block).map(|pt| pt.len())
        });
        unpadded.map_err(|_| Error::InvalidPadding)
    }
}

pub struct CbcEncryptor {
    cipher: Option<EncCipher>,
    pending: [u8; BLOCK_LEN],
    pending_len: usize,
}

impl CbcEncryptor {
    pub fn new(key: &DerivedKey, iv: &Iv) -> Result<Self> {
        Ok(Self {
            cipher: Some(EncCipher::new(key, iv)?),
            pending: [0u8; BLOCK_LEN],
            pending_len: 0,
        })
    }

    /// Encrypts every complete block available and appends it to `out`.
    pub fn update(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let cipher = self
            .cipher
            .as_mut()
            .ok_or(Error::InvalidState("finalized"))?;

        if self.pending_len > 0 {
            let take = (BLOCK_LEN - self.pending_len).min(input.len());
            self.pending[self.pending_len..self.pending_len + take]
                .copy_from_slice(&input[..take]);
            self.pending_len += take;
            input = &input[take..];

            if self.pending_len < BLOCK_LEN {
                return Ok(());
            }
            cipher.encrypt_blocks(&mut self.pending);
            out.extend_from_slice(&self.pending);
            self.pending_len = 0;
        }

        let full = input.len() - input.len() % BLOCK_LEN;
        let start = out.len();
        out.extend_from_slice(&input[..full]);
        cipher.encrypt_blocks(&mut out[start..]);

        let rest = &input[full..];
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
        Ok(())
    }

    /// Pads the buffered tail and emits the final ciphertext block.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let cipher = self.cipher.take().ok_or(Error::InvalidState("finalized"))?;
        let len = cipher.encrypt_final(&mut self.pending, self.pending_len)?;
        out.extend_from_slice(&self.pending[..len]);
        self.pending_len = 0;
        Ok(())
    }
}

impl Drop for CbcEncryptor {
    fn drop(&mut self) {
        self.pending.zeroize();
    }
}

pub struct CbcDecryptor {
    cipher: Option<DecCipher>,
    pending: [u8; BLOCK_LEN],
    pending_len: usize,
}

impl CbcDecryptor {
    pub fn new(key: &DerivedKey, iv: &Iv) -> Result<Self> {
        Ok(Self {
            cipher: Some(DecCipher::new(key, iv)?),
            pending: [0u8; BLOCK_LEN],
            pending_len: 0,
        })
    }

    /// Decrypts every block except the most recent one, which may carry padding.
    pub fn update(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let cipher = self
            .cipher
            .as_mut()
            .ok_or(Error::InvalidState("finalized"))?;

        if self.pending_len < BLOCK_LEN {
            let take = (BLOCK_LEN - self.pending_len).min(input.len());
            self.pending[self.pending_len..self.pending_len + take]
                .copy_from_slice(&input[..take]);
            self.pending_len += take;
            input = &input[take..];
        }
        if input.is_empty() {
            return Ok(());
        }

        // More data follows, so the held block is not the last one.
        cipher.decrypt_blocks(&mut self.pending);
        out.extend_from_slice(&self.pending);

        let keep = match input.len() % BLOCK_LEN {
            0 => BLOCK_LEN,
            r => r,
        };
        let full = input.len() - keep;
        let start = out.len();
        out.extend_from_slice(&input[..full]);
        cipher.decrypt_blocks(&mut out[start..]);

        self.pending[..keep].copy_from_slice(&input[full..]);
        self.pending_len = keep;
        Ok(())
    }

    /// Validates and strips the padding of the held block.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let cipher = self.cipher.take().ok_or(Error::InvalidState("finalized"))?;
        if self.pending_len != BLOCK_LEN {
            return Err(Error::InvalidPadding);
        }
        let len = cipher.decrypt_final(&mut self.pending)?;
        out.extend_from_slice(&self.pending[..len]);
        self.pending_len = 0;
        Ok(())
    }
}

impl Drop for CbcDecryptor {
    fn drop(&mut self) {
        self.pending.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KdfParams, derive};

    fn key(bits: u32) -> DerivedKey {
        derive(b"pw", b"saltsalt", bits, KdfParams::new(4, 8, 1).unwrap()).unwrap()
    }

    fn encrypt_in_chunks(key: &DerivedKey, iv: &Iv, data: &[u8], step: usize) -> Vec<u8> {
        let mut enc = CbcEncryptor::new(key, iv).unwrap();
        let mut out = Vec::new();
        for chunk in data.chunks(step.max(1)) {
            enc.update(chunk, &mut out).unwrap();
        }
        enc.finish(&mut out).unwrap();
        out
    }

    fn decrypt_in_chunks(key: &DerivedKey, iv: &Iv, data: &[u8], step: usize) -> Result<Vec<u8>> {
        let mut dec = CbcDecryptor::new(key, iv)?;
        let mut out = Vec::new();
        for chunk in data.chunks(step.max(1)) {
            dec.update(chunk, &mut out)?;
        }
        dec.finish(&mut out)?;
        Ok(out)
    }

    #[test]
    fn matches_one_shot_cbc() {
        let key = key(256);
        let iv = Iv::from_bytes([7u8; 16]);
        let data: Vec<u8> = (0..100u8).collect();

        let mut buf = [0u8; 112];
        buf[..data.len()].copy_from_slice(&data);
        let one_shot = cbc::Encryptor::<Aes256>::new_from_slices(key.as_bytes(), iv.as_bytes())
            .unwrap()
            .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
            .unwrap()
            .to_vec();

        for step in [1, 5, 16, 17, 64, 1000] {
            assert_eq!(encrypt_in_chunks(&key, &iv, &data, step), one_shot);
        }
    }

    #[test]
    fn aligned_plaintext_gets_full_padding_block() {
        let key = key(128);
        let iv = Iv::from_bytes([1u8; 16]);
        assert_eq!(encrypt_in_chunks(&key, &iv, &[], 1).len(), 16);
        assert_eq!(encrypt_in_chunks(&key, &iv, &[0u8; 16], 16).len(), 32);
        assert_eq!(encrypt_in_chunks(&key, &iv, &[0u8; 15], 4).len(), 16);
    }

    #[test]
    fn decrypt_is_independent_of_chunking() {
        let key = key(192);
        let iv = Iv::from_bytes([9u8; 16]);
        let data = vec![0xabu8; 333];
        let ct = encrypt_in_chunks(&key, &iv, &data, 64);

        for step in [1, 3, 15, 16, 31, 32, 4096] {
            assert_eq!(decrypt_in_chunks(&key, &iv, &ct, step).unwrap(), data);
        }
    }

    #[test]
    fn empty_or_misaligned_body_is_invalid_padding() {
        let key = key(256);
        let iv = Iv::from_bytes([0u8; 16]);
        assert!(matches!(
            decrypt_in_chunks(&key, &iv, &[], 1),
            Err(Error::InvalidPadding)
        ));
        assert!(matches!(
            decrypt_in_chunks(&key, &iv, &[1u8; 20], 7),
            Err(Error::InvalidPadding)
        ));
    }

    #[test]
    fn update_after_finish_is_rejected() {
        let key = key(128);
        let iv = Iv::from_bytes([0u8; 16]);
        let mut enc = CbcEncryptor::new(&key, &iv).unwrap();
        let mut out = Vec::new();
        enc.finish(&mut out).unwrap();
        assert!(matches!(
            enc.update(b"late", &mut out),
            Err(Error::InvalidState(_))
        ));
        assert!(enc.finish(&mut out).is_err());
    }
}
