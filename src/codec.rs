//! Framed stream codec: `IV | CBC ciphertext` in both directions.

use tracing::debug;

use crate::crypto::{CbcDecryptor, CbcEncryptor, DerivedKey, Iv};
use crate::error::{Error, Result};
use crate::format;
use crate::pipeline::Transform;

/// Lifecycle of one codec invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    Idle,
    HeaderHandled,
    Streaming,
    Finalized,
    Failed,
}

impl CodecState {
    fn ensure_open(self) -> Result<()> {
        match self {
            CodecState::Finalized => Err(Error::InvalidState("finalized")),
            CodecState::Failed => Err(Error::InvalidState("failed")),
            _ => Ok(()),
        }
    }
}

/// Encrypts a plaintext stream, emitting the IV ahead of the first ciphertext byte.
pub struct FrameEncoder {
    iv: Iv,
    cipher: CbcEncryptor,
    state: CodecState,
}

impl FrameEncoder {
    pub fn new(key: &DerivedKey, iv: Iv) -> Result<Self> {
        Ok(Self {
            cipher: CbcEncryptor::new(key, &iv)?,
            iv,
            state: CodecState::Idle,
        })
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    fn emit_header(&mut self, out: &mut Vec<u8>) {
        if self.state == CodecState::Idle {
            format::write_header(&self.iv, out);
            self.state = CodecState::HeaderHandled;
            debug!("wrote frame header");
        }
    }
}

impl Transform for FrameEncoder {
    fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.state.ensure_open()?;
        self.emit_header(out);
        match self.cipher.update(chunk, out) {
            Ok(()) => {
                self.state = CodecState::Streaming;
                Ok(())
            }
            Err(e) => {
                self.state = CodecState::Failed;
                Err(e)
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.state.ensure_open()?;
        self.emit_header(out);
        let result = self.cipher.finish(out);
        self.state = match &result {
            Ok(()) => CodecState::Finalized,
            Err(_) => CodecState::Failed,
        };
        result
    }
}

/// Decrypts the ciphertext body of a frame whose header was already read
/// with [`format::read_header`].
pub struct FrameDecoder {
    cipher: CbcDecryptor,
    state: CodecState,
}

impl FrameDecoder {
    pub fn new(key: &DerivedKey, iv: Iv) -> Result<Self> {
        Ok(Self {
            cipher: CbcDecryptor::new(key, &iv)?,
            state: CodecState::HeaderHandled,
        })
    }

    pub fn state(&self) -> CodecState {
        self.state
    }
}

impl Transform for FrameDecoder {
    fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.state.ensure_open()?;
        match self.cipher.update(chunk, out) {
            Ok(()) => {
                self.state = CodecState::Streaming;
                Ok(())
            }
            Err(e) => {
                self.state = CodecState::Failed;
                Err(e)
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.state.ensure_open()?;
        let result = self.cipher.finish(out);
        self.state = match &result {
            Ok(()) => CodecState::Finalized,
            Err(_) => CodecState::Failed,
        };
        result
    }
}
