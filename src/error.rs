//! Error types shared by every filecrypt operation.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while deriving keys, framing, or streaming.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid key size: {0} bits (expected 128, 192 or 256)")]
    InvalidKeySize(u32),

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("OS random generator unavailable")]
    EntropyUnavailable,

    #[error("encrypted file too short: got {0} of 16 header bytes")]
    TruncatedHeader(usize),

    /// Wrong password, wrong IV and corrupted ciphertext all end up here.
    #[error("invalid padding: wrong password, salt, key size or corrupted data")]
    InvalidPadding,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("codec is {0} and accepts no further input")]
    InvalidState(&'static str),

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported output encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("invalid hmac key: {0}")]
    InvalidMacKey(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl Error {
    /// Returns the underlying error kind, looking through pipeline wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Pipeline(e) => e.source.root(),
            other => other,
        }
    }
}

/// Pipeline stage that produced a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Transform,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Source => write!(f, "source"),
            Stage::Transform => write!(f, "transform"),
            Stage::Sink => write!(f, "sink"),
        }
    }
}

/// First failure observed while streaming, tagged with the stage it came from.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    stage: Stage,
    source: Box<Error>,
}

impl PipelineError {
    pub fn new(stage: Stage, source: impl Into<Error>) -> Self {
        Self {
            stage,
            source: Box::new(source.into()),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }
}
