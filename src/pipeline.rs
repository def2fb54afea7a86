//! Pipeline driver: source -> transform -> sink.
//!
//! The driver pulls one chunk at a time and does not read again until the
//! sink has accepted everything produced from the previous chunk, so a slow
//! sink throttles reading and memory stays bounded by a single chunk.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::error::{Error, PipelineError, Result, Stage};

/// Size of each read from the source.
pub const CHUNK_LEN: usize = 64 * 1024;

/// Synchronous byte transform driven chunk by chunk.
pub trait Transform {
    /// Consumes `chunk` and appends whatever output is ready to `out`.
    fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Flushes the remaining output once the source is exhausted.
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()>;
}

/// How a pipeline run ended, as seen by the sink when it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Aborted,
}

/// Destination of a pipeline. `close` consumes the sink, so it runs once.
pub trait Sink: Write {
    fn close(self, completion: Completion) -> io::Result<()>;
}

impl Sink for File {
    fn close(mut self, completion: Completion) -> io::Result<()> {
        self.flush()?;
        if completion == Completion::Finished {
            self.sync_all()?;
        }
        Ok(())
    }
}

impl Sink for Vec<u8> {
    fn close(self, _completion: Completion) -> io::Result<()> {
        Ok(())
    }
}

impl Sink for &mut Vec<u8> {
    fn close(self, _completion: Completion) -> io::Result<()> {
        Ok(())
    }
}

/// Shared cancellation flag, checked before every read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Streams `source` through `transform` into `sink`, closing the sink on
/// every path. Returns the number of bytes written.
///
/// # Errors
///
/// The first failure wins: a [`PipelineError`] naming the failing stage, or
/// [`Error::Cancelled`]. A close error is only reported when streaming
/// itself succeeded.
pub fn run<R, T, S>(
    mut source: R,
    mut transform: T,
    mut sink: S,
    cancel: &CancelToken,
) -> Result<u64>
where
    R: Read,
    T: Transform,
    S: Sink,
{
    let streamed = pump(&mut source, &mut transform, &mut sink, cancel);

    let completion = if streamed.is_ok() {
        Completion::Finished
    } else {
        Completion::Aborted
    };
    let closed = sink.close(completion);

    match (streamed, closed) {
        (Ok(written), Ok(())) => {
            debug!(written, "pipeline finished");
            Ok(written)
        }
        (Ok(_), Err(e)) => Err(PipelineError::new(Stage::Sink, e).into()),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                debug!(error = %close_err, "close failed after earlier error");
            }
            warn!(error = %e, "pipeline aborted");
            Err(e)
        }
    }
}

/// Closes `sink` as aborted and hands back `err`. For failures that happen
/// before any streaming starts.
pub fn abort<S: Sink>(sink: S, err: Error) -> Error {
    if let Err(close_err) = sink.close(Completion::Aborted) {
        debug!(error = %close_err, "close failed after earlier error");
    }
    err
}

fn pump<R, T, S>(
    source: &mut R,
    transform: &mut T,
    sink: &mut S,
    cancel: &CancelToken,
) -> Result<u64>
where
    R: Read,
    T: Transform,
    S: Sink,
{
    let mut input = vec![0u8; CHUNK_LEN];
    let mut output = Vec::with_capacity(CHUNK_LEN + 2 * crate::crypto::BLOCK_LEN);
    let mut written = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let n = match source.read(&mut input) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(PipelineError::new(Stage::Source, e).into()),
        };

        output.clear();
        let step = if n == 0 {
            transform.finish(&mut output)
        } else {
            transform.update(&input[..n], &mut output)
        };
        step.map_err(|e| PipelineError::new(Stage::Transform, e))?;

        sink.write_all(&output)
            .map_err(|e| PipelineError::new(Stage::Sink, e))?;
        written += output.len() as u64;

        if n == 0 {
            return Ok(written);
        }
    }
}
