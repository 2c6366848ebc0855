// Lazy chunked reads over a remote handle; one backend read per pull.
use std::iter::FusedIterator;

use tracing::trace;

use crate::core::backend::Connection;
use crate::core::error::Error;
use crate::core::handle::RemoteFile;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Yields non-empty chunks until the first empty read. Single use: once it
/// returns `None` (or an error) it stays exhausted.
pub struct ReadChunks<'a, C: Connection> {
    file: &'a mut RemoteFile<C>,
    chunk_size: usize,
    close_on_exhaustion: bool,
    done: bool,
    failed: bool,
}

impl<'a, C: Connection> ReadChunks<'a, C> {
    pub fn new(file: &'a mut RemoteFile<C>, chunk_size: usize) -> Self {
        Self {
            file,
            chunk_size: chunk_size.max(1),
            close_on_exhaustion: false,
            done: false,
            failed: false,
        }
    }

    /// Closes the handle once the stream is exhausted.
    pub fn close_on_exhaustion(mut self, close: bool) -> Self {
        self.close_on_exhaustion = close;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Re-arms a sequence that ended on a read error; the next pull retries the read.
    pub(crate) fn resume_after_error(&mut self) {
        if self.failed {
            self.failed = false;
            self.done = false;
        }
    }
}

impl<C: Connection> Iterator for ReadChunks<'_, C> {
    type Item = Result<Vec<u8>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.file.read(Some(self.chunk_size)) {
            Ok(chunk) if !chunk.is_empty() => {
                trace!(len = chunk.len(), position = self.file.tell(), "chunk");
                Some(Ok(chunk))
            }
            Ok(_) => {
                self.done = true;
                if self.close_on_exhaustion {
                    if let Err(err) = self.file.close() {
                        return Some(Err(err));
                    }
                }
                None
            }
            Err(err) => {
                self.done = true;
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl<C: Connection> FusedIterator for ReadChunks<'_, C> {}
