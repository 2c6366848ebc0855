// Re-segments a chunk sequence into line-feed delimited lines.
use std::iter::FusedIterator;

use bstr::{BString, ByteSlice};

use crate::core::backend::Connection;
use crate::core::chunks::ReadChunks;
use crate::core::error::Error;

/// Lines exclude their line feed. A trailing fragment without a line feed is
/// yielded as the last line; a stream ending in `\n` yields no empty line.
/// Carriage returns are kept unless `trim_cr(true)` is set.
///
/// A failed read is yielded as an error and keeps the partial line buffered;
/// pulling again retries the read and continues that line.
pub struct Lines<'a, C: Connection> {
    chunks: ReadChunks<'a, C>,
    buf: Vec<u8>,
    start: usize,
    trim_cr: bool,
    exhausted: bool,
}

impl<'a, C: Connection> Lines<'a, C> {
    pub fn new(chunks: ReadChunks<'a, C>) -> Self {
        Self {
            chunks,
            buf: Vec::new(),
            start: 0,
            trim_cr: false,
            exhausted: false,
        }
    }

    pub fn trim_cr(mut self, trim: bool) -> Self {
        self.trim_cr = trim;
        self
    }

    /// Bytes already read from the handle that do not yet form a complete line.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    pub fn into_pending(mut self) -> BString {
        self.buf.drain(..self.start);
        BString::from(self.buf)
    }

    fn finish_line(&self, mut line: Vec<u8>) -> BString {
        if self.trim_cr && line.last() == Some(&b'\r') {
            line.pop();
        }
        BString::from(line)
    }

    fn refill(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }
}

impl<C: Connection> Iterator for Lines<'_, C> {
    type Item = Result<BString, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let pending = &self.buf[self.start..];
            if let Some(idx) = pending.find_byte(b'\n') {
                let line = pending[..idx].to_vec();
                self.start += idx + 1;
                return Some(Ok(self.finish_line(line)));
            }

            if self.exhausted {
                if pending.is_empty() {
                    return None;
                }
                let line = pending.to_vec();
                self.buf.clear();
                self.start = 0;
                return Some(Ok(self.finish_line(line)));
            }

            match self.chunks.next() {
                Some(Ok(chunk)) => self.refill(&chunk),
                Some(Err(err)) => {
                    self.chunks.resume_after_error();
                    return Some(Err(err));
                }
                None => self.exhausted = true,
            }
        }
    }
}

impl<C: Connection> FusedIterator for Lines<'_, C> {}
