//! Purpose: File-like handle over one open remote stream.
//! Exports: `RemoteFile`.
//! Role: Owns the pooled connection and descriptor returned by a manager's open.
//! Invariants: `position` always equals the offset last reported by the backend.
//! Invariants: The connection is released exactly once, on the first close or on drop.
//! Invariants: A permission-denied error from the remote close is suppressed; others propagate.
//! Invariants: Reads on write-only and writes on read-only handles fail before any remote call.
use std::fmt;
use std::io::{self, SeekFrom};

use bstr::BString;
use tracing::{debug, warn};

use crate::core::backend::{Connection, Descriptor, Whence};
use crate::core::chunks::{DEFAULT_CHUNK_SIZE, ReadChunks};
use crate::core::error::{Error, ErrorKind};
use crate::core::lease::ConnectionLease;
use crate::core::lines::Lines;
use crate::core::mode::AccessFlag;

pub struct RemoteFile<C: Connection> {
    lease: ConnectionLease<C>,
    desc: Descriptor,
    access: AccessFlag,
    path: Option<String>,
    position: u64,
    closed: bool,
}

impl<C: Connection> RemoteFile<C> {
    pub fn new(conn: C, desc: Descriptor, access: AccessFlag) -> Self {
        Self {
            lease: ConnectionLease::new(conn),
            desc,
            access,
            path: None,
            position: 0,
            closed: false,
        }
    }

    /// Attaches the logical path used in local errors and log events.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn fileno(&self) -> Descriptor {
        self.desc
    }

    pub fn access(&self) -> AccessFlag {
        self.access
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads up to `size` bytes, or the rest of the stream when `size` is `None`.
    /// Returns an empty vector at end of stream.
    pub fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>, Error> {
        if !self.access.can_read() {
            return Err(self.local_error(ErrorKind::UnsupportedOperation, "read on write-only handle"));
        }
        let desc = self.desc;
        let conn = self.connection()?;
        let contents = conn.read_file(desc, size)?;
        self.position += contents.len() as u64;
        Ok(contents)
    }

    pub fn readall(&mut self) -> Result<Vec<u8>, Error> {
        self.read(None)
    }

    /// Returns how many bytes the backend accepted; a short count is not an error.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        if !self.access.can_write() {
            return Err(self.local_error(ErrorKind::UnsupportedOperation, "write on read-only handle"));
        }
        let desc = self.desc;
        let conn = self.connection()?;
        let written = conn.write_file(desc, data)?;
        self.position += written as u64;
        Ok(written)
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, Error> {
        let desc = self.desc;
        let conn = self.connection()?;
        let position = conn.seek_file(desc, offset, whence)?;
        debug!(desc = %desc, offset, whence = whence.as_raw(), position, "seek");
        self.position = position;
        Ok(position)
    }

    /// Closes the remote stream and returns the connection to its pool.
    /// Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let desc = self.desc;
        let result = match self.lease.get_mut() {
            Some(conn) => conn.close_file(desc),
            None => Ok(()),
        };
        self.lease.release();
        debug!(desc = %desc, path = self.path.as_deref(), "closed");

        match result {
            Err(err) if err.is_permission_denied() => {
                warn!(desc = %desc, error = %err, "remote close not permitted; ignoring");
                Ok(())
            }
            other => other,
        }
    }

    pub fn chunks(&mut self, chunk_size: usize) -> ReadChunks<'_, C> {
        ReadChunks::new(self, chunk_size)
    }

    pub fn lines(&mut self) -> Lines<'_, C> {
        Lines::new(ReadChunks::new(self, DEFAULT_CHUNK_SIZE))
    }

    /// Reads every remaining line, without line feeds.
    pub fn read_lines(&mut self) -> Result<Vec<BString>, Error> {
        self.lines().collect()
    }

    fn connection(&mut self) -> Result<&mut C, Error> {
        if self.closed {
            return Err(self.local_error(ErrorKind::Closed, "handle is closed"));
        }
        self.lease.get_mut().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("connection already released")
        })
    }

    fn local_error(&self, kind: ErrorKind, message: &str) -> Error {
        let err = Error::new(kind).with_message(message).with_offset(self.position);
        match &self.path {
            Some(path) => err.with_path(path.clone()),
            None => err,
        }
    }
}

impl<C: Connection> Drop for RemoteFile<C> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(desc = %self.desc, error = %err, "implicit close failed");
        }
    }
}

impl<C: Connection> fmt::Debug for RemoteFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFile")
            .field("desc", &self.desc)
            .field("access", &self.access)
            .field("path", &self.path)
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> io::Read for RemoteFile<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let contents = RemoteFile::read(self, Some(buf.len()))?;
        if contents.len() > buf.len() {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("backend returned more bytes than requested")
                .into());
        }
        buf[..contents.len()].copy_from_slice(&contents);
        Ok(contents.len())
    }
}

impl<C: Connection> io::Write for RemoteFile<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(RemoteFile::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<C: Connection> io::Seek for RemoteFile<C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset out of range")
                })?;
                (offset, Whence::Start)
            }
            SeekFrom::Current(offset) => (offset, Whence::Current),
            SeekFrom::End(offset) => (offset, Whence::End),
        };
        Ok(RemoteFile::seek(self, offset, whence)?)
    }
}
