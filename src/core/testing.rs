// In-memory connection used by unit tests: serves bytes in bounded pieces and records calls.
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::backend::{Connection, Descriptor, Whence};
use crate::core::error::{Error, ErrorKind};

pub const FAKE_DESC: Descriptor = Descriptor(3);

#[derive(Debug, Default)]
pub struct FakeState {
    pub data: Vec<u8>,
    pub pos: usize,
    /// Upper bound on bytes returned by a single bounded read.
    pub piece: usize,
    /// Upper bound on bytes accepted by a single write.
    pub write_cap: Option<usize>,
    pub close_error: Option<ErrorKind>,
    /// Number of the read call (1-based) that fails once without moving the offset.
    pub fail_read: Option<usize>,
    pub closes: usize,
    pub releases: usize,
    pub reads: usize,
}

pub type Shared = Rc<RefCell<FakeState>>;

pub struct FakeConnection {
    state: Shared,
}

impl FakeConnection {
    pub fn new(data: &[u8]) -> (Self, Shared) {
        let state = Rc::new(RefCell::new(FakeState {
            data: data.to_vec(),
            piece: usize::MAX,
            ..FakeState::default()
        }));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }

    pub fn with_piece(data: &[u8], piece: usize) -> (Self, Shared) {
        let (conn, state) = Self::new(data);
        state.borrow_mut().piece = piece;
        (conn, state)
    }
}

impl Connection for FakeConnection {
    fn close_file(&mut self, desc: Descriptor) -> Result<(), Error> {
        assert_eq!(desc, FAKE_DESC);
        let mut state = self.state.borrow_mut();
        state.closes += 1;
        match state.close_error {
            Some(kind) => Err(Error::new(kind).with_message("close refused")),
            None => Ok(()),
        }
    }

    fn read_file(&mut self, desc: Descriptor, size: Option<usize>) -> Result<Vec<u8>, Error> {
        assert_eq!(desc, FAKE_DESC);
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        if state.fail_read == Some(state.reads) {
            return Err(Error::new(ErrorKind::Io).with_message("transient read failure"));
        }
        let start = state.pos.min(state.data.len());
        let len = match size {
            Some(size) => size.min(state.piece),
            None => state.data.len() - start,
        };
        let end = (start + len).min(state.data.len());
        state.pos = end;
        Ok(state.data[start..end].to_vec())
    }

    fn write_file(&mut self, desc: Descriptor, data: &[u8]) -> Result<usize, Error> {
        assert_eq!(desc, FAKE_DESC);
        let mut state = self.state.borrow_mut();
        let accepted = state.write_cap.map_or(data.len(), |cap| cap.min(data.len()));
        let start = state.pos;
        let end = start + accepted;
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(&data[..accepted]);
        state.pos = end;
        Ok(accepted)
    }

    fn seek_file(&mut self, desc: Descriptor, offset: i64, whence: Whence) -> Result<u64, Error> {
        assert_eq!(desc, FAKE_DESC);
        let mut state = self.state.borrow_mut();
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => state.pos as i64,
            Whence::End => state.data.len() as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("negative offset"));
        }
        state.pos = target as usize;
        Ok(target as u64)
    }

    fn release(self) {
        self.state.borrow_mut().releases += 1;
    }
}
