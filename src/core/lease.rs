// Scoped ownership of a pooled connection; the connection goes back to its pool exactly once.
use crate::core::backend::Connection;

pub struct ConnectionLease<C: Connection> {
    conn: Option<C>,
}

impl<C: Connection> ConnectionLease<C> {
    pub fn new(conn: C) -> Self {
        Self { conn: Some(conn) }
    }

    pub fn get_mut(&mut self) -> Option<&mut C> {
        self.conn.as_mut()
    }

    /// Returns the connection to the pool. Later calls (and drop) do nothing.
    pub fn release(&mut self) -> bool {
        match self.conn.take() {
            Some(conn) => {
                conn.release();
                true
            }
            None => false,
        }
    }
}

impl<C: Connection> Drop for ConnectionLease<C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionLease;
    use crate::core::testing::FakeConnection;

    #[test]
    fn release_runs_once() {
        let (conn, state) = FakeConnection::new(b"");
        let mut lease = ConnectionLease::new(conn);
        assert!(lease.release());
        assert!(!lease.release());
        drop(lease);
        assert_eq!(state.borrow().releases, 1);
    }

    #[test]
    fn drop_releases_unreleased_connection() {
        let (conn, state) = FakeConnection::new(b"");
        {
            let _lease = ConnectionLease::new(conn);
            assert_eq!(state.borrow().releases, 0);
        }
        assert_eq!(state.borrow().releases, 1);
    }
}
