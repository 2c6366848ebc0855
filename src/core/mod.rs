// Core primitives: errors, mode resolution, backend contracts, handles and read sequences.
pub mod backend;
pub mod chunks;
pub mod error;
pub mod handle;
pub mod lease;
pub mod lines;
pub mod mode;

#[cfg(test)]
pub(crate) mod testing;
