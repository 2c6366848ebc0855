//! Purpose: Library crate backing the `rodsio` CLI and embedders.
//! Exports: `api` (data objects, remote file handles, read sequences, local backend).
//! Role: File-like access to remote data objects over pooled backend connections.
//! Invariants: All operations are synchronous; a call blocks until the backend answers.
//! Invariants: `core` holds backend-agnostic primitives; `api` is the public surface.
pub mod api;
pub(crate) mod core;
pub(crate) mod zone_paths;
