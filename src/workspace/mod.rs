//! Workspace file operations.
//!
//! The sandbox root filesystem is read-only; `/workspace` is a writable
//! tmpfs. Archive-based transfer can fail against a read-only rootfs, so
//! every file operation runs through in-container shell utilities over exec.
//!
//! - [`path`]: pure path confinement, no filesystem access
//! - [`service`]: list/read/write/delete against a running sandbox

pub mod path;
pub mod service;

pub use path::{container_path, sanitize};
pub use service::{Encoding, Entry, EntryKind, FileContent, WorkspaceService};
