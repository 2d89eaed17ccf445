//! Concrete record endpoints for the ductflow sink runtime.
//!
//! Two endpoint kinds ship with the runtime: a filesystem tap writing
//! JSON-line part files per slice, and an in-memory tap for embedded runs
//! and tests. Both implement the `Tap` contract from `dfl-pipeline`.

pub mod fs;
pub mod memory;

pub use fs::*;
pub use memory::*;
