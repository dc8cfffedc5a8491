//! # Collaborators
//!
//! Async seams between the engine and the outside world: where documents are
//! stored and where live preview data comes from. Each seam is a trait with
//! an in-memory implementation for tests and embedding, plus a real one
//! (files on disk, an HTTP ranking service).

pub mod persistence;
pub mod provider;

pub use persistence::{FilePersistence, MemoryPersistence, PersistenceAdapter};
pub use provider::{HttpProvider, PreviewDataProvider, StaticProvider};
