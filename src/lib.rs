//! cardstore - Flashcard datasets with a derived JSON cache
//!
//! Each dataset (phrases, vocabulary, kanji) is stored as a CSV source that
//! stays authoritative. Reads are served from row-keyed JSON projections and
//! a hash manifest that are rebuilt on demand and kept in step with writes.

pub mod cli;
pub mod domain;
pub mod storage;

pub use domain::{Dataset, Projection, Resource, SheetModel};
pub use storage::{Project, ResourceStore, StoreConfig, StoreError};
