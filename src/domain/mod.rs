//! Domain models for cardstore
//!
//! Contains the resource names, the sheet model and the projection
//! transform, without any I/O concerns.

mod resource;
mod sheet;
mod projection;

pub use resource::{Dataset, Resource, ResourceError};
pub use sheet::{CellRange, CellRef, CellRefError, ColumnMeta, SheetModel};
pub use projection::{content_hash, project, Projection, RowObject};
