//! # Command-Line Interface
//!
//! Operator commands over a project's store.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project setup | `init` |
//! | Resource | Datasets and the manifest | `read vocabulary`, `write Phrases.csv`, `workbook` |
//! | Cache | Derived state | `cache status`, `cache rebuild`, `cache reindex` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! `read` prints the stored document as is in both formats.
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug logs on stderr, or set `RUST_LOG`:
//! ```bash
//! cardstore --verbose read cache
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod cache_cmd;
mod output;
mod resource_cmd;

pub use app::{init_tracing, run, Cli, Commands};
pub use output::{Output, OutputFormat};
