//! HCA Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the HCA orchestration workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`HcaError`] and the crate-wide [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: metadata types, job ids, scratch and target dataset identities
//!
//! # Example
//!
//! ```no_run
//! use hca_common::types::{MetadataType, ScratchConfig};
//!
//! let scratch = ScratchConfig::new(
//!     "scratch-bucket",
//!     "run-1234",
//!     "scratch-project",
//!     "hca_scratch",
//!     86_400_000,
//! );
//! let metadata_type = MetadataType::new("cell_suspension");
//!
//! assert_eq!(metadata_type.primary_key(), "cell_suspension_id");
//! assert_eq!(scratch.scratch_area(), "gs://scratch-bucket/run-1234");
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{HcaError, Result};
