//! HCA Orchestration Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads HCA metadata from a scratch staging area into a Terra Data
//! Repository dataset, one table per metadata type.
//!
//! # Modules
//!
//! - **load**: diff staged rows against loaded rows, ingest new rows and
//!   soft-delete superseded ones
//! - **jobs**: wait for data repository jobs and check their results
//! - **staging**: scratch dataset creation, scratch cleanup, staging dedupe
//! - **validate**: subgraph completeness checks on a loaded dataset
//! - **storage**, **bigquery**, **data_repo**: the service traits and their
//!   HTTP/S3 adapters
//!
//! # Example
//!
//! ```no_run
//! use hca_orchestration::load::{fanout, load_all, Resources, DEFAULT_METADATA_PATH};
//!
//! # async fn run(resources: Resources) {
//! let dataset = resources.scratch.dataset_name("abcd1234");
//! let summary = load_all(&resources, fanout(&dataset, DEFAULT_METADATA_PATH), 4).await;
//! assert!(summary.is_success());
//! # }
//! ```

pub mod bigquery;
pub mod config;
pub mod data_repo;
pub mod jobs;
pub mod load;
pub mod partitions;
pub mod staging;
pub mod storage;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;
