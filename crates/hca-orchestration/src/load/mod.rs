//! Loading HCA metadata tables into the data repository
//!
//! - [`diff`]: staged-versus-loaded queries
//! - [`export`]: scratch tables out to object storage
//! - [`table`]: the per-type load state machine
//! - [`fanout`]: one unit of work per metadata type, run concurrently
//! - [`reconcile`]: the version rules as plain functions

use crate::bigquery::QueryEngine;
use crate::data_repo::DataRepoApi;
use crate::jobs::{JobWaiter, WaitConfig};
use crate::storage::ObjectStore;
use hca_common::types::{ScratchConfig, TargetDataset};
use std::sync::Arc;

pub mod diff;
pub mod export;
pub mod fanout;
pub mod reconcile;
pub mod table;

pub use fanout::{fanout, load_all, LoadSummary, DEFAULT_METADATA_PATH, METADATA_TYPES};
pub use table::{
    DataCheck, LoadOutcome, LoadReport, LoadStart, LoadState, LoadTableController, OutdatedCheck,
    OutdatedRows,
};

/// Services and run settings shared by every table load.
#[derive(Clone)]
pub struct Resources {
    pub storage: Arc<dyn ObjectStore>,
    pub bigquery: Arc<dyn QueryEngine>,
    pub data_repo: Arc<dyn DataRepoApi>,
    pub scratch: ScratchConfig,
    pub target: TargetDataset,
    pub wait: WaitConfig,
}

impl Resources {
    pub fn waiter(&self) -> JobWaiter {
        JobWaiter::new(self.data_repo.clone(), self.wait)
    }
}
