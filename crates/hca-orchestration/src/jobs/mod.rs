//! Completion tracking for asynchronous data repository jobs

pub mod result;
pub mod waiter;

pub use result::ResultCheck;
pub use waiter::{CompletedJob, JobWaiter, WaitConfig};
