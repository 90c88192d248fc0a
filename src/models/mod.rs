//! Data models for parallel test runs
//!
//! This module contains the data structures shared by the grouper, the
//! dispatcher and the aggregator.

mod work;
mod worker;

pub use work::{Group, WorkItem, DEFAULT_WEIGHT};
pub use worker::{EnvDiscriminator, WorkerResult, WorkerStatus, SPAWN_FAILURE_CODE};
