//! Worker execution engine
//!
//! Builds worker commands, launches the workers, streams their output and
//! aggregates their results.

mod aggregator;
mod command;
mod dispatcher;
mod multiplexer;

pub use aggregator::{FailureCountExtractor, RunResult, SummaryExtractor};
pub use command::{CommandError, CommandTemplate, Invocation};
pub use dispatcher::{Dispatcher, ExecutionMode, WorkerContext, DEFAULT_ENV_VAR};
pub use multiplexer::{FlushPolicy, OutputMultiplexer, DEFAULT_CHUNK_TIMEOUT};
