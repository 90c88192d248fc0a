//! Worker dispatch
//!
//! Launches one process per group, either all at once (bounded by an optional
//! concurrency limit) or one after another.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use super::aggregator::RunResult;
use super::command::{CommandTemplate, Invocation};
use super::multiplexer::{spawn_reader, FlushPolicy, OutputMultiplexer, DEFAULT_CHUNK_TIMEOUT};
use crate::models::{EnvDiscriminator, Group, WorkerResult, WorkerStatus};
use crate::output::SharedSink;

/// Default name of the variable carrying the worker discriminator
pub const DEFAULT_ENV_VAR: &str = "TEST_ENV_NUMBER";

const OUTPUT_CHANNEL_SIZE: usize = 64;

/// How workers are scheduled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Parallel,
    /// One worker at a time, output flushed once per worker
    Sequential,
}

/// Everything needed to launch one worker
#[derive(Clone, Debug)]
pub struct WorkerContext {
    pub ordinal: usize,
    pub discriminator: EnvDiscriminator,
    pub group: Group,
    pub invocation: Invocation,
}

impl WorkerContext {
    fn item_ids(&self) -> Vec<String> {
        self.group.ids().into_iter().map(String::from).collect()
    }
}

/// Parallel worker dispatcher
#[derive(Clone, Debug)]
pub struct Dispatcher {
    env_var: String,
    chunk_timeout: Duration,
    mode: ExecutionMode,
    max_concurrent: Option<usize>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            env_var: DEFAULT_ENV_VAR.to_string(),
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            mode: ExecutionMode::Parallel,
            max_concurrent: None,
        }
    }

    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = name.into();
        self
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Cap on simultaneously running workers; the rest wait for a free slot
    pub fn with_max_concurrent(mut self, max_concurrent: Option<usize>) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Build one context per group
    pub fn contexts(&self, groups: Vec<Group>, template: &CommandTemplate) -> Vec<WorkerContext> {
        groups
            .into_iter()
            .enumerate()
            .map(|(ordinal, group)| {
                let discriminator = EnvDiscriminator::from_ordinal(ordinal);
                let invocation = template
                    .render(&group.ids())
                    .env(&self.env_var, discriminator.as_env_value());

                WorkerContext {
                    ordinal,
                    discriminator,
                    group,
                    invocation,
                }
            })
            .collect()
    }

    /// Run every group through `template` and aggregate the results
    pub async fn dispatch(
        &self,
        groups: Vec<Group>,
        template: &CommandTemplate,
        sink: SharedSink,
    ) -> RunResult {
        let contexts = self.contexts(groups, template);
        self.run(contexts, sink, !template.runs_without_items()).await
    }

    /// Launch workers; with `skip_empty` workers without items are not started
    pub async fn run(
        &self,
        contexts: Vec<WorkerContext>,
        sink: SharedSink,
        skip_empty: bool,
    ) -> RunResult {
        let start = Instant::now();
        info!(
            "Dispatching {} workers ({:?}, chunk timeout {}ms)",
            contexts.len(),
            self.mode,
            self.chunk_timeout.as_millis()
        );

        let results = match self.mode {
            ExecutionMode::Parallel => self.run_parallel(contexts, sink, skip_empty).await,
            ExecutionMode::Sequential => {
                let mut results = Vec::new();
                for context in contexts {
                    let result = if skip_empty && context.group.is_empty() {
                        WorkerResult::skipped(context.ordinal)
                    } else {
                        run_worker(context, sink.clone(), FlushPolicy::AtEnd).await
                    };
                    results.push(result);
                }
                results
            }
        };

        let run = RunResult::new(results, start.elapsed().as_millis() as u64);
        info!(
            "All workers finished in {}ms - {}/{} succeeded",
            run.duration_ms,
            run.workers.len() - run.failed_workers().len(),
            run.workers.len()
        );
        run
    }

    async fn run_parallel(
        &self,
        contexts: Vec<WorkerContext>,
        sink: SharedSink,
        skip_empty: bool,
    ) -> Vec<WorkerResult> {
        let permits = self.max_concurrent.unwrap_or(contexts.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let policy = FlushPolicy::Interval(self.chunk_timeout);

        let mut results = Vec::new();
        let mut handles = Vec::new();

        for context in contexts {
            if skip_empty && context.group.is_empty() {
                debug!("Worker {} has no items, skipping", context.ordinal + 1);
                results.push(WorkerResult::skipped(context.ordinal));
                continue;
            }

            let ordinal = context.ordinal;
            let items = context.item_ids();
            let semaphore = semaphore.clone();
            let sink = sink.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_worker(context, sink, policy).await
            });
            handles.push((ordinal, items, handle));
        }

        let (meta, handles): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .map(|(ordinal, items, handle)| ((ordinal, items), handle))
            .unzip();

        for ((ordinal, items), joined) in meta.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Worker {} task failed: {}", ordinal + 1, e);
                    results.push(WorkerResult::new(
                        ordinal,
                        items,
                        WorkerStatus::Terminated,
                        "",
                    ));
                }
            }
        }

        results
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn one worker, stream its output and wait for it to exit
async fn run_worker(context: WorkerContext, sink: SharedSink, policy: FlushPolicy) -> WorkerResult {
    let items = context.item_ids();
    let ordinal = context.ordinal;
    let start = Instant::now();

    info!(
        worker = ordinal + 1,
        env = %context.discriminator,
        items = items.len(),
        "Starting worker"
    );
    debug!("Worker {} command: {}", ordinal + 1, context.invocation);

    let mut child = match context.invocation.to_command().spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(
                "Worker {} could not start {}: {}",
                ordinal + 1,
                context.invocation.program,
                e
            );
            return WorkerResult::new(ordinal, items, WorkerStatus::SpawnFailed(e.to_string()), "")
                .with_duration(start.elapsed().as_millis() as u64);
        }
    };

    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_SIZE);
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, tx.clone());
    }
    drop(tx);

    let captured = OutputMultiplexer::new(sink, policy).run(rx).await;

    let status = match child.wait().await {
        Ok(status) => match status.code() {
            Some(code) => WorkerStatus::Exited(code),
            None => WorkerStatus::Terminated,
        },
        Err(e) => {
            warn!("Failed to wait for worker {}: {}", ordinal + 1, e);
            WorkerStatus::Terminated
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(worker = ordinal + 1, status = %status, duration_ms, "Worker finished");

    WorkerResult::new(
        ordinal,
        items,
        status,
        String::from_utf8_lossy(&captured).to_string(),
    )
    .with_duration(duration_ms)
}
