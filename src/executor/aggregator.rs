//! Result aggregation
//!
//! Folds per-worker results into one run result and pulls summary lines out
//! of captured output.

use serde::Serialize;

use crate::models::WorkerResult;

/// Pulls result summary lines out of a worker's output
pub trait SummaryExtractor: Send + Sync {
    fn extract(&self, output: &str) -> Vec<String>;
}

/// Finds `N failure(s)` lines after stripping progress markers (`.`, `F`, `*`)
#[derive(Clone, Copy, Debug, Default)]
pub struct FailureCountExtractor;

impl SummaryExtractor for FailureCountExtractor {
    fn extract(&self, output: &str) -> Vec<String> {
        output
            .lines()
            .map(|line| line.replace(['.', 'F', '*'], ""))
            .filter(|line| has_failure_count(line))
            .collect()
    }
}

/// True when the line has a run of digits followed by " failure"
fn has_failure_count(line: &str) -> bool {
    line.match_indices(" failure").any(|(index, _)| {
        line[..index]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

/// Aggregate outcome of one run
#[derive(Clone, Debug, Serialize)]
pub struct RunResult {
    /// Ordered by worker ordinal
    pub workers: Vec<WorkerResult>,
    pub success: bool,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn new(mut workers: Vec<WorkerResult>, duration_ms: u64) -> Self {
        workers.sort_by_key(|w| w.ordinal);
        let success = workers.iter().all(WorkerResult::is_success);

        Self {
            workers,
            success,
            duration_ms,
        }
    }

    pub fn failed_workers(&self) -> Vec<&WorkerResult> {
        self.workers.iter().filter(|w| !w.is_success()).collect()
    }

    /// Summary lines from every worker, in ordinal order
    pub fn summary_lines(&self, extractor: &dyn SummaryExtractor) -> Vec<String> {
        self.workers
            .iter()
            .flat_map(|w| extractor.extract(&w.output))
            .collect()
    }

    /// Process exit code for the whole run
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkerStatus;

    fn exited(ordinal: usize, code: i32, output: &str) -> WorkerResult {
        WorkerResult::new(ordinal, Vec::new(), WorkerStatus::Exited(code), output)
    }

    #[test]
    fn test_all_success() {
        let run = RunResult::new((0..4).map(|i| exited(i, 0, "")).collect(), 10);
        assert!(run.success);
        assert_eq!(run.exit_code(), 0);
        assert!(run.failed_workers().is_empty());
    }

    #[test]
    fn test_one_failure_fails_run() {
        let codes = [0, 0, 1, 0];
        let workers = codes
            .iter()
            .enumerate()
            .map(|(i, c)| exited(i, *c, ""))
            .collect();
        let run = RunResult::new(workers, 10);

        assert!(!run.success);
        assert_eq!(run.exit_code(), 1);
        let failed: Vec<_> = run.failed_workers().iter().map(|w| w.ordinal).collect();
        assert_eq!(failed, vec![2]);
    }

    #[test]
    fn test_spawn_failure_and_termination_fail_run() {
        let run = RunResult::new(
            vec![
                exited(0, 0, ""),
                WorkerResult::new(1, Vec::new(), WorkerStatus::SpawnFailed("nope".into()), ""),
            ],
            1,
        );
        assert!(!run.success);

        let run = RunResult::new(
            vec![WorkerResult::new(0, Vec::new(), WorkerStatus::Terminated, "")],
            1,
        );
        assert!(!run.success);
    }

    #[test]
    fn test_skipped_workers_count_as_success() {
        let run = RunResult::new(vec![exited(0, 0, ""), WorkerResult::skipped(1)], 1);
        assert!(run.success);
    }

    #[test]
    fn test_results_sorted_by_ordinal() {
        let run = RunResult::new(vec![exited(2, 0, ""), exited(0, 0, ""), exited(1, 0, "")], 1);
        let ordinals: Vec<_> = run.workers.iter().map(|w| w.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_extract_failure_lines() {
        let output = "Loaded suite\n..F.*\nFinished in 0.1 seconds.\n5 tests, 7 assertions, 1 failures, 0 errors\n";
        let lines = FailureCountExtractor.extract(output);
        assert_eq!(lines, vec!["5 tests, 7 assertions, 1 failures, 0 errors"]);
    }

    #[test]
    fn test_extract_rspec_style() {
        let output = "..\n\nFinished in 0.002 seconds\n2 examples, 0 failures\n";
        assert_eq!(
            FailureCountExtractor.extract(output),
            vec!["2 examples, 0 failures"]
        );
    }

    #[test]
    fn test_extract_misses_are_omitted() {
        assert!(FailureCountExtractor.extract("no summary here\nfailure without count").is_empty());
        assert!(FailureCountExtractor.extract("").is_empty());
    }

    #[test]
    fn test_summary_lines_in_ordinal_order() {
        let run = RunResult::new(
            vec![
                exited(1, 1, "1 example, 1 failure\n"),
                exited(0, 0, "1 example, 0 failures\n"),
            ],
            1,
        );
        assert_eq!(
            run.summary_lines(&FailureCountExtractor),
            vec!["1 example, 0 failures", "1 example, 1 failure"]
        );
    }
}
