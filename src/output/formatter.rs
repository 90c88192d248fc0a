//! Run report formatting
//!
//! Renders the run plan, group assignments and final results as a table,
//! JSON or CSV.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::executor::{RunResult, SummaryExtractor};
use crate::models::{Group, WorkerResult};
use crate::weights::WeightStrategy;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    finished_at: DateTime<Utc>,
    success: bool,
    duration_ms: u64,
    summary: Vec<String>,
    workers: &'a [WorkerResult],
}

#[derive(Serialize)]
struct GroupReport<'a> {
    worker: usize,
    weight: f64,
    items: Vec<&'a str>,
}

/// Run report formatter
pub struct RunFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl RunFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// One line describing how the work is split
    pub fn format_plan(&self, workers: usize, items: usize, noun: &str) -> String {
        let per_worker = if workers > 0 { items / workers } else { 0 };
        format!("{workers} processes for {items} {noun}s, ~ {per_worker} {noun}s per process")
    }

    /// Which source the item weights came from
    pub fn format_strategy(&self, strategy: WeightStrategy) -> String {
        match strategy {
            WeightStrategy::RecordedRuntime => "Using recorded test runtime".to_string(),
            WeightStrategy::FileSize => "Using file sizes".to_string(),
        }
    }

    /// Group assignments, without running anything
    pub fn format_groups(&self, groups: &[Group]) -> String {
        let reports: Vec<GroupReport> = groups
            .iter()
            .enumerate()
            .map(|(i, g)| GroupReport {
                worker: i + 1,
                weight: g.total_weight(),
                items: g.ids(),
            })
            .collect();

        match self.format {
            OutputFormat::Json => serde_json::to_string(&reports).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&reports).unwrap_or_default(),
            OutputFormat::Csv => self
                .csv(
                    &["worker", "weight", "item"],
                    reports.iter().flat_map(|r| {
                        r.items.iter().map(move |item| {
                            vec![r.worker.to_string(), format!("{:.2}", r.weight), item.to_string()]
                        })
                    }),
                )
                .unwrap_or_default(),
            OutputFormat::Table => {
                let mut output = String::new();
                for report in &reports {
                    output.push_str(&format!(
                        "Worker {:2} [{:10.2}] {} items\n",
                        report.worker,
                        report.weight,
                        report.items.len()
                    ));
                    for item in &report.items {
                        output.push_str(&format!("    {item}\n"));
                    }
                }
                output
            }
        }
    }

    /// Final report for a finished run
    pub fn format_run(&self, run: &RunResult, extractor: &dyn SummaryExtractor) -> String {
        match self.format {
            OutputFormat::Table => self.format_run_table(run, extractor),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let report = RunReport {
                    finished_at: Utc::now(),
                    success: run.success,
                    duration_ms: run.duration_ms,
                    summary: run.summary_lines(extractor),
                    workers: &run.workers,
                };
                if self.format == OutputFormat::JsonPretty {
                    serde_json::to_string_pretty(&report).unwrap_or_default()
                } else {
                    serde_json::to_string(&report).unwrap_or_default()
                }
            }
            OutputFormat::Csv => self
                .csv(
                    &["worker", "env", "items", "status", "exit_code", "duration_ms", "summary"],
                    run.workers.iter().map(|w| {
                        vec![
                            (w.ordinal + 1).to_string(),
                            w.discriminator.as_env_value(),
                            w.items.len().to_string(),
                            w.status.to_string(),
                            w.status.code().map(|c| c.to_string()).unwrap_or_default(),
                            w.duration_ms.to_string(),
                            extractor.extract(&w.output).join("; "),
                        ]
                    }),
                )
                .unwrap_or_default(),
        }
    }

    fn format_run_table(&self, run: &RunResult, extractor: &dyn SummaryExtractor) -> String {
        let mut output = String::new();

        output.push_str("\nResults:\n");
        for line in run.summary_lines(extractor) {
            output.push_str(&line);
            output.push('\n');
        }

        output.push('\n');
        for worker in &run.workers {
            let line = worker.to_string();
            if self.colorize && !worker.is_success() {
                output.push_str(&format!("\x1b[31m{line}\x1b[0m\n"));
            } else {
                output.push_str(&line);
                output.push('\n');
            }
        }

        output.push_str(&format!(
            "\nTook {:.6} seconds\n",
            run.duration_ms as f64 / 1000.0
        ));

        if !run.success {
            let failed = run.failed_workers().len();
            let line = format!("{failed} of {} processes failed", run.workers.len());
            if self.colorize {
                output.push_str(&format!("\x1b[31m{line}\x1b[0m\n"));
            } else {
                output.push_str(&line);
                output.push('\n');
            }
        }

        output
    }

    fn csv<I>(&self, header: &[&str], rows: I) -> Result<String>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(&row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to finish CSV output: {}", e.error()))?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl Default for RunFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a run report to a file
pub fn write_report_to_file(
    path: &str,
    run: &RunResult,
    extractor: &dyn SummaryExtractor,
    format: OutputFormat,
) -> Result<()> {
    let formatter = RunFormatter::new(format).no_color();
    let content = formatter.format_run(run, extractor);

    let mut file =
        std::fs::File::create(path).with_context(|| format!("Failed to create report: {path}"))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FailureCountExtractor;
    use crate::models::{WorkItem, WorkerStatus};

    fn sample_run() -> RunResult {
        RunResult::new(
            vec![
                WorkerResult::new(
                    0,
                    vec!["a_test.rb".into()],
                    WorkerStatus::Exited(0),
                    "1 example, 0 failures\n",
                )
                .with_duration(1500),
                WorkerResult::new(
                    1,
                    vec!["b_test.rb".into()],
                    WorkerStatus::Exited(1),
                    "1 example, 1 failure\n",
                ),
            ],
            1500,
        )
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("CSV"), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::from_str("unknown"), None);
    }

    #[test]
    fn test_format_plan() {
        let formatter = RunFormatter::default();
        assert_eq!(
            formatter.format_plan(3, 4, "spec"),
            "3 processes for 4 specs, ~ 1 specs per process"
        );
        assert_eq!(
            formatter.format_plan(0, 0, "test"),
            "0 processes for 0 tests, ~ 0 tests per process"
        );
    }

    #[test]
    fn test_format_strategy() {
        let formatter = RunFormatter::default();
        assert_eq!(
            formatter.format_strategy(WeightStrategy::RecordedRuntime),
            "Using recorded test runtime"
        );
        assert_eq!(
            formatter.format_strategy(WeightStrategy::FileSize),
            "Using file sizes"
        );
    }

    #[test]
    fn test_run_table() {
        let output = RunFormatter::default()
            .no_color()
            .format_run(&sample_run(), &FailureCountExtractor);

        assert!(output.contains("Results:\n1 example, 0 failures\n1 example, 1 failure\n"));
        assert!(output.contains("Took 1.500000 seconds"));
        assert!(output.contains("1 of 2 processes failed"));
    }

    #[test]
    fn test_run_json() {
        let output =
            RunFormatter::new(OutputFormat::Json).format_run(&sample_run(), &FailureCountExtractor);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["workers"].as_array().unwrap().len(), 2);
        assert_eq!(value["workers"][1]["discriminator"]["numbered"], 2);
    }

    #[test]
    fn test_run_csv() {
        let output =
            RunFormatter::new(OutputFormat::Csv).format_run(&sample_run(), &FailureCountExtractor);
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(lines[0], "worker,env,items,status,exit_code,duration_ms,summary");
        assert_eq!(lines[1], "1,,1,exit 0,0,1500,\"1 example, 0 failures\"");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_groups_table() {
        let group: Group = vec![WorkItem::new("a_test.rb", 3.0)].into_iter().collect();
        let output = RunFormatter::default().format_groups(&[group, Group::new()]);

        assert!(output.contains("Worker  1"));
        assert!(output.contains("    a_test.rb\n"));
        assert!(output.contains("Worker  2"));
    }
}
