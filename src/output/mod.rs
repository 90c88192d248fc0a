//! Output module
//!
//! Shared sink for worker output and formatting of run reports.

mod formatter;
mod sink;

pub use formatter::{write_report_to_file, OutputFormat, RunFormatter};
pub use sink::{ConsoleSink, SharedSink};

#[cfg(test)]
pub use sink::RecordingSink;
