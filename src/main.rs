//! partest - parallel test runner
//!
//! Splits test files into balanced groups and runs each group in its own
//! worker process. Workers see their number in `TEST_ENV_NUMBER` (empty for
//! the first worker, then 2, 3, ...) so they can pick separate databases or
//! ports. Output from all workers is streamed to the console in chunks and
//! the run fails when any worker fails.
//!
//! ## Usage
//!
//! ```bash
//! # Run every test file below test/ on all CPUs
//! partest run --command 'ruby -Itest {items}'
//!
//! # Four workers, skipping test/slow
//! partest run -n 4 --root 'test/!(slow)' --command 'ruby -Itest {items}'
//!
//! # Show the grouping without running anything
//! partest groups -n 4
//!
//! # Run a setup command once per worker
//! partest exec -n 4 'rake db:create'
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{debug, info};

mod cli;
mod config;
mod discovery;
mod executor;
mod grouper;
mod models;
mod output;
mod utils;
mod weights;

use cli::Args;
use config::{AppConfig, ConfigFile, EnvConfig};
use executor::{CommandTemplate, Dispatcher, ExecutionMode, FailureCountExtractor, RunResult};
use models::{Group, WorkItem};
use output::{ConsoleSink, OutputFormat, RunFormatter, SharedSink};
use utils::{init_logger, LogLevel};
use weights::{RuntimeLog, WeightEstimator, WeightStrategy};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let verbose = args.verbose || env.verbose.unwrap_or(false);
    init_logger(LogLevel::resolve(verbose, args.log_level.as_deref()));

    match args.command {
        cli::Command::Run(run_args) => {
            let run = run_tests(run_args, &env).await?;
            exit_with(&run);
        }
        cli::Command::Exec(exec_args) => {
            let run = run_exec(exec_args, &env).await?;
            exit_with(&run);
        }
        cli::Command::Groups(groups_args) => {
            show_groups(groups_args, &env)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &env)?;
        }
    }

    Ok(())
}

fn exit_with(run: &RunResult) {
    if !run.success {
        std::process::exit(run.exit_code());
    }
}

/// Config file, then environment overrides
fn load_settings(config_path: Option<&str>, env: &EnvConfig) -> Result<AppConfig> {
    let path = config_path.or(env.config_file.as_deref());
    let file = ConfigFile::load_from(path)?;
    debug!("Loaded configuration (version {})", file.version);

    let mut app = file.app;
    app.apply_env(env);
    Ok(app)
}

fn apply_partition_args(app: &mut AppConfig, args: &cli::PartitionArgs) {
    if let Some(ref root) = args.root {
        app.root = root.clone();
    }
    if let Some(ref suffix) = args.suffix {
        app.suffix = suffix.clone();
    }
    if let Some(ref runtime_log) = args.runtime_log {
        app.runtime_log = Some(runtime_log.clone());
    }
}

fn apply_worker_args(app: &mut AppConfig, args: &cli::WorkerArgs) {
    if let Some(timeout) = args.chunk_timeout {
        app.chunk_timeout_ms = (timeout * 1000.0).round() as u64;
    }
    if let Some(ref log_file) = args.log_file {
        app.log_file = Some(log_file.clone());
    }
    if let Some(max_concurrent) = args.max_concurrent {
        app.max_concurrent = Some(max_concurrent);
    }
    if let Some(ref env_var) = args.env_var {
        app.env_var = env_var.clone();
    }
}

/// Groups ready to dispatch, with how they were weighed
struct Plan {
    groups: Vec<Group>,
    item_count: usize,
    /// `None` when items were dealt out in input order without weighing
    strategy: Option<WeightStrategy>,
}

/// Weighted, partitioned test files
fn plan_groups(app: &AppConfig, args: &cli::PartitionArgs, env: &EnvConfig) -> Result<Plan> {
    let workers = app.worker_count(args.processes)?;

    let ids = if args.items.is_empty() {
        let root = app.scan_root(env.path_prefix.as_deref());
        discovery::find_items(&root, &app.suffix)?
    } else {
        args.items.clone()
    };
    let item_count = ids.len();

    if args.no_sort {
        let items = ids.into_iter().map(WorkItem::unweighted).collect();
        let groups = grouper::in_groups(items, workers)?;
        info!("Dealt {} items into {} groups in input order", item_count, groups.len());
        return Ok(Plan {
            groups,
            item_count,
            strategy: None,
        });
    }

    let runtime_log = app
        .runtime_log
        .as_deref()
        .map(RuntimeLog::load)
        .unwrap_or_default();

    let mut estimator = WeightEstimator::new(runtime_log).with_coverage(app.runtime_coverage);
    if let Some(ref root) = args.runtime_root {
        estimator = estimator.with_runtime_root(root);
    }
    let estimate = estimator.estimate(&ids);
    let groups = grouper::partition(estimate.items, workers, true)?;

    info!(
        "Partitioned {} items into {} groups by {}",
        item_count,
        groups.len(),
        estimate.strategy
    );
    Ok(Plan {
        groups,
        item_count,
        strategy: Some(estimate.strategy),
    })
}

/// Strategy and worker/item counts, printed before anything runs
fn plan_lines(formatter: &RunFormatter, plan: &Plan, noun: &str) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(strategy) = plan.strategy {
        lines.push(formatter.format_strategy(strategy));
    }
    lines.push(formatter.format_plan(plan.groups.len(), plan.item_count, noun));
    lines
}

fn build_dispatcher(app: &AppConfig, args: &cli::WorkerArgs) -> Dispatcher {
    let mode = if args.non_parallel {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Parallel
    };

    Dispatcher::new()
        .with_env_var(&app.env_var)
        .with_chunk_timeout(app.chunk_timeout())
        .with_mode(mode)
        .with_max_concurrent(app.max_concurrent)
}

fn build_sink(app: &AppConfig) -> Result<SharedSink> {
    let console = match app.log_file {
        Some(ref path) => ConsoleSink::stdout().with_log_file(path)?,
        None => ConsoleSink::stdout(),
    };
    Ok(SharedSink::new(console))
}

/// Noun used in the plan line
fn item_noun(suffix: &str) -> &'static str {
    if suffix.contains("spec") {
        "spec"
    } else if suffix.contains("feature") {
        "feature"
    } else {
        "test"
    }
}

async fn run_tests(args: cli::RunArgs, env: &EnvConfig) -> Result<RunResult> {
    let mut app = load_settings(args.partition.config.as_deref(), env)?;
    apply_partition_args(&mut app, &args.partition);
    apply_worker_args(&mut app, &args.worker);
    if let Some(ref command) = args.command {
        app.command = Some(command.clone());
    }
    if let Some(ref options) = args.test_options {
        app.test_options = Some(options.clone());
    }
    app.validate()?;

    let command = app
        .command
        .as_deref()
        .ok_or_else(|| anyhow!("No worker command given. Use --command or set app.command in partest.yaml"))?;
    let mut template = CommandTemplate::parse(command)
        .with_context(|| format!("Invalid worker command: {command}"))?;
    if let Some(ref options) = app.test_options {
        template = template
            .with_options(options)
            .with_context(|| format!("Invalid test options: {options}"))?;
    }

    let plan = plan_groups(&app, &args.partition, env)?;
    let format = OutputFormat::from_str(&args.worker.format).unwrap_or(OutputFormat::Table);
    let formatter = RunFormatter::new(format);

    print_plan(format, &plan_lines(&formatter, &plan, item_noun(&app.suffix)));

    let dispatcher = build_dispatcher(&app, &args.worker);
    let run = dispatcher
        .dispatch(plan.groups, &template, build_sink(&app)?)
        .await;

    report(&formatter, &run, args.worker.report.as_deref(), format)?;
    Ok(run)
}

async fn run_exec(args: cli::ExecArgs, env: &EnvConfig) -> Result<RunResult> {
    let mut app = load_settings(args.config.as_deref(), env)?;
    apply_worker_args(&mut app, &args.worker);
    app.validate()?;

    let template = CommandTemplate::shell(&args.command)
        .with_context(|| format!("Invalid command: {}", args.command))?;

    let workers = app.worker_count(args.processes)?;
    let groups = vec![Group::new(); workers];

    let format = OutputFormat::from_str(&args.worker.format).unwrap_or(OutputFormat::Table);
    let formatter = RunFormatter::new(format);

    let dispatcher = build_dispatcher(&app, &args.worker);
    let run = dispatcher.dispatch(groups, &template, build_sink(&app)?).await;

    report(&formatter, &run, args.worker.report.as_deref(), format)?;
    Ok(run)
}

fn print_plan(format: OutputFormat, lines: &[String]) {
    // non-table formats keep the plan out of the report; worker output still goes to stdout
    for line in lines {
        if format == OutputFormat::Table {
            println!("{line}");
        } else {
            eprintln!("{line}");
        }
    }
}

fn report(
    formatter: &RunFormatter,
    run: &RunResult,
    report_path: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let extractor = FailureCountExtractor;
    println!("{}", formatter.format_run(run, &extractor));

    for worker in run.failed_workers() {
        eprintln!(
            "Worker {} ({} items) failed: {}",
            worker.ordinal + 1,
            worker.items.len(),
            worker.status
        );
    }

    if let Some(path) = report_path {
        output::write_report_to_file(path, run, &extractor, format)?;
        info!("Report saved to {}", path);
    }

    Ok(())
}

fn show_groups(args: cli::GroupsArgs, env: &EnvConfig) -> Result<()> {
    let mut app = load_settings(args.partition.config.as_deref(), env)?;
    apply_partition_args(&mut app, &args.partition);
    app.validate()?;

    let plan = plan_groups(&app, &args.partition, env)?;
    let format = OutputFormat::from_str(&args.format).unwrap_or(OutputFormat::Table);
    let formatter = RunFormatter::new(format);

    print_plan(format, &plan_lines(&formatter, &plan, item_noun(&app.suffix)));
    println!("{}", formatter.format_groups(&plan.groups));

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, env: &EnvConfig) -> Result<()> {
    use std::path::Path;

    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {output}. Use --force to overwrite."
                );
            }

            ConfigFile::example().save(path)?;
            println!("✓ Configuration file created: {output}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { env: show_env, format } => {
            if show_env {
                if env.has_any() {
                    env.print_summary();
                } else {
                    println!("No PARTEST_* variables set.");
                }
                println!();
                config::print_env_help();
            } else {
                let app = load_settings(None, env)?;
                let output = if format == "json" {
                    serde_json::to_string_pretty(&app)?
                } else {
                    serde_yaml::to_string(&app)?
                };
                println!("{output}");
            }
        }

        cli::ConfigAction::Validate { file } => {
            let path = file
                .or_else(|| env.config_file.clone())
                .or_else(|| ConfigFile::find().map(|p| p.to_string_lossy().to_string()))
                .unwrap_or_else(|| "./partest.yaml".to_string());

            match ConfigFile::load(&path) {
                Ok(_) => {
                    println!("✓ Configuration file is valid: {path}");
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {path}");
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
