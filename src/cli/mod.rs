//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Run test files in parallel worker processes
#[derive(Parser, Debug)]
#[command(name = "partest")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Split test files into balanced groups and run them in parallel")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test files in parallel
    Run(RunArgs),

    /// Run the same shell command in every worker
    Exec(ExecArgs),

    /// Show how test files would be grouped, without running them
    Groups(GroupsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Options shared by every command that partitions test files
#[derive(ClapArgs, Debug, Default)]
pub struct PartitionArgs {
    /// Test files to run (default: scan the root)
    pub items: Vec<String>,

    /// Number of worker processes
    #[arg(short = 'n', long)]
    pub processes: Option<usize>,

    /// Directory or pattern scanned for test files, e.g. 'test/!(slow)'
    #[arg(long)]
    pub root: Option<String>,

    /// File name suffix of test files
    #[arg(long)]
    pub suffix: Option<String>,

    /// Deal files out in order instead of balancing by weight
    #[arg(long)]
    pub no_sort: bool,

    /// Recorded runtimes used to weigh test files
    #[arg(long)]
    pub runtime_log: Option<String>,

    /// Directory prepended to paths found in the runtime log
    #[arg(long)]
    pub runtime_root: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Options controlling how workers run
#[derive(ClapArgs, Debug, Default)]
pub struct WorkerArgs {
    /// Run workers one after another
    #[arg(long)]
    pub non_parallel: bool,

    /// Seconds between flushes of buffered worker output
    #[arg(long)]
    pub chunk_timeout: Option<f64>,

    /// Copy all worker output to this file
    #[arg(short, long)]
    pub log_file: Option<String>,

    /// Maximum number of workers running at once
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Environment variable carrying the worker number
    #[arg(long)]
    pub env_var: Option<String>,

    /// Output format (table, json, json-pretty, csv)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Save the run report to file
    #[arg(long)]
    pub report: Option<String>,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub partition: PartitionArgs,

    #[command(flatten)]
    pub worker: WorkerArgs,

    /// Worker command; `{items}` marks where test files go
    #[arg(long)]
    pub command: Option<String>,

    /// Options inserted right after the command's program
    #[arg(short = 'o', long, allow_hyphen_values = true)]
    pub test_options: Option<String>,
}

/// Arguments for exec command
#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Shell command run by every worker
    pub command: String,

    /// Number of worker processes
    #[arg(short = 'n', long)]
    pub processes: Option<usize>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    #[command(flatten)]
    pub worker: WorkerArgs,
}

/// Arguments for groups command
#[derive(Parser, Debug)]
pub struct GroupsArgs {
    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Output format (table, json, json-pretty, csv)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "partest.yaml")]
        output: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Also show environment overrides
        #[arg(long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// Config file (default: search standard locations)
        file: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let args = Args::parse_from([
            "partest",
            "run",
            "-n",
            "4",
            "--command",
            "rspec {items}",
            "--no-sort",
            "--chunk-timeout",
            "0.5",
            "a_test.rb",
            "b_test.rb",
        ]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.partition.processes, Some(4));
                assert_eq!(run.command.as_deref(), Some("rspec {items}"));
                assert!(run.partition.no_sort);
                assert_eq!(run.worker.chunk_timeout, Some(0.5));
                assert_eq!(run.partition.items, vec!["a_test.rb", "b_test.rb"]);
                assert_eq!(run.worker.format, "table");
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_test_options_accept_hyphens() {
        let args = Args::parse_from(["partest", "run", "-o", "--seed 42"]);
        match args.command {
            Command::Run(run) => assert_eq!(run.test_options.as_deref(), Some("--seed 42")),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_exec_args() {
        let args = Args::parse_from([
            "partest",
            "exec",
            "echo $TEST_ENV_NUMBER",
            "-n",
            "3",
            "--non-parallel",
            "--verbose",
        ]);
        assert!(args.verbose);
        match args.command {
            Command::Exec(exec) => {
                assert_eq!(exec.command, "echo $TEST_ENV_NUMBER");
                assert_eq!(exec.processes, Some(3));
                assert!(exec.worker.non_parallel);
            }
            _ => panic!("Expected Exec command"),
        }
    }

    #[test]
    fn test_groups_args() {
        let args = Args::parse_from(["partest", "groups", "--root", "spec/", "--format", "json"]);
        match args.command {
            Command::Groups(groups) => {
                assert_eq!(groups.partition.root.as_deref(), Some("spec/"));
                assert_eq!(groups.format, "json");
                assert!(groups.partition.items.is_empty());
            }
            _ => panic!("Expected Groups command"),
        }
    }

    #[test]
    fn test_config_args() {
        let args = Args::parse_from(["partest", "config", "init", "--force"]);
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { output, force },
            }) => {
                assert_eq!(output, "partest.yaml");
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
