//! CLI parse: clap types for testsmith. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Testsmith CLI - Generate API test artifacts from specifications
#[derive(Parser)]
#[command(name = "testsmith")]
#[command(about = "Generate tabular, scenario and collection test artifacts from API specifications")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (where config/ is looked up)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate test artifacts for one or more specification files
    Generate {
        /// Specification file (repeatable)
        #[arg(long = "spec", required = true)]
        specs: Vec<PathBuf>,

        /// Extra instructions passed to the planner and every generator
        #[arg(long)]
        focus: Option<String>,

        /// Output directory (overrides output.directory)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Sectioning strategy (by-tag, by-path, by-method, by-complexity, manual, auto)
        #[arg(long, default_value = "auto")]
        strategy: String,

        /// Skip tabular test cases
        #[arg(long)]
        no_tabular: bool,

        /// Skip scenario feature files
        #[arg(long)]
        no_scenario: bool,

        /// Skip the request collection
        #[arg(long)]
        no_collection: bool,

        /// Run stateless generators concurrently (default)
        #[arg(long, conflicts_with = "sequential")]
        parallel: bool,

        /// Run one section at a time
        #[arg(long)]
        sequential: bool,

        /// Generate a single artifact kind (tabular, scenario, collection)
        #[arg(long, conflicts_with_all = ["no_tabular", "no_scenario", "no_collection"])]
        only: Option<String>,

        /// Skip companion documentation files
        #[arg(long)]
        no_docs: bool,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the resolved configuration
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Inspect or maintain the upload cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show registry statistics
    Stats {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Drop entries whose source file no longer exists
    Cleanup {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
