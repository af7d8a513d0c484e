use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

pub(crate) const DEFAULT_REINDEX_PAGE_SIZE: u32 = 200;

/// Command-line arguments for the Folio binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Folio article cache, counter buffer and search worker"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "FOLIO_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the counter reconciler until interrupted.
    Worker(Box<WorkerArgs>),
    /// Run a single reconciliation cycle and print the report.
    Flush(FlushArgs),
    /// Push every stored article to the search engine.
    Reindex(ReindexArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the log level filter (e.g. info, debug).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct AcceleratorOverrides {
    /// Accelerator backend: none, memory or redis.
    #[arg(long = "accelerator-backend", value_name = "BACKEND")]
    pub accelerator_backend: Option<String>,

    /// Redis connection URL for the accelerator.
    #[arg(long = "accelerator-url", value_name = "URL")]
    pub accelerator_url: Option<String>,

    /// Prefix prepended to every accelerator key.
    #[arg(long = "accelerator-namespace", value_name = "NAME")]
    pub accelerator_namespace: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SearchOverrides {
    /// Base URL of the search engine; leave unset to search the store only.
    #[arg(long = "search-url", value_name = "URL")]
    pub search_url: Option<String>,

    /// Index holding article documents.
    #[arg(long = "search-index", value_name = "NAME")]
    pub search_index: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: WorkerOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub accelerator: AcceleratorOverrides,

    #[command(flatten)]
    pub search: SearchOverrides,

    /// Seconds between reconciliation cycles.
    #[arg(long = "reconciler-interval-seconds", value_name = "SECONDS")]
    pub reconciler_interval_seconds: Option<u64>,

    /// Keys requested per scan page while reconciling.
    #[arg(long = "reconciler-batch-size", value_name = "COUNT")]
    pub reconciler_batch_size: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FlushArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub accelerator: AcceleratorOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct ReindexArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub search: SearchOverrides,

    /// Articles loaded from the store per page.
    #[arg(long = "page-size", default_value_t = DEFAULT_REINDEX_PAGE_SIZE)]
    pub page_size: u32,
}
