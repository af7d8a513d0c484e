//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use self::cli::{
    AcceleratorOverrides, CliArgs, Command, DatabaseOverride, FlushArgs, LoggingOverrides,
    ReindexArgs, SearchOverrides, WorkerArgs, WorkerOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_DETAIL_TTL_SECS: u64 = 30;
const DEFAULT_CACHE_LIST_TTL_SECS: u64 = 120;
const DEFAULT_CACHE_OPERATION_TIMEOUT_MS: u64 = 250;
const DEFAULT_CACHE_SCAN_BATCH: u64 = 100;
const DEFAULT_COUNTER_OPERATION_TIMEOUT_MS: u64 = 250;
const DEFAULT_RECONCILER_INTERVAL_SECS: u64 = 30;
const DEFAULT_RECONCILER_BATCH_SIZE: u64 = 100;
const DEFAULT_RECONCILER_OPERATION_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_SEARCH_INDEX: &str = "articles";
const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_SEARCH_STARTUP_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_TASK_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub accelerator: AcceleratorSettings,
    pub cache: CacheSettings,
    pub counters: CounterSettings,
    pub reconciler: ReconcilerSettings,
    pub search: SearchSettings,
    pub tasks: TaskSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceleratorBackend {
    None,
    Memory,
    Redis { url: String },
}

#[derive(Debug, Clone)]
pub struct AcceleratorSettings {
    pub backend: AcceleratorBackend,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub detail_ttl: Duration,
    pub list_ttl: Duration,
    pub operation_timeout: Duration,
    pub scan_batch: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CounterSettings {
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub interval: Duration,
    pub batch_size: NonZeroU32,
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub url: Option<String>,
    pub index: String,
    pub timeout: Duration,
    pub startup_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Worker(args)) => raw.apply_worker_overrides(&args.overrides),
        Some(Command::Flush(args)) => {
            raw.apply_database_override(&args.database);
            raw.apply_logging_overrides(&args.logging);
            raw.apply_accelerator_overrides(&args.accelerator);
        }
        Some(Command::Reindex(args)) => {
            raw.apply_database_override(&args.database);
            raw.apply_logging_overrides(&args.logging);
            raw.apply_search_overrides(&args.search);
        }
        None => raw.apply_worker_overrides(&WorkerOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    accelerator: RawAcceleratorSettings,
    cache: RawCacheSettings,
    counters: RawCounterSettings,
    reconciler: RawReconcilerSettings,
    search: RawSearchSettings,
    tasks: RawTaskSettings,
}

impl RawSettings {
    fn apply_worker_overrides(&mut self, overrides: &WorkerOverrides) {
        self.apply_database_override(&overrides.database);
        self.apply_logging_overrides(&overrides.logging);
        self.apply_accelerator_overrides(&overrides.accelerator);
        self.apply_search_overrides(&overrides.search);

        if let Some(seconds) = overrides.reconciler_interval_seconds {
            self.reconciler.interval_seconds = Some(seconds);
        }
        if let Some(batch) = overrides.reconciler_batch_size {
            self.reconciler.batch_size = Some(batch);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_accelerator_overrides(&mut self, overrides: &AcceleratorOverrides) {
        if let Some(backend) = overrides.accelerator_backend.as_ref() {
            self.accelerator.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.accelerator_url.as_ref() {
            self.accelerator.url = Some(url.clone());
        }
        if let Some(namespace) = overrides.accelerator_namespace.as_ref() {
            self.accelerator.namespace = Some(namespace.clone());
        }
    }

    fn apply_search_overrides(&mut self, overrides: &SearchOverrides) {
        if let Some(url) = overrides.search_url.as_ref() {
            self.search.url = Some(url.clone());
        }
        if let Some(index) = overrides.search_index.as_ref() {
            self.search.index = Some(index.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            accelerator,
            cache,
            counters,
            reconciler,
            search,
            tasks,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            accelerator: build_accelerator_settings(accelerator)?,
            cache: build_cache_settings(cache)?,
            counters: build_counter_settings(counters)?,
            reconciler: build_reconciler_settings(reconciler)?,
            search: build_search_settings(search)?,
            tasks: build_task_settings(tasks)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.trim()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS.into()),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections,
    })
}

fn build_accelerator_settings(
    accelerator: RawAcceleratorSettings,
) -> Result<AcceleratorSettings, LoadError> {
    let url = non_blank(accelerator.url);
    let backend_name = non_blank(accelerator.backend).map(|name| name.to_ascii_lowercase());

    // An explicit URL without a backend selects Redis.
    let backend = match (backend_name.as_deref(), url) {
        (Some("none"), _) => AcceleratorBackend::None,
        (Some("memory"), _) => AcceleratorBackend::Memory,
        (Some("redis"), Some(url)) | (None, Some(url)) => {
            validate_url(&url, "accelerator.url")?;
            AcceleratorBackend::Redis { url }
        }
        (Some("redis"), None) => {
            return Err(LoadError::invalid(
                "accelerator.url",
                "required when the backend is `redis`",
            ));
        }
        (None, None) => AcceleratorBackend::Memory,
        (Some(other), _) => {
            return Err(LoadError::invalid(
                "accelerator.backend",
                format!("unknown backend `{other}`; expected none, memory or redis"),
            ));
        }
    };

    Ok(AcceleratorSettings {
        backend,
        namespace: non_blank(accelerator.namespace),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        detail_ttl: seconds(
            cache
                .detail_ttl_seconds
                .unwrap_or(DEFAULT_CACHE_DETAIL_TTL_SECS),
            "cache.detail_ttl_seconds",
        )?,
        list_ttl: seconds(
            cache.list_ttl_seconds.unwrap_or(DEFAULT_CACHE_LIST_TTL_SECS),
            "cache.list_ttl_seconds",
        )?,
        operation_timeout: millis(
            cache
                .operation_timeout_ms
                .unwrap_or(DEFAULT_CACHE_OPERATION_TIMEOUT_MS),
            "cache.operation_timeout_ms",
        )?,
        scan_batch: non_zero_u32(
            cache.scan_batch.unwrap_or(DEFAULT_CACHE_SCAN_BATCH),
            "cache.scan_batch",
        )?,
    })
}

fn build_counter_settings(counters: RawCounterSettings) -> Result<CounterSettings, LoadError> {
    Ok(CounterSettings {
        operation_timeout: millis(
            counters
                .operation_timeout_ms
                .unwrap_or(DEFAULT_COUNTER_OPERATION_TIMEOUT_MS),
            "counters.operation_timeout_ms",
        )?,
    })
}

fn build_reconciler_settings(
    reconciler: RawReconcilerSettings,
) -> Result<ReconcilerSettings, LoadError> {
    Ok(ReconcilerSettings {
        interval: seconds(
            reconciler
                .interval_seconds
                .unwrap_or(DEFAULT_RECONCILER_INTERVAL_SECS),
            "reconciler.interval_seconds",
        )?,
        batch_size: non_zero_u32(
            reconciler
                .batch_size
                .unwrap_or(DEFAULT_RECONCILER_BATCH_SIZE),
            "reconciler.batch_size",
        )?,
        operation_timeout: millis(
            reconciler
                .operation_timeout_ms
                .unwrap_or(DEFAULT_RECONCILER_OPERATION_TIMEOUT_MS),
            "reconciler.operation_timeout_ms",
        )?,
    })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let url = non_blank(search.url);
    if let Some(url) = url.as_deref() {
        validate_url(url, "search.url")?;
    }

    let index = search
        .index
        .map(|index| index.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SEARCH_INDEX.to_string());
    if index.is_empty() || index.contains('/') {
        return Err(LoadError::invalid(
            "search.index",
            "must be a non-empty name without `/`",
        ));
    }

    Ok(SearchSettings {
        url,
        index,
        timeout: millis(
            search.timeout_ms.unwrap_or(DEFAULT_SEARCH_TIMEOUT_MS),
            "search.timeout_ms",
        )?,
        startup_timeout: millis(
            search
                .startup_timeout_ms
                .unwrap_or(DEFAULT_SEARCH_STARTUP_TIMEOUT_MS),
            "search.startup_timeout_ms",
        )?,
    })
}

fn build_task_settings(tasks: RawTaskSettings) -> Result<TaskSettings, LoadError> {
    Ok(TaskSettings {
        timeout: millis(
            tasks.timeout_ms.unwrap_or(DEFAULT_TASK_TIMEOUT_MS),
            "tasks.timeout_ms",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAcceleratorSettings {
    backend: Option<String>,
    url: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    detail_ttl_seconds: Option<u64>,
    list_ttl_seconds: Option<u64>,
    operation_timeout_ms: Option<u64>,
    scan_batch: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCounterSettings {
    operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReconcilerSettings {
    interval_seconds: Option<u64>,
    batch_size: Option<u64>,
    operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    url: Option<String>,
    index: Option<String>,
    timeout_ms: Option<u64>,
    startup_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTaskSettings {
    timeout_ms: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn validate_url(value: &str, key: &'static str) -> Result<(), LoadError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))
}

fn seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
