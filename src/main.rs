use std::{process, sync::Arc};

use folio::{
    application::{
        accelerator::Accelerator,
        articles::ArticleService,
        error::AppError,
        repos::ArticlesRepo,
        tasks::BackgroundTasks,
    },
    cache::{ArticleCache, CacheConfig, Keyspace},
    config::{self, Command, ReindexArgs, Settings},
    counters::{CounterBuffer, FlushReport, Reconciler, ReconcilerConfig, log_report},
    infra::{
        accelerator, db::PostgresRepositories, error::InfraError, search::HttpSearchEngine,
        telemetry,
    },
    search::{SearchConfig, SearchEngine, SearchFacade, SearchState},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.report().chain();
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        None | Some(Command::Worker(_)) => run_worker(settings).await,
        Some(Command::Flush(_)) => run_flush(settings).await,
        Some(Command::Reindex(args)) => run_reindex(settings, args).await,
    }
}

/// Shared handles every subcommand builds from the same settings.
struct Runtime {
    repo: Arc<dyn ArticlesRepo>,
    accelerator: Option<Arc<dyn Accelerator>>,
    keys: Keyspace,
    tasks: BackgroundTasks,
}

impl Runtime {
    async fn build(settings: &Settings, with_accelerator: bool) -> Result<Self, AppError> {
        let repositories = init_repositories(settings).await?;
        let accelerator = if with_accelerator {
            accelerator::connect(&settings.accelerator).await
        } else {
            None
        };

        Ok(Self {
            repo: repositories,
            accelerator,
            keys: Keyspace::new(settings.accelerator.namespace.as_deref()),
            tasks: BackgroundTasks::new(),
        })
    }

    fn reconciler(&self, settings: &Settings) -> Reconciler {
        Reconciler::new(
            self.accelerator.clone(),
            self.repo.clone(),
            self.keys.clone(),
            ReconcilerConfig::from(&settings.reconciler),
        )
    }

    async fn search(&self, settings: &Settings) -> Result<SearchFacade, AppError> {
        let engine = match settings.search.url.as_deref() {
            Some(url) => {
                let engine =
                    HttpSearchEngine::new(url, &settings.search.index, settings.search.timeout)
                        .map_err(InfraError::from)?;
                Some(Arc::new(engine) as Arc<dyn SearchEngine>)
            }
            None => None,
        };

        Ok(SearchFacade::connect(
            engine,
            self.repo.clone(),
            self.tasks.clone(),
            SearchConfig::from(&settings.search),
        )
        .await)
    }

    async fn articles(&self, settings: &Settings) -> Result<ArticleService, AppError> {
        let cache = ArticleCache::new(
            self.accelerator.clone(),
            self.keys.clone(),
            CacheConfig::from(&settings.cache),
        );
        let counters = CounterBuffer::new(
            self.accelerator.clone(),
            self.repo.clone(),
            self.keys.clone(),
            settings.counters.operation_timeout,
        );
        let search = self.search(settings).await?;

        Ok(ArticleService::new(
            self.repo.clone(),
            cache,
            counters,
            search,
            self.tasks.clone(),
        )
        .with_task_timeout(settings.tasks.timeout))
    }
}

async fn run_worker(settings: Settings) -> Result<(), AppError> {
    let runtime = Runtime::build(&settings, true).await?;
    let articles = runtime.articles(&settings).await?;
    let reconciler = Arc::new(runtime.reconciler(&settings));

    info!(
        accelerator = runtime
            .accelerator
            .as_ref()
            .map(|accelerator| accelerator.backend_name())
            .unwrap_or("none"),
        search_engine = matches!(articles.search_facade().state(), SearchState::Enabled),
        interval_secs = reconciler.config().interval.as_secs(),
        "Folio worker started"
    );

    let handle = reconciler.clone().spawn(reconciler.config().interval);

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!("Shutdown requested; flushing buffered counters");

    handle.abort();
    if let Err(err) = handle.await {
        if !err.is_cancelled() {
            warn!(error = %err, "Reconciler task ended abnormally");
        }
    }

    let report = reconciler.flush_all().await;
    log_report(&report);

    articles.tasks().drain().await;
    info!("Folio worker stopped");
    Ok(())
}

async fn run_flush(settings: Settings) -> Result<(), AppError> {
    let runtime = Runtime::build(&settings, true).await?;
    if runtime.accelerator.is_none() {
        warn!("No accelerator available; nothing is buffered");
    }

    let report = runtime.reconciler(&settings).flush_all().await;
    log_report(&report);
    print_report(&report);
    Ok(())
}

async fn run_reindex(settings: Settings, args: ReindexArgs) -> Result<(), AppError> {
    if args.page_size == 0 {
        return Err(AppError::validation("--page-size must be greater than zero"));
    }

    let runtime = Runtime::build(&settings, false).await?;
    let search = runtime.search(&settings).await?;
    let report = search.reindex_all(args.page_size).await?;
    runtime.tasks.drain().await;

    println!("indexed={} failed={}", report.indexed, report.failed);
    if report.failed > 0 {
        return Err(AppError::unexpected(format!(
            "{} article(s) failed to index",
            report.failed
        )));
    }
    Ok(())
}

fn print_report(report: &FlushReport) {
    println!(
        "scanned={} applied={} cleaned={} failed={} views={} likes={}{}",
        report.scanned,
        report.applied,
        report.cleaned,
        report.failed,
        report.view_delta,
        report.like_delta,
        if report.aborted { " (aborted)" } else { "" }
    );
}

async fn init_repositories(settings: &Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}
