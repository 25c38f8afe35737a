use crate::checkpoint::CheckpointStore;
use crate::clients::{Job104Client, Job104CrawlConfig};
use crate::crawler::CrawlContext;
use crate::diagnostics::Diagnostics;
use crate::interrupt::install_ctrl_c_handler;
use crate::pipeline::{CrawlPipeline, RunSummary};
use crate::policy::CrawlPolicy;
use crate::session::ChromeLauncher;
use crate::writer::{load_existing_ids, OutputPaths, OutputStore};
use crate::{CrawlError, Result};
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Crawl 104 job bank postings page by page with resumable checkpoints", long_about = None)]
pub struct Cli {
    /// Search page URL without query string
    #[arg(long, default_value = "https://www.104.com.tw/jobs/search")]
    pub base_url: String,

    /// Search query; jobcat=2007001022 is data engineering
    #[arg(long, default_value = "jobcat=2007001022")]
    pub query_params: String,

    /// Pagination parameter, `{page}` is replaced by the page number
    #[arg(long, default_value = "page={page}")]
    pub pagination: String,

    #[arg(long, default_value_t = 1)]
    pub start_page: u32,

    #[arg(long, default_value_t = 20)]
    pub end_page: u32,

    /// Output name; the jobcat suffix is appended
    #[arg(long, default_value = "job_data.csv")]
    pub output_csv: String,

    /// Previously written table whose job ids are skipped
    #[arg(long, default_value = "job_data_jobcat_1022.csv")]
    pub existing_csv: PathBuf,

    #[arg(long, default_value_t = false)]
    pub headless: bool,

    #[arg(long, default_value = "checkpoint.json")]
    pub checkpoint: PathBuf,

    /// TOML file overriding delays, retry bounds and cadences
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Where markup of failed pages is written
    #[arg(long, default_value = ".")]
    pub diagnostics_dir: PathBuf,

    /// Save the raw markup of every listing page attempt
    #[arg(long, default_value_t = false)]
    pub dump_list_pages: bool,

    /// Directory for the timestamped run log
    #[arg(long, default_value = ".")]
    pub log_dir: PathBuf,
}

/// Console output plus a plain-text log file named after the start time.
pub fn init_logging(log_dir: &std::path::Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(format!(
        "crawler_log_{}.txt",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let log_file = File::create(&log_path)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init()
        .map_err(|e| CrawlError::Configuration(e.to_string()))?;

    Ok(log_path)
}

pub fn run(cli: Cli) -> Result<RunSummary> {
    let log_path = init_logging(&cli.log_dir)?;
    tracing::info!(log = %log_path.display(), "start");
    let started = std::time::Instant::now();

    let policy = match &cli.policy {
        Some(path) => CrawlPolicy::from_toml_file(path)?,
        None => CrawlPolicy::default(),
    };
    if cli.end_page < cli.start_page {
        return Err(CrawlError::Configuration(format!(
            "end page {} is before start page {}",
            cli.end_page, cli.start_page
        )));
    }

    let existing_ids = load_existing_ids(&cli.existing_csv);
    let output = OutputStore::new(OutputPaths::for_query(&cli.output_csv, &cli.query_params));
    let client = Job104Client::new(Job104CrawlConfig {
        base_url: cli.base_url,
        query_params: cli.query_params,
        pagination: cli.pagination,
    });
    let ctx = CrawlContext::new(
        ChromeLauncher::new(cli.headless),
        policy,
        Diagnostics::new(cli.diagnostics_dir, cli.dump_list_pages),
    );
    let interrupt = install_ctrl_c_handler()?;

    let mut pipeline = CrawlPipeline::new(client, ctx, CheckpointStore::new(cli.checkpoint), output)
        .with_existing_ids(existing_ids)
        .with_interrupt(interrupt);
    let summary = pipeline.run(cli.start_page, cli.end_page);

    tracing::info!(elapsed_secs = started.elapsed().as_secs_f64(), "end");
    summary
}
