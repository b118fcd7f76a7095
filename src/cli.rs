use crate::admission::{RunAdmissionFilter, DEFAULT_MIN_RUN_LENGTH};
use crate::extract::MetricExtractor;
use crate::histogram::archive::JsonArchiveOpener;
use crate::locator::{HttpSavesetService, RunFileLocator};
use crate::model::{RunConfig, RunNumber};
use crate::options::{algorithm_id, Mode, TrendOptions};
use crate::orchestrator::{
    plot_batch, plot_trend, run_batch, run_trend, BatchJob, RunWalker, TrendJob,
};
use crate::publish::{load_credential, HttpPublisher, Publisher};
use crate::render::TrendRenderer;
use crate::rundb::{HttpMetadataSource, RunMetadataResolver};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "run-trends",
    version,
    about = "Per-run trend metrics from monitoring savesets, published for trend plotting"
)]
pub struct Cli {
    /// First run of the range (inclusive)
    pub run_lower: u32,

    /// Last run of the range (inclusive)
    pub run_upper: u32,

    /// Options unit relative to --options-dir, without extension (e.g. velo/hotspot_occupancy)
    pub options_path: String,

    /// Report family; plots land in figures/<lo>_<hi>/<report_type>/
    #[arg(default_value = "unspecified")]
    pub report_type: String,

    /// Directory holding the options units
    #[arg(long, default_value = "options")]
    pub options_dir: PathBuf,

    /// Run database API; the run number is appended
    #[arg(long, default_value = "http://rundb-internal.lbdaq.cern.ch/api/run/")]
    pub rundb_url: String,

    /// Local cache of run database documents
    #[arg(long, default_value = "rundb_files")]
    pub rundb_cache: PathBuf,

    /// Root of the per-run saveset tree
    #[arg(long, default_value = "/hist/Savesets/ByRun")]
    pub saveset_root: PathBuf,

    /// Service asked to create missing savesets; the run number is appended
    #[arg(
        long,
        default_value = "http://monitoringhub.lbdaq.cern.ch/v1/createrunsaveset/LHCb/"
    )]
    pub saveset_service_url: String,

    /// Time-series store ingest endpoint; nothing is published without it
    #[arg(long)]
    pub publish_url: Option<String>,

    /// Compute and plot only, even if --publish-url is set
    #[arg(long)]
    pub no_publish: bool,

    /// File holding the publish credential
    #[arg(long, default_value = ".git_key_file")]
    pub key_file: PathBuf,

    /// Shortest admitted run [default: options file, else 300s]
    #[arg(long)]
    pub min_run_length: Option<humantime::Duration>,

    /// Only admit runs sent to this destination (e.g. OFFLINE)
    #[arg(long)]
    pub destination: Option<String>,

    /// Root directory for plots
    #[arg(long, default_value = "figures")]
    pub figures_dir: PathBuf,

    /// Run metadata documents resolved ahead of processing
    #[arg(long, default_value_t = 1)]
    pub fetch_concurrency: usize,

    /// Timeout for every HTTP request
    #[arg(long, default_value = "30s")]
    pub http_timeout: humantime::Duration,

    /// Only log warnings and errors
    #[arg(long)]
    pub quiet: bool,
}

/// Build a `RunConfig` from CLI arguments and the loaded options.
///
/// Command-line values win over the options file for the minimum run length
/// and the destination filter.
pub fn build_config(args: &Cli, options: &TrendOptions) -> Result<RunConfig> {
    if args.run_upper < args.run_lower {
        anyhow::bail!(
            "empty run range: upper bound {} is below lower bound {}",
            args.run_upper,
            args.run_lower
        );
    }
    let min_run_length = args
        .min_run_length
        .map(Duration::from)
        .or(options.min_run_length)
        .unwrap_or(DEFAULT_MIN_RUN_LENGTH);
    let publish_url = if args.no_publish {
        None
    } else {
        args.publish_url.clone()
    };

    Ok(RunConfig {
        run_lower: RunNumber(args.run_lower),
        run_upper: RunNumber(args.run_upper),
        report_type: args.report_type.clone(),
        algorithm: algorithm_id(&args.options_path),
        rundb_url: args.rundb_url.clone(),
        rundb_cache: args.rundb_cache.clone(),
        saveset_root: args.saveset_root.clone(),
        saveset_service_url: args.saveset_service_url.clone(),
        publish_url,
        key_file: args.key_file.clone(),
        min_run_length,
        destination: args.destination.clone().or_else(|| options.destination.clone()),
        figures_dir: args.figures_dir.clone(),
        fetch_concurrency: args.fetch_concurrency.max(1),
        http_timeout: Duration::from(args.http_timeout),
        user_agent: format!("run-trends/{}", env!("CARGO_PKG_VERSION")),
    })
}

pub async fn run(args: Cli) -> Result<()> {
    let options = TrendOptions::load(&args.options_dir, &args.options_path)?;
    let cfg = build_config(&args, &options)?;
    tracing::info!(
        options = %args.options_path,
        lower = %cfg.run_lower,
        upper = %cfg.run_upper,
        min_run_length = %humantime::format_duration(cfg.min_run_length),
        destination = cfg.destination.as_deref().unwrap_or("any"),
        "processing run range"
    );

    let http = reqwest::Client::builder()
        .user_agent(&cfg.user_agent)
        .timeout(cfg.http_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let publisher = match &cfg.publish_url {
        Some(url) => {
            let credential = load_credential(&cfg.key_file)?;
            Some(HttpPublisher::new(http.clone(), url, credential))
        }
        None => {
            tracing::info!("publishing disabled");
            None
        }
    };
    let publisher = publisher.as_ref().map(|p| p as &dyn Publisher);

    let walker = RunWalker {
        resolver: RunMetadataResolver::new(
            Box::new(HttpMetadataSource::new(http.clone(), &cfg.rundb_url)),
            &cfg.rundb_cache,
        ),
        locator: RunFileLocator::new(
            &cfg.saveset_root,
            &options.file_suffix,
            Box::new(HttpSavesetService::new(http, &cfg.saveset_service_url)),
        ),
        opener: Box::new(JsonArchiveOpener),
        filter: RunAdmissionFilter {
            destination: cfg.destination.clone(),
            min_run_length: cfg.min_run_length,
        },
        provider: options.provider.clone(),
        fetch_concurrency: cfg.fetch_concurrency,
    };
    if !options.regions.is_empty() {
        tracing::debug!(regions = options.regions.len(), "hotspot regions loaded");
    }
    let extractor = MetricExtractor::new(options.regions.clone(), &options.hotspot_name_prefix);
    let range_tag = format!("{}_{}", cfg.run_lower, cfg.run_upper);

    let lines = match &options.mode {
        Mode::Trend(spec) => {
            let job = TrendJob {
                name: &options.name,
                algorithm: &cfg.algorithm,
                spec,
                extractor: &extractor,
                publisher,
            };
            let outcome = run_trend(&walker, cfg.runs().collect(), &job).await?;
            let renderer = TrendRenderer {
                title: options.name.clone(),
                y_axis_title: options.y_axis_title.clone(),
                y_range: options.y_range,
            };
            plot_trend(
                &outcome.series,
                &renderer,
                &cfg.figures_subdir(&cfg.report_type),
                &format!("{}_{range_tag}", options.name),
            )?;
            crate::text_summary::build_text_summary(&options.name, &outcome).lines
        }
        Mode::Batch(batch) => {
            let job = BatchJob {
                name: &options.name,
                batch,
                extractor: &extractor,
                publisher,
            };
            let outcome = run_batch(&walker, cfg.runs().collect(), &job).await;
            let y_desc = if options.y_axis_title.is_empty() {
                "Value"
            } else {
                options.y_axis_title.as_str()
            };
            plot_batch(
                &outcome,
                &job,
                y_desc,
                &cfg.figures_subdir("publishing_all_sensors_verify"),
                &range_tag,
            )?;
            crate::text_summary::build_batch_summary(&options.name, &outcome).lines
        }
    };

    let mut out = std::io::stdout().lock();
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
