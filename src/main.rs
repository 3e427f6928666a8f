use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use indicator_figures::config::{default_cache_dir, DEFAULT_END_YEAR, DEFAULT_PER_PAGE, DEFAULT_START_YEAR};
use indicator_figures::{BuilderConfig, CacheMode, Country, FigureBuilder, WorldBankClient};

// ----------------------- CLI -----------------------
#[derive(Parser, Debug)]
#[command(
    name = "indicator-figures",
    about = "Fetch World Bank energy indicators for a set of countries and print four chart-ready figures as JSON."
)]
struct Args {
    /// Country as NAME=ISO3 (repeatable, order is kept), e.g. --country "United States=USA".
    /// Defaults to the ten largest economies.
    #[arg(long = "country", value_name = "NAME=ISO3")]
    countries: Vec<String>,

    /// Indicator code (repeatable, at least four). Defaults to electricity use,
    /// renewable share, energy use per capita and greenhouse-gas totals.
    #[arg(long = "indicator", value_name = "CODE")]
    indicators: Vec<String>,

    /// First year requested from the API
    #[arg(long, default_value_t = DEFAULT_START_YEAR)]
    start: i32,

    /// Last year requested from the API
    #[arg(long, default_value_t = DEFAULT_END_YEAR)]
    end: i32,

    /// Observations per page
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,

    /// API base URL (without trailing /country)
    #[arg(long)]
    api_base: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Reuse responses from the disk cache
    #[arg(long, default_value_t = false)]
    cache: bool,

    /// Write JSON here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// Fail if any indicator could not be loaded
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Print debug info
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

// ----------------------- Main -----------------------
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let cfg = build_config(&args)?;
    let client = WorldBankClient::new(&cfg).context("Failed to build World Bank HTTP client")?;

    let report = FigureBuilder::new(client)
        .build(&cfg)
        .await
        .context("Invalid configuration")?;

    let figures = if args.strict {
        report.into_strict().context("Strict mode: an indicator failed")?
    } else {
        if let Some(summary) = report.failure_summary(cfg.indicators.len()) {
            warn!("{}", summary);
        }
        report.figures
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&figures)?
    } else {
        serde_json::to_string(&figures)?
    };

    match &args.output {
        Some(path) => {
            fs::write(path, json.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("wrote {} figures to {}", figures.len(), path.display());
        }
        None => {
            let mut out = io::stdout().lock();
            out.write_all(json.as_bytes())?;
            out.write_all(b"\n")?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_config(args: &Args) -> Result<BuilderConfig> {
    let mut cfg = BuilderConfig::default();

    if !args.countries.is_empty() {
        cfg.countries = args
            .countries
            .iter()
            .map(|s| Country::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
    }
    if !args.indicators.is_empty() {
        cfg.indicators = args.indicators.iter().map(|s| s.trim().to_string()).collect();
    }

    cfg.date_range.start = args.start;
    cfg.date_range.end = args.end;
    cfg.per_page = args.per_page;
    cfg.timeout = Duration::from_secs(args.timeout_secs);
    if let Some(base) = &args.api_base {
        cfg.api_base = base.trim().to_string();
    }
    if !cfg.api_base.starts_with("http://") && !cfg.api_base.starts_with("https://") {
        return Err(anyhow!("--api-base must start with http:// or https://, got '{}'", cfg.api_base));
    }

    if args.cache {
        let dir = default_cache_dir().ok_or_else(|| anyhow!("Could not locate a cache directory"))?;
        cfg.cache = CacheMode::Dir(dir);
    }

    Ok(cfg)
}
