use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use ode_query::catalog::CatalogClient;
use ode_query::config::Config;
use ode_query::error::QueryError;
use ode_query::merge::{QueryEngine, QueryReport};
use ode_query::params::{parse_extra, validate_time, QueryFilters, QueryParams};
use ode_query::report;

#[derive(Parser)]
#[command(name = "ode-query")]
#[command(about = "Find calibrated, derived and geometry products in the ODE REST catalog")]
struct Cli {
    /// CONL configuration file (built-in configuration if omitted)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log file, default stderr
    #[arg(long, global = true, value_name = "FILE")]
    log: Option<PathBuf>,
    /// Output format for the results
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Also write one CSV row per file URL
    #[arg(long, global = true, value_name = "FILE")]
    csv: Option<PathBuf>,
    /// List observations with a single file too
    #[arg(long, global = true)]
    all: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Query calibrated and derived products of any target
    Query {
        /// PDS target name
        #[arg(long)]
        target: String,
        /// Instrument host ID
        #[arg(long)]
        ihid: String,
        /// Instrument ID
        #[arg(long)]
        iid: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Query images and their geometry for a configured target (e.g. mercury)
    Target {
        /// Target name as configured
        name: String,
        /// Instrument host ID
        #[arg(long)]
        ihid: String,
        /// Instrument key from the target's instrument table
        #[arg(long)]
        iid: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Show configured targets and their instruments
    Targets,
}

#[derive(Args)]
struct FilterArgs {
    /// Min of first coordinate (in degrees by default)
    #[arg(long = "c1min", value_name = "WESTERNLON", allow_negative_numbers = true)]
    westernlon: Option<f64>,
    /// Max of first coordinate (in degrees by default)
    #[arg(long = "c1max", value_name = "EASTERNLON", allow_negative_numbers = true)]
    easternlon: Option<f64>,
    /// Min of second coordinate (in degrees by default)
    #[arg(long = "c2min", value_name = "MINLAT", allow_negative_numbers = true)]
    minlat: Option<f64>,
    /// Max of second coordinate (in degrees by default)
    #[arg(long = "c2max", value_name = "MAXLAT", allow_negative_numbers = true)]
    maxlat: Option<f64>,
    /// Acquisition start time - format YYYY-MM-DDTHH:MM:SS.m
    #[arg(long = "time-min", alias = "Time_min", value_name = "MINOBTIME", value_parser = parse_time)]
    minobtime: Option<String>,
    /// Acquisition stop time - format YYYY-MM-DDTHH:MM:SS.m
    #[arg(long = "time-max", alias = "Time_max", value_name = "MAXOBTIME", value_parser = parse_time)]
    maxobtime: Option<String>,
    /// Min incidence angle (solar zenithal angle)
    #[arg(long = "incidence-min", alias = "Incidence_min", value_name = "MININANGLE")]
    mininangle: Option<f64>,
    /// Max incidence angle (solar zenithal angle)
    #[arg(long = "incidence-max", alias = "Incidence_max", value_name = "MAXINANGLE")]
    maxinangle: Option<f64>,
    /// Min emerge angle
    #[arg(long = "emerge-min", alias = "Emerge_min", value_name = "MINEMANGLE")]
    minemangle: Option<f64>,
    /// Max emerge angle
    #[arg(long = "emerge-max", alias = "Emerge_max", value_name = "MAXEMANGLE")]
    maxemangle: Option<f64>,
    /// Min phase angle
    #[arg(long = "phase-min", alias = "Phase_min", value_name = "MINPHANGLE")]
    minphangle: Option<f64>,
    /// Max phase angle
    #[arg(long = "phase-max", alias = "Phase_max", value_name = "MAXPHANGLE")]
    maxphangle: Option<f64>,
    /// Extra catalog parameter passed through as is (repeatable)
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    extra: Vec<(String, String)>,
}

impl FilterArgs {
    fn into_filters(self) -> QueryFilters {
        QueryFilters {
            westernlon: self.westernlon,
            easternlon: self.easternlon,
            minlat: self.minlat,
            maxlat: self.maxlat,
            minobtime: self.minobtime,
            maxobtime: self.maxobtime,
            mininangle: self.mininangle,
            maxinangle: self.maxinangle,
            minemangle: self.minemangle,
            maxemangle: self.maxemangle,
            minphangle: self.minphangle,
            maxphangle: self.maxphangle,
            extra: self.extra.into_iter().collect::<BTreeMap<_, _>>(),
        }
    }
}

fn parse_time(s: &str) -> Result<String, QueryError> {
    validate_time("acquisition time", Some(s))?;
    Ok(s.to_string())
}

fn parse_param(s: &str) -> Result<(String, String), QueryError> {
    parse_extra(s)
}

fn init_logging(log: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ode_query=info"));

    match log {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run_targets(config: &Config) -> Result<()> {
    if config.targets.is_empty() {
        println!("No targets configured");
        return Ok(());
    }
    for (name, target) in &config.targets {
        println!(
            "{} (images: pt={}, geometry: pt={}, hosts: {})",
            name,
            target.image_pt,
            target.geometry_pt,
            if target.ihid.is_empty() {
                "any".to_string()
            } else {
                target.ihid.join(", ")
            }
        );
        for (key, instrument) in &target.instruments {
            println!(
                "  {} -> iid={} file type {}",
                key, instrument.iid, instrument.img_type
            );
        }
    }
    Ok(())
}

fn print_report(outcome: &QueryReport, format: Format, csv: Option<&Path>, all: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        Format::Text => report::write_listing(&mut out, outcome, all)?,
        Format::Json => report::write_json(&mut out, outcome)?,
    }

    if let Some(path) = csv {
        let rows = report::write_csv(path, &outcome.results)?;
        tracing::info!(rows, path = %path.display(), "CSV written");
    }
    if !outcome.diagnostics.is_empty() {
        tracing::warn!(
            problems = outcome.diagnostics.len(),
            "some catalog queries failed or returned nothing, results may be partial"
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let Cli {
        config,
        log,
        format,
        csv,
        all,
        command,
    } = Cli::parse();

    init_logging(log.as_deref())?;
    let config = Config::load(config.as_deref())?;

    let report = match command {
        Commands::Query {
            target,
            ihid,
            iid,
            filters,
        } => {
            let params = QueryParams::new(target, ihid, iid, filters.into_filters())?;
            let client = CatalogClient::from_config(&config)?;
            QueryEngine::new(client, &config).associate_files(&params)
        }
        Commands::Target {
            name,
            ihid,
            iid,
            filters,
        } => {
            let params = QueryParams::new(name, ihid, iid, filters.into_filters())?;
            let client = CatalogClient::from_config(&config)?;
            QueryEngine::new(client, &config).combine_phased(&params)?
        }
        Commands::Targets => return run_targets(&config),
    };

    print_report(&report, format, csv.as_deref(), all)
}
