//! Fusion Oracle CLI
//!
//! Runs the built-in test catalog against one compute device, selected by
//! its flat ordinal.

use anyhow::Context;
use clap::Parser;
use fusion_oracle::backend::SimulatedDevice;
use fusion_oracle::buffer::Layout;
use fusion_oracle::catalog::build_suites;
use fusion_oracle::config::{OracleConfig, SuiteKind};
use fusion_oracle::device::DeviceSelector;
use fusion_oracle::numeric::NumericProfile;
use fusion_oracle::suite::{ConsoleReporter, Runner};
use fusion_oracle::{Error, VERSION};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fusion-oracle")]
#[command(author, version, about = "Differential-correctness oracle for fused linear-algebra kernels", long_about = None)]
struct Cli {
    /// Device ordinal, counted over every device of every platform
    #[arg(value_name = "DEVICE", required_unless_present = "list_devices")]
    device: Option<usize>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Numeric profile under test (single or double)
    #[arg(long)]
    profile: Option<NumericProfile>,

    /// Matrix layout to test (repeatable)
    #[arg(long, value_name = "LAYOUT")]
    layout: Vec<Layout>,

    /// Suite to run (repeatable)
    #[arg(long, value_name = "SUITE")]
    suite: Vec<SuiteKind>,

    /// Seed for random inputs
    #[arg(long)]
    seed: Option<u64>,

    /// Only run cases whose name matches this regex
    #[arg(short, long, value_name = "REGEX")]
    filter: Option<String>,

    /// Maximum accepted relative error
    #[arg(long, value_name = "EPSILON")]
    tolerance: Option<f64>,

    /// List devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            // --help / --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(Error::Usage(format!("{:?}", e.kind())).exit_code());
        }
    };

    setup_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(code)
        }
    }
}

fn setup_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<OracleConfig> {
    let mut config = match &cli.config {
        Some(path) => OracleConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => OracleConfig::default(),
    };
    if let Some(profile) = cli.profile {
        config.profile = profile;
    }
    if !cli.layout.is_empty() {
        config.layouts = cli.layout.clone();
    }
    if !cli.suite.is_empty() {
        config.suites = cli.suite.clone();
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if cli.filter.is_some() {
        config.filter = cli.filter.clone();
    }
    if cli.tolerance.is_some() {
        config.tolerance = cli.tolerance;
    }
    config.validate()?;
    Ok(config)
}

/// Returns whether every case passed.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli)?;
    let selector = DeviceSelector::new(&config.enumerator())?;

    if cli.list_devices {
        for (descriptor, platform, device) in selector.iter() {
            println!(
                "[{}] {} / {} ({})",
                descriptor.ordinal, platform, device.name, device.device_type
            );
        }
        return Ok(true);
    }

    let ordinal = cli
        .device
        .ok_or_else(|| Error::Usage("missing device ordinal".into()))?;
    let active = selector.activate(ordinal)?;

    println!("----------------------------------------------");
    println!("               Device Info");
    println!("----------------------------------------------");
    println!("{}", active.info.info());
    println!("Platform:             {}", active.platform);
    println!("Oracle Version:       {}", VERSION);

    let tolerance = config.tolerance_spec()?;
    let backend = SimulatedDevice::new(active, config.profile)?;
    let mut runner = Runner::new(backend, config.profile)
        .with_tolerance(tolerance)
        .with_filter(config.filter_regex()?);

    let suites = build_suites(&config);
    info!(suites = suites.len(), tolerance = %tolerance, "starting run");
    let report = runner.run(&suites, &mut ConsoleReporter::stdout())?;

    if let Some(failed) = report.first_failure() {
        eprintln!("Test failed at '{}': {}", failed.name, failed.outcome);
    }
    Ok(report.success())
}
