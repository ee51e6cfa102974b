use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use cycle_slip::io::{observations_to_series, read_csv_series, read_observations};
use cycle_slip::report::{describe_jump, Reporter};
use cycle_slip::{
    detect_and_repair, DetectorConfig, DifferenceDetector, FitErrorPolicy, JumpRecord, PhaseSeries,
    WindowedFitter,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect and repair cycle slips in carrier-phase observations",
    long_about = None,
    after_help = "Examples:\n  cycle-slip fit obs.txt --threshold 4\n  cycle-slip diff obs.txt --threshold 2.8 --order-threshold 4=6 --output res_delta\n  cycle-slip repair obs.txt --threshold 2.8 --output res_poly\n  RUST_LOG=debug cycle-slip fit data.csv --csv --time-column t --phase-column L1\n"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flag samples that a sliding polynomial fit fails to predict
    Fit(CommonArgs),
    /// Flag samples whose 2nd..kth order differences exceed the threshold
    Diff(CommonArgs),
    /// Run the polynomial fit and replace flagged samples with their predictions
    Repair(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Observation file: header line, then week, seconds of week, pseudorange, carrier phase
    input: PathBuf,

    /// Treat the input as CSV with named time and phase columns
    #[arg(long, default_value_t = false)]
    csv: bool,

    #[arg(long, default_value = "time")]
    time_column: String,

    #[arg(long, default_value = "phase")]
    phase_column: String,

    /// Use seconds since the GPS epoch instead of seconds of week
    #[arg(long, default_value_t = false)]
    continuous_time: bool,

    /// JSON detector configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Samples per local fit
    #[arg(short, long)]
    window: Option<usize>,

    /// Degree of the local polynomial
    #[arg(short, long)]
    degree: Option<usize>,

    /// Discrepancy that flags a cycle slip
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Highest difference order
    #[arg(long)]
    max_order: Option<usize>,

    /// Sigma at or above which a window's fit is not trusted
    #[arg(long, conflicts_with = "no_gate")]
    acceptance_bound: Option<f64>,

    /// Predict from every window regardless of its sigma
    #[arg(long, default_value_t = false)]
    no_gate: bool,

    /// Per-order difference threshold, e.g. 4=6.5 (repeatable)
    #[arg(long = "order-threshold", value_parser = parse_order_threshold)]
    order_thresholds: Vec<(usize, f64)>,

    /// Report each index once across difference orders
    #[arg(long, default_value_t = false)]
    dedup: bool,

    /// Skip windows that cannot be fitted instead of aborting
    #[arg(long, default_value_t = false)]
    skip_failed_windows: bool,

    /// Directory for jumps.txt, jumps.csv, series.csv and differences.csv
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_order_threshold(s: &str) -> std::result::Result<(usize, f64), String> {
    let (order, threshold) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ORDER=THRESHOLD, got '{}'", s))?;
    let order = order
        .trim()
        .parse()
        .map_err(|e| format!("invalid order '{}': {}", order, e))?;
    let threshold = threshold
        .trim()
        .parse()
        .map_err(|e| format!("invalid threshold '{}': {}", threshold, e))?;
    Ok((order, threshold))
}

/// Merges the JSON config and flags; each detector checks the fields it reads.
fn load_config(args: &CommonArgs) -> Result<DetectorConfig> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path)
            .map_err(|e| anyhow!("reading config {}: {}", path.display(), e))?,
        None => DetectorConfig::default(),
    };

    if let Some(window) = args.window {
        config = config.with_window_size(window);
    }
    if let Some(degree) = args.degree {
        config = config.with_degree(degree);
    }
    if let Some(threshold) = args.threshold {
        config = config.with_threshold(threshold);
    }
    if let Some(max_order) = args.max_order {
        config = config.with_max_order(max_order);
    }
    if args.no_gate {
        config = config.with_acceptance_bound(None);
    } else if let Some(bound) = args.acceptance_bound {
        config = config.with_acceptance_bound(Some(bound));
    }
    for &(order, threshold) in &args.order_thresholds {
        config = config.with_order_threshold(order, threshold);
    }
    if args.dedup {
        config = config.with_deduplicate(true);
    }
    if args.skip_failed_windows {
        config = config.with_fit_error_policy(FitErrorPolicy::Skip);
    }

    Ok(config)
}

fn load_series(args: &CommonArgs) -> Result<PhaseSeries> {
    let series = if args.csv {
        read_csv_series(&args.input, &args.time_column, &args.phase_column)
            .map_err(|e| anyhow!("reading {}: {}", args.input.display(), e))?
    } else {
        let observations = read_observations(&args.input)
            .map_err(|e| anyhow!("reading {}: {}", args.input.display(), e))?;
        observations_to_series(&observations, args.continuous_time)?
    };
    info!("read {} samples from {}", series.len(), args.input.display());
    Ok(series)
}

fn reporter(args: &CommonArgs) -> Result<Option<Reporter>> {
    args.output
        .as_ref()
        .map(|dir| {
            Reporter::create(dir)
                .with_context(|| format!("creating output directory {}", dir.display()))
        })
        .transpose()
}

fn log_jumps(jumps: &[JumpRecord]) {
    if jumps.is_empty() {
        info!("no cycle slips detected");
        return;
    }
    for jump in jumps {
        info!("{}", describe_jump(jump));
    }
    info!("{} cycle slip(s) detected", jumps.len());
}

fn run_fit(args: &CommonArgs) -> Result<()> {
    let config = load_config(args)?;
    let series = load_series(args)?;

    let mut fitter = WindowedFitter::with_config(config)?;
    let pass = fitter.run(&series)?;
    info!(
        "{} windows: {} predicted, {} skipped, {} failed",
        pass.outcomes.len(),
        pass.predicted_count(),
        pass.skipped_count(),
        pass.failed_count()
    );
    log_jumps(&pass.jumps);

    if let Some(reporter) = reporter(args)? {
        reporter
            .write_jumps(&pass.jumps)
            .map_err(|e| anyhow!("writing jump report: {}", e))?;
        reporter
            .write_series(&series, None)
            .map_err(|e| anyhow!("writing series: {}", e))?;
        info!("reports written to {}", reporter.dir().display());
    }
    Ok(())
}

fn run_diff(args: &CommonArgs) -> Result<()> {
    let config = load_config(args)?;
    let series = load_series(args)?;

    let pass = DifferenceDetector::with_config(config)?.run(&series)?;
    log_jumps(&pass.jumps);

    if let Some(reporter) = reporter(args)? {
        reporter
            .write_jumps(&pass.jumps)
            .map_err(|e| anyhow!("writing jump report: {}", e))?;
        reporter
            .write_series(&series, None)
            .map_err(|e| anyhow!("writing series: {}", e))?;
        reporter
            .write_differences(&series, &pass.series)
            .map_err(|e| anyhow!("writing differences: {}", e))?;
        info!("reports written to {}", reporter.dir().display());
    }
    Ok(())
}

fn run_repair(args: &CommonArgs) -> Result<()> {
    let config = load_config(args)?;
    let series = load_series(args)?;

    let outcome = detect_and_repair(&series, &config)?;
    log_jumps(&outcome.jumps);
    info!("{} sample(s) repaired", outcome.jumps.len());

    if let Some(reporter) = reporter(args)? {
        reporter
            .write_jumps(&outcome.jumps)
            .map_err(|e| anyhow!("writing jump report: {}", e))?;
        reporter
            .write_series(&series, Some(&outcome.repaired))
            .map_err(|e| anyhow!("writing series: {}", e))?;
        info!("reports written to {}", reporter.dir().display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Fit(args) => run_fit(args),
        Command::Diff(args) => run_diff(args),
        Command::Repair(args) => run_repair(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_threshold() {
        assert_eq!(parse_order_threshold("4=6.5"), Ok((4, 6.5)));
        assert_eq!(parse_order_threshold(" 3 = 2 "), Ok((3, 2.0)));
        assert!(parse_order_threshold("4").is_err());
        assert!(parse_order_threshold("x=1").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "cycle-slip",
            "diff",
            "obs.txt",
            "--threshold",
            "2.8",
            "--order-threshold",
            "4=6",
            "--dedup",
        ]);
        let Command::Diff(args) = cli.command else {
            panic!("expected diff subcommand");
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.threshold, 2.8);
        assert_eq!(config.threshold_for_order(4), 6.0);
        assert!(config.deduplicate);
        assert_eq!(config.window_size, 6);
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let cli = Cli::parse_from(["cycle-slip", "fit", "obs.txt", "--window", "4"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit subcommand");
        };
        let config = load_config(&args).unwrap();
        assert!(WindowedFitter::with_config(config).is_err());
    }

    #[test]
    fn test_diff_accepts_unused_fit_flags() {
        let cli = Cli::parse_from(["cycle-slip", "diff", "obs.txt", "--window", "4"]);
        let Command::Diff(args) = cli.command else {
            panic!("expected diff subcommand");
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.window_size, 4);
        assert!(DifferenceDetector::with_config(config).is_ok());
    }
}
