use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use movies_metadata::catalog::CsfdClient;
use movies_metadata::logging::{init_logging, LogConfig, LogFormat};
use movies_metadata::models::Stats;
use movies_metadata::normalize::{parse_stopwords, StopWords};
use movies_metadata::progress::{
    create_record_progress, format_duration, is_log_only, log_progress, set_log_only,
};
use movies_metadata::reconcile::{ReconcileConfig, Reconciler, RunEnd};
use movies_metadata::safety::{validate_output_path, FinishOutcome, PendingOutput};
use movies_metadata::settings::{
    default_columns, default_skipping_columns, parse_columns, unknown_columns,
    CSFD_MAX_REQUESTS_PER_MINUTE, DEFAULT_STOPWORDS,
};
use movies_metadata::throttle::RateLimiter;

#[derive(Parser)]
#[command(name = "movies-metadata")]
#[command(about = "Enrich a CSV list of movies with metadata from the ČSFD catalog")]
struct Args {
    /// Input CSV file (stdin when omitted)
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Comma-separated input and output columns; repeat a column to get its second value.
    /// Known columns: filename (alias raw_query), query, title, year, genre, country,
    /// director, actor, match. Others are carried through unchanged
    #[arg(short = 'c', long = "columns")]
    columns: Option<String>,

    /// Comma-separated columns which, when all filled, skip the catalog search
    #[arg(short = 'x', long = "skip-columns")]
    skip_columns: Option<String>,

    /// Extra stop words, one per line
    #[arg(short = 's', long = "stopwords")]
    stopwords: Option<PathBuf>,

    /// Overwrite an existing output: -f keeps a backup, -ff replaces it
    #[arg(short = 'f', long = "force", action = ArgAction::Count)]
    force: u8,

    /// The first input row is a header
    #[arg(long)]
    input_header: bool,

    #[arg(long, default_value_t = CSFD_MAX_REQUESTS_PER_MINUTE,
          value_parser = clap::value_parser!(u32).range(1..))]
    requests_per_minute: u32,

    /// Also write the run statistics as JSON
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// Hide progress bars and print periodic progress lines instead
    #[arg(long)]
    log_only: bool,

    /// -v debug, -vv trace
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    output: PathBuf,
}

const PROGRESS_LOG_INTERVAL: u64 = 100;

fn load_stopwords(path: Option<&Path>) -> Result<StopWords> {
    let mut stopwords = parse_stopwords(DEFAULT_STOPWORDS);
    if let Some(path) = path {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read stop words from {}", path.display()))?;
        stopwords.extend(parse_stopwords(&text));
    }
    Ok(stopwords)
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

fn csv_reader<R: Read>(input: R, has_headers: bool) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(input)
}

/// Number of data rows in an input file, for sizing the progress bar.
fn count_records(path: &Path, has_headers: bool) -> Result<u64> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input {}", path.display()))?;
    let mut reader = csv_reader(BufReader::new(file), has_headers);
    let mut row = csv::ByteRecord::new();
    let mut count = 0;
    while reader.read_byte_record(&mut row)? {
        count += 1;
    }
    Ok(count)
}

fn print_report(stats: &Stats, interrupted: bool, elapsed: std::time::Duration) {
    println!("\n{:=<60}", "");
    if interrupted {
        println!("Reconciliation interrupted!");
    } else {
        println!("Reconciliation complete!");
    }
    print!("{}", stats);
    println!("  Elapsed: {}", format_duration(elapsed));
    println!("{:=<60}", "");
}

fn main() -> Result<()> {
    let args = Args::parse();

    set_log_only(args.log_only);
    let log_config = LogConfig::from_verbosity(args.verbose)
        .with_format(args.log_format)
        .with_ansi(!is_log_only());
    init_logging(&log_config)?;

    validate_output_path(&args.output, args.input.as_deref(), args.force)?;

    let columns = match &args.columns {
        Some(value) => parse_columns(value),
        None => default_columns(),
    };
    anyhow::ensure!(!columns.is_empty(), "No columns declared");
    let unknown = unknown_columns(&columns);
    if !unknown.is_empty() {
        warn!(columns = %unknown.join(","), "unknown columns are carried through unchanged");
    }
    let skipping_columns = match &args.skip_columns {
        Some(value) => parse_columns(value),
        None => default_skipping_columns(),
    };
    let stopwords = load_stopwords(args.stopwords.as_deref())?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("Failed to install Ctrl-C handler")?;
    }

    let start = Instant::now();

    let total = match &args.input {
        Some(path) => Some(count_records(path, args.input_header)?),
        None => None,
    };
    info!(
        input = %args.input.as_deref().map_or("<stdin>".into(), |p| p.display().to_string()),
        output = %args.output.display(),
        records = ?total,
        columns = %columns.join(","),
        "starting reconciliation"
    );

    let mut reader = csv_reader(open_input(args.input.as_deref())?, args.input_header);
    let pending = PendingOutput::create(&args.output, args.force)?;
    let mut writer = csv::Writer::from_writer(pending);
    writer
        .write_record(&columns)
        .context("Failed to write output header")?;

    let config = ReconcileConfig {
        columns,
        skipping_columns,
        stopwords,
    };
    let catalog = CsfdClient::new().context("Failed to create catalog client")?;
    let mut reconciler = Reconciler::new(
        catalog,
        RateLimiter::per_minute(args.requests_per_minute),
        config,
    );

    let pb = create_record_progress(total, "Reconciling");
    let mut processed = 0u64;
    let result = reconciler.process_csv(&mut reader, &mut writer, &interrupted, |_| {
        processed += 1;
        pb.inc(1);
        log_progress("reconcile", processed, total, PROGRESS_LOG_INTERVAL);
    });
    pb.finish_and_clear();

    let stats = reconciler.into_stats();
    let run_end = match result {
        Ok(run_end) => run_end,
        Err(e) => {
            // the staged output is dropped with the writer
            drop(writer);
            print_report(&stats, true, start.elapsed());
            return Err(e);
        }
    };

    let pending = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush output")?;
    match pending.finish(stats.write)? {
        FinishOutcome::Untouched => {
            println!("No rows written, {} left untouched", args.output.display())
        }
        FinishOutcome::Written => println!("Output written: {}", args.output.display()),
        FinishOutcome::WrittenWithBackup(backup) => println!(
            "Output written: {} (previous output kept as {})",
            args.output.display(),
            backup.display()
        ),
    }

    print_report(&stats, run_end == RunEnd::Interrupted, start.elapsed());

    if let Some(path) = &args.stats_json {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    Ok(())
}
