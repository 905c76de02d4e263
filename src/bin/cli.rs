//! caskkv CLI
//!
//! Command-line interface for operating a caskkv data directory.

use std::path::PathBuf;
use std::process;

use caskkv::recovery::Recovery;
use caskkv::{CaskError, Config, Engine, MergeOutcome, Value};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// caskkv CLI
#[derive(Parser, Debug)]
#[command(name = "caskkv")]
#[command(about = "Bitcask-style key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./caskkv_data")]
    data_dir: PathBuf,

    /// Segment file prefix
    #[arg(short, long, default_value = "caskkv")]
    base_name: String,

    /// Segment size in MB before rotation
    #[arg(short, long, default_value = "100")]
    segment_mb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// How to interpret the value
        #[arg(short, long, value_enum, default_value_t = Kind::Str)]
        kind: Kind,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Compact segments now
    Merge,

    /// Print store statistics
    Stats,

    /// Check every segment for damaged entries
    Verify,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Int,
    Float,
    Bool,
    Str,
    Bytes,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,caskkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> caskkv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .base_name(&args.base_name)
        .max_segment_size(args.segment_mb * 1024 * 1024)
        .build();

    // Verification must work on stores that recovery would reject, and
    // must not create a store where there is none
    if let Commands::Verify = args.command {
        return verify(&config);
    }

    let engine = Engine::open(config)?;

    match args.command {
        Commands::Get { key } => match engine.get(key) {
            Ok(value) => println!("{}", value),
            Err(CaskError::KeyNotFound) => println!("(nil)"),
            Err(e) => return Err(e),
        },
        Commands::Put { key, value, kind } => {
            engine.put(key, parse_value(&value, kind)?)?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.delete(key)?;
            println!("OK");
        }
        Commands::Merge => {
            let stats = engine.try_merge()?;
            match stats.outcome {
                MergeOutcome::Completed => println!(
                    "merged {} segments into {}, rewrote {} entries, reclaimed {} bytes",
                    stats.segments_merged,
                    stats.segments_written,
                    stats.entries_rewritten,
                    stats.bytes_reclaimed()
                ),
                MergeOutcome::Skipped(reason) => println!("skipped: {:?}", reason),
            }
        }
        Commands::Stats => {
            let stats = engine.stats();
            println!("live keys:      {}", stats.live_keys);
            println!("segments:       {}", stats.segment_count);
            println!("active segment: {}", stats.active_segment_id);
            println!("disk usage:     {} bytes", stats.disk_usage);
        }
        Commands::Verify => unreachable!("handled before the engine is opened"),
    }

    engine.close()
}

fn verify(config: &Config) -> caskkv::Result<()> {
    let reports = Recovery::verify_dir(&config.data_dir, &config.base_name)?;
    if reports.is_empty() {
        println!("no segments in {}", config.data_dir.display());
    }

    let mut damaged = 0;
    for report in reports {
        match &report.error {
            None => println!(
                "segment {:>6}: ok, {} entries ({} tombstones), {} bytes",
                report.segment_id, report.entries, report.tombstones, report.file_bytes
            ),
            Some(err) => {
                damaged += 1;
                println!(
                    "segment {:>6}: DAMAGED after {} entries ({} of {} bytes valid): {}",
                    report.segment_id, report.entries, report.valid_bytes, report.file_bytes, err
                );
            }
        }
    }

    if damaged > 0 {
        return Err(CaskError::CorruptEntry(format!("{} damaged segment(s)", damaged)));
    }
    Ok(())
}

fn parse_value(raw: &str, kind: Kind) -> caskkv::Result<Value> {
    let invalid = |e: String| CaskError::InvalidValue(format!("{:?} as {:?}: {}", raw, kind, e));
    let value = match kind {
        Kind::Int => Value::Int(raw.parse().map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?),
        Kind::Float => Value::Float(raw.parse().map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?),
        Kind::Bool => Value::Bool(raw.parse().map_err(|e: std::str::ParseBoolError| invalid(e.to_string()))?),
        Kind::Str => Value::from(raw),
        Kind::Bytes => Value::from(raw.as_bytes()),
    };
    Ok(value)
}
