//! ECG Sensor Agent CLI
//!
//! Drives the acquisition and analysis core at a fixed cadence.

use chrono::Local;
use clap::{Parser, Subcommand};
use ecg_sensor_agent::{
    config::{Config, LimitUnit},
    export, Monitor, ReaderEvent, TickStatus, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "ecg-sensor")]
#[command(version = VERSION)]
#[command(about = "Serial ECG monitor with HRV stress-index analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live stress-index readings from the device
    Monitor {
        /// Serial port of the ECG device (e.g. /dev/ttyACM0)
        port: String,

        /// Sliding-window limit (clamped to 10..=1200)
        #[arg(long)]
        cache_limit: Option<u32>,

        /// Limit unit: "seconds" or "rr"
        #[arg(long, default_value = "seconds")]
        unit: String,
    },

    /// Record a session and export the merged rows on stop
    Record {
        /// Serial port of the ECG device
        port: String,

        /// Output CSV file (default: timestamped file in the export dir)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Stop automatically after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Sliding-window limit (clamped to 10..=1200)
        #[arg(long)]
        cache_limit: Option<u32>,
    },

    /// Analyze a previously exported CSV file
    Analyze {
        /// Input file, minimal or extended variant
        input: PathBuf,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor {
            port,
            cache_limit,
            unit,
        } => {
            cmd_run(&port, cache_limit, &unit, false, None, None);
        }
        Commands::Record {
            port,
            output,
            duration,
            cache_limit,
        } => {
            cmd_run(&port, cache_limit, "seconds", true, duration, output);
        }
        Commands::Analyze { input } => {
            cmd_analyze(&input);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn parse_unit(unit: &str) -> LimitUnit {
    match unit {
        "rr" | "rr-intervals" => LimitUnit::RrIntervals,
        _ => LimitUnit::Seconds,
    }
}

fn cmd_run(
    port: &str,
    cache_limit: Option<u32>,
    unit: &str,
    record: bool,
    duration: Option<u64>,
    output: Option<PathBuf>,
) {
    println!("ECG Sensor Agent v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_default();
    if let Some(limit) = cache_limit {
        config.cache_limit = limit;
    }
    config.limit_unit = parse_unit(unit);
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let tick_interval = Duration::from_millis(config.tick_interval_ms);
    let export_dir = config.export_path.clone();
    let mut monitor = Monitor::new(config);

    if let Err(e) = monitor.connect(port) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    println!("Connected to {port}");

    if record {
        if let Err(e) = monitor.start_recording() {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        println!("Recording...");
    }
    println!("Press Ctrl+C to stop");
    println!();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        eprintln!("Warning: Could not install Ctrl+C handler: {e}");
    }

    let started = Instant::now();
    while running.load(Ordering::SeqCst) {
        thread::sleep(tick_interval);

        // Surface out-of-band worker events
        let mut disconnected = false;
        for event in monitor.reader().events().try_iter() {
            match event {
                ReaderEvent::RecordSkipped(e) => {
                    eprintln!("Warning: skipped malformed record ({e})");
                }
                ReaderEvent::Disconnected { reason } => {
                    eprintln!("Device disconnected: {reason}");
                    disconnected = true;
                }
                ReaderEvent::Connected { .. } => {}
            }
        }
        if disconnected {
            break;
        }

        let now = Local::now().format("%H:%M:%S");
        match monitor.tick() {
            TickStatus::Reading(reading) => {
                println!(
                    "[{now}] stress index {:.2} | latest RR {:.1} ms",
                    reading.stress_index, reading.latest_rr_ms
                );
            }
            TickStatus::Collecting { samples } => {
                println!("[{now}] collecting... ({samples} samples)");
            }
            TickStatus::Failed(e) => {
                eprintln!("[{now}] analysis failed: {e}");
            }
        }

        if let Some(secs) = duration {
            if started.elapsed() >= Duration::from_secs(secs) {
                break;
            }
        }
    }

    println!();
    if record {
        match monitor.finish_session() {
            Some(rows) => {
                let path =
                    output.unwrap_or_else(|| export::timestamped_path(&export_dir, "ecg-session"));
                match export::write_rows(&path, &rows) {
                    Ok(()) => println!("Exported {} rows to {}", rows.len(), path.display()),
                    Err(e) => eprintln!("Error writing export: {e}"),
                }
            }
            None => eprintln!("No recorded data to export"),
        }
    }

    let stats = monitor.reader().stats();
    println!(
        "Stopping: {} records parsed, {} skipped",
        stats.records_parsed, stats.records_skipped
    );
    monitor.disconnect();
}

fn cmd_analyze(input: &PathBuf) {
    let samples = match export::read_samples(input) {
        Ok(samples) => samples,
        Err(e) => {
            eprintln!("Error reading {}: {e}", input.display());
            std::process::exit(1);
        }
    };
    println!("{} samples from {}", samples.len(), input.display());

    let analyzer = ecg_sensor_agent::HrvAnalyzer::new(&samples, -1);
    println!("Detected peaks: {}", analyzer.peaks().len());

    match analyzer.stats() {
        Ok(stats) => {
            println!("Processed RR intervals: {}", stats.interval_count);
            println!("RR range: {:.3} s ({:.3} - {:.3})", stats.range, stats.min_rr, stats.max_rr);
            println!("Mo: {:.3} s, AMo: {:.3}", stats.mo, stats.amo);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    match analyzer.stress_index() {
        Ok(si) => println!("Stress index: {si:.2}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();
    println!("Configuration file: {:?}", Config::config_path());
    println!();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing config: {e}"),
    }
}
