//! Collects this machine's hardware profile and writes it, together with
//! its fingerprint id, to a JSON report for the license issuer.
//!
//! Usage:
//!   hwlicense_fingerprint --output hardware_fingerprint.json

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hwlicense::config::get_config;
use hwlicense::events::{tracing_observer, LicenseEvent};
use hwlicense::hardware::{Collector, FingerprintReport};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "hwlicense_fingerprint")]
#[command(about = "Collect the hardware fingerprint of this machine")]
struct Args {
    /// Where to write the fingerprint report
    #[arg(short, long, default_value = "hardware_fingerprint.json")]
    output: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match get_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(2);
        }
    };
    config.logging.init_subscriber();

    let observer = tracing_observer();
    let collector = Collector::native(config.hardware.probe_timeout(), observer.clone());
    let report = FingerprintReport::from_profile(collector.collect());
    observer.on_event(
        LicenseEvent::FingerprintCollected,
        report.unique_id.as_str(),
        None,
    );

    if let Err(e) = report.save(&args.output) {
        error!(error = %e, path = %args.output.display(), "Failed to write fingerprint report");
        eprintln!("Could not write {}: {e}", args.output.display());
        return ExitCode::FAILURE;
    }

    println!("Hardware fingerprint written to {}", args.output.display());
    println!();
    for line in report.profile.summary_lines() {
        println!("  {line}");
    }
    println!();
    println!("Unique hardware ID: {}", report.unique_id);
    println!("Send the report file to your license issuer.");

    ExitCode::SUCCESS
}
