//! Validates the sealed license on this machine and prints the verdict.
//!
//! Exit codes: 0 valid, 1 invalid, 2 configuration or secret error,
//! 105 tracer attached.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hwlicense::config::get_config;
use hwlicense::events::{tracing_observer, LicenseEvent};
use hwlicense::guard::{tracer_detected, TRACER_EXIT_CODE};
use hwlicense::validator::LicenseValidator;

#[derive(Parser, Debug)]
#[command(name = "hwlicense_validate")]
#[command(about = "Validate the license installed on this machine")]
struct Args {
    /// Sealed license file [default: license.path from config]
    #[arg(short, long)]
    license: Option<PathBuf>,

    /// Shared secret file [default: secret.path from config]
    #[arg(long)]
    secret_file: Option<PathBuf>,
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

    if tracer_detected() {
        observer.on_event(LicenseEvent::TracerDetected, "self", None);
        eprintln!("A debugger is attached; refusing to continue.");
        return ExitCode::from(TRACER_EXIT_CODE);
    }

    let mut settings = config.clone();
    if let Some(path) = args.license {
        settings.license.path = path;
    }
    if let Some(path) = args.secret_file {
        settings.secret.path = path;
    }

    let mut validator = match LicenseValidator::from_config(&settings, observer) {
        Ok(validator) => validator,
        Err(e) => {
            eprintln!("Cannot validate: {e}");
            return ExitCode::from(2);
        }
    };

    let (ok, reason) = validator.validate();
    if !ok {
        println!(
            "License status: INVALID ({reason}) for {}",
            validator.license_path().display()
        );
        println!("{}", reason.message());
        return ExitCode::FAILURE;
    }

    println!("License status: VALID");
    if let Some(info) = validator.get_license_info() {
        match serde_json::to_string_pretty(&info) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Could not render license info: {e}"),
        }
    }
    ExitCode::SUCCESS
}
