//! Issues a sealed license bound to one machine's fingerprint.
//!
//! Usage:
//!   hwlicense_issue --fingerprint hardware_fingerprint.json --days 365 \
//!       --name "Example Ltd" --email ops@example.com
//!
//! Without `--key`, the shared secret is read from `--secret-file`, or
//! generated and written there on the first run. Keep that file private:
//! anyone holding it can mint licenses.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hwlicense::config::{get_config, LicensingConfig};
use hwlicense::errors::LicenseResult;
use hwlicense::events::tracing_observer;
use hwlicense::hardware::{FingerprintId, FingerprintReport};
use hwlicense::issuer::{resolve_secret, LicenseIssuer};
use hwlicense::license::{Subject, TIMESTAMP_FORMAT};

#[derive(Parser, Debug)]
#[command(name = "hwlicense_issue")]
#[command(about = "Issue a hardware-bound license")]
struct Args {
    /// Fingerprint report produced by hwlicense_fingerprint
    #[arg(short, long, default_value = "hardware_fingerprint.json")]
    fingerprint: PathBuf,

    /// Hardware id to bind to, instead of reading a report
    #[arg(long)]
    hardware_id: Option<String>,

    /// Sealed license output path [default: license.path from config]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Validity in days [default: license.default_validity_days from config]
    #[arg(short, long)]
    days: Option<u32>,

    /// Licensee name
    #[arg(short, long)]
    name: Option<String>,

    /// Licensee email
    #[arg(short, long)]
    email: Option<String>,

    /// Shared secret to sign and seal with
    #[arg(short, long)]
    key: Option<String>,

    /// Granted feature; repeat for several [default: license.default_features from config]
    #[arg(long = "feature")]
    features: Vec<String>,

    /// Shared secret file, read or created when --key is absent
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

    match run(args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("License issuance failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args, config: &LicensingConfig) -> LicenseResult<()> {
    let observer = tracing_observer();

    let hardware_id = match args.hardware_id {
        Some(id) => FingerprintId::new(id)?,
        None => FingerprintReport::load_id(&args.fingerprint)?,
    };

    let secret_file = args.secret_file.unwrap_or_else(|| config.secret.path.clone());
    let generated = args.key.is_none() && !secret_file.exists();
    let secret = resolve_secret(args.key.as_deref(), &secret_file, &observer)?;
    if generated {
        println!("Generated a new shared secret in {}", secret_file.display());
        println!("Distribute it to validators over a trusted channel and keep it private.");
    }

    let features = if args.features.is_empty() {
        config.license.default_features.clone()
    } else {
        args.features
    };
    let days = args.days.unwrap_or(config.license.default_validity_days);
    let output = args.output.unwrap_or_else(|| config.license.path.clone());

    let issuer = LicenseIssuer::new(secret, observer);
    let record = issuer.create_license(
        Some(hardware_id.as_str()),
        days,
        Subject::new(args.name, args.email),
        Some(features),
    )?;
    let companion = issuer.seal_and_persist(&record, &output)?;

    println!("License written to {}", output.display());
    println!("Summary written to {}", companion.display());
    println!("  Hardware ID: {}", record.hardware_id);
    println!("  Issued:      {}", record.issue_date.format(TIMESTAMP_FORMAT));
    println!("  Expires:     {}", record.expiry_date.format(TIMESTAMP_FORMAT));
    println!("  Features:    {}", record.allowed_features.join(", "));
    Ok(())
}
