use std::env;
use std::fs;
use std::path::PathBuf;

use hwlicense::config::LicensingConfig;
use serial_test::serial;

const ENV_VARS: [&str; 5] = [
    "HWLICENSE_LICENSE_PATH",
    "HWLICENSE_SECRET_PATH",
    "HWLICENSE_PROBE_TIMEOUT_MS",
    "HWLICENSE_LOG_LEVEL",
    "HWLICENSE_DEFAULT_VALIDITY_DAYS",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn defaults_apply_without_file_or_env() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let stem = dir.path().join("absent");

    let config = LicensingConfig::load_from(stem.to_str().unwrap()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.license.path, PathBuf::from("license.dat"));
    assert_eq!(config.license.default_validity_days, 365);
    assert_eq!(config.secret.path, PathBuf::from("license_secret.key"));
    assert_eq!(config.hardware.probe_timeout_ms, 5_000);
    assert_eq!(config.logging.level, "info");
}

#[test]
#[serial]
fn file_values_override_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("hwlicense.toml"),
        r#"
[license]
path = "/opt/app/license.dat"
default_validity_days = 90
default_features = ["base"]

[hardware]
probe_timeout_ms = 1500
"#,
    )
    .unwrap();

    let stem = dir.path().join("hwlicense");
    let config = LicensingConfig::load_from(stem.to_str().unwrap()).unwrap();

    assert_eq!(config.license.path, PathBuf::from("/opt/app/license.dat"));
    assert_eq!(config.license.default_validity_days, 90);
    assert_eq!(config.license.default_features, vec!["base"]);
    assert_eq!(config.hardware.probe_timeout_ms, 1500);
    assert_eq!(config.secret.path, PathBuf::from("license_secret.key"));
}

#[test]
#[serial]
fn env_overrides_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("hwlicense.toml"),
        "[license]\ndefault_validity_days = 90\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();

    env::set_var("HWLICENSE_DEFAULT_VALIDITY_DAYS", "10");
    env::set_var("HWLICENSE_SECRET_PATH", "/etc/app/secret.key");
    env::set_var("HWLICENSE_PROBE_TIMEOUT_MS", "250");
    env::set_var("HWLICENSE_LOG_LEVEL", "debug");

    let stem = dir.path().join("hwlicense");
    let config = LicensingConfig::load_from(stem.to_str().unwrap()).unwrap();
    clear_env();

    assert_eq!(config.license.default_validity_days, 10);
    assert_eq!(config.secret.path, PathBuf::from("/etc/app/secret.key"));
    assert_eq!(config.hardware.probe_timeout_ms, 250);
    assert_eq!(config.logging.level, "debug");
    config.validate().unwrap();
}

#[test]
#[serial]
fn invalid_values_fail_validation() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    env::set_var("HWLICENSE_PROBE_TIMEOUT_MS", "0");

    let stem = dir.path().join("absent");
    let config = LicensingConfig::load_from(stem.to_str().unwrap()).unwrap();
    clear_env();

    assert!(config.validate().is_err());
}
