//! License issuance: create, sign, seal and write a license for one machine.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::encryption::seal_with_secret;
use crate::errors::{LicenseError, LicenseResult};
use crate::events::{LicenseEvent, Observer};
use crate::hardware::FingerprintId;
use crate::license::{compute_signature, LicenseRecord, Subject, DEFAULT_FEATURES};
use crate::secret::SharedSecret;

/// Suffix appended to the license file stem for the readable summary.
pub const COMPANION_SUFFIX: &str = "_info.txt";

/// Mints sealed licenses under one shared secret.
pub struct LicenseIssuer {
    secret: SharedSecret,
    observer: Observer,
}

impl LicenseIssuer {
    pub fn new(secret: SharedSecret, observer: Observer) -> Self {
        Self { secret, observer }
    }

    /// Create and sign a record for `fingerprint_id`, issued now.
    ///
    /// `features` defaults to [`DEFAULT_FEATURES`]. An absent or blank id is
    /// [`LicenseError::MissingHardwareId`].
    pub fn create_license(
        &self,
        fingerprint_id: Option<&str>,
        validity_days: u32,
        subject: Option<Subject>,
        features: Option<Vec<String>>,
    ) -> LicenseResult<LicenseRecord> {
        self.create_license_at(Utc::now(), fingerprint_id, validity_days, subject, features)
    }

    /// [`Self::create_license`] with an explicit issue time.
    pub fn create_license_at(
        &self,
        issued_at: DateTime<Utc>,
        fingerprint_id: Option<&str>,
        validity_days: u32,
        subject: Option<Subject>,
        features: Option<Vec<String>>,
    ) -> LicenseResult<LicenseRecord> {
        let hardware_id = FingerprintId::new(fingerprint_id.unwrap_or_default())?;
        let features = features
            .unwrap_or_else(|| DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect());

        let mut record =
            LicenseRecord::unsigned(hardware_id, issued_at, validity_days, features, subject)?;
        record.signature = Some(self.sign(&record)?);

        self.observer.on_event(
            LicenseEvent::Issued,
            record.hardware_id.as_str(),
            Some(&format!("valid for {validity_days} days")),
        );
        Ok(record)
    }

    /// HMAC-SHA256 over the record without its signature.
    pub fn sign(&self, record: &LicenseRecord) -> LicenseResult<String> {
        compute_signature(record, &self.secret)
    }

    /// Seal `record` under this issuer's secret and write it to `path`.
    /// Returns the path of the companion summary.
    pub fn seal_and_persist(
        &self,
        record: &LicenseRecord,
        path: impl AsRef<Path>,
    ) -> LicenseResult<PathBuf> {
        let companion = seal_and_persist(record, &self.secret, path.as_ref())?;
        self.observer.on_event(
            LicenseEvent::Sealed,
            &path.as_ref().display().to_string(),
            Some(record.hardware_id.as_str()),
        );
        Ok(companion)
    }
}

/// Seal the canonical JSON of a signed `record` with a fresh salt, write
/// `salt || token` to `path`, and write the redacted summary next to it.
///
/// The summary is for operators only; validators never read it.
pub fn seal_and_persist(
    record: &LicenseRecord,
    secret: &SharedSecret,
    path: &Path,
) -> LicenseResult<PathBuf> {
    if record.signature.is_none() {
        return Err(LicenseError::SerializationError(
            "refusing to seal an unsigned license record".to_string(),
        ));
    }

    let json = record.to_canonical_json()?;
    let sealed = seal_with_secret(json.as_bytes(), secret.expose())?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, sealed)?;

    let companion = companion_path(path);
    fs::write(&companion, record.summary_text())?;

    info!(
        license = %path.display(),
        summary = %companion.display(),
        "License written"
    );
    Ok(companion)
}

/// `<dir>/<stem>_info.txt` for a license at `<dir>/<stem>.<ext>`.
pub fn companion_path(license_path: &Path) -> PathBuf {
    let stem = license_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "license".to_string());
    license_path.with_file_name(format!("{stem}{COMPANION_SUFFIX}"))
}

/// Pick the signing secret for an issuance run.
///
/// An explicit secret wins. Otherwise `secret_file` is read if it exists;
/// if it does not, a new secret is generated and written there so later
/// runs sign with the same key. Whoever can read that file can mint
/// licenses.
pub fn resolve_secret(
    explicit: Option<&str>,
    secret_file: &Path,
    observer: &Observer,
) -> LicenseResult<SharedSecret> {
    if let Some(secret) = explicit {
        return SharedSecret::new(secret);
    }
    if secret_file.exists() {
        return SharedSecret::from_file(secret_file);
    }

    let secret = SharedSecret::generate()?;
    secret.persist(secret_file)?;
    observer.on_event(
        LicenseEvent::SecretGenerated,
        &secret_file.display().to_string(),
        None,
    );
    Ok(secret)
}
