//! License validation.
//!
//! [`LicenseValidator::validate`] walks a linear chain of checks and stops
//! at the first failure:
//!
//! ```text
//! Start -> Loaded -> SignatureOk -> HardwareOk -> NotExpired -> Valid
//!   \________\___________\____________\____________> Invalid(reason)
//! ```
//!
//! Every failure is folded into one coarse [`ValidationReason`]; the caller
//! never learns whether a load failed because of a wrong key or corrupt
//! bytes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::LicensingConfig;
use crate::encryption::unseal_with_secret;
use crate::errors::LicenseResult;
use crate::events::{LicenseEvent, Observer};
use crate::hardware::{Collector, FingerprintSource};
use crate::license::{verify_signature, LicenseInfo, LicenseRecord};
use crate::secret::{load_global_secret, SharedSecret};

/// Outcome of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationReason {
    Valid,
    /// Missing file, malformed bytes, failed decryption or invalid JSON.
    LoadFailure,
    SignatureFailure,
    HardwareMismatch,
    Expired,
}

impl ValidationReason {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationReason::Valid => "valid",
            ValidationReason::LoadFailure => "load_failure",
            ValidationReason::SignatureFailure => "signature_failure",
            ValidationReason::HardwareMismatch => "hardware_mismatch",
            ValidationReason::Expired => "expired",
        }
    }

    /// Message safe to show an end user.
    pub fn message(&self) -> &'static str {
        match self {
            ValidationReason::Valid => "License is valid.",
            ValidationReason::LoadFailure => "License file is missing or could not be read.",
            ValidationReason::SignatureFailure => "License integrity check failed.",
            ValidationReason::HardwareMismatch => "License is not valid for this machine.",
            ValidationReason::Expired => "License has expired.",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationReason::Valid)
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position in the validation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Start,
    Loaded,
    SignatureOk,
    HardwareOk,
    NotExpired,
    Valid,
    Invalid(ValidationReason),
}

impl ValidationStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ValidationStage::Valid | ValidationStage::Invalid(_))
    }

    fn reason(&self) -> Option<ValidationReason> {
        match self {
            ValidationStage::Valid => Some(ValidationReason::Valid),
            ValidationStage::Invalid(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Checks a sealed license file against the shared secret and the
/// current machine.
pub struct LicenseValidator {
    license_path: PathBuf,
    secret: SharedSecret,
    source: Box<dyn FingerprintSource>,
    observer: Observer,
    record: Option<LicenseRecord>,
    stage: ValidationStage,
}

impl LicenseValidator {
    pub fn new(
        license_path: impl Into<PathBuf>,
        secret: SharedSecret,
        source: Box<dyn FingerprintSource>,
        observer: Observer,
    ) -> Self {
        Self {
            license_path: license_path.into(),
            secret,
            source,
            observer,
            record: None,
            stage: ValidationStage::Start,
        }
    }

    /// Validator for this machine using the configured license path,
    /// secret file and probe timeout.
    ///
    /// A missing or empty secret file is an error; there is no fallback.
    pub fn from_config(config: &LicensingConfig, observer: Observer) -> LicenseResult<Self> {
        let collector = Collector::native(config.hardware.probe_timeout(), observer.clone());
        Self::from_config_with_collector(config, collector, observer)
    }

    /// Like [`Self::from_config`], with the hardware collector supplied by
    /// the caller.
    pub fn from_config_with_collector(
        config: &LicensingConfig,
        collector: Collector,
        observer: Observer,
    ) -> LicenseResult<Self> {
        let secret = load_global_secret(&config.secret.path)?.clone();
        Ok(Self::new(
            config.license.path.clone(),
            secret,
            Box::new(collector),
            observer,
        ))
    }

    pub fn license_path(&self) -> &Path {
        &self.license_path
    }

    /// Run the full check chain against the current time.
    pub fn validate(&mut self) -> (bool, ValidationReason) {
        self.validate_at(Utc::now())
    }

    /// Run the full check chain, treating `now` as the current time.
    pub fn validate_at(&mut self, now: DateTime<Utc>) -> (bool, ValidationReason) {
        self.record = None;
        let mut record = None;
        let mut stage = ValidationStage::Start;

        while !stage.is_terminal() {
            stage = self.step(stage, &mut record, now);
            debug!(stage = ?stage, "License validation step");
        }
        self.stage = stage;

        let reason = stage.reason().unwrap_or(ValidationReason::LoadFailure);
        if reason.is_valid() {
            if let Some(rec) = &record {
                self.observer
                    .on_event(LicenseEvent::Validated, rec.hardware_id.as_str(), None);
            }
            self.record = record;
        } else {
            self.observer.on_event(
                LicenseEvent::ValidationFailed,
                &self.license_path.display().to_string(),
                Some(reason.as_str()),
            );
        }

        (reason.is_valid(), reason)
    }

    fn step(
        &self,
        stage: ValidationStage,
        record: &mut Option<LicenseRecord>,
        now: DateTime<Utc>,
    ) -> ValidationStage {
        match stage {
            ValidationStage::Start => match self.load() {
                Ok(loaded) => {
                    *record = Some(loaded);
                    ValidationStage::Loaded
                }
                Err(e) => {
                    debug!(error = %e, "License could not be loaded");
                    ValidationStage::Invalid(ValidationReason::LoadFailure)
                }
            },
            ValidationStage::Loaded => {
                if record
                    .as_ref()
                    .is_some_and(|r| verify_signature(r, &self.secret))
                {
                    ValidationStage::SignatureOk
                } else {
                    ValidationStage::Invalid(ValidationReason::SignatureFailure)
                }
            }
            ValidationStage::SignatureOk => {
                let current = self.source.current_id();
                if record.as_ref().is_some_and(|r| r.hardware_id == current) {
                    ValidationStage::HardwareOk
                } else {
                    ValidationStage::Invalid(ValidationReason::HardwareMismatch)
                }
            }
            ValidationStage::HardwareOk => {
                if record.as_ref().is_some_and(|r| !r.is_expired_at(now)) {
                    ValidationStage::NotExpired
                } else {
                    ValidationStage::Invalid(ValidationReason::Expired)
                }
            }
            ValidationStage::NotExpired => ValidationStage::Valid,
            ValidationStage::Valid | ValidationStage::Invalid(_) => stage,
        }
    }

    fn load(&self) -> LicenseResult<LicenseRecord> {
        let sealed = fs::read(&self.license_path)?;
        let plaintext = unseal_with_secret(&sealed, self.secret.expose())?;
        let record: LicenseRecord = serde_json::from_slice(&plaintext)?;

        self.observer.on_event(
            LicenseEvent::Loaded,
            &self.license_path.display().to_string(),
            None,
        );
        Ok(record)
    }

    /// Where the last run stopped.
    pub fn stage(&self) -> ValidationStage {
        self.stage
    }

    /// Non-secret fields of the license from the last successful run.
    pub fn get_license_info(&self) -> Option<LicenseInfo> {
        self.record.as_ref().map(LicenseRecord::info)
    }

    /// `false` unless the last run was valid and granted `feature`.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.record.as_ref().is_some_and(|r| r.has_feature(feature))
    }
}
