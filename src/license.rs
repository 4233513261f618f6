//! The entitlement record sealed into a license file.
//!
//! Wire format (canonical JSON, keys sorted):
//!
//! ```json
//! {"allowed_features": ["base", "premium", "export"],
//!  "expiry_date": "2027-10-15 09:30:00",
//!  "hardware_id": "<64 hex chars>",
//!  "issue_date": "2026-10-15 09:30:00",
//!  "signature": "<hmac-sha256 hex>",
//!  "user": {"email": "ops@example.com", "name": "Example Ltd"}}
//! ```
//!
//! The signature is an HMAC-SHA256 over the canonical JSON of the record
//! with the `signature` key removed.

use std::fmt::Write as _;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_json;
use crate::errors::{LicenseError, LicenseResult};
use crate::hardware::FingerprintId;
use crate::secret::SharedSecret;

/// Entitlements granted when the issuer is not given an explicit list.
pub const DEFAULT_FEATURES: [&str; 3] = ["base", "premium", "export"];

/// Shown in place of the signature in every human-readable rendering.
pub const SIGNATURE_PLACEHOLDER: &str = "[signature redacted]";

/// Timestamp layout used inside license records (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Optional licensee details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Subject {
    /// Blank values count as absent. Returns `None` when neither a name
    /// nor an email remains.
    pub fn new(name: Option<String>, email: Option<String>) -> Option<Self> {
        let name = name.filter(|n| !n.trim().is_empty());
        let email = email.filter(|e| !e.trim().is_empty());
        if name.is_none() && email.is_none() {
            None
        } else {
            Some(Self { name, email })
        }
    }
}

/// A signed (or about-to-be-signed) license record.
///
/// Records are built once by the issuer and never modified afterwards;
/// any change invalidates the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub hardware_id: FingerprintId,
    #[serde(with = "timestamp")]
    pub issue_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub expiry_date: DateTime<Utc>,
    pub allowed_features: Vec<String>,
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl LicenseRecord {
    /// Build an unsigned record valid for `validity_days` calendar days
    /// from `issued_at` (truncated to whole seconds).
    ///
    /// An expiry beyond the representable date range is a
    /// [`LicenseError::ConfigError`].
    pub fn unsigned(
        hardware_id: FingerprintId,
        issued_at: DateTime<Utc>,
        validity_days: u32,
        features: Vec<String>,
        subject: Option<Subject>,
    ) -> LicenseResult<Self> {
        let issue_date = issued_at.trunc_subsecs(0);
        let expiry_date = Duration::try_days(i64::from(validity_days))
            .and_then(|validity| issue_date.checked_add_signed(validity))
            .ok_or_else(|| {
                LicenseError::ConfigError(format!(
                    "validity of {validity_days} days is out of range"
                ))
            })?;

        Ok(Self {
            hardware_id,
            issue_date,
            expiry_date,
            allowed_features: dedup_preserving_order(features),
            subject,
            signature: None,
        })
    }

    /// Canonical JSON of every field except `signature`.
    pub fn signing_payload(&self) -> LicenseResult<String> {
        let unsigned = Self {
            signature: None,
            ..self.clone()
        };
        canonical_json(&unsigned)
    }

    /// Canonical JSON of the full record, signature included.
    pub fn to_canonical_json(&self) -> LicenseResult<String> {
        canonical_json(self)
    }

    /// Inclusive expiry: a license is still valid at exactly `expiry_date`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_date
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.allowed_features.iter().any(|f| f == feature)
    }

    /// The non-secret view of this record.
    pub fn info(&self) -> LicenseInfo {
        LicenseInfo {
            hardware_id: self.hardware_id.clone(),
            issue_date: self.issue_date,
            expiry_date: self.expiry_date,
            allowed_features: self.allowed_features.clone(),
            subject: self.subject.clone(),
        }
    }

    /// Operator-facing text listing every field, with the signature value
    /// replaced by [`SIGNATURE_PLACEHOLDER`].
    pub fn summary_text(&self) -> String {
        let mut out = String::from("License information (reference only, not a license):\n\n");
        let _ = writeln!(out, "hardware_id: {}", self.hardware_id);
        let _ = writeln!(out, "issue_date: {}", self.issue_date.format(TIMESTAMP_FORMAT));
        let _ = writeln!(out, "expiry_date: {}", self.expiry_date.format(TIMESTAMP_FORMAT));
        let _ = writeln!(out, "allowed_features: {}", self.allowed_features.join(", "));
        if let Some(subject) = &self.subject {
            if let Some(name) = &subject.name {
                let _ = writeln!(out, "user.name: {name}");
            }
            if let Some(email) = &subject.email {
                let _ = writeln!(out, "user.email: {email}");
            }
        }
        if self.signature.is_some() {
            let _ = writeln!(out, "signature: {SIGNATURE_PLACEHOLDER}");
        }
        out
    }
}

/// License fields safe to show to a user. Never carries the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseInfo {
    pub hardware_id: FingerprintId,
    #[serde(with = "timestamp")]
    pub issue_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub expiry_date: DateTime<Utc>,
    pub allowed_features: Vec<String>,
    #[serde(rename = "user", skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
}

/// HMAC-SHA256 over [`LicenseRecord::signing_payload`], hex-encoded.
///
/// Deterministic: the same record and secret always give the same value.
pub fn compute_signature(record: &LicenseRecord, secret: &SharedSecret) -> LicenseResult<String> {
    let payload = record.signing_payload()?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.expose().as_bytes());
    let tag = hmac::sign(&key, payload.as_bytes());
    Ok(hex::encode(tag.as_ref()))
}

/// Constant-time check of the stored signature against a recomputed one.
///
/// A missing signature, non-hex signature, or unserializable record all
/// count as a mismatch.
pub fn verify_signature(record: &LicenseRecord, secret: &SharedSecret) -> bool {
    let Some(stored) = record.signature.as_deref() else {
        return false;
    };
    let Ok(tag) = hex::decode(stored) else {
        return false;
    };
    let Ok(payload) = record.signing_payload() else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.expose().as_bytes());
    hmac::verify(&key, payload.as_bytes(), &tag).is_ok()
}

fn dedup_preserving_order(features: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(features.len());
    for feature in features {
        if !seen.contains(&feature) {
            seen.push(feature);
        }
    }
    seen
}

/// Serde adapter for [`TIMESTAMP_FORMAT`].
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(subject: Option<Subject>) -> LicenseRecord {
        let issued = Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 0).unwrap();
        LicenseRecord::unsigned(
            FingerprintId::new("abc123").unwrap(),
            issued,
            30,
            DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect(),
            subject,
        )
        .unwrap()
    }

    #[test]
    fn expiry_is_issue_plus_calendar_days() {
        let record = sample(None);
        assert_eq!(
            record.expiry_date,
            Utc.with_ymd_and_hms(2026, 11, 14, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn signing_payload_has_expected_layout() {
        let subject = Subject::new(Some("Example Ltd".into()), None);
        let payload = sample(subject).signing_payload().unwrap();
        assert_eq!(
            payload,
            r#"{"allowed_features": ["base", "premium", "export"], "expiry_date": "2026-11-14 09:30:00", "hardware_id": "abc123", "issue_date": "2026-10-15 09:30:00", "user": {"name": "Example Ltd"}}"#
        );
    }

    #[test]
    fn signing_payload_ignores_existing_signature() {
        let mut record = sample(None);
        let before = record.signing_payload().unwrap();
        record.signature = Some("deadbeef".into());
        assert_eq!(record.signing_payload().unwrap(), before);
    }

    #[test]
    fn signature_is_deterministic_and_verifies() {
        let secret = SharedSecret::new("shared").unwrap();
        let mut record = sample(None);

        let first = compute_signature(&record, &secret).unwrap();
        let second = compute_signature(&record, &secret).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        record.signature = Some(first);
        assert!(verify_signature(&record, &secret));
        assert!(!verify_signature(
            &record,
            &SharedSecret::new("other").unwrap()
        ));
    }

    #[test]
    fn mutated_field_fails_verification() {
        let secret = SharedSecret::new("shared").unwrap();
        let mut record = sample(None);
        record.signature = Some(compute_signature(&record, &secret).unwrap());

        record.expiry_date += Duration::days(365);
        assert!(!verify_signature(&record, &secret));
    }

    #[test]
    fn missing_or_malformed_signature_fails() {
        let secret = SharedSecret::new("shared").unwrap();
        let mut record = sample(None);
        assert!(!verify_signature(&record, &secret));

        record.signature = Some("not-hex".into());
        assert!(!verify_signature(&record, &secret));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let record = sample(None);
        assert!(!record.is_expired_at(record.expiry_date));
        assert!(record.is_expired_at(record.expiry_date + Duration::seconds(1)));
    }

    #[test]
    fn features_are_deduplicated_in_order() {
        let record = LicenseRecord::unsigned(
            FingerprintId::new("abc123").unwrap(),
            Utc::now(),
            1,
            vec!["export".into(), "base".into(), "export".into()],
            None,
        )
        .unwrap();
        assert_eq!(record.allowed_features, vec!["export", "base"]);
        assert!(record.has_feature("base"));
        assert!(!record.has_feature("premium"));
    }

    #[test]
    fn out_of_range_validity_is_an_error() {
        let result = LicenseRecord::unsigned(
            FingerprintId::new("abc123").unwrap(),
            Utc::now(),
            u32::MAX,
            vec!["base".into()],
            None,
        );
        assert!(matches!(result, Err(LicenseError::ConfigError(_))));
    }

    #[test]
    fn blank_subject_fields_are_dropped() {
        assert_eq!(Subject::new(Some(String::new()), Some("  ".into())), None);

        let subject = Subject::new(Some(String::new()), Some("ops@example.com".into())).unwrap();
        assert!(subject.name.is_none());

        let payload = sample(Some(subject)).signing_payload().unwrap();
        assert!(payload.contains(r#""user": {"email": "ops@example.com"}"#));
    }

    #[test]
    fn json_round_trip_uses_wire_names() {
        let mut record = sample(Subject::new(None, Some("ops@example.com".into())));
        record.signature = Some("00ff".into());

        let json = record.to_canonical_json().unwrap();
        assert!(json.contains(r#""user": {"email": "ops@example.com"}"#));

        let parsed: LicenseRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn summary_redacts_signature() {
        let mut record = sample(Subject::new(Some("Example Ltd".into()), None));
        record.signature = Some("0123456789abcdef".into());

        let text = record.summary_text();
        assert!(text.contains("hardware_id: abc123"));
        assert!(text.contains("user.name: Example Ltd"));
        assert!(text.contains(SIGNATURE_PLACEHOLDER));
        assert!(!text.contains("0123456789abcdef"));
    }

    #[test]
    fn info_omits_signature() {
        let mut record = sample(None);
        record.signature = Some("0123456789abcdef".into());

        let json = serde_json::to_string(&record.info()).unwrap();
        assert!(!json.contains("signature"));
        assert!(!json.contains("0123456789abcdef"));
    }
}
