//! Error types for the licensing core.
//!
//! Issuance and the cryptographic primitives return [`LicenseResult`].
//! Validation never surfaces these errors directly: the validator folds
//! them into a coarse [`crate::validator::ValidationReason`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LicenseError {
    /// Issuance was attempted without a hardware fingerprint.
    #[error("missing hardware id: a fingerprint is required to issue a license")]
    MissingHardwareId,

    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Unsealing failed. Wrong key and corrupt data are deliberately
    /// indistinguishable.
    #[error("decryption failed")]
    DecryptionFailure,

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("storage error: {0}")]
    StorageError(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for LicenseError {
    fn from(e: serde_json::Error) -> Self {
        LicenseError::SerializationError(e.to_string())
    }
}

pub type LicenseResult<T> = Result<T, LicenseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_failure_message_is_opaque() {
        let msg = LicenseError::DecryptionFailure.to_string();
        assert_eq!(msg, "decryption failed");
    }

    #[test]
    fn io_errors_convert_to_storage_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: LicenseError = io.into();
        assert!(matches!(err, LicenseError::StorageError(_)));
    }
}
