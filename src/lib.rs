//! hwlicense - hardware-bound offline licensing
//!
//! A license is a signed JSON record bound to one machine's hardware
//! fingerprint and sealed to a file with a key derived from a pre-shared
//! secret.
//!
//! - [`hardware`] collects a best-effort hardware profile and hashes it
//!   into a [`hardware::FingerprintId`].
//! - [`issuer`] creates, signs and seals licenses for a fingerprint.
//! - [`validator`] loads a sealed license and checks signature, hardware
//!   binding and expiry, in that order.
//!
//! # Example
//!
//! ```no_run
//! use hwlicense::config::get_config;
//! use hwlicense::events::tracing_observer;
//! use hwlicense::validator::LicenseValidator;
//!
//! let config = get_config()?;
//! let mut validator = LicenseValidator::from_config(config, tracing_observer())?;
//! let (ok, reason) = validator.validate();
//! if !ok {
//!     eprintln!("{}", reason.message());
//! }
//! # Ok::<(), hwlicense::errors::LicenseError>(())
//! ```

pub mod canonical;
pub mod config;
pub mod encryption;
pub mod errors;
pub mod events;
pub mod guard;
pub mod hardware;
pub mod issuer;
pub mod license;
pub mod secret;
pub mod validator;

pub use errors::{LicenseError, LicenseResult};
pub use hardware::{Collector, FingerprintId, HardwareProfile};
pub use issuer::LicenseIssuer;
pub use license::{LicenseInfo, LicenseRecord, Subject};
pub use secret::SharedSecret;
pub use validator::{LicenseValidator, ValidationReason};
