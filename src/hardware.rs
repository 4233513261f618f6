//! Hardware fingerprinting.
//!
//! A [`Collector`] asks a platform-specific [`PlatformProbe`] for one
//! typed value per hardware category, then [`compute_id`] hashes the
//! canonical JSON of the resulting [`HardwareProfile`] into a
//! [`FingerprintId`].
//!
//! Every probe is best-effort. A failing utility, a missing file or an
//! unparsable output only removes that field from the profile. Note that
//! this makes the id change whenever a probe starts or stops succeeding;
//! license binding is exact-match only.

pub mod command;
pub mod linux;
pub mod macos;
pub mod windows;

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::canonical_json;
use crate::errors::{LicenseError, LicenseResult};
use crate::events::{LicenseEvent, Observer};

pub use command::{CommandRunner, ProbeFailure, DEFAULT_PROBE_TIMEOUT};

/// Hex-encoded SHA-256 digest identifying one machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintId(String);

impl FingerprintId {
    /// Wrap an existing id. An empty id is [`LicenseError::MissingHardwareId`].
    pub fn new(id: impl Into<String>) -> LicenseResult<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(LicenseError::MissingHardwareId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FingerprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_cores: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiosInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotherboardInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// One network interface and its hardware address (lowercase, `:`-separated).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddress {
    pub interface: String,
    pub address: String,
}

impl MacAddress {
    /// Normalizes `AA-BB-...` / `aa:bb:...` forms. Returns `None` for
    /// malformed or all-zero addresses.
    pub fn new(interface: &str, address: &str) -> Option<Self> {
        let interface = interface.trim();
        let normalized = address.trim().to_ascii_lowercase().replace('-', ":");

        let octets: Vec<&str> = normalized.split(':').collect();
        let well_formed = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if interface.is_empty() || !well_formed || octets.iter().all(|o| *o == "00") {
            return None;
        }

        Some(Self {
            interface: interface.to_string(),
            address: normalized,
        })
    }
}

/// Everything the probes could find, one optional entry per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios: Option<BiosInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motherboard: Option<MotherboardInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_addresses: Option<Vec<MacAddress>>,
}

impl HardwareProfile {
    /// Human-readable lines for operators (platform, CPU, board, BIOS,
    /// disk, first MAC).
    pub fn summary_lines(&self) -> Vec<String> {
        let unknown = || "Unknown".to_string();
        let mut lines = Vec::new();

        let system = self.system.clone().unwrap_or_default();
        lines.push(format!(
            "System: {} {}",
            system.platform.unwrap_or_else(unknown),
            system.platform_version.unwrap_or_default()
        ));
        lines.push(format!("Architecture: {}", system.architecture.unwrap_or_else(unknown)));
        lines.push(format!("Hostname: {}", system.hostname.unwrap_or_else(unknown)));

        let cpu = self.cpu.clone().unwrap_or_default();
        let cpu_id = cpu.processor_id.or(cpu.physical_id).or(cpu.brand.clone());
        lines.push(format!("CPU ID: {}", cpu_id.unwrap_or_else(unknown)));
        if let Some(model) = cpu.name.or(cpu.model_name) {
            lines.push(format!("CPU model: {model}"));
        }

        let board = self.motherboard.clone().unwrap_or_default();
        lines.push(format!("Board vendor: {}", board.vendor.unwrap_or_else(unknown)));
        lines.push(format!("Board serial: {}", board.serial_number.unwrap_or_else(unknown)));

        let bios = self.bios.clone().unwrap_or_default();
        lines.push(format!("BIOS version: {}", bios.version.unwrap_or_else(unknown)));

        if let Some(serial) = self.disk.as_ref().and_then(|d| d.serial_number.clone()) {
            lines.push(format!("Disk serial: {serial}"));
        }
        if let Some(mac) = self.mac_addresses.as_ref().and_then(|m| m.first()) {
            lines.push(format!("First MAC: {} ({})", mac.address, mac.interface));
        }

        lines
    }
}

/// Per-OS source of hardware facts.
///
/// Implementations must not panic; anything they cannot determine is
/// `None`. Text parsing lives in free functions next to each
/// implementation so it can be tested against captured command output.
pub trait PlatformProbe: Send + Sync {
    fn system(&self) -> Option<SystemInfo>;
    fn cpu(&self) -> Option<CpuInfo>;
    fn bios(&self) -> Option<BiosInfo>;
    fn motherboard(&self) -> Option<MotherboardInfo>;
    fn disk(&self) -> Option<DiskInfo>;
    fn mac_addresses(&self) -> Option<Vec<MacAddress>>;
}

/// Used on operating systems without a dedicated probe: system facts only.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseProbe;

impl PlatformProbe for BaseProbe {
    fn system(&self) -> Option<SystemInfo> {
        present(base_system_info(std::env::consts::OS))
    }
    fn cpu(&self) -> Option<CpuInfo> {
        None
    }
    fn bios(&self) -> Option<BiosInfo> {
        None
    }
    fn motherboard(&self) -> Option<MotherboardInfo> {
        None
    }
    fn disk(&self) -> Option<DiskInfo> {
        None
    }
    fn mac_addresses(&self) -> Option<Vec<MacAddress>> {
        None
    }
}

/// The probe for the operating system this binary was built for.
pub fn native_probe(timeout: Duration) -> Box<dyn PlatformProbe> {
    let runner = CommandRunner::new(timeout);

    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxProbe::new(runner))
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacProbe::new(runner))
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::WindowsProbe::new(runner))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = runner;
        Box::new(BaseProbe)
    }
}

/// Anything that can tell the validator which machine it is running on.
pub trait FingerprintSource {
    fn current_id(&self) -> FingerprintId;
}

/// A fixed id, e.g. one computed earlier or received from elsewhere.
impl FingerprintSource for FingerprintId {
    fn current_id(&self) -> FingerprintId {
        self.clone()
    }
}

/// Runs every probe and derives the fingerprint.
pub struct Collector {
    probe: Box<dyn PlatformProbe>,
    observer: Observer,
}

impl Collector {
    pub fn new(probe: Box<dyn PlatformProbe>, observer: Observer) -> Self {
        Self { probe, observer }
    }

    /// Collector for the current OS with the given per-command timeout.
    pub fn native(timeout: Duration, observer: Observer) -> Self {
        Self::new(native_probe(timeout), observer)
    }

    /// Run every probe once. Never fails; missing values are omitted.
    pub fn collect(&self) -> HardwareProfile {
        let mut profile = HardwareProfile {
            system: self.guard("system", self.probe.system()),
            cpu: self.guard("cpu", self.probe.cpu()),
            bios: self.guard("bios", self.probe.bios()),
            motherboard: self.guard("motherboard", self.probe.motherboard()),
            disk: self.guard("disk", self.probe.disk()),
            mac_addresses: self.guard(
                "mac_addresses",
                self.probe.mac_addresses().filter(|m| !m.is_empty()),
            ),
        };
        if let Some(macs) = profile.mac_addresses.as_mut() {
            macs.sort();
            macs.dedup();
        }
        profile
    }

    /// Collect and hash in one step.
    pub fn fingerprint_id(&self) -> FingerprintId {
        let profile = self.collect();
        let id = compute_id(&profile);
        self.observer
            .on_event(LicenseEvent::FingerprintCollected, id.as_str(), None);
        id
    }

    fn guard<T>(&self, category: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.observer
                .on_event(LicenseEvent::ProbeFailed, category, Some("no value"));
        }
        value
    }
}

impl FingerprintSource for Collector {
    fn current_id(&self) -> FingerprintId {
        self.fingerprint_id()
    }
}

/// SHA-256 over the canonical JSON of `profile`, as lowercase hex.
///
/// MAC addresses are sorted first so interface enumeration order never
/// affects the result.
pub fn compute_id(profile: &HardwareProfile) -> FingerprintId {
    let mut canonical = profile.clone();
    if let Some(macs) = canonical.mac_addresses.as_mut() {
        macs.sort();
    }

    // Every field is a string, list or map; serialization cannot fail.
    let text = canonical_json(&canonical).unwrap_or_default();
    let digest = Sha256::digest(text.as_bytes());
    FingerprintId(hex::encode(digest))
}

/// A collected profile together with its id, as exchanged with the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintReport {
    #[serde(flatten)]
    pub profile: HardwareProfile,
    pub unique_id: FingerprintId,
}

impl FingerprintReport {
    pub fn from_profile(profile: HardwareProfile) -> Self {
        let unique_id = compute_id(&profile);
        Self { profile, unique_id }
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> LicenseResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read a report's `unique_id`.
    ///
    /// A readable report without a non-empty `unique_id` is
    /// [`LicenseError::MissingHardwareId`].
    pub fn load_id(path: impl AsRef<Path>) -> LicenseResult<FingerprintId> {
        let raw = fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        match value.get("unique_id").and_then(|v| v.as_str()) {
            Some(id) => FingerprintId::new(id),
            None => Err(LicenseError::MissingHardwareId),
        }
    }
}

/// `Some(value)` unless every field of `value` is empty.
pub(crate) fn present<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}

/// Trimmed, non-empty text or `None`.
pub(crate) fn non_empty(value: impl AsRef<str>) -> Option<String> {
    let trimmed = value.as_ref().trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trimmed contents of a small text file (sysfs/procfs entries).
pub(crate) fn read_trimmed(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path).ok().and_then(non_empty)
}

/// Platform name, architecture and hostname; release and version are left
/// to the OS-specific probe.
pub(crate) fn base_system_info(platform: &str) -> SystemInfo {
    SystemInfo {
        platform: non_empty(platform),
        architecture: non_empty(std::env::consts::ARCH),
        hostname: hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .and_then(non_empty),
        ..SystemInfo::default()
    }
}
