use super::{
    base_system_info, non_empty, present, BiosInfo, CommandRunner, CpuInfo, DiskInfo, MacAddress,
    MotherboardInfo, PlatformProbe, SystemInfo,
};

/// Shells out to `sysctl`, `ioreg`, `uname` and `networksetup`.
///
/// Macs expose no BIOS or separate disk serial through these utilities;
/// those categories stay absent.
pub struct MacProbe {
    runner: CommandRunner,
}

impl MacProbe {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn sysctl(&self, name: &str) -> Option<String> {
        self.runner.output("sysctl", &["-n", name]).and_then(non_empty)
    }

    fn uname(&self, flag: &str) -> Option<String> {
        self.runner.output("uname", &[flag]).and_then(non_empty)
    }
}

impl PlatformProbe for MacProbe {
    fn system(&self) -> Option<SystemInfo> {
        present(SystemInfo {
            platform_release: self.uname("-r"),
            platform_version: self.uname("-v"),
            processor: self.uname("-p"),
            ..base_system_info("Darwin")
        })
    }

    fn cpu(&self) -> Option<CpuInfo> {
        present(CpuInfo {
            brand: self.sysctl("machdep.cpu.brand_string"),
            physical_cores: self.sysctl("hw.physicalcpu"),
            ..CpuInfo::default()
        })
    }

    fn bios(&self) -> Option<BiosInfo> {
        None
    }

    fn motherboard(&self) -> Option<MotherboardInfo> {
        let out = self
            .runner
            .output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])?;
        present(parse_platform_expert(&out))
    }

    fn disk(&self) -> Option<DiskInfo> {
        None
    }

    fn mac_addresses(&self) -> Option<Vec<MacAddress>> {
        let out = self
            .runner
            .output("networksetup", &["-listallhardwareports"])?;
        Some(parse_hardware_ports(&out))
    }
}

/// Serial, model and manufacturer from `ioreg -rd1 -c IOPlatformExpertDevice`.
pub fn parse_platform_expert(text: &str) -> MotherboardInfo {
    MotherboardInfo {
        vendor: ioreg_value(text, "manufacturer"),
        product: ioreg_value(text, "model"),
        serial_number: ioreg_value(text, "IOPlatformSerialNumber"),
    }
}

/// Value of `"key" = "value"` or `"key" = <"value">` in ioreg output.
fn ioreg_value(text: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    text.lines()
        .find(|line| line.trim_start().starts_with(&needle))
        .and_then(|line| line.split_once('='))
        .and_then(|(_, value)| {
            non_empty(value.trim().trim_start_matches('<').trim_end_matches('>').trim_matches('"'))
        })
}

/// `Device:` / `Ethernet Address:` pairs from `networksetup -listallhardwareports`.
pub fn parse_hardware_ports(text: &str) -> Vec<MacAddress> {
    let mut macs = Vec::new();
    let mut device: Option<&str> = None;

    for line in text.lines() {
        if let Some(name) = line.strip_prefix("Device:") {
            device = Some(name.trim());
        } else if let Some(address) = line.strip_prefix("Ethernet Address:") {
            if let Some(mac) = device.take().and_then(|d| MacAddress::new(d, address)) {
                macs.push(mac);
            }
        }
    }

    macs.sort();
    macs
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOREG: &str = r#"+-o J314sAP  <class IOPlatformExpertDevice, id 0x100000218, registered>
    {
      "IOPlatformSerialNumber" = "C02XG0FDH7JY"
      "manufacturer" = <"Apple Inc.">
      "model" = <"MacBookPro18,3">
      "IOPlatformUUID" = "5F2A9B1C-1111-2222-3333-444455556666"
    }
"#;

    const PORTS: &str = "\
Hardware Port: Wi-Fi
Device: en0
Ethernet Address: 3c:22:fb:aa:bb:01

Hardware Port: Thunderbolt Bridge
Device: bridge0
Ethernet Address: N/A

Hardware Port: Thunderbolt 1
Device: en1
Ethernet Address: 36:0B:4C:AA:BB:02

VLAN Configurations
===================
";

    #[test]
    fn parses_platform_expert_device() {
        let board = parse_platform_expert(IOREG);
        assert_eq!(board.serial_number.as_deref(), Some("C02XG0FDH7JY"));
        assert_eq!(board.vendor.as_deref(), Some("Apple Inc."));
        assert_eq!(board.product.as_deref(), Some("MacBookPro18,3"));
    }

    #[test]
    fn parses_hardware_ports_and_skips_na() {
        let macs = parse_hardware_ports(PORTS);
        assert_eq!(
            macs,
            vec![
                MacAddress::new("en0", "3c:22:fb:aa:bb:01").unwrap(),
                MacAddress::new("en1", "36:0b:4c:aa:bb:02").unwrap(),
            ]
        );
    }

    #[test]
    fn empty_ioreg_output_yields_nothing() {
        assert!(present(parse_platform_expert("")).is_none());
    }
}
