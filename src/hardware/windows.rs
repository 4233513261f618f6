use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{
    base_system_info, non_empty, present, BiosInfo, CommandRunner, CpuInfo, DiskInfo, MacAddress,
    MotherboardInfo, PlatformProbe, SystemInfo,
};

/// `Microsoft Windows [Version 10.0.19045.3803]`
static VER_OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Version\s+([0-9.]+)\]").expect("valid ver regex"));

/// One quoted CSV field.
static CSV_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)""#).expect("valid csv field regex"));

type WmicRecord = BTreeMap<String, String>;

/// Queries WMI through `wmic ... /format:list`, plus `ver` and `getmac`.
pub struct WindowsProbe {
    runner: CommandRunner,
}

impl WindowsProbe {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// First record of `wmic <class> get <fields> /format:list`.
    fn wmic(&self, class: &str, fields: &str) -> Option<WmicRecord> {
        let out = self
            .runner
            .output("wmic", &[class, "get", fields, "/format:list"])?;
        parse_wmic_list(&out).into_iter().next()
    }
}

impl PlatformProbe for WindowsProbe {
    fn system(&self) -> Option<SystemInfo> {
        let version = self
            .runner
            .output("cmd", &["/C", "ver"])
            .and_then(|out| parse_ver(&out));
        let release = version
            .as_deref()
            .and_then(|v| v.split('.').next())
            .and_then(non_empty);

        present(SystemInfo {
            platform_release: release,
            platform_version: version,
            processor: std::env::var("PROCESSOR_IDENTIFIER").ok().and_then(non_empty),
            ..base_system_info("Windows")
        })
    }

    fn cpu(&self) -> Option<CpuInfo> {
        let mut rec = self.wmic("cpu", "ProcessorId,Name,NumberOfCores")?;
        present(CpuInfo {
            processor_id: take(&mut rec, "ProcessorId"),
            name: take(&mut rec, "Name"),
            cores: take(&mut rec, "NumberOfCores"),
            ..CpuInfo::default()
        })
    }

    fn bios(&self) -> Option<BiosInfo> {
        let mut rec = self.wmic("bios", "Manufacturer,SerialNumber,SMBIOSBIOSVersion,ReleaseDate")?;
        present(BiosInfo {
            vendor: take(&mut rec, "Manufacturer"),
            serial_number: take(&mut rec, "SerialNumber"),
            version: take(&mut rec, "SMBIOSBIOSVersion"),
            release_date: take(&mut rec, "ReleaseDate"),
        })
    }

    fn motherboard(&self) -> Option<MotherboardInfo> {
        let mut rec = self.wmic("baseboard", "Manufacturer,Product,SerialNumber")?;
        present(MotherboardInfo {
            vendor: take(&mut rec, "Manufacturer"),
            product: take(&mut rec, "Product"),
            serial_number: take(&mut rec, "SerialNumber"),
        })
    }

    fn disk(&self) -> Option<DiskInfo> {
        let out = self.runner.output(
            "wmic",
            &["diskdrive", "get", "Index,Model,SerialNumber,Size", "/format:list"],
        )?;
        parse_wmic_disks(&out)
    }

    fn mac_addresses(&self) -> Option<Vec<MacAddress>> {
        let out = self.runner.output("getmac", &["/v", "/fo", "csv", "/nh"])?;
        Some(parse_getmac_csv(&out))
    }
}

fn take(rec: &mut WmicRecord, key: &str) -> Option<String> {
    rec.remove(key).and_then(non_empty)
}

/// Records of `Key=Value` lines separated by blank lines.
pub fn parse_wmic_list(text: &str) -> Vec<WmicRecord> {
    let mut records = Vec::new();
    let mut current = WmicRecord::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            current.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// Lowest-index physical disk that reports a serial number.
pub fn parse_wmic_disks(text: &str) -> Option<DiskInfo> {
    let mut disks: Vec<(u32, DiskInfo)> = parse_wmic_list(text)
        .into_iter()
        .filter_map(|mut rec| {
            let index = take(&mut rec, "Index")
                .and_then(|i| i.parse().ok())
                .unwrap_or(u32::MAX);
            let disk = DiskInfo {
                name: None,
                model: take(&mut rec, "Model"),
                serial_number: take(&mut rec, "SerialNumber"),
                size: take(&mut rec, "Size"),
            };
            disk.serial_number.is_some().then_some((index, disk))
        })
        .collect();
    disks.sort_by_key(|(index, _)| *index);
    disks.into_iter().next().map(|(_, disk)| disk)
}

/// Version number from `ver` output.
pub fn parse_ver(text: &str) -> Option<String> {
    VER_OUTPUT.captures(text).and_then(|c| non_empty(&c[1]))
}

/// Connection name and physical address columns of
/// `getmac /v /fo csv /nh`. Disconnected adapters report `N/A` or
/// `Disabled` and are dropped.
pub fn parse_getmac_csv(text: &str) -> Vec<MacAddress> {
    let mut macs: Vec<MacAddress> = text
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = CSV_FIELD
                .captures_iter(line)
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();
            match fields.as_slice() {
                [connection, _adapter, address, ..] => MacAddress::new(connection, address),
                _ => None,
            }
        })
        .collect();
    macs.sort();
    macs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wmic_list_records() {
        let out = "\r\r\nName=Intel(R) Core(TM) i5-10400 CPU @ 2.90GHz\r\r\nNumberOfCores=6\r\r\nProcessorId=BFEBFBFF000A0653\r\r\n\r\r\n\r\r\n";
        let records = parse_wmic_list(out);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["ProcessorId"], "BFEBFBFF000A0653");
        assert_eq!(records[0]["NumberOfCores"], "6");
    }

    #[test]
    fn blank_values_are_dropped() {
        let mut rec = parse_wmic_list("SerialNumber=\nProduct=PRIME B460M-A\n")
            .into_iter()
            .next()
            .unwrap();
        assert!(take(&mut rec, "SerialNumber").is_none());
        assert_eq!(take(&mut rec, "Product").as_deref(), Some("PRIME B460M-A"));
    }

    #[test]
    fn picks_lowest_index_disk_with_serial() {
        let out = "\
Index=1
Model=WDC WD10EZEX-08WN4A0
SerialNumber=WD-WCC6Y0AAAAAA
Size=1000202273280

Index=0
Model=Samsung SSD 860 EVO 500GB
SerialNumber=S3Z9NB0K123456
Size=500105249280

Index=2
Model=Virtual Disk
SerialNumber=
Size=1073741824
";
        let disk = parse_wmic_disks(out).unwrap();
        assert_eq!(disk.serial_number.as_deref(), Some("S3Z9NB0K123456"));
        assert_eq!(disk.model.as_deref(), Some("Samsung SSD 860 EVO 500GB"));
    }

    #[test]
    fn parses_ver_output() {
        let out = "\r\nMicrosoft Windows [Version 10.0.19045.3803]\r\n";
        assert_eq!(parse_ver(out).as_deref(), Some("10.0.19045.3803"));
        assert!(parse_ver("garbage").is_none());
    }

    #[test]
    fn parses_getmac_csv() {
        let out = r#""Ethernet","Intel(R) Ethernet Connection (7) I219-V","A4-BB-6D-11-22-33","\Device\Tcpip_{1234}"
"Wi-Fi","Intel(R) Wi-Fi 6 AX201 160MHz","N/A","Media disconnected"
"Bluetooth Network Connection","Bluetooth Device (PAN)","Disabled","Disconnected"
"#;
        let macs = parse_getmac_csv(out);
        assert_eq!(macs, vec![MacAddress::new("Ethernet", "a4:bb:6d:11:22:33").unwrap()]);
    }
}
