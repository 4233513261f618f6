use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::{
    base_system_info, non_empty, present, read_trimmed, BiosInfo, CommandRunner, CpuInfo, DiskInfo,
    MacAddress, MotherboardInfo, PlatformProbe, SystemInfo,
};

const DMI_DIR: &str = "/sys/class/dmi/id";
const NET_DIR: &str = "/sys/class/net";

/// `KEY="value"` pairs as printed by `lsblk -P`.
static LSBLK_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Z-]+)="([^"]*)""#).expect("valid lsblk pair regex"));

/// Reads sysfs/procfs and shells out to `lsblk` and `uname`.
pub struct LinuxProbe {
    runner: CommandRunner,
}

impl LinuxProbe {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn dmi(&self, entry: &str) -> Option<String> {
        read_trimmed(Path::new(DMI_DIR).join(entry))
    }
}

impl PlatformProbe for LinuxProbe {
    fn system(&self) -> Option<SystemInfo> {
        present(SystemInfo {
            platform_release: read_trimmed("/proc/sys/kernel/osrelease"),
            platform_version: read_trimmed("/proc/sys/kernel/version"),
            processor: self
                .runner
                .output("uname", &["-p"])
                .and_then(non_empty)
                .filter(|p| p != "unknown"),
            ..base_system_info("Linux")
        })
    }

    fn cpu(&self) -> Option<CpuInfo> {
        let text = fs::read_to_string("/proc/cpuinfo").ok()?;
        present(parse_cpuinfo(&text))
    }

    fn bios(&self) -> Option<BiosInfo> {
        present(BiosInfo {
            vendor: self.dmi("bios_vendor"),
            version: self.dmi("bios_version"),
            release_date: self.dmi("bios_date"),
            serial_number: None,
        })
    }

    fn motherboard(&self) -> Option<MotherboardInfo> {
        // board_serial is root-only on most distributions.
        present(MotherboardInfo {
            vendor: self.dmi("board_vendor"),
            product: self.dmi("board_name"),
            serial_number: self.dmi("board_serial"),
        })
    }

    fn disk(&self) -> Option<DiskInfo> {
        let out = self
            .runner
            .output("lsblk", &["-d", "-n", "-P", "-o", "NAME,MODEL,SERIAL,SIZE"])?;
        parse_lsblk(&out)
    }

    fn mac_addresses(&self) -> Option<Vec<MacAddress>> {
        let entries = fs::read_dir(NET_DIR).ok()?;
        let mut macs: Vec<MacAddress> = entries
            .flatten()
            .filter_map(|entry| {
                let iface = entry.file_name().to_string_lossy().into_owned();
                let address = read_trimmed(entry.path().join("address"))?;
                MacAddress::new(&iface, &address)
            })
            .collect();
        macs.sort();
        Some(macs)
    }
}

/// First `physical id`, `model name` and `cpu cores` entries of
/// `/proc/cpuinfo`.
pub fn parse_cpuinfo(text: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key.trim() {
            "physical id" => &mut info.physical_id,
            "model name" => &mut info.model_name,
            "cpu cores" => &mut info.cores,
            _ => continue,
        };
        if slot.is_none() {
            *slot = non_empty(value);
        }
    }
    info
}

/// First whole disk reported by `lsblk -d -n -P` that has a serial number.
pub fn parse_lsblk(text: &str) -> Option<DiskInfo> {
    text.lines().find_map(|line| {
        let mut disk = DiskInfo::default();
        for cap in LSBLK_PAIR.captures_iter(line) {
            let value = non_empty(&cap[2]);
            match &cap[1] {
                "NAME" => disk.name = value,
                "MODEL" => disk.model = value,
                "SERIAL" => disk.serial_number = value,
                "SIZE" => disk.size = value,
                _ => {}
            }
        }
        disk.serial_number.is_some().then_some(disk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz
physical id\t: 0
cpu cores\t: 6

processor\t: 1
model name\t: Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz
physical id\t: 0
cpu cores\t: 6
";

    #[test]
    fn parses_first_cpu_block() {
        let info = parse_cpuinfo(CPUINFO);
        assert_eq!(
            info.model_name.as_deref(),
            Some("Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz")
        );
        assert_eq!(info.physical_id.as_deref(), Some("0"));
        assert_eq!(info.cores.as_deref(), Some("6"));
        assert!(info.processor_id.is_none());
    }

    #[test]
    fn arm_cpuinfo_without_model_name_is_empty() {
        let info = parse_cpuinfo("processor\t: 0\nBogoMIPS\t: 48.00\n");
        assert!(present(info).is_none());
    }

    #[test]
    fn lsblk_skips_disks_without_serial() {
        let out = r#"NAME="loop0" MODEL="" SERIAL="" SIZE="55.7M"
NAME="nvme0n1" MODEL="Samsung SSD 970 EVO Plus 1TB" SERIAL="S4EWNX0R123456" SIZE="931.5G"
NAME="sda" MODEL="USB Stick" SERIAL="AA0001" SIZE="14.9G"
"#;
        let disk = parse_lsblk(out).unwrap();
        assert_eq!(disk.name.as_deref(), Some("nvme0n1"));
        assert_eq!(disk.model.as_deref(), Some("Samsung SSD 970 EVO Plus 1TB"));
        assert_eq!(disk.serial_number.as_deref(), Some("S4EWNX0R123456"));
        assert_eq!(disk.size.as_deref(), Some("931.5G"));
    }

    #[test]
    fn lsblk_without_any_serial_is_none() {
        assert!(parse_lsblk(r#"NAME="vda" MODEL="" SERIAL="" SIZE="20G""#).is_none());
        assert!(parse_lsblk("").is_none());
    }
}
