//! Host counters: CPU, memory, swap, disks, battery, uptime and load.

use crate::format::safe_percent;
use crate::metrics::command::run_tool;
use crate::metrics::data::{unix_timestamp, Battery, DiskMount, LoadAverage, SystemInfo};
use crate::metrics::result::{CollectorData, CollectorResult};
use crate::metrics::traits::Collector;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

/// Operating systems the host collector knows how to read.
pub const SUPPORTED_PLATFORMS: &[&str] = &["linux", "macos"];

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const SECTOR_BYTES: u64 = 512;

lazy_static! {
    static ref PMSET_BATTERY: Regex =
        Regex::new(r"(\d+(?:\.\d+)?)%;\s*([^;\n]+)(?:;\s*(\d+):(\d+)\s+remaining)?")
            .expect("valid pmset regex");
}

/// Reads host-wide counters through sysinfo and platform files.
pub struct HostCollector {
    system: System,
    disks: Disks,
    platform: String,
    disk_mounts_max: usize,
    tool_timeout: Duration,
    primed: bool,
}

impl HostCollector {
    pub fn new(disk_mounts_max: usize) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            platform: std::env::consts::OS.to_string(),
            disk_mounts_max,
            tool_timeout: Duration::from_secs(3),
            primed: false,
        }
    }

    /// Override the detected platform name.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    fn is_supported(&self) -> bool {
        sysinfo::IS_SUPPORTED_SYSTEM && SUPPORTED_PLATFORMS.contains(&self.platform.as_str())
    }

    async fn refresh_cpu(&mut self) {
        self.system.refresh_cpu_usage();
        if !self.primed {
            // Usage is a delta between two refreshes.
            tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
            self.system.refresh_cpu_usage();
            self.primed = true;
        }
    }

    fn collect_cpu(&self, data: &mut CollectorData) {
        let cpus = self.system.cpus();
        let per_cpu: Vec<f64> = cpus.iter().map(|cpu| f64::from(cpu.cpu_usage())).collect();
        let overall = if per_cpu.is_empty() {
            0.0
        } else {
            per_cpu.iter().sum::<f64>() / per_cpu.len() as f64
        };

        let load = System::load_average();
        data.cpu_percent = Some(overall);
        data.cpu_count = Some(cpus.len());
        data.cpu_per_cpu = Some(per_cpu);
        data.load_average = Some(LoadAverage {
            load_1: load.one,
            load_5: load.five,
            load_15: load.fifteen,
        });
    }

    fn collect_memory(&self, data: &mut CollectorData) {
        let total = self.system.total_memory() as f64;
        let used = self.system.used_memory() as f64;
        data.memory_total_gb = Some(total / GIB);
        data.memory_used_gb = Some(used / GIB);
        data.memory_available_gb = Some(self.system.available_memory() as f64 / GIB);
        data.memory_percent = Some(safe_percent(used, total));

        let swap_total = self.system.total_swap() as f64;
        let swap_used = self.system.used_swap() as f64;
        data.swap_total_gb = Some(swap_total / GIB);
        data.swap_used_gb = Some(swap_used / GIB);
        data.swap_percent = Some(safe_percent(swap_used, swap_total));
    }

    fn collect_disks(&mut self, data: &mut CollectorData) {
        self.disks.refresh_list();

        let mut mounts = Vec::new();
        for disk in self.disks.iter() {
            let total = disk.total_space();
            // Pseudo filesystems and mounts we may not stat report no capacity.
            if total == 0 {
                continue;
            }
            let free = disk.available_space().min(total);
            let used = total - free;
            mounts.push(DiskMount {
                mountpoint: disk.mount_point().to_string_lossy().to_string(),
                total_gb: total as f64 / GIB,
                used_gb: used as f64 / GIB,
                free_gb: free as f64 / GIB,
                percent: safe_percent(used as f64, total as f64),
                device: disk.name().to_string_lossy().to_string(),
                fstype: disk.file_system().to_string_lossy().to_string(),
            });
            if mounts.len() >= self.disk_mounts_max {
                break;
            }
        }

        let root = self
            .disks
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .map(|disk| {
                let total = disk.total_space();
                (total, total - disk.available_space().min(total))
            });
        let (total, used) = root.unwrap_or((0, 0));
        data.disk_total_gb = Some(total as f64 / GIB);
        data.disk_used_gb = Some(used as f64 / GIB);
        data.disk_percent = Some(safe_percent(used as f64, total as f64));
        data.disk_mounts = Some(mounts);

        let (read, written) = self.read_disk_io().unwrap_or((0, 0));
        data.disk_read_bytes = Some(read);
        data.disk_write_bytes = Some(written);
    }

    fn read_disk_io(&self) -> Option<(u64, u64)> {
        if self.platform != "linux" {
            return None;
        }
        let diskstats = fs::read_to_string("/proc/diskstats").ok()?;
        Some(parse_diskstats(&diskstats, |name| {
            Path::new("/sys/block").join(name).exists()
        }))
    }

    async fn collect_battery(&self) -> Option<Battery> {
        match self.platform.as_str() {
            "linux" => read_linux_battery(Path::new("/sys/class/power_supply")),
            "macos" => match run_tool("pmset", &["-g", "batt"], self.tool_timeout).await {
                Ok(output) => parse_pmset_battery(&output.stdout),
                Err(err) => {
                    debug!("battery: {}", err);
                    None
                }
            },
            _ => None,
        }
    }

    fn system_info(&self, total_memory_gb: f64) -> SystemInfo {
        let cpus = self.system.cpus();
        SystemInfo {
            hostname: System::host_name().unwrap_or_default(),
            platform: System::name().unwrap_or_else(|| self.platform.clone()),
            platform_release: System::kernel_version().unwrap_or_default(),
            platform_version: System::os_version().unwrap_or_default(),
            architecture: std::env::consts::ARCH.to_string(),
            processor: cpus.first().map(|cpu| cpu.brand().to_string()).unwrap_or_default(),
            logical_cores: cpus.len(),
            total_memory_gb,
        }
    }
}

#[async_trait]
impl Collector for HostCollector {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn collect(&mut self) -> CollectorResult {
        if !self.is_supported() {
            return CollectorResult::failure(format!("unsupported platform: {}", self.platform));
        }

        self.refresh_cpu().await;
        self.system.refresh_memory();

        let mut data = CollectorData {
            timestamp: Some(unix_timestamp()),
            uptime_sec: Some(System::uptime() as f64),
            ..Default::default()
        };
        self.collect_cpu(&mut data);
        self.collect_memory(&mut data);
        self.collect_disks(&mut data);
        data.battery = self.collect_battery().await;

        let total_memory_gb = data.memory_total_gb.unwrap_or_default();
        data.system_info = Some(self.system_info(total_memory_gb));

        CollectorResult::success(data)
    }
}

/// Sum sectors read and written across whole block devices in `/proc/diskstats`.
///
/// Loop and RAM devices are ignored. Returns cumulative bytes.
pub fn parse_diskstats(text: &str, is_whole_device: impl Fn(&str) -> bool) -> (u64, u64) {
    let mut read = 0u64;
    let mut written = 0u64;
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") || !is_whole_device(name) {
            continue;
        }
        let (Ok(sectors_read), Ok(sectors_written)) = (fields[5].parse::<u64>(), fields[9].parse::<u64>()) else {
            continue;
        };
        read = read.saturating_add(sectors_read.saturating_mul(SECTOR_BYTES));
        written = written.saturating_add(sectors_written.saturating_mul(SECTOR_BYTES));
    }
    (read, written)
}

/// Parse `pmset -g batt` output.
///
/// ```text
/// Now drawing from 'Battery Power'
///  -InternalBattery-0 (id=4653155)	85%; discharging; 4:32 remaining present: true
/// ```
pub fn parse_pmset_battery(text: &str) -> Option<Battery> {
    let caps = PMSET_BATTERY.captures(text)?;
    let percent = caps[1].parse::<f64>().ok()?;
    let state = caps[2].trim().to_ascii_lowercase();

    let plugged = if text.contains("'AC Power'") {
        Some(true)
    } else if text.contains("'Battery Power'") {
        Some(false)
    } else {
        Some(state != "discharging")
    };

    let secs_left = match (caps.get(3), caps.get(4)) {
        (Some(hours), Some(minutes)) if state == "discharging" => {
            let hours = hours.as_str().parse::<u64>().ok()?;
            let minutes = minutes.as_str().parse::<u64>().ok()?;
            Some(hours * 3600 + minutes * 60)
        }
        _ => None,
    };

    Some(Battery {
        percent,
        plugged,
        secs_left,
    })
}

/// Read the first battery under a Linux `power_supply` class directory.
pub fn read_linux_battery(root: &Path) -> Option<Battery> {
    let entries = fs::read_dir(root).ok()?;
    let mut battery = None;
    let mut ac_online = None;

    for entry in entries.flatten() {
        let dir = entry.path();
        let kind = read_trimmed(&dir.join("type")).unwrap_or_default();
        match kind.as_str() {
            "Battery" if battery.is_none() => {
                let Some(percent) = read_trimmed(&dir.join("capacity")).and_then(|c| c.parse::<f64>().ok()) else {
                    continue;
                };
                let status = read_trimmed(&dir.join("status")).unwrap_or_default();
                let discharging = status.eq_ignore_ascii_case("discharging");
                let secs_left = if discharging { linux_secs_left(&dir) } else { None };
                battery = Some((percent, status, secs_left));
            }
            "Mains" => {
                if let Some(online) = read_trimmed(&dir.join("online")) {
                    ac_online = Some(online == "1");
                }
            }
            _ => {}
        }
    }

    let (percent, status, secs_left) = battery?;
    let plugged = ac_online.or_else(|| {
        if status.is_empty() || status.eq_ignore_ascii_case("unknown") {
            None
        } else {
            Some(!status.eq_ignore_ascii_case("discharging"))
        }
    });
    Some(Battery {
        percent,
        plugged,
        secs_left,
    })
}

fn linux_secs_left(dir: &Path) -> Option<u64> {
    let read = |name: &str| read_trimmed(&dir.join(name)).and_then(|v| v.parse::<f64>().ok());
    let (now, rate) = match (read("energy_now"), read("power_now")) {
        (Some(energy), Some(power)) => (energy, power),
        _ => (read("charge_now")?, read("current_now")?),
    };
    if rate <= 0.0 {
        return None;
    }
    Some((now / rate * 3600.0) as u64)
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
