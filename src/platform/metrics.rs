use anyhow::Result;
use sysinfo::{Disks, System};

use crate::core::{DiskUsage, MemoryUsage};
use crate::health::SystemMetrics;

/// sysinfo ベースの実装。CPU は1サンプル窓の差分で測る。
pub struct SysinfoMetrics {
    sys: System,
}

impl SysinfoMetrics {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMetrics for SysinfoMetrics {
    fn cpu_percent(&mut self) -> Result<f64> {
        self.sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.sys.refresh_cpu_usage();
        Ok(f64::from(self.sys.global_cpu_usage()))
    }

    fn memory(&mut self) -> Result<MemoryUsage> {
        self.sys.refresh_memory();
        Ok(MemoryUsage {
            total_bytes: self.sys.total_memory(),
            free_bytes: self.sys.free_memory(),
        })
    }

    fn boot_disk(&mut self) -> Result<Option<DiskUsage>> {
        let disks = Disks::new_with_refreshed_list();
        let boot_mount = boot_mount_point();

        let boot = disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new(boot_mount.as_str()));
        // ブートボリュームが列挙に出てこない環境では、最大のボリュームで代用する。
        let fallback = disks.iter().max_by_key(|d| d.total_space());

        let disk = match boot.or(fallback) {
            Some(disk) if disk.total_space() > 0 => disk,
            _ => return Ok(None),
        };

        Ok(Some(DiskUsage {
            mount_point: disk.mount_point().display().to_string(),
            total_bytes: disk.total_space(),
            free_bytes: disk.available_space(),
        }))
    }
}

fn boot_mount_point() -> String {
    #[cfg(windows)]
    {
        let drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        format!("{drive}\\")
    }

    #[cfg(not(windows))]
    {
        "/".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_totals_are_consistent() {
        let mut metrics = SysinfoMetrics::new();
        let mem = metrics.memory().expect("memory");
        assert!(mem.total_bytes >= mem.free_bytes);
        assert!(mem.percent_used() >= 0.0 && mem.percent_used() <= 100.0);
    }

    #[test]
    fn boot_disk_never_reports_zero_total() {
        let mut metrics = SysinfoMetrics::new();
        if let Some(disk) = metrics.boot_disk().expect("disk query") {
            assert!(disk.total_bytes > 0);
        }
    }
}
