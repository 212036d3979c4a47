use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::core::{DiskUsage, HealthSnapshot, MemoryUsage};

pub trait SystemMetrics {
    fn cpu_percent(&mut self) -> Result<f64>;
    fn memory(&mut self) -> Result<MemoryUsage>;
    /// ブートボリュームの容量。どの情報源でも total > 0 を得られなければ None。
    fn boot_disk(&mut self) -> Result<Option<DiskUsage>>;
}

pub trait SecurityAuditLog {
    fn failed_logons_since(&self, window: Duration) -> Result<u64>;
}

pub trait NetworkProbe {
    fn reachable(&self, host: &str) -> bool;
    fn average_latency_ms(&self, host: &str, samples: u32) -> Option<f64>;
    fn default_gateway(&self) -> Option<String>;
    fn public_ip(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub host: String,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct HealthOptions {
    pub probe_host: String,
    pub latency_samples: u32,
}

const LOGON_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// 全計測を1パスで行う。個々の失敗はその項目の欠測にとどめ、実行全体は落とさない。
pub fn collect(
    metrics: &mut dyn SystemMetrics,
    audit: &dyn SecurityAuditLog,
    net: &dyn NetworkProbe,
    identity: &HostIdentity,
    opts: &HealthOptions,
) -> HealthSnapshot {
    let timestamp = format_timestamp(OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()));

    let cpu_percent = metrics.cpu_percent().ok().map(round1);
    let memory = metrics.memory().ok();
    let disk = metrics.boot_disk().ok().flatten();
    let failed_logons_24h = audit.failed_logons_since(LOGON_WINDOW).ok();

    let ping_reachable = net.reachable(&opts.probe_host);
    let avg_latency_ms = net
        .average_latency_ms(&opts.probe_host, opts.latency_samples)
        .map(round1);
    let default_gateway = net.default_gateway();
    let public_ip = net.public_ip();

    HealthSnapshot {
        timestamp,
        host: identity.host.clone(),
        user: identity.user.clone(),
        cpu_percent,
        memory,
        disk,
        failed_logons_24h,
        ping_target: opts.probe_host.clone(),
        ping_reachable,
        avg_latency_ms,
        default_gateway,
        public_ip,
    }
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn gb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

fn format_timestamp(t: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    t.format(&fmt).unwrap_or_else(|_| "unknown".to_string())
}

pub fn render_text(s: &HealthSnapshot) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "=== Workstation Health Report ===");
    let _ = writeln!(out, "Generated: {}", s.timestamp);
    let _ = writeln!(out, "Host: {}", s.host);
    let _ = writeln!(out, "User: {}", s.user);
    let _ = writeln!(out);

    match s.cpu_percent {
        Some(v) => {
            let _ = writeln!(out, "CPU Usage: {v:.1} %");
        }
        None => {
            let _ = writeln!(out, "CPU Usage: n/a");
        }
    }

    match &s.memory {
        Some(m) => {
            let _ = writeln!(
                out,
                "Memory: {:.1} MB used / {:.1} MB total ({:.1} %)",
                mb(m.used_bytes()),
                mb(m.total_bytes),
                m.percent_used()
            );
        }
        None => {
            let _ = writeln!(out, "Memory: n/a");
        }
    }

    match &s.disk {
        Some(d) => {
            let _ = writeln!(
                out,
                "Disk ({}): {:.1} GB used / {:.1} GB total ({:.1} %)",
                d.mount_point,
                gb(d.used_bytes()),
                gb(d.total_bytes),
                d.percent_used()
            );
        }
        None => {
            let _ = writeln!(out, "Disk: n/a");
        }
    }

    match s.failed_logons_24h {
        Some(n) => {
            let _ = writeln!(out, "Failed logons (24h): {n}");
        }
        None => {
            let _ = writeln!(out, "Failed logons (24h): n/a (no access to Security log)");
        }
    }

    let reach = if s.ping_reachable {
        "reachable"
    } else {
        "unreachable"
    };
    let _ = writeln!(out, "Ping {}: {reach}", s.ping_target);

    match s.avg_latency_ms {
        Some(v) => {
            let _ = writeln!(out, "Average latency: {v:.1} ms");
        }
        None => {
            let _ = writeln!(out, "Average latency: failed/blocked");
        }
    }

    match &s.default_gateway {
        Some(gw) => {
            let _ = writeln!(out, "Default gateway: {gw}");
        }
        None => {
            let _ = writeln!(out, "Default gateway: n/a");
        }
    }

    if let Some(ip) = &s.public_ip {
        let _ = writeln!(out, "Public IP: {ip}");
    }

    out
}

pub fn csv_header() -> &'static str {
    "Timestamp,Host,User,CpuPercent,MemoryUsedMB,MemoryTotalMB,MemoryPercent,\
     DiskUsedGB,DiskTotalGB,DiskPercent,FailedLogons24h,PingTarget,PingReachable,\
     AvgLatencyMs,DefaultGateway,PublicIP"
}

pub fn csv_row(s: &HealthSnapshot) -> String {
    let cpu = opt_fixed1(s.cpu_percent);
    let (mem_used, mem_total, mem_pct) = match &s.memory {
        Some(m) => (
            format!("{:.1}", mb(m.used_bytes())),
            format!("{:.1}", mb(m.total_bytes)),
            format!("{:.1}", m.percent_used()),
        ),
        None => na3(),
    };
    let (disk_used, disk_total, disk_pct) = match &s.disk {
        Some(d) => (
            format!("{:.1}", gb(d.used_bytes())),
            format!("{:.1}", gb(d.total_bytes)),
            format!("{:.1}", d.percent_used()),
        ),
        None => na3(),
    };
    let failed = s
        .failed_logons_24h
        .map(|n| n.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let latency = opt_fixed1(s.avg_latency_ms);
    let gateway = s.default_gateway.clone().unwrap_or_else(|| "n/a".to_string());
    let public_ip = s.public_ip.clone().unwrap_or_default();

    [
        s.timestamp.as_str(),
        s.host.as_str(),
        s.user.as_str(),
        cpu.as_str(),
        mem_used.as_str(),
        mem_total.as_str(),
        mem_pct.as_str(),
        disk_used.as_str(),
        disk_total.as_str(),
        disk_pct.as_str(),
        failed.as_str(),
        s.ping_target.as_str(),
        if s.ping_reachable { "true" } else { "false" },
        latency.as_str(),
        gateway.as_str(),
        public_ip.as_str(),
    ]
    .iter()
    .map(|f| csv_escape(f))
    .collect::<Vec<_>>()
    .join(",")
}

fn opt_fixed1(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.1}"),
        None => "n/a".to_string(),
    }
}

fn na3() -> (String, String, String) {
    ("n/a".to_string(), "n/a".to_string(), "n/a".to_string())
}

pub fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// `2026-08-29 14:35:01` -> `2026-08-29-143501`（ファイル名は秒まで刻む）。
pub fn file_stamp(timestamp: &str) -> String {
    timestamp
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            ':' => None,
            other => Some(other),
        })
        .collect()
}

pub fn write_reports(out_dir: &Path, snapshot: &HealthSnapshot) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(out_dir).with_context(|| {
        format!(
            "レポートディレクトリの作成に失敗しました: {}",
            out_dir.display()
        )
    })?;

    let stamp = file_stamp(&snapshot.timestamp);
    let text_path = out_dir.join(format!("health-report-{stamp}.txt"));
    let csv_path = out_dir.join(format!("health-data-{stamp}.csv"));

    std::fs::write(&text_path, render_text(snapshot)).with_context(|| {
        format!(
            "レポートの書き込みに失敗しました: {}",
            text_path.display()
        )
    })?;

    let csv = format!("{}\n{}\n", csv_header(), csv_row(snapshot));
    std::fs::write(&csv_path, csv).with_context(|| {
        format!("CSVの書き込みに失敗しました: {}", csv_path.display())
    })?;

    Ok((text_path, csv_path))
}
