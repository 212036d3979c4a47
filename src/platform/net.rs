use std::time::Duration;

use crate::health::NetworkProbe;
use crate::platform::run_command;

const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(2);

/// OS の ping / 経路テーブル / 外部HTTPに問い合わせる実装。全操作がベストエフォート。
pub struct CommandNetworkProbe {
    timeout: Duration,
    public_ip_url: String,
}

impl CommandNetworkProbe {
    pub fn new(timeout: Duration, public_ip_url: String) -> Self {
        Self {
            timeout,
            public_ip_url,
        }
    }

    fn ping(&self, host: &str, count: u32) -> Option<String> {
        let count_s = count.to_string();

        #[cfg(windows)]
        let args = ["-n", count_s.as_str(), "-w", "2000", host];
        #[cfg(not(windows))]
        let args = ["-c", count_s.as_str(), "-W", "2", host];

        let output = run_command("ping", &args, self.timeout).ok()?;
        if output.exit_code != 0 {
            return None;
        }
        Some(output.stdout)
    }
}

impl NetworkProbe for CommandNetworkProbe {
    fn reachable(&self, host: &str) -> bool {
        self.ping(host, 1).is_some()
    }

    fn average_latency_ms(&self, host: &str, samples: u32) -> Option<f64> {
        let stdout = self.ping(host, samples.max(1))?;
        parse_ping_average(&stdout)
    }

    fn default_gateway(&self) -> Option<String> {
        #[cfg(windows)]
        {
            let query = "Get-NetRoute -DestinationPrefix '0.0.0.0/0' -ErrorAction Stop \
                         | Sort-Object -Property RouteMetric \
                         | Select-Object -First 1 -ExpandProperty NextHop";
            let output =
                run_command("powershell", &["-NoProfile", "-Command", query], self.timeout).ok()?;
            if output.exit_code != 0 {
                return None;
            }
            parse_gateway_value(&output.stdout)
        }

        #[cfg(not(windows))]
        {
            let output = run_command("ip", &["route", "show", "default"], self.timeout).ok()?;
            if output.exit_code != 0 {
                return None;
            }
            parse_default_route(&output.stdout)
        }
    }

    fn public_ip(&self) -> Option<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(PUBLIC_IP_TIMEOUT)
            .build()
            .ok()?;
        let response = client.get(&self.public_ip_url).send().ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().ok()?;
        let ip = body.trim();
        if ip.is_empty() || ip.len() > 64 || ip.chars().any(char::is_whitespace) {
            return None;
        }
        Some(ip.to_string())
    }
}

/// ping の出力から平均RTT(ms)を取り出す。Unix の rtt 行、Windows の Average 行、
/// どちらも無ければ個々の time= サンプルの算術平均に落ちる。
pub fn parse_ping_average(stdout: &str) -> Option<f64> {
    parse_rtt_line(stdout)
        .or_else(|| parse_windows_average(stdout))
        .or_else(|| parse_time_samples(stdout))
}

fn parse_rtt_line(stdout: &str) -> Option<f64> {
    for line in stdout.lines() {
        if !line.contains("min/avg/max") {
            continue;
        }
        let rest = line.split_once('=')?.1;
        let avg = rest.trim().split('/').nth(1)?;
        return avg.trim().parse::<f64>().ok();
    }
    None
}

fn parse_windows_average(stdout: &str) -> Option<f64> {
    let idx = stdout.find("Average")?;
    let rest = &stdout[idx..];
    let rest = rest.split_once('=')?.1.trim_start();
    let digits: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse::<f64>().ok()
}

fn parse_time_samples(stdout: &str) -> Option<f64> {
    let mut values = Vec::new();
    for (idx, _) in stdout.match_indices("time=") {
        let rest = &stdout[idx + "time=".len()..];
        let digits: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(v) = digits.parse::<f64>() {
            values.push(v);
        }
    }
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// `ip route show default` の `default via <addr> dev ...` から次ホップを取る。
pub fn parse_default_route(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("default") {
            continue;
        }
        let mut tokens = tokens.peekable();
        while let Some(token) = tokens.next() {
            if token == "via" {
                return tokens.next().map(str::to_string);
            }
        }
    }
    None
}

/// PowerShell が1値だけ出力した想定の stdout からアドレスらしき行を取る。
pub fn parse_gateway_value(stdout: &str) -> Option<String> {
    let value = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    if value.contains('.') || value.contains(':') {
        Some(value.to_string())
    } else {
        None
    }
}
