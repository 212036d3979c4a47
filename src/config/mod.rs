use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// TOML出力ではテーブルより先に値を書く必要があるため、config_path を先頭側に置く。
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub base_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    pub provision: ProvisionConfig,
    pub cleanup: CleanupConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionConfig {
    pub csv_path: PathBuf,
    pub log_path: PathBuf,
    /// 平文で保持される共通パスワード。未設定ならアカウントごとにランダム生成する。
    #[serde(skip_serializing)]
    pub default_password: Option<String>,
    pub log_password: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupConfig {
    pub csv_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthConfig {
    pub output_dir: PathBuf,
    pub probe_host: String,
    pub latency_samples: u32,
    pub public_ip_url: String,
}

impl EffectiveConfig {
    fn with_base(base_dir: PathBuf) -> Self {
        Self {
            provision: ProvisionConfig {
                csv_path: base_dir.join("new_users.csv"),
                log_path: base_dir.join("provision_log.txt"),
                default_password: None,
                log_password: false,
            },
            cleanup: CleanupConfig {
                csv_path: base_dir.join("cleanup_users.csv"),
            },
            health: HealthConfig {
                output_dir: base_dir.join("HealthReports"),
                probe_host: "8.8.8.8".to_string(),
                latency_samples: 4,
                public_ip_url: "https://api.ipify.org".to_string(),
            },
            base_dir,
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    base_dir: Option<PathBuf>,
    provision: Option<RawProvisionConfig>,
    cleanup: Option<RawCleanupConfig>,
    health: Option<RawHealthConfig>,
}

#[derive(Debug, Deserialize)]
struct RawProvisionConfig {
    csv_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    default_password: Option<String>,
    log_password: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawCleanupConfig {
    csv_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawHealthConfig {
    output_dir: Option<PathBuf>,
    probe_host: Option<String>,
    latency_samples: Option<u32>,
    public_ip_url: Option<String>,
}

pub fn default_base_dir(home_dir: &Path) -> PathBuf {
    home_dir.join("ITOps")
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/winops/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    let raw = if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        Some(raw)
    } else {
        None
    };

    let base_dir = std::env::var_os("WINOPS_BASE_DIR")
        .map(PathBuf::from)
        .or_else(|| raw.as_ref().and_then(|r| r.base_dir.clone()))
        .unwrap_or_else(|| default_base_dir(home_dir));

    let mut cfg = EffectiveConfig::with_base(base_dir);
    if let Some(raw) = raw {
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(provision) = raw.provision {
        if let Some(csv_path) = provision.csv_path {
            cfg.provision.csv_path = csv_path;
        }
        if let Some(log_path) = provision.log_path {
            cfg.provision.log_path = log_path;
        }
        if let Some(default_password) = provision.default_password {
            cfg.provision.default_password = Some(default_password);
        }
        if let Some(log_password) = provision.log_password {
            cfg.provision.log_password = log_password;
        }
    }

    if let Some(cleanup) = raw.cleanup {
        if let Some(csv_path) = cleanup.csv_path {
            cfg.cleanup.csv_path = csv_path;
        }
    }

    if let Some(health) = raw.health {
        if let Some(output_dir) = health.output_dir {
            cfg.health.output_dir = output_dir;
        }
        if let Some(probe_host) = health.probe_host {
            cfg.health.probe_host = probe_host;
        }
        if let Some(latency_samples) = health.latency_samples {
            cfg.health.latency_samples = latency_samples;
        }
        if let Some(public_ip_url) = health.public_ip_url {
            cfg.health.public_ip_url = public_ip_url;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Some(v) = std::env::var_os("WINOPS_PROVISION_CSV") {
        cfg.provision.csv_path = PathBuf::from(v);
    }
    if let Some(v) = std::env::var_os("WINOPS_PROVISION_LOG") {
        cfg.provision.log_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("WINOPS_PROVISION_DEFAULT_PASSWORD") {
        if !v.is_empty() {
            cfg.provision.default_password = Some(v);
        }
    }
    if let Ok(v) = std::env::var("WINOPS_PROVISION_LOG_PASSWORD") {
        cfg.provision.log_password = parse_bool(&v).with_context(|| "WINOPS_PROVISION_LOG_PASSWORD")?;
    }
    if let Some(v) = std::env::var_os("WINOPS_CLEANUP_CSV") {
        cfg.cleanup.csv_path = PathBuf::from(v);
    }
    if let Some(v) = std::env::var_os("WINOPS_HEALTH_OUTPUT_DIR") {
        cfg.health.output_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("WINOPS_HEALTH_PROBE_HOST") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.health.probe_host = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("WINOPS_HEALTH_LATENCY_SAMPLES") {
        cfg.health.latency_samples = v
            .trim()
            .parse::<u32>()
            .with_context(|| "WINOPS_HEALTH_LATENCY_SAMPLES")?;
    }
    if let Ok(v) = std::env::var("WINOPS_HEALTH_PUBLIC_IP_URL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.health.public_ip_url = v.to_string();
        }
    }

    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_rooted_under_base_dir() {
        let cfg = EffectiveConfig::with_base(PathBuf::from("/base"));
        assert_eq!(cfg.provision.csv_path, PathBuf::from("/base/new_users.csv"));
        assert_eq!(
            cfg.provision.log_path,
            PathBuf::from("/base/provision_log.txt")
        );
        assert_eq!(cfg.cleanup.csv_path, PathBuf::from("/base/cleanup_users.csv"));
        assert_eq!(cfg.health.output_dir, PathBuf::from("/base/HealthReports"));
        assert_eq!(cfg.health.probe_host, "8.8.8.8");
        assert_eq!(cfg.health.latency_samples, 4);
        assert!(cfg.provision.default_password.is_none());
        assert!(!cfg.provision.log_password);
    }

    #[test]
    fn raw_config_overrides_only_given_fields() {
        let raw: RawConfig = toml::from_str(
            r#"
            [provision]
            log_password = true

            [health]
            probe_host = "1.1.1.1"
            "#,
        )
        .expect("parse raw");

        let mut cfg = EffectiveConfig::with_base(PathBuf::from("/base"));
        apply_raw_config(&mut cfg, raw);

        assert!(cfg.provision.log_password);
        assert_eq!(cfg.health.probe_host, "1.1.1.1");
        assert_eq!(cfg.provision.csv_path, PathBuf::from("/base/new_users.csv"));
        assert_eq!(cfg.health.latency_samples, 4);
    }

    #[test]
    fn default_password_is_never_serialized() {
        let mut cfg = EffectiveConfig::with_base(PathBuf::from("/base"));
        cfg.provision.default_password = Some("Temp123!".to_string());
        let shown = toml::to_string_pretty(&cfg).expect("serialize");
        assert!(!shown.contains("Temp123!"), "shown={shown}");
        assert!(shown.contains("log_password"), "shown={shown}");
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert!(parse_bool("1").expect("1"));
        assert!(parse_bool("Yes").expect("yes"));
        assert!(!parse_bool("off").expect("off"));
        assert!(parse_bool("maybe").is_err());
    }
}
