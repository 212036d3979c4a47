use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

use crate::health::HostIdentity;

pub mod metrics;
pub mod net;
#[cfg(windows)]
pub mod windows;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("プロセス起動に失敗しました: {cmd}"))?;

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("プロセス待機に失敗しました: {cmd}"))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("タイムアウトしました（{timeout:?}）: {cmd}"));
        }
    };

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    let mut stderr = String::new();
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

pub fn effective_home_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home));
    }
    std::env::var_os("USERPROFILE")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("環境変数 HOME / USERPROFILE が設定されていません"))
}

/// レポートヘッダ用のホスト名と実行ユーザー名。設定値ではなく実行環境から読む。
pub fn local_identity() -> HostIdentity {
    let host = sysinfo::System::host_name()
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string());
    let user = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown".to_string());
    HostIdentity { host, user }
}

/// PowerShell の単一引用符文字列に埋め込む値をエスケープする。
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// 数値1つだけを出力するコマンドの stdout を u64 に解釈する。
pub fn parse_count(stdout: &str) -> Result<u64> {
    let trimmed = stdout.trim();
    trimmed
        .parse::<u64>()
        .with_context(|| format!("件数を数値として解釈できません: {trimmed:?}"))
}

/// PowerShell が出力する `True` / `False` を解釈する。
pub fn parse_ps_bool(stdout: &str) -> Option<bool> {
    match stdout.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
