use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::accounts::{AccountDirectory, NewAccount, ProfileState, ProfileStore};
use crate::health::SecurityAuditLog;
use crate::platform::{CommandOutput, parse_count, parse_ps_bool, ps_quote, run_command};

/// `net user` を使うローカルアカウント台帳。
pub struct NetUserDirectory {
    timeout: Duration,
}

impl NetUserDirectory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn net_user(&self, args: &[&str]) -> Result<CommandOutput> {
        run_command("net", args, self.timeout)
    }
}

fn ensure_success(output: &CommandOutput, cmdline: &str) -> Result<()> {
    if output.exit_code == 0 {
        return Ok(());
    }
    let stderr = output.stderr.trim();
    let detail = if stderr.is_empty() {
        output.stdout.trim()
    } else {
        stderr
    };
    if detail.is_empty() {
        return Err(anyhow!(
            "外部コマンドが失敗しました（exit_code={}）: {cmdline}",
            output.exit_code
        ));
    }
    Err(anyhow!("{detail}"))
}

impl AccountDirectory for NetUserDirectory {
    // `net user <name>` は存在すれば 0、未知のユーザーなら 2 を返す。
    fn exists(&self, username: &str) -> Result<bool> {
        let output = self.net_user(&["user", username])?;
        match output.exit_code {
            0 => Ok(true),
            2 => Ok(false),
            _ => {
                ensure_success(&output, &format!("net user {username}"))?;
                Ok(false)
            }
        }
    }

    fn create(&mut self, account: &NewAccount) -> Result<()> {
        let fullname = format!("/fullname:{}", account.full_name);
        let comment = format!("/comment:{}", account.description);
        let output = self.net_user(&[
            "user",
            account.username.as_str(),
            account.password.as_str(),
            "/add",
            fullname.as_str(),
            comment.as_str(),
            "/active:yes",
        ])?;
        ensure_success(&output, &format!("net user {} /add", account.username))
    }

    fn set_enabled(&mut self, username: &str, enabled: bool) -> Result<()> {
        let active = if enabled {
            "/active:yes"
        } else {
            "/active:no"
        };
        let output = self.net_user(&["user", username, active])?;
        ensure_success(&output, &format!("net user {username} {active}"))
    }

    fn delete(&mut self, username: &str) -> Result<()> {
        let output = self.net_user(&["user", username, "/delete"])?;
        ensure_success(&output, &format!("net user {username} /delete"))
    }
}

/// Win32_UserProfile（CIM）経由でプロファイルを探して消す。SIDはローカルユーザーから引く。
pub struct CimProfileStore {
    timeout: Duration,
}

impl CimProfileStore {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn powershell(&self, script: &str) -> Result<CommandOutput> {
        run_command("powershell", &["-NoProfile", "-Command", script], self.timeout)
    }
}

fn profile_query_script(username: &str) -> String {
    format!(
        "$sid = (Get-LocalUser -Name {u} -ErrorAction Stop).SID.Value; \
         $p = Get-CimInstance Win32_UserProfile -Filter \"SID = '$sid'\" -ErrorAction Stop; \
         if ($p) {{ $p.Loaded }}",
        u = ps_quote(username)
    )
}

fn profile_delete_script(username: &str) -> String {
    format!(
        "$sid = (Get-LocalUser -Name {u} -ErrorAction Stop).SID.Value; \
         Get-CimInstance Win32_UserProfile -Filter \"SID = '$sid'\" -ErrorAction Stop \
         | Remove-CimInstance -ErrorAction Stop",
        u = ps_quote(username)
    )
}

impl ProfileStore for CimProfileStore {
    fn find(&self, username: &str) -> Result<Option<ProfileState>> {
        let output = self.powershell(&profile_query_script(username))?;
        ensure_success(&output, "Get-CimInstance Win32_UserProfile")?;
        match parse_ps_bool(&output.stdout) {
            Some(loaded) => Ok(Some(ProfileState { loaded })),
            None if output.stdout.trim().is_empty() => Ok(None),
            None => Err(anyhow!(
                "Win32_UserProfile の応答を解釈できません: {:?}",
                output.stdout.trim()
            )),
        }
    }

    fn delete(&mut self, username: &str) -> Result<()> {
        let output = self.powershell(&profile_delete_script(username))?;
        ensure_success(&output, "Remove-CimInstance Win32_UserProfile")
    }
}

/// Security イベントログのログオン失敗（Id=4625）件数。権限が無いと Get-WinEvent が落ちる。
pub struct SecurityEventLog {
    timeout: Duration,
}

impl SecurityEventLog {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn failed_logon_script(hours: u64) -> String {
    // 該当イベントが0件のとき Get-WinEvent は例外を投げるため、その場合のみ 0 に倒す。
    format!(
        "try {{ \
           (Get-WinEvent -FilterHashtable @{{ LogName='Security'; Id=4625; \
            StartTime=(Get-Date).AddHours(-{hours}) }} -ErrorAction Stop \
            | Measure-Object).Count \
         }} catch [Exception] {{ \
           if ($_.Exception.Message -match 'No events') {{ 0 }} else {{ throw }} \
         }}"
    )
}

impl SecurityAuditLog for SecurityEventLog {
    fn failed_logons_since(&self, window: Duration) -> Result<u64> {
        let hours = window.as_secs().div_ceil(3600).max(1);
        let output = run_command(
            "powershell",
            &["-NoProfile", "-Command", failed_logon_script(hours).as_str()],
            self.timeout,
        )?;
        ensure_success(&output, "Get-WinEvent -FilterHashtable (Security/4625)")?;
        parse_count(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_success_prefers_stderr_detail() {
        let output = CommandOutput {
            exit_code: 2,
            stdout: "The user name could not be found.\r\n".to_string(),
            stderr: String::new(),
        };
        let err = ensure_success(&output, "net user ghost /delete").expect_err("nonzero exit");
        assert_eq!(err.to_string(), "The user name could not be found.");

        let ok = CommandOutput {
            exit_code: 0,
            stdout: "The command completed successfully.\r\n".to_string(),
            stderr: String::new(),
        };
        assert!(ensure_success(&ok, "net user jdoe").is_ok());
    }

    #[test]
    fn profile_scripts_quote_the_username() {
        let script = profile_query_script("o'brien");
        assert!(script.contains("'o''brien'"), "script={script}");
        let script = profile_delete_script("jdoe");
        assert!(script.contains("Remove-CimInstance"), "script={script}");
    }

    #[test]
    fn failed_logon_script_embeds_window_hours() {
        let script = failed_logon_script(24);
        assert!(script.contains("AddHours(-24)"), "script={script}");
        assert!(script.contains("Id=4625"), "script={script}");
    }
}
