use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use rand_core::{OsRng, RngCore};

use crate::accounts::{AccountDirectory, NewAccount};
use crate::config::ProvisionConfig;
use crate::core::{ProvisionOutcome, UserRecord};

// I と O、l と o など紛らわしい文字を除いた64文字（1バイトを6bitに落とすだけで偏りなく選べる）。
const PASSWORD_CHARSET: &[u8; 64] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789!@#$%-_+";
const GENERATED_PASSWORD_LEN: usize = 16;

#[derive(Debug, Clone)]
pub enum CredentialPolicy {
    /// 設定された共通パスワードを全アカウントに使う。`log_password` が真のときだけ
    /// CREATED 行に平文を残す。既定では残さない。
    Fixed { password: String, log_password: bool },
    /// アカウントごとにランダム生成し、どこにも記録しない。
    PerAccountRandom,
}

impl CredentialPolicy {
    pub fn from_config(cfg: &ProvisionConfig) -> Self {
        match &cfg.default_password {
            Some(password) => CredentialPolicy::Fixed {
                password: password.clone(),
                log_password: cfg.log_password,
            },
            None => CredentialPolicy::PerAccountRandom,
        }
    }

    fn issue(&self) -> (String, Option<String>) {
        match self {
            CredentialPolicy::Fixed {
                password,
                log_password,
            } => {
                let logged = log_password.then(|| password.clone());
                (password.clone(), logged)
            }
            CredentialPolicy::PerAccountRandom => (generate_password(GENERATED_PASSWORD_LEN), None),
        }
    }
}

pub fn generate_password(len: usize) -> String {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf.iter()
        .map(|b| PASSWORD_CHARSET[(b & 63) as usize] as char)
        .collect()
}

/// 1レコードを処理して結果を返す。失敗はこの関数の中で握り、ERROR として返す。
pub fn process_record(
    directory: &mut dyn AccountDirectory,
    record: &UserRecord,
    policy: &CredentialPolicy,
) -> ProvisionOutcome {
    match try_process_record(directory, record, policy) {
        Ok(outcome) => outcome,
        Err(err) => ProvisionOutcome::Error {
            username: record.username.clone(),
            message: format!("{err:#}"),
        },
    }
}

fn try_process_record(
    directory: &mut dyn AccountDirectory,
    record: &UserRecord,
    policy: &CredentialPolicy,
) -> Result<ProvisionOutcome> {
    if directory.exists(&record.username)? {
        return Ok(ProvisionOutcome::Skipped {
            username: record.username.clone(),
        });
    }

    let (password, logged_password) = policy.issue();
    let full_name = record.full_name();
    directory.create(&NewAccount {
        username: record.username.clone(),
        full_name: full_name.clone(),
        description: record.department.clone(),
        password,
    })?;
    directory.set_enabled(&record.username, true)?;

    Ok(ProvisionOutcome::Created {
        username: record.username.clone(),
        full_name,
        department: record.department.clone(),
        logged_password,
    })
}

/// 実行ごとに作り直す結果ログ。起動時に切り詰め、1結果1行で追記する。
pub struct RunLog {
    file: File,
}

impl RunLog {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("ログディレクトリの作成に失敗しました: {}", parent.display())
                })?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("ログファイルの作成に失敗しました: {}", path.display()))?;
        Ok(Self { file })
    }

    pub fn append(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{line}").context("ログファイルへの書き込みに失敗しました")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct FakeDirectory {
        accounts: BTreeMap<String, FakeAccount>,
        fail_create_for: Option<String>,
    }

    #[derive(Debug, Clone)]
    struct FakeAccount {
        full_name: String,
        description: String,
        enabled: bool,
    }

    impl AccountDirectory for FakeDirectory {
        fn exists(&self, username: &str) -> Result<bool> {
            Ok(self.accounts.contains_key(username))
        }

        fn create(&mut self, account: &NewAccount) -> Result<()> {
            if self.fail_create_for.as_deref() == Some(account.username.as_str()) {
                return Err(anyhow!("The account name is invalid"));
            }
            self.accounts.insert(
                account.username.clone(),
                FakeAccount {
                    full_name: account.full_name.clone(),
                    description: account.description.clone(),
                    enabled: false,
                },
            );
            Ok(())
        }

        fn set_enabled(&mut self, username: &str, enabled: bool) -> Result<()> {
            let account = self
                .accounts
                .get_mut(username)
                .ok_or_else(|| anyhow!("no such account: {username}"))?;
            account.enabled = enabled;
            Ok(())
        }

        fn delete(&mut self, username: &str) -> Result<()> {
            self.accounts
                .remove(username)
                .map(|_| ())
                .ok_or_else(|| anyhow!("no such account: {username}"))
        }
    }

    fn record(username: &str, first: &str, last: &str, dept: &str) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            department: dept.to_string(),
        }
    }

    #[test]
    fn creates_missing_account_enabled_with_department_description() {
        let mut dir = FakeDirectory::default();
        let policy = CredentialPolicy::PerAccountRandom;
        let outcome = process_record(&mut dir, &record("jdoe", "Jane", "", "Eng"), &policy);

        assert_eq!(outcome.to_string(), "CREATED: jdoe (Jane ) Dept=Eng");
        let stored = dir.accounts.get("jdoe").expect("account created");
        assert!(stored.enabled);
        assert_eq!(stored.full_name, "Jane ");
        assert_eq!(stored.description, "Eng");
    }

    #[test]
    fn second_run_skips_every_created_account() {
        let mut dir = FakeDirectory::default();
        let policy = CredentialPolicy::PerAccountRandom;
        let records = vec![
            record("alice", "Alice", "Ant", "IT"),
            record("bob", "Bob", "Bee", "HR"),
        ];

        let first: Vec<String> = records
            .iter()
            .map(|r| process_record(&mut dir, r, &policy).to_string())
            .collect();
        assert!(first.iter().all(|l| l.starts_with("CREATED: ")));

        let second: Vec<String> = records
            .iter()
            .map(|r| process_record(&mut dir, r, &policy).to_string())
            .collect();
        assert_eq!(
            second,
            vec![
                "SKIPPED: alice already exists".to_string(),
                "SKIPPED: bob already exists".to_string(),
            ]
        );
    }

    #[test]
    fn create_failure_becomes_error_outcome_and_batch_continues() {
        let mut dir = FakeDirectory {
            fail_create_for: Some("bad".to_string()),
            ..FakeDirectory::default()
        };
        let policy = CredentialPolicy::PerAccountRandom;

        let bad = process_record(&mut dir, &record("bad", "B", "A", "IT"), &policy);
        assert_eq!(bad.to_string(), "ERROR: bad -> The account name is invalid");

        let good = process_record(&mut dir, &record("good", "G", "O", "IT"), &policy);
        assert!(good.to_string().starts_with("CREATED: good"));
    }

    #[test]
    fn fixed_policy_logs_password_only_when_opted_in() {
        let silent = CredentialPolicy::Fixed {
            password: "Temp123!".to_string(),
            log_password: false,
        };
        let (pw, logged) = silent.issue();
        assert_eq!(pw, "Temp123!");
        assert_eq!(logged, None);

        let loud = CredentialPolicy::Fixed {
            password: "Temp123!".to_string(),
            log_password: true,
        };
        let (_, logged) = loud.issue();
        assert_eq!(logged.as_deref(), Some("Temp123!"));
    }

    #[test]
    fn random_policy_never_exposes_the_password() {
        let (pw, logged) = CredentialPolicy::PerAccountRandom.issue();
        assert_eq!(pw.len(), GENERATED_PASSWORD_LEN);
        assert_eq!(logged, None);
    }

    #[test]
    fn generate_password_uses_charset_only() {
        let pw = generate_password(64);
        assert_eq!(pw.len(), 64);
        assert!(pw.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
    }

    #[test]
    fn run_log_truncates_on_create_and_appends_lines() {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "winops-runlog-test-{}-{seq}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("provision_log.txt");

        {
            let mut log = RunLog::create(&path).expect("create log");
            log.append("CREATED: alice (Alice Ant) Dept=IT").expect("append");
        }
        {
            let mut log = RunLog::create(&path).expect("recreate log");
            log.append("SKIPPED: alice already exists").expect("append");
        }

        let contents = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(contents, "SKIPPED: alice already exists\n");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
