use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::config::EffectiveConfig;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "winops",
    version,
    about = "Windowsワークステーションの定常運用（アカウントの一括作成・一括削除・健全性レポート）を行う"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Provision(ProvisionArgs),
    Cleanup(CleanupArgs),
    Health(HealthArgs),
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ProvisionArgs {
    #[arg(long)]
    pub csv: Option<PathBuf>,
    #[arg(long)]
    pub log: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CleanupArgs {
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct HealthArgs {
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;
    let env_config_path = std::env::var_os("WINOPS_CONFIG").map(PathBuf::from);
    let mut cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;

    let ui_cfg = UiConfig {
        quiet: cli.quiet,
        verbose: cli.verbose,
        stderr_is_tty,
    };
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Provision(args) => {
            if cli.json {
                return Err(crate::exit::invalid_args(
                    "provision は --json と併用できません",
                ));
            }
            if let Some(csv) = args.csv {
                cfg.provision.csv_path = csv;
            }
            if let Some(log) = args.log {
                cfg.provision.log_path = log;
            }
            run_provision(&cfg, &ui_cfg, timeout)?;
        }
        Commands::Cleanup(args) => {
            if cli.json {
                return Err(crate::exit::invalid_args(
                    "cleanup は --json と併用できません",
                ));
            }
            if let Some(csv) = args.csv {
                cfg.cleanup.csv_path = csv;
            }
            run_cleanup(&cfg, &ui_cfg, timeout)?;
        }
        Commands::Health(args) => {
            if let Some(out_dir) = args.out_dir {
                cfg.health.output_dir = out_dir;
            }
            run_health(&cfg, &ui_cfg, cli.json, timeout)?;
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "winops", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    let stdout = io::stdout();
                    serde_json::to_writer_pretty(stdout.lock(), &cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: `winops config --show` を使用してください");
            }
        }
    }

    Ok(())
}

fn run_provision(cfg: &EffectiveConfig, ui: &UiConfig, timeout: Duration) -> Result<()> {
    let records = crate::roster::read_user_records(&cfg.provision.csv_path)?;
    if ui.verbose && !ui.quiet {
        eprintln!("処理対象: {} 件", records.len());
    }

    let mut directory = account_directory(timeout)?;
    let policy = crate::provision::CredentialPolicy::from_config(&cfg.provision);
    let mut log = crate::provision::RunLog::create(&cfg.provision.log_path)?;

    for record in &records {
        let outcome = crate::provision::process_record(directory.as_mut(), record, &policy);
        let line = outcome.to_string();
        if !ui.quiet {
            println!("{line}");
        }
        log.append(&line)?;
    }

    Ok(())
}

fn run_cleanup(cfg: &EffectiveConfig, ui: &UiConfig, timeout: Duration) -> Result<()> {
    let usernames = crate::roster::read_cleanup_usernames(&cfg.cleanup.csv_path)?;
    if ui.verbose && !ui.quiet {
        eprintln!("処理対象: {} 件", usernames.len());
    }

    let mut directory = account_directory(timeout)?;
    let mut profiles = profile_store(timeout)?;

    for username in &usernames {
        for outcome in crate::cleanup::process_entry(directory.as_mut(), profiles.as_mut(), username)
        {
            if !ui.quiet {
                println!("{outcome}");
            }
        }
    }

    Ok(())
}

fn run_health(cfg: &EffectiveConfig, ui: &UiConfig, json: bool, timeout: Duration) -> Result<()> {
    let mut metrics = crate::platform::metrics::SysinfoMetrics::new();
    let audit = security_audit_log(timeout);
    let net = crate::platform::net::CommandNetworkProbe::new(
        timeout,
        cfg.health.public_ip_url.clone(),
    );
    let identity = crate::platform::local_identity();
    let opts = crate::health::HealthOptions {
        probe_host: cfg.health.probe_host.clone(),
        latency_samples: cfg.health.latency_samples,
    };

    let spinner = if ui.stderr_is_tty && !ui.quiet && !json {
        let s = indicatif::ProgressBar::new_spinner();
        s.set_message("計測中...");
        s.enable_steady_tick(Duration::from_millis(120));
        Some(s)
    } else {
        None
    };

    let snapshot = crate::health::collect(&mut metrics, &audit, &net, &identity, &opts);

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if json {
        write_json(&snapshot)?;
    } else if !ui.quiet {
        print!("{}", crate::health::render_text(&snapshot));
    }

    let (text_path, csv_path) = crate::health::write_reports(&cfg.health.output_dir, &snapshot)?;
    if !ui.quiet && !json {
        println!();
        println!("レポート: {}", text_path.display());
        println!("CSV: {}", csv_path.display());
    }

    Ok(())
}

#[cfg(windows)]
fn account_directory(timeout: Duration) -> Result<Box<dyn crate::accounts::AccountDirectory>> {
    Ok(Box::new(crate::platform::windows::NetUserDirectory::new(
        timeout,
    )))
}

#[cfg(not(windows))]
fn account_directory(_timeout: Duration) -> Result<Box<dyn crate::accounts::AccountDirectory>> {
    Err(crate::exit::invalid_args(
        "アカウント操作は Windows のみ対応です（net user を使用します）",
    ))
}

#[cfg(windows)]
fn profile_store(timeout: Duration) -> Result<Box<dyn crate::accounts::ProfileStore>> {
    Ok(Box::new(crate::platform::windows::CimProfileStore::new(
        timeout,
    )))
}

#[cfg(not(windows))]
fn profile_store(_timeout: Duration) -> Result<Box<dyn crate::accounts::ProfileStore>> {
    Err(crate::exit::invalid_args(
        "プロファイル操作は Windows のみ対応です（Win32_UserProfile を使用します）",
    ))
}

#[cfg(windows)]
fn security_audit_log(timeout: Duration) -> impl crate::health::SecurityAuditLog {
    crate::platform::windows::SecurityEventLog::new(timeout)
}

#[cfg(not(windows))]
fn security_audit_log(_timeout: Duration) -> impl crate::health::SecurityAuditLog {
    UnsupportedAuditLog
}

#[cfg(not(windows))]
struct UnsupportedAuditLog;

#[cfg(not(windows))]
impl crate::health::SecurityAuditLog for UnsupportedAuditLog {
    fn failed_logons_since(&self, _window: Duration) -> Result<u64> {
        Err(anyhow::anyhow!(
            "Security イベントログはこのOSでは参照できません"
        ))
    }
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        "powershell" => Ok(clap_complete::Shell::PowerShell),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish|powershell を指定してください）"
        ))),
    }
}
