use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bridge::UserBridge;
use crate::config::{self, AppConfig};
use crate::listener;
use crate::model::status::StatusMapper;
use crate::providers::github::GitHubTarget;
use crate::providers::jira::JiraSource;
use crate::providers::SourceView;
use crate::sync::{EngineOptions, ReconciliationEngine};
use crate::worker::{spawn_worker, PassTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Sync,
    Serve,
    Inspect,
    Help,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CliArgs {
    pub command: Command,
    pub config: Option<PathBuf>,
}

/// Parse `board-bridge <command> [--config <path>]`.
pub fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut command = None;
    let mut config = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => bail!("Missing value for -c/--config flag"),
                }
            }
            "-h" | "--help" | "help" => command = Some(Command::Help),
            "sync" if command.is_none() => command = Some(Command::Sync),
            "serve" if command.is_none() => command = Some(Command::Serve),
            "inspect" if command.is_none() => command = Some(Command::Inspect),
            other => bail!("Unexpected argument '{other}'\n\nRun `board-bridge help` for usage."),
        }
        i += 1;
    }

    Ok(CliArgs {
        command: command.unwrap_or(Command::Help),
        config,
    })
}

pub fn print_help() {
    println!("board-bridge: one-way sync from Jira into a GitHub project board\n");
    println!("USAGE:");
    println!("  board-bridge sync      Run one reconciliation pass and print its report");
    println!("  board-bridge serve     Listen for webhooks and run a pass for each one");
    println!("  board-bridge inspect   Show source epics, their tasks and mapped statuses");
    println!();
    println!("OPTIONS:");
    println!("  -c, --config <path>  Config file (default: ~/.board-bridge/config.toml)");
    println!();
    println!("Set RUST_LOG to tune logging, e.g. RUST_LOG=board_bridge=debug.");
}

fn load(args: &CliArgs) -> Result<AppConfig> {
    let path = args.config.clone().unwrap_or_else(config::default_config_path);
    config::load_config(&path).context("Failed to load configuration")
}

fn jira_source(config: &AppConfig) -> JiraSource {
    JiraSource::new(
        &config.jira.domain,
        &config.jira.email,
        &config.jira.api_token,
        config.jira.project.clone(),
    )
}

fn build_engine(config: &AppConfig) -> Result<ReconciliationEngine> {
    let bridge = UserBridge::load(&config.bridge.mapping).context("Failed to load bridge mapping")?;
    if bridge.is_empty() {
        warn!("bridge mapping is empty, assignees will never be synced");
    } else {
        info!(entries = bridge.len(), "bridge mapping loaded");
    }
    let target = GitHubTarget::new(
        config.github.token.clone(),
        config.github.owner.clone(),
        config.github.repository.clone(),
    );
    let options = EngineOptions {
        board: config.github.project.clone(),
        issue_type: config.github.issue_type.clone(),
        status_field: config.sync.status_field.clone(),
        close_done: config.sync.close_done,
    };
    Ok(ReconciliationEngine::new(
        Arc::new(jira_source(config)),
        Arc::new(target),
        bridge,
        options,
    ))
}

pub async fn handle_sync(args: &CliArgs) -> Result<()> {
    let config = load(args)?;
    let engine = build_engine(&config)?;
    let report = engine.run_pass().await.context("Reconciliation pass failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn handle_serve(args: &CliArgs) -> Result<()> {
    let config = load(args)?;
    let engine = Arc::new(build_engine(&config)?);
    let addr: SocketAddr = format!("{}:{}", config.listener.host, config.listener.port)
        .parse()
        .context("Invalid listener address")?;

    let tls = match config.listener.tls_files() {
        Some((cert, key)) => {
            Some(listener::load_tls(cert, key).context("Failed to load listener certificate")?)
        }
        None => None,
    };

    let (queue, _worker) = spawn_worker(engine, config.listener.queue_capacity);
    queue.enqueue(PassTrigger::new("startup"))?;
    listener::serve(addr, queue, tls).await
}

pub async fn handle_inspect(args: &CliArgs) -> Result<()> {
    let config = load(args)?;
    let source = jira_source(&config);

    for epic in source.list_epics().await? {
        println!("[{}] {}", epic.id, epic.title);
        for task in source.epic_tasks(&epic.id).await? {
            let status = match StatusMapper::map(&task.status) {
                Ok(mapped) => mapped.to_string(),
                Err(_) => format!("unmapped ({})", task.status),
            };
            let assignee = task
                .assignee
                .as_ref()
                .map(|a| a.display_name.as_str())
                .unwrap_or("unassigned");
            println!("  [{}] {} | {status}, {assignee}", task.id, task.title);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_prints_help() {
        let parsed = parse_args(&args(&[])).unwrap();
        assert_eq!(parsed.command, Command::Help);
        assert_eq!(parsed.config, None);
    }

    #[test]
    fn parse_sync_with_config() {
        let parsed = parse_args(&args(&["sync", "--config", "/etc/bridge.toml"])).unwrap();
        assert_eq!(parsed.command, Command::Sync);
        assert_eq!(parsed.config, Some(PathBuf::from("/etc/bridge.toml")));
    }

    #[test]
    fn config_flag_may_come_first() {
        let parsed = parse_args(&args(&["-c", "bridge.toml", "serve"])).unwrap();
        assert_eq!(parsed.command, Command::Serve);
        assert_eq!(parsed.config, Some(PathBuf::from("bridge.toml")));
    }

    #[test]
    fn parse_inspect() {
        assert_eq!(parse_args(&args(&["inspect"])).unwrap().command, Command::Inspect);
    }

    #[test]
    fn missing_config_value_fails() {
        let err = parse_args(&args(&["sync", "--config"])).unwrap_err();
        assert!(err.to_string().contains("Missing value"));
    }

    #[test]
    fn second_command_is_rejected() {
        let err = parse_args(&args(&["sync", "serve"])).unwrap_err();
        assert!(err.to_string().contains("Unexpected argument 'serve'"));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        assert!(parse_args(&args(&["--dry-run"])).is_err());
    }
}
