use acd_core::is_valid_project_name;
use acd_sync::{ReconnectPolicy, RestProjectApi, SyncClient, SyncConfig, WsConnector};
use clap::Parser;
use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;
use url::Url;

mod command;
mod render;

use command::{parse_command, Command, HELP};
use render::Renderer;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8888";

#[derive(Parser, Debug)]
#[command(name = "acd-watch", about = "Follow a project's agent live from the terminal")]
struct Args {
    /// Dashboard origin; falls back to ACD_BASE_URL.
    #[arg(long, default_value = "")]
    base_url: String,
    #[arg(long, default_value_t = 30)]
    heartbeat_interval: u64,
    #[arg(long, default_value_t = 3)]
    reconnect_delay: u64,
    /// Switch to doubling backoff capped at this many seconds.
    #[arg(long)]
    backoff_max: Option<u64>,
    #[arg(long)]
    no_pong_timeout: bool,
    #[arg(long)]
    no_reconcile: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
    /// Project to follow; falls back to ACD_PROJECT.
    project: Option<String>,
}

#[derive(Debug, Clone)]
struct RuntimeConfig {
    project: String,
    sync: SyncConfig,
    log_dir: String,
    log_stdout: bool,
}

struct LogGuard {
    file: Option<Arc<StdMutex<std::fs::File>>>,
}

struct MultiWriter {
    stderr_enabled: bool,
    file: Option<Arc<StdMutex<std::fs::File>>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match load_config(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("acd-watch: {err}");
            std::process::exit(2);
        }
    };
    let _log_guard = init_logging(&config);
    info!(
        "acd_watch_start: project={} origin={}",
        config.project, config.sync.origin
    );

    let api = RestProjectApi::new(config.sync.origin.clone());
    let mut client = SyncClient::new(config.sync.clone(), Arc::new(WsConnector)).with_api(Arc::new(api));
    client.connect(&config.project)?;

    let mut updates = client.subscribe();
    let mut renderer = Renderer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    print_lines(&mut stdout, renderer.render(&updates.borrow_and_update()));
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let rendered = renderer.render(&updates.borrow_and_update());
                print_lines(&mut stdout, rendered);
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        warn!("stdin_read_error: {err}");
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => run_command(&mut client, command, &mut stdout).await,
                    Ok(None) => {}
                    Err(message) => print_lines(&mut stdout, vec![message]),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown().await;
    info!("acd_watch_stop");
    Ok(())
}

async fn run_command(client: &mut SyncClient, command: Command, out: &mut io::Stdout) {
    let note = match command {
        Command::Answer(answer) => match client.answer_question(&answer).await {
            Ok(()) => "answer sent".to_string(),
            Err(err) => {
                warn!("answer_failed: {err}");
                format!("answer failed: {err}")
            }
        },
        Command::ClearLogs => {
            client.clear_logs();
            "logs cleared".to_string()
        }
        Command::Dismiss => {
            if client.clear_pending_question() {
                "question dismissed".to_string()
            } else {
                "no question pending".to_string()
            }
        }
        Command::Reconnect => match client.reconnect().await {
            Ok(()) => "reconnecting".to_string(),
            Err(err) => format!("reconnect failed: {err}"),
        },
        Command::Project(name) => {
            if !is_valid_project_name(&name) {
                format!("invalid project name: {name}")
            } else {
                match client.connect(&name) {
                    Ok(()) => format!("following {name}"),
                    Err(err) => {
                        error!("project_switch_failed: {err}");
                        format!("switch failed: {err}")
                    }
                }
            }
        }
        Command::Help => HELP.to_string(),
        Command::Quit => return,
    };
    print_lines(out, vec![note]);
}

fn print_lines(out: &mut io::Stdout, lines: Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let mut handle = out.lock();
    for line in lines {
        let _ = writeln!(handle, "{line}");
    }
    let _ = handle.flush();
}

fn load_config(args: Args) -> Result<RuntimeConfig, String> {
    let project = resolve_project(args.project.as_deref())?;
    let origin = resolve_base_url(&args.base_url)?;
    if args.heartbeat_interval == 0 {
        return Err("--heartbeat-interval must be at least 1 second".to_string());
    }
    let reconnect_delay = Duration::from_secs(args.reconnect_delay);
    let reconnect = match args.backoff_max {
        Some(max) => ReconnectPolicy::Backoff {
            initial: reconnect_delay.max(Duration::from_secs(1)),
            max: Duration::from_secs(max.max(1)),
            jitter: true,
        },
        None => ReconnectPolicy::Fixed(reconnect_delay),
    };
    let mut sync = SyncConfig::new(origin)
        .with_heartbeat_interval(Duration::from_secs(args.heartbeat_interval))
        .with_reconnect(reconnect)
        .with_reconcile_on_reconnect(!args.no_reconcile);
    if args.no_pong_timeout {
        sync = sync.with_pong_timeout(None);
    }
    Ok(RuntimeConfig {
        project,
        sync,
        log_dir: resolve_log_dir(&args.log_dir),
        log_stdout: resolve_log_stdout(),
    })
}

fn resolve_project(flag: Option<&str>) -> Result<String, String> {
    let project = match flag.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.to_string(),
        None => env::var("ACD_PROJECT")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| "missing project name (argument or ACD_PROJECT)".to_string())?,
    };
    if !is_valid_project_name(&project) {
        return Err(format!(
            "invalid project name {project:?}: use 1-50 letters, digits, '-' or '_'"
        ));
    }
    Ok(project)
}

fn resolve_base_url(flag: &str) -> Result<Url, String> {
    let raw = if !flag.trim().is_empty() {
        flag.trim().to_string()
    } else if let Ok(value) = env::var("ACD_BASE_URL") {
        if value.trim().is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            value.trim().to_string()
        }
    } else {
        DEFAULT_BASE_URL.to_string()
    };
    let url = Url::parse(&raw).map_err(|err| format!("invalid base url {raw:?}: {err}"))?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(url),
        other => Err(format!("unsupported base url scheme: {other}")),
    }
}

fn resolve_log_dir(flag: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = env::var("ACD_LOG_DIR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    ".acd/logs".to_string()
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_log_stdout() -> bool {
    env::var("ACD_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}

fn init_logging(config: &RuntimeConfig) -> Option<LogGuard> {
    let level = env::var("ACD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match open_log_file(&config.log_dir, &config.project) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let stderr_enabled = config.log_stdout;
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone(), stderr_enabled));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

impl MultiWriter {
    fn new(file: Option<Arc<StdMutex<std::fs::File>>>, stderr_enabled: bool) -> Self {
        Self {
            stderr_enabled,
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // stderr keeps the rendered view on stdout clean
        if self.stderr_enabled {
            let _ = io::stderr().write_all(buf);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.stderr_enabled {
            let _ = io::stderr().flush();
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str, project: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("acd-watch-{}.log", sanitize_component(project)));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(LogGuard {
        file: Some(Arc::new(StdMutex::new(file))),
    })
}

fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
