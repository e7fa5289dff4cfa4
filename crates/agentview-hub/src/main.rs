mod git;
mod handlers;
mod hub;
mod state;
mod watch;

use agentview_core::protocol::CreateTabRequest;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use hub::{HubConfig, HubState};
use std::{
    fs::OpenOptions,
    io::{self, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};
use watch::FileWatcher;

const DEFAULT_ADDR: &str = "127.0.0.1:3333";
const DEFAULT_LOG_DIR: &str = ".agentview/logs";
/// Id of the tab opened from the command line.
const INITIAL_TAB_ID: &str = "initial";

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    debug: bool,
    ping_interval: Duration,
    write_timeout: Duration,
    log_dir: String,
    initial_file: Option<String>,
    initial_title: String,
    initial_type: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "agentview-hub", about = "Serves tabs to agentview clients")]
struct Args {
    /// File to open as the first tab.
    file: Option<String>,
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value_t = 30)]
    ping_interval: u64,
    #[arg(long, default_value_t = 10)]
    write_timeout: u64,
    #[arg(long, default_value = "")]
    log_dir: String,
    /// Title of the initial tab (defaults to the file name).
    #[arg(long, default_value = "")]
    title: String,
    /// Type of the initial tab (detected from the file when omitted).
    #[arg(long = "type")]
    tab_type: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(Args::parse());
    let _log_guard = init_logging(&config);
    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            anyhow::bail!("invalid address {}: {err}", config.addr);
        }
    };
    if !addr.ip().is_loopback() {
        error!(event = "invalid_addr", addr = %config.addr);
        anyhow::bail!("refusing to listen on non-loopback address {addr}");
    }

    let (watcher, changes) = match FileWatcher::new() {
        Ok((watcher, changes)) => (Some(watcher), Some(changes)),
        Err(err) => {
            warn!(event = "watcher_unavailable", error = %err);
            (None, None)
        }
    };
    let hub = Arc::new(HubState::new(
        HubConfig {
            debug: config.debug,
            ping_interval: config.ping_interval,
            write_timeout: config.write_timeout,
        },
        watcher,
    ));
    if let Some(changes) = changes {
        tokio::spawn(watch::run_reload(hub.clone(), changes, watch::DEFAULT_DEBOUNCE));
    }
    if let Some(request) = initial_request(&config) {
        match handlers::prepare_tab(request).await {
            Ok(prepared) => {
                hub.upsert_tab(prepared.tab, prepared.source.as_deref()).await;
            }
            Err(err) => {
                error!(event = "initial_tab_failed", error = ?err);
                anyhow::bail!("cannot open initial tab: {err:?}");
            }
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        error!(event = "hub_error", error = %err);
        err
    })?;
    info!(event = "hub_start", addr = %config.addr, version = env!("CARGO_PKG_VERSION"));

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = axum::serve(
        listener,
        router(hub.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        error!(event = "hub_error", error = %err);
    }
    let active = hub.store().read().await.active_id().map(str::to_string);
    info!(
        event = "hub_stop",
        clients = hub.client_count().await,
        active = ?active
    );
    Ok(())
}

fn router(hub: Arc<HubState>) -> Router {
    Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(|| async { "ok" }))
        .route("/api/status", get(handlers::status))
        .route(
            "/api/tabs",
            get(handlers::list_tabs)
                .post(handlers::create_tab)
                .delete(handlers::clear_tabs),
        )
        .route(
            "/api/tabs/:id",
            get(handlers::get_tab).delete(handlers::delete_tab),
        )
        .route("/api/tabs/:id/activate", post(handlers::activate_tab))
        .with_state(hub)
}

fn initial_request(config: &Config) -> Option<CreateTabRequest> {
    let file = config.initial_file.clone()?;
    Some(CreateTabRequest {
        id: Some(INITIAL_TAB_ID.to_string()),
        title: config.initial_title.clone(),
        tab_type: config.initial_type.clone(),
        file: Some(file),
        ..CreateTabRequest::default()
    })
}

fn load_config(args: Args) -> Config {
    let debug = args.debug || env_true("AGENTVIEW_DEBUG");
    Config {
        addr: resolve_addr(&args.addr),
        debug,
        ping_interval: Duration::from_secs(args.ping_interval),
        write_timeout: Duration::from_secs(args.write_timeout),
        log_dir: resolve_log_dir(&args.log_dir),
        initial_file: args.file.filter(|file| !file.trim().is_empty()),
        initial_title: args.title,
        initial_type: args.tab_type,
    }
}

fn init_logging(config: &Config) -> Option<LogGuard> {
    let level = match std::env::var("AGENTVIEW_LOG_LEVEL") {
        Ok(level) if !level.trim().is_empty() => level,
        _ if config.debug => "debug".to_string(),
        _ => "info".to_string(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match open_log_file(&config.log_dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

struct MultiWriter {
    stdout: io::Stdout,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<std::fs::File>>>) -> Self {
        Self {
            stdout: io::stdout(),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stdout.write_all(buf);
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stdout.flush();
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = file.flush();
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    if std::fs::create_dir_all(&dir).is_err() {
        return Ok(LogGuard { file: None });
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("agentview-hub.log"))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    if let Ok(value) = std::env::var("AGENTVIEW_ADDR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    DEFAULT_ADDR.to_string()
}

fn resolve_log_dir(log_dir_flag: &str) -> String {
    if !log_dir_flag.trim().is_empty() {
        return log_dir_flag.to_string();
    }
    if let Ok(value) = std::env::var("AGENTVIEW_LOG_DIR") {
        return value;
    }
    DEFAULT_LOG_DIR.to_string()
}
