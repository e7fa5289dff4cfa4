use crate::api::{api_base_from_ws, ApiError};
use agentview_core::diff::FoldConfig;
use clap::Parser;
use url::Url;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3333/ws";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "agentview-client", about = "Terminal viewer for agentview tabs")]
pub struct Args {
    /// Websocket endpoint of the hub.
    #[arg(long, default_value = "")]
    pub url: String,
    /// HTTP base of the hub; derived from --url when empty.
    #[arg(long, default_value = "")]
    pub api: String,
    #[arg(long, default_value = "")]
    pub log_dir: String,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    #[arg(long, default_value_t = 8)]
    pub fold_threshold: usize,
    #[arg(long, default_value_t = 3)]
    pub fold_context: usize,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws_url: Url,
    pub api_base: Url,
    pub log_dir: String,
    pub log_stdout: bool,
    pub debug: bool,
    pub fold: FoldConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid url {value:?}: {reason}")]
    Url { value: String, reason: String },
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ClientConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let ws_url = parse_url(&resolve_url(&args.url))?;
        let api_base = match resolve_api(&args.api) {
            Some(api) => parse_url(&api)?,
            None => api_base_from_ws(&ws_url)?,
        };
        Ok(Self {
            ws_url,
            api_base,
            log_dir: resolve_log_dir(&args.log_dir),
            log_stdout: env_true("AGENTVIEW_LOG_STDOUT"),
            debug: args.debug || env_true("AGENTVIEW_DEBUG"),
            fold: FoldConfig {
                threshold: args.fold_threshold,
                context: args.fold_context,
            },
        })
    }
}

fn parse_url(value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|err| ConfigError::Url {
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn resolve_url(flag: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.trim().to_string();
    }
    if let Some(value) = non_empty_env("AGENTVIEW_URL") {
        return value;
    }
    if let Some(addr) = non_empty_env("AGENTVIEW_ADDR") {
        return format!("ws://{}/ws", addr.trim());
    }
    DEFAULT_WS_URL.to_string()
}

fn resolve_api(flag: &str) -> Option<String> {
    if !flag.trim().is_empty() {
        return Some(flag.trim().to_string());
    }
    non_empty_env("AGENTVIEW_API")
}

fn resolve_log_dir(flag: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var("AGENTVIEW_LOG_DIR") {
        return value;
    }
    ".agentview/logs".to_string()
}
