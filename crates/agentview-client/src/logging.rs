use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

/// Keeps the log file handle alive for the life of the process.
pub struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl LogGuard {
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }
}

struct MultiWriter {
    stdout_enabled: bool,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stdout_enabled {
            let _ = io::stdout().write_all(buf);
        }
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|err| err.into_inner());
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.stdout_enabled {
            let _ = io::stdout().flush();
        }
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|err| err.into_inner());
            let _ = file.flush();
        }
        Ok(())
    }
}

/// `RUST_LOG` wins, then `AGENTVIEW_LOG_LEVEL`, then `debug`/`info`.
pub fn filter_directive(debug: bool) -> String {
    if let Ok(level) = std::env::var("AGENTVIEW_LOG_LEVEL") {
        if !level.trim().is_empty() {
            return level;
        }
    }
    if debug { "debug" } else { "info" }.to_string()
}

pub fn init_logging(log_dir: &str, debug: bool, stdout_enabled: bool) -> Option<LogGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(debug)));
    let guard = match open_log_file(log_dir, "client") {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter {
        stdout_enabled,
        file: file.clone(),
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_ansi(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn open_log_file(log_dir: &str, component: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    if std::fs::create_dir_all(&dir).is_err() {
        return Ok(LogGuard { file: None });
    }
    let path = dir.join(format!("agentview-{component}.log"));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_dir_disables_file() {
        let guard = open_log_file("  ", "client").expect("guard");
        assert!(!guard.has_file());
    }

    #[test]
    fn log_file_is_named_after_component() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logs = dir.path().join("logs");
        let guard = open_log_file(logs.to_str().expect("utf8"), "client").expect("guard");
        assert!(guard.has_file());
        assert!(logs.join("agentview-client.log").exists());
    }
}
