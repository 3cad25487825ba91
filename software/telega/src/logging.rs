//! Terminal and text-file logging through `tracing`.
//!
//! The terminal shows what `RUST_LOG` selects (default `info`). The op's text
//! log always records down to `debug`, which is where log-only device messages
//! end up. The subscriber is installed once per process; each op after that
//! only moves the file output.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

use crate::error::{Error, Result};

type OpLogLayer = fmt::Layer<
    Registry,
    fmt::format::DefaultFields,
    fmt::format::Format<fmt::format::Full, fmt::time::ChronoUtc>,
    NonBlocking,
>;

/// Level recorded in the op's text log regardless of `RUST_LOG`
const OP_LOG_LEVEL: LevelFilter = LevelFilter::DEBUG;

static OP_LOG: OnceLock<OpLog> = OnceLock::new();

/// The op log file currently written to.
struct OpLogFile {
    path: PathBuf,
    // Flushes the file when replaced
    _guard: WorkerGuard,
}

/// Handles of the installed subscriber
struct OpLog {
    _terminal: WorkerGuard,
    current: Mutex<OpLogFile>,
    reload: reload::Handle<OpLogLayer, Registry>,
}

impl OpLog {
    fn path(&self) -> PathBuf {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .path
            .clone()
    }

    /// Move file output to `path` unless it is already going there.
    fn point_at(&self, path: PathBuf) -> Result<()> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.path == path {
            return Ok(());
        }
        let (writer, guard) = tracing_appender::non_blocking(open_append(&path)?);
        self.reload
            .modify(|layer| *layer = op_log_layer(writer))
            .map_err(|e| Error::Logging(format!("could not move log to {path:?}: {e}")))?;
        *current = OpLogFile {
            path,
            _guard: guard,
        };
        Ok(())
    }
}

fn op_log_layer(writer: NonBlocking) -> OpLogLayer {
    fmt::layer::<Registry>()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(writer)
        .with_ansi(false)
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Logging(format!("could not open {path:?}: {e}")))
}

/// `{op_dir}/logs/{op_name}.log`, creating the directory.
fn op_log_path(op_dir: &Path, op_name: &str) -> Result<PathBuf> {
    let dir = op_dir.join("logs");
    fs::create_dir_all(&dir)
        .map_err(|e| Error::Logging(format!("could not create {dir:?}: {e}")))?;
    Ok(dir.join(format!("{op_name}.log")))
}

/// Log to the terminal and to the op's text log, returning the log's path.
///
/// Calling this again for the same op keeps writing to the open file.
pub fn init_logging(op_dir: &Path, op_name: &str) -> Result<PathBuf> {
    let path = op_log_path(op_dir, op_name)?;

    if let Some(log) = OP_LOG.get() {
        log.point_at(path.clone())?;
        return Ok(path);
    }

    let terminal_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::Logging(format!("bad log filter: {e}")))?;
    let (terminal_writer, terminal_guard) = tracing_appender::non_blocking(std::io::stdout());
    let terminal = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(terminal_writer)
        .with_target(false)
        .with_filter(terminal_filter);

    let (file_writer, file_guard) = tracing_appender::non_blocking(open_append(&path)?);
    let (file, reload) = reload::Layer::<OpLogLayer, Registry>::new(op_log_layer(file_writer));

    tracing_subscriber::registry()
        .with(file.with_filter(OP_LOG_LEVEL))
        .with(terminal)
        .try_init()
        .map_err(|e| Error::Logging(format!("could not install subscriber: {e}")))?;

    let _ = OP_LOG.set(OpLog {
        _terminal: terminal_guard,
        current: Mutex::new(OpLogFile {
            path: path.clone(),
            _guard: file_guard,
        }),
        reload,
    });
    Ok(path)
}

/// Text log currently receiving output, if logging was set up.
pub fn current_log_file() -> Option<PathBuf> {
    OP_LOG.get().map(OpLog::path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_log_follows_the_op_and_records_debug() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        let a = init_logging(first.path(), "op_a").unwrap();
        assert_eq!(a, first.path().join("logs").join("op_a.log"));
        assert_eq!(current_log_file(), Some(a.clone()));
        tracing::debug!("op_a debug line");

        // Same op again keeps the file
        assert_eq!(init_logging(first.path(), "op_a").unwrap(), a);
        assert_eq!(current_log_file(), Some(a.clone()));

        let b = init_logging(second.path(), "op_b").unwrap();
        assert_eq!(b, second.path().join("logs").join("op_b.log"));
        assert_eq!(current_log_file(), Some(b.clone()));
        assert!(b.exists());

        // Moving on flushed the first file
        let text = fs::read_to_string(&a).unwrap();
        assert!(text.contains("op_a debug line"), "{text}");
        assert!(text.contains("DEBUG"));
    }

    #[test]
    fn unusable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let err = init_logging(&blocker, "op").unwrap_err();
        assert!(matches!(err, Error::Logging(_)));
    }
}
