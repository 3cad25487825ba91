//! Error types for telega

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Telega error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device path is invalid or busy
    #[error("Could not open port {port}: {reason}")]
    PortOpen { port: String, reason: String },

    /// A command was issued before the port was opened
    #[error("Port {0} is not open")]
    PortNotOpen(String),

    /// The device stopped answering mid-session
    #[error("Device on {0} disconnected")]
    Disconnected(String),

    /// Command name with no known wire encoding
    #[error("Unrecognized command `{0}`")]
    UnrecognizedCommand(String),

    /// The device rejected a command or did not answer in time
    #[error("Command `{command}` was not acknowledged, received {received:02X?}")]
    CommandNotAcknowledged { command: String, received: Vec<u8> },

    /// Frame or sentence checksum did not match its contents
    #[error("Checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    ChecksumMismatch { computed: u8, received: u8 },

    /// The session log could not be created
    #[error("Could not create log file {path:?}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The port was not returned by the previous session's reader
    #[error("Port is unavailable; the previous reader did not release it")]
    PortUnavailable,

    /// A command was sent while the pipeline is idle
    #[error("Pipeline is not active")]
    NotActive,

    /// An actor exited before it could take a request
    #[error("{0} actor has stopped")]
    ActorStopped(&'static str),

    /// An actor thread panicked
    #[error("{0} actor panicked")]
    ActorPanicked(&'static str),

    /// An actor did not exit within the join timeout and was detached
    #[error("{0} actor did not exit in time and was detached")]
    ActorUnresponsive(&'static str),

    /// Logging setup failed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
