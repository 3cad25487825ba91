//! Information about the current acquisition op
//! that may be used by the pipeline's actors and ports.

use std::default::Default;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

use crate::device::DeviceKind;

/// Operation context for a pipeline
#[derive(Serialize, Deserialize, Clone, Debug)]
#[non_exhaustive]
pub struct PipelineCtx {
    /// Which protocol the port speaks
    pub device: DeviceKind,

    /// Serial baud rate, or `None` for the device's default
    pub baud_rate: Option<u32>,

    /// Bound on a single-byte read, which is also the longest the reader
    /// can go without checking for commands and stop requests
    pub read_timeout: Duration,

    /// How long `start` waits for the reader to open the port
    pub open_grace: Duration,

    /// How long `stop` waits after sending a stop command
    /// for in-flight I/O to settle
    pub settle_grace: Duration,

    /// How long `restart` waits for the board to act on the command
    pub restart_grace: Duration,

    /// Bound on joining each actor during `stop`;
    /// actors still running after this are detached
    pub join_timeout: Duration,

    /// Channel poll interval of the decoder and collector
    pub poll_interval: Duration,

    /// A name for this op,
    /// which will be used as the prefix of each session log file
    /// and must be compatible with that use.
    pub op_name: String,

    /// A directory to place session logs and text logs.
    pub op_dir: PathBuf,

    /// Also write tracing output to `{op_dir}/logs/{op_name}.log`
    pub log_to_file: bool,
}

impl PipelineCtx {
    pub fn new(device: DeviceKind) -> Self {
        Self {
            device,
            ..Default::default()
        }
    }

    /// Baud rate to open the port with.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
            .unwrap_or_else(|| self.device.default_baud_rate())
    }

    /// Path of the raw log for one session.
    pub fn session_log_path(&self, label: &str) -> PathBuf {
        self.op_dir.join(format!(
            "{}_{}_{}.{}",
            self.op_name,
            self.device.tag(),
            label,
            self.device.log_extension()
        ))
    }
}

impl Default for PipelineCtx {
    fn default() -> Self {
        // Use current time with seconds as op name and use working directory as op dir,
        // replacing characters in the name that would be invalid on Windows.
        let op_name = DateTime::<Utc>::from(SystemTime::now())
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            .replace(":", "");
        Self {
            device: DeviceKind::default(),
            baud_rate: None,
            read_timeout: Duration::from_millis(100),
            open_grace: Duration::from_millis(500),
            settle_grace: Duration::from_millis(500),
            restart_grace: Duration::from_millis(400),
            join_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            op_name,
            op_dir: std::fs::canonicalize("./").unwrap_or_default(),
            log_to_file: false,
        }
    }
}
