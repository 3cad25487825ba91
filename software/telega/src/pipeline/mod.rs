//! Supervisor that owns the actors of an acquisition session.
//!
//! A pipeline is `Idle` until [`Pipeline::start`] spawns the reader, decoder,
//! and collector, and `Active` until [`Pipeline::stop`] has shut all three
//! down. Every session writes its own raw log file.
//!
//! Threads cannot be killed, so stopping the reader and decoder is done by
//! raising their stop flags without waiting for any natural end of stream.
//! Every blocking call in those actors is bounded by the read timeout or the
//! poll interval, so they exit promptly; one that does not exit within the
//! join timeout is detached and reported.

pub mod context;
pub(crate) mod nonblocking;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{Sender, unbounded};
use tracing::{debug, error, info, warn};

use crate::actor::{ActorHandle, DecoderActor, ReaderActor};
use crate::collector::{CRITICAL_TEXT, Collector, CollectorSummary, Listener, NullListener, RawLog};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::link::Port;
use crate::logging::init_logging;

pub use context::PipelineCtx;
use nonblocking::ReadySignal;

/// Label of the session log written during the initial setting
pub const INITIAL_SETTING_LABEL: &str = "Init";

/// How long [`Pipeline::collect_coordinates`] listens by default
pub const DEFAULT_COLLECTION_TIME: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Idle,
    Active,
}

/// Handles of a running session
struct Session {
    control: Sender<String>,
    reader: ActorHandle<Box<dyn Port>>,
    decoder: ActorHandle<u64>,
    collector: ActorHandle<CollectorSummary>,
    active: Arc<AtomicBool>,
    log_path: PathBuf,
}

/// What a completed session produced
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub log_path: PathBuf,
    pub bytes_decoded: u64,
    pub collector: CollectorSummary,
}

pub struct Pipeline {
    ctx: PipelineCtx,
    port: Option<Box<dyn Port>>,
    listener: Arc<dyn Listener>,
    session: Option<Session>,
    sessions_started: u64,
    last_report: Option<SessionReport>,
}

impl Pipeline {
    pub fn new(ctx: PipelineCtx, port: Box<dyn Port>) -> Self {
        Self {
            ctx,
            port: Some(port),
            listener: Arc::new(NullListener),
            session: None,
            sessions_started: 0,
            last_report: None,
        }
    }

    /// Set the receiver of decoded values, messages and errors.
    /// Takes effect at the next `start`.
    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn ctx(&self) -> &PipelineCtx {
        &self.ctx
    }

    pub fn state(&self) -> PipelineState {
        if self.session.is_some() {
            PipelineState::Active
        } else {
            PipelineState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Raw log of the running session
    pub fn log_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.log_path.as_path())
    }

    /// Outcome of the most recently stopped session
    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    /// Start a session, sending `command` once the port is open.
    ///
    /// Does nothing if a session is already running. Returns the path
    /// of the session's raw log.
    pub fn start(&mut self, command: Option<Command>) -> Result<PathBuf> {
        let label = match command {
            Some(Command::StartInitialSetting) => INITIAL_SETTING_LABEL.to_owned(),
            _ => (self.sessions_started + 1).to_string(),
        };
        self.start_session(command.map(|c| c.name().to_owned()), &label)
    }

    fn start_session(&mut self, command: Option<String>, label: &str) -> Result<PathBuf> {
        if let Some(session) = &self.session {
            debug!("Pipeline already active, ignoring start");
            return Ok(session.log_path.clone());
        }

        if self.ctx.log_to_file {
            if let Err(e) = init_logging(&self.ctx.op_dir, &self.ctx.op_name) {
                // Terminal logging still works
                warn!("File logging unavailable: {e}");
            }
        }

        // Check the port before touching an existing log with the same label
        let port = self.port.take().ok_or(Error::PortUnavailable)?;
        let log_path = self.ctx.session_log_path(label);
        let log = match RawLog::create(&log_path) {
            Ok(log) => log,
            Err(e) => {
                self.port = Some(port);
                return Err(e);
            }
        };
        self.sessions_started += 1;
        info!(
            "Starting {} session on {} with {}, logging to {log_path:?}",
            self.ctx.device,
            port.name(),
            command.as_deref().unwrap_or("no command"),
        );

        let (control_tx, control_rx) = unbounded();
        let (data_tx, data_rx) = unbounded();
        let (decoded_tx, decoded_rx) = unbounded();
        let (duplicate_tx, duplicate_rx) = unbounded();
        let (message_tx, message_rx) = unbounded();

        // Reader, then give it a bounded chance to open the port
        let ready = Arc::new(ReadySignal::default());
        let reader_stop = Arc::new(AtomicBool::new(false));
        let reader = ReaderActor::new(
            port,
            self.ctx.clone(),
            command,
            control_rx,
            data_tx,
            message_tx.clone(),
            reader_stop.clone(),
            ready.clone(),
        );
        let reader = ActorHandle::spawn("reader", reader_stop, move || reader.run());
        let state = ready.wait_ready_or_finished(self.ctx.open_grace);
        if !state.ready && !state.finished {
            warn!(
                "Port not open after {:?}, continuing",
                self.ctx.open_grace
            );
        }

        let decoder_stop = Arc::new(AtomicBool::new(false));
        let decoder = DecoderActor::new(
            self.ctx.device.decoder(),
            data_rx,
            decoded_tx,
            duplicate_tx,
            message_tx,
            decoder_stop.clone(),
            self.ctx.poll_interval,
        );
        let decoder = ActorHandle::spawn("decoder", decoder_stop, move || decoder.run());

        let active = Arc::new(AtomicBool::new(true));
        let collector = Collector::new(
            self.ctx.device,
            decoded_rx,
            message_rx,
            duplicate_rx,
            active.clone(),
            self.listener.clone(),
            log,
            self.ctx.poll_interval,
        );
        // The collector is stopped through `active`, not the stop flag
        let collector = ActorHandle::spawn(
            "collector",
            Arc::new(AtomicBool::new(false)),
            move || collector.run(),
        );

        self.session = Some(Session {
            control: control_tx,
            reader,
            decoder,
            collector,
            active,
            log_path: log_path.clone(),
        });
        Ok(log_path)
    }

    /// Relay a command to the device while a session is running.
    pub fn send_command(&self, command: Command) -> Result<()> {
        self.send_command_name(command.name())
    }

    /// Relay a command by name. Names without a wire encoding
    /// park the reader.
    pub fn send_command_name(&self, name: &str) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NotActive)?;
        session
            .control
            .send(name.to_owned())
            .map_err(|_| Error::ActorStopped("reader"))
    }

    /// Stop the running session, optionally sending `command` first
    /// and waiting for in-flight I/O to settle.
    ///
    /// Does nothing when idle. Failures are reported as critical errors
    /// through tracing and the listener, never returned, so the pipeline
    /// is always idle afterwards.
    pub fn stop(&mut self, command: Option<Command>) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Some(command) = command {
            if session.control.send(command.name().to_owned()).is_ok() {
                thread::sleep(self.ctx.settle_grace);
            } else {
                debug!("Reader already gone, not sending {command}");
            }
        }

        let mut report = SessionReport {
            log_path: session.log_path.clone(),
            ..Default::default()
        };
        let timeout = self.ctx.join_timeout;
        let poll = self.ctx.poll_interval;

        // The reader must be gone before the decoder is told to stop:
        // a byte from a read in flight would otherwise miss the log
        session.reader.stop();
        match session.reader.join_timeout(timeout, poll) {
            Ok(port) => self.port = Some(port),
            Err(e) => self.report_critical(&e),
        }
        session.decoder.stop();
        match session.decoder.join_timeout(timeout, poll) {
            Ok(n) => report.bytes_decoded = n,
            Err(e) => self.report_critical(&e),
        }

        // Let the collector drain what is left and close the log
        session.active.store(false, Ordering::Relaxed);
        match session.collector.join_timeout(timeout, poll) {
            Ok(summary) => report.collector = summary,
            Err(e) => self.report_critical(&e),
        }

        info!(
            "Stopped {} session: {} bytes decoded, {} bytes logged to {:?}",
            self.ctx.device, report.bytes_decoded, report.collector.bytes_logged, report.log_path
        );
        self.last_report = Some(report);
    }

    /// The collector may be gone by now, so report directly.
    fn report_critical(&self, err: &Error) {
        error!("{}: critical: {err}", self.ctx.device);
        self.listener.on_error(self.ctx.device.tag(), CRITICAL_TEXT);
    }

    /// Start the board's initial setting, logging to the `Init` session file.
    pub fn start_initial_setting(&mut self) -> Result<PathBuf> {
        self.start_session(
            Some(Command::StartInitialSetting.name().to_owned()),
            INITIAL_SETTING_LABEL,
        )
    }

    /// End the initial-setting session, typically after the board has echoed
    /// `stop_InitialSetting`.
    pub fn stop_initial_setting(&mut self) {
        self.stop(None);
    }

    /// Start measuring, logging to a session file labeled with `data_type`.
    pub fn start_measuring(&mut self, data_type: &str) -> Result<PathBuf> {
        self.start_session(Some(Command::StartMeasuring.name().to_owned()), data_type)
    }

    /// Tell the board to stop measuring, then stop the session.
    pub fn stop_measuring(&mut self) {
        self.stop(Some(Command::StopMeasuring));
    }

    /// Restart the board: relay the command to a running session or start a
    /// short session for it, give the board time to act, then stop.
    pub fn restart(&mut self) -> Result<()> {
        if self.is_active() {
            self.send_command(Command::Restart)?;
        } else {
            self.start_session(Some(Command::Restart.name().to_owned()), "Restart")?;
        }
        thread::sleep(self.ctx.restart_grace);
        self.stop(None);
        Ok(())
    }

    /// Listen to the GPS module for `duration`, then stop.
    /// Sentences reach the listener as they are decoded.
    pub fn collect_coordinates(&mut self, duration: Duration) -> Result<SessionReport> {
        self.start(None)?;
        thread::sleep(duration);
        self.stop(None);
        self.last_report.clone().ok_or(Error::NotActive)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop(None);
    }
}
