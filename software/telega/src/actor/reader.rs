//! Reader actor that owns the serial port on its own thread.
//!
//! The reader opens the port, relays operator commands to the device, and
//! forwards every byte it reads to the decoder. Commands are checked without
//! blocking before each timeout-bounded read, so a command or a stop request is
//! acted on within one read timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam::channel::{Receiver, Sender, TryRecvError};
use tracing::debug;

use super::post;
use crate::command::Behavior;
use crate::error::Error;
use crate::link::{DeviceLink, Port, ReadOutcome};
use crate::message::Message;
use crate::pipeline::PipelineCtx;
use crate::pipeline::nonblocking::{ReadyFinishGuard, ReadySignal};

/// What the streaming loop decided
enum Next {
    Switch(Behavior),
    Exit,
}

pub struct ReaderActor {
    link: DeviceLink,
    ctx: PipelineCtx,
    initial_command: Option<String>,
    control: Receiver<String>,
    data: Sender<Option<u8>>,
    messages: Sender<Message>,
    stop: Arc<AtomicBool>,
    ready: Arc<ReadySignal>,
}

impl ReaderActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        port: Box<dyn Port>,
        ctx: PipelineCtx,
        initial_command: Option<String>,
        control: Receiver<String>,
        data: Sender<Option<u8>>,
        messages: Sender<Message>,
        stop: Arc<AtomicBool>,
        ready: Arc<ReadySignal>,
    ) -> Self {
        Self {
            link: DeviceLink::new(port, messages.clone()),
            ctx,
            initial_command,
            control,
            data,
            messages,
            stop,
            ready,
        }
    }

    /// Run until stopped or until the device fails, returning the closed port.
    pub fn run(mut self) -> Box<dyn Port> {
        let _guard = ReadyFinishGuard {
            ready: self.ready.clone(),
        };

        if !self.link.is_open() {
            if let Err(err) = self.link.open(&self.ctx) {
                self.fail(&err, format!("Could not open {}", self.link.name()));
                return self.link.into_port();
            }
        }
        self.ready.mark_ready();
        post(
            &self.messages,
            Message::info(format!("Reading from {}", self.link.name())),
        );

        let mut behavior = Behavior::Stream;
        if let Some(name) = self.initial_command.take() {
            match self.dispatch(&name) {
                Some(b) => behavior = b,
                None => return self.link.into_port(),
            }
        }

        loop {
            match behavior {
                Behavior::Stream => match self.stream() {
                    Next::Switch(b) => behavior = b,
                    Next::Exit => break,
                },
                Behavior::Park => {
                    self.park();
                    break;
                }
            }
        }

        debug!("Reader for {} exiting", self.link.name());
        self.link.into_port()
    }

    /// Forward bytes until a command changes the behavior or the reader must exit.
    fn stream(&mut self) -> Next {
        loop {
            // Commands queued before a stop request are still sent
            match self.control.try_recv() {
                Ok(name) => {
                    return match self.dispatch(&name) {
                        Some(b) => Next::Switch(b),
                        None => Next::Exit,
                    };
                }
                Err(TryRecvError::Empty) => {}
                // The supervisor is gone
                Err(TryRecvError::Disconnected) => return Next::Exit,
            }

            if self.stop.load(Ordering::Relaxed) {
                return Next::Exit;
            }

            match self.link.read_byte() {
                Ok(ReadOutcome::Byte(b)) => {
                    if self.data.send(Some(b)).is_err() {
                        return Next::Exit;
                    }
                }
                Ok(ReadOutcome::Timeout) => {}
                Ok(ReadOutcome::EndOfStream) => {
                    if self.data.send(None).is_err() {
                        return Next::Exit;
                    }
                    thread::sleep(self.ctx.poll_interval);
                }
                Err(err) => {
                    self.fail(&err, format!("Lost connection to {}", self.link.name()));
                    return Next::Exit;
                }
            }
        }
    }

    /// Port closed; wait to be stopped without reading.
    fn park(&mut self) {
        self.link.close();
        post(
            &self.messages,
            Message::info(format!("{} closed", self.link.name())),
        );
        while !self.stop.load(Ordering::Relaxed) {
            match self.control.recv_timeout(self.ctx.poll_interval) {
                Ok(name) => post(
                    &self.messages,
                    Message::warning(format!(
                        "Ignoring `{name}`: {} is closed until the session is restarted",
                        self.link.name()
                    )),
                ),
                Err(e) if e.is_disconnected() => break,
                Err(_) => {}
            }
        }
    }

    /// Send a command and map the result to the next behavior,
    /// or `None` if the reader must exit.
    fn dispatch(&mut self, name: &str) -> Option<Behavior> {
        match self.link.send(name) {
            Ok(behavior) => Some(behavior),
            Err(err @ Error::UnrecognizedCommand(_)) => {
                post(
                    &self.messages,
                    Message::warning(format!("{err}; no command sent")),
                );
                Some(Behavior::Park)
            }
            Err(err) => {
                self.fail(&err, format!("Command `{name}` failed on {}", self.link.name()));
                None
            }
        }
    }

    /// Report the detailed cause as a Warning and a short summary as an Error.
    fn fail(&self, err: &Error, summary: String) {
        post(&self.messages, Message::warning(err.to_string()));
        post(&self.messages, Message::error(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::device::DeviceKind;
    use crate::link::MockupPort;
    use crate::message::Severity;
    use crossbeam::channel::{Receiver, unbounded};
    use std::thread::JoinHandle;
    use std::time::Duration;
    use telega_shared::stm::CommandCode;

    struct Harness {
        control: Sender<String>,
        data: Receiver<Option<u8>>,
        messages: Receiver<Message>,
        stop: Arc<AtomicBool>,
        thread: JoinHandle<Box<dyn Port>>,
    }

    fn spawn(port: MockupPort, initial: Option<Command>) -> Harness {
        let mut ctx = PipelineCtx::new(port.device);
        ctx.read_timeout = Duration::from_millis(10);
        ctx.poll_interval = Duration::from_millis(2);

        let (control_tx, control_rx) = unbounded();
        let (data_tx, data_rx) = unbounded();
        let (msg_tx, msg_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let reader = ReaderActor::new(
            Box::new(port),
            ctx,
            initial.map(|c| c.name().to_owned()),
            control_rx,
            data_tx,
            msg_tx,
            stop.clone(),
            Arc::new(ReadySignal::default()),
        );
        Harness {
            control: control_tx,
            data: data_rx,
            messages: msg_rx,
            stop,
            thread: thread::spawn(move || reader.run()),
        }
    }

    fn severities(rx: &Receiver<Message>) -> Vec<Severity> {
        rx.try_iter().map(|m| m.severity).collect()
    }

    #[test]
    fn streams_until_stopped() {
        let (port, handle) = MockupPort::new(DeviceKind::Stm);
        let h = spawn(port, Some(Command::StartMeasuring));

        // Wait for a few frames to arrive
        let mut got = Vec::new();
        while got.len() < 50 {
            if let Ok(Some(b)) = h.data.recv_timeout(Duration::from_secs(5)) {
                got.push(b);
            }
        }
        h.stop.store(true, Ordering::Relaxed);
        let port = h.thread.join().unwrap();
        assert!(!port.is_open());

        let mut all = got;
        all.extend(h.data.try_iter().flatten());
        assert_eq!(all, handle.served_stream());
        assert!(!severities(&h.messages).contains(&Severity::Error));
    }

    #[test]
    fn command_interrupts_streaming_and_parks() {
        let (port, handle) = MockupPort::new(DeviceKind::Stm);
        let h = spawn(port, Some(Command::StartMeasuring));
        let _ = h.data.recv_timeout(Duration::from_secs(5));

        h.control.send(Command::StopMeasuring.name().to_owned()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handle.is_open() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!handle.is_open());
        assert_eq!(
            handle.commands(),
            vec![CommandCode::StartMeasuring, CommandCode::StopMeasuring]
        );

        h.stop.store(true, Ordering::Relaxed);
        h.thread.join().unwrap();
    }

    #[test]
    fn open_failure_reports_error() {
        let (port, _handle) = MockupPort::new(DeviceKind::Stm);
        let h = spawn(port.failing_open(), Some(Command::StartMeasuring));
        h.thread.join().unwrap();
        assert_eq!(severities(&h.messages), vec![Severity::Warning, Severity::Error]);
    }

    #[test]
    fn unacknowledged_command_exits() {
        let (port, _handle) = MockupPort::new(DeviceKind::Stm);
        let h = spawn(port.rejecting_commands(), Some(Command::StartInitialSetting));
        h.thread.join().unwrap();
        let severities = severities(&h.messages);
        assert_eq!(&severities[severities.len() - 2..], &[Severity::Warning, Severity::Error]);
        assert!(h.data.try_recv().is_err());
    }

    #[test]
    fn unrecognized_command_parks_without_sending() {
        let (port, handle) = MockupPort::new(DeviceKind::Stm);
        let h = spawn(port, None);
        h.control.send("stop_CollectingData".to_owned()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handle.is_open() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!handle.is_open());
        assert!(handle.written().is_empty());

        h.stop.store(true, Ordering::Relaxed);
        h.thread.join().unwrap();
        assert!(severities(&h.messages).contains(&Severity::Warning));
    }

    #[test]
    fn disconnect_reports_error() {
        let (port, _handle) = MockupPort::new(DeviceKind::Gps);
        let h = spawn(port.disconnecting_after(100), None);
        h.thread.join().unwrap();

        assert_eq!(h.data.try_iter().count(), 100);
        let severities = severities(&h.messages);
        assert_eq!(&severities[severities.len() - 2..], &[Severity::Warning, Severity::Error]);
    }
}
