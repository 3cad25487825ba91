//! Single consumer of everything the reader and decoder produce.
//!
//! The collector writes mirrored bytes to the session log, hands decoded values
//! to the [`Listener`], and routes messages by severity to tracing and to the
//! listener's display and error callbacks.

pub mod listener;
pub mod raw_log;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, Select};
use tracing::{debug, error, info, warn};

use crate::decoder::Decoded;
use crate::device::DeviceKind;
use crate::message::{Message, Severity};

pub use listener::{
    ChannelListener, LatestValueHandle, LatestValueListener, Listener, ListenerEvent, NullListener,
};
pub use raw_log::RawLog;

/// Text passed to [`Listener::on_error`] for Critical messages;
/// the details only go to the log.
pub const CRITICAL_TEXT: &str = "Critical error, check the log file";

/// Counts of what one session's collector handled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectorSummary {
    pub records: u64,
    pub sentences: u64,
    pub messages: u64,
    pub bytes_logged: u64,
}

pub struct Collector {
    device: DeviceKind,
    decoded: Receiver<Decoded>,
    messages: Receiver<Message>,
    duplicate: Receiver<u8>,
    active: Arc<AtomicBool>,
    listener: Arc<dyn Listener>,
    log: RawLog,
    poll_interval: Duration,
}

impl Collector {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: DeviceKind,
        decoded: Receiver<Decoded>,
        messages: Receiver<Message>,
        duplicate: Receiver<u8>,
        active: Arc<AtomicBool>,
        listener: Arc<dyn Listener>,
        log: RawLog,
        poll_interval: Duration,
    ) -> Self {
        Self {
            device,
            decoded,
            messages,
            duplicate,
            active,
            listener,
            log,
            poll_interval,
        }
    }

    /// Drain all three channels while the session is active or any of them
    /// still holds data, then close the log.
    pub fn run(self) -> CollectorSummary {
        let Collector {
            device,
            decoded,
            messages,
            duplicate,
            active,
            listener,
            log,
            poll_interval,
        } = self;
        let mut sink = Sink {
            tag: device.tag(),
            listener,
            log,
            log_failed: false,
            summary: CollectorSummary::default(),
        };

        let mut sel = Select::new();
        let decoded_idx = sel.recv(&decoded);
        let messages_idx = sel.recv(&messages);
        let duplicate_idx = sel.recv(&duplicate);
        let mut open = 3;

        while open > 0
            && (active.load(Ordering::Relaxed)
                || !decoded.is_empty()
                || !messages.is_empty()
                || !duplicate.is_empty())
        {
            let Ok(op) = sel.select_timeout(poll_interval) else {
                continue;
            };
            let index = op.index();
            // A failed receive means every sender is gone; stop selecting on it
            let received = if index == decoded_idx {
                op.recv(&decoded).map(|d| sink.decoded(d)).is_ok()
            } else if index == messages_idx {
                op.recv(&messages).map(|m| sink.message(m)).is_ok()
            } else if index == duplicate_idx {
                op.recv(&duplicate).map(|b| sink.byte(b)).is_ok()
            } else {
                unreachable!("unknown select index {index}")
            };
            if !received {
                sel.remove(index);
                open -= 1;
            }
        }

        sink.finish()
    }
}

/// Everything the collector writes to, owned by the collector thread.
struct Sink {
    tag: &'static str,
    listener: Arc<dyn Listener>,
    log: RawLog,
    log_failed: bool,
    summary: CollectorSummary,
}

impl Sink {
    fn decoded(&mut self, decoded: Decoded) {
        match decoded {
            Decoded::Record(r) => {
                self.summary.records += 1;
                self.listener.on_decoded_record(&r);
            }
            Decoded::Sentence(s) => {
                self.summary.sentences += 1;
                self.listener.on_decoded_sentence(&s);
            }
        }
    }

    fn message(&mut self, message: Message) {
        self.summary.messages += 1;
        let Message { severity, text } = message;
        let tag = self.tag;
        match severity {
            Severity::Debug => debug!("{tag}: {text}"),
            Severity::Info => {
                info!("{tag}: {text}");
                self.listener.on_message(severity, &text);
            }
            Severity::Warning => {
                warn!("{tag}: {text}");
                self.listener.on_message(severity, &text);
            }
            Severity::Error => {
                error!("{tag}: {text}");
                self.listener.on_message(severity, &text);
                self.listener.on_error(tag, &text);
            }
            Severity::Critical => {
                error!("{tag}: critical: {text}");
                self.listener.on_error(tag, CRITICAL_TEXT);
            }
            Severity::Command => {
                debug!("{tag}: device reported {text}");
                self.listener.on_command_echo(&text);
            }
        }
    }

    fn byte(&mut self, byte: u8) {
        if self.log_failed {
            return;
        }
        if let Err(e) = self.log.write(&[byte]) {
            // Report once and keep serving the listener
            self.log_failed = true;
            let text = format!("Could not write session log {:?}: {e}", self.log.path());
            error!("{}: {text}", self.tag);
            self.listener.on_error(self.tag, &text);
        }
    }

    fn finish(mut self) -> CollectorSummary {
        match self.log.close() {
            Ok(n) => self.summary.bytes_logged = n,
            Err(e) => {
                let text = format!("Could not close session log {:?}: {e}", self.log.path());
                error!("{}: {text}", self.tag);
                self.listener.on_error(self.tag, &text);
                self.summary.bytes_logged = self.log.written();
            }
        }
        debug!(
            "{}: session log {:?} closed after {} bytes",
            self.tag,
            self.log.path(),
            self.summary.bytes_logged
        );
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodedRecord;
    use crossbeam::channel::unbounded;
    use std::thread;

    struct Running {
        decoded: crossbeam::channel::Sender<Decoded>,
        messages: crossbeam::channel::Sender<Message>,
        duplicate: crossbeam::channel::Sender<u8>,
        active: Arc<AtomicBool>,
        events: Receiver<ListenerEvent>,
        thread: thread::JoinHandle<CollectorSummary>,
    }

    fn start(path: &std::path::Path) -> Running {
        let (decoded_tx, decoded_rx) = unbounded();
        let (msg_tx, msg_rx) = unbounded();
        let (dup_tx, dup_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let active = Arc::new(AtomicBool::new(true));
        let collector = Collector::new(
            DeviceKind::Stm,
            decoded_rx,
            msg_rx,
            dup_rx,
            active.clone(),
            Arc::new(ChannelListener::new(event_tx)),
            RawLog::create(path).unwrap(),
            Duration::from_millis(2),
        );
        Running {
            decoded: decoded_tx,
            messages: msg_tx,
            duplicate: dup_tx,
            active,
            events: event_rx,
            thread: thread::spawn(move || collector.run()),
        }
    }

    #[test]
    fn routes_by_severity() {
        let dir = tempfile::tempdir().unwrap();
        let r = start(&dir.path().join("s.bin"));

        for m in [
            Message::debug("d"),
            Message::info("i"),
            Message::warning("w"),
            Message::error("e"),
            Message::critical("c"),
            Message::command("stop_InitialSetting"),
        ] {
            r.messages.send(m).unwrap();
        }
        r.active.store(false, Ordering::Relaxed);
        let summary = r.thread.join().unwrap();
        assert_eq!(summary.messages, 6);

        let events: Vec<ListenerEvent> = r.events.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ListenerEvent::Message {
                    severity: Severity::Info,
                    text: "i".into()
                },
                ListenerEvent::Message {
                    severity: Severity::Warning,
                    text: "w".into()
                },
                ListenerEvent::Message {
                    severity: Severity::Error,
                    text: "e".into()
                },
                ListenerEvent::Error {
                    tag: "STM".into(),
                    text: "e".into()
                },
                ListenerEvent::Error {
                    tag: "STM".into(),
                    text: CRITICAL_TEXT.into()
                },
                ListenerEvent::CommandEcho("stop_InitialSetting".into()),
            ]
        );
    }

    #[test]
    fn drains_before_exiting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.bin");
        let r = start(&path);

        let bytes: Vec<u8> = (0..=255).collect();
        for b in &bytes {
            r.duplicate.send(*b).unwrap();
        }
        for _ in 0..3 {
            r.decoded
                .send(Decoded::Record(DecodedRecord::from_body(&[1, 0, 2, 0]).unwrap()))
                .unwrap();
        }
        // Deactivate while data is still queued; keep the senders alive
        r.active.store(false, Ordering::Relaxed);
        let summary = r.thread.join().unwrap();

        assert_eq!(summary.bytes_logged, 256);
        assert_eq!(summary.records, 3);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert_eq!(r.events.try_iter().count(), 3);
        drop((r.decoded, r.messages, r.duplicate));
    }

    #[test]
    fn exits_when_all_producers_are_gone() {
        let dir = tempfile::tempdir().unwrap();
        let r = start(&dir.path().join("s.bin"));
        r.duplicate.send(0x7E).unwrap();
        drop((r.decoded, r.messages, r.duplicate));

        // Still active, but nothing can arrive any more
        let summary = r.thread.join().unwrap();
        assert_eq!(summary.bytes_logged, 1);
        assert!(r.active.load(Ordering::Relaxed));
    }
}
