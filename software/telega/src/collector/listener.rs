//! Callbacks through which the collector hands results to the outside world,
//! usually a UI.

use std::sync::{Arc, RwLock};

use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};

use crate::decoder::{DecodedRecord, DecodedSentence};
use crate::message::Severity;

/// Receiver of decoded values, messages and errors.
///
/// Called from the collector thread, one call at a time.
/// Every callback defaults to doing nothing.
pub trait Listener: Send + Sync {
    fn on_decoded_record(&self, _record: &DecodedRecord) {}

    fn on_decoded_sentence(&self, _sentence: &DecodedSentence) {}

    /// Info and Warning text for display
    fn on_message(&self, _severity: Severity, _text: &str) {}

    /// Error and Critical reports. A UI is expected to re-enable
    /// controls it disabled for the session.
    fn on_error(&self, _tag: &str, _text: &str) {}

    /// The device echoed a command, e.g. `stop_InitialSetting`
    fn on_command_echo(&self, _name: &str) {}
}

/// Listener that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullListener;

impl Listener for NullListener {}

/// One listener callback, as an owned value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ListenerEvent {
    Record(DecodedRecord),
    Sentence(DecodedSentence),
    Message { severity: Severity, text: String },
    Error { tag: String, text: String },
    CommandEcho(String),
}

/// Listener that forwards every callback over a channel,
/// e.g. to a UI thread.
#[derive(Clone, Debug)]
pub struct ChannelListener {
    tx: Sender<ListenerEvent>,
}

impl ChannelListener {
    pub fn new(tx: Sender<ListenerEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: ListenerEvent) {
        // A closed receiver means nobody is watching
        let _ = self.tx.send(event);
    }
}

impl Listener for ChannelListener {
    fn on_decoded_record(&self, record: &DecodedRecord) {
        self.forward(ListenerEvent::Record(record.clone()));
    }

    fn on_decoded_sentence(&self, sentence: &DecodedSentence) {
        self.forward(ListenerEvent::Sentence(sentence.clone()));
    }

    fn on_message(&self, severity: Severity, text: &str) {
        self.forward(ListenerEvent::Message {
            severity,
            text: text.to_owned(),
        });
    }

    fn on_error(&self, tag: &str, text: &str) {
        self.forward(ListenerEvent::Error {
            tag: tag.to_owned(),
            text: text.to_owned(),
        });
    }

    fn on_command_echo(&self, name: &str) {
        self.forward(ListenerEvent::CommandEcho(name.to_owned()));
    }
}

/// Cloneable handle for polling the latest decoded values,
/// for displays that refresh on their own schedule.
#[derive(Clone, Default)]
pub struct LatestValueHandle {
    record: Arc<RwLock<Option<Arc<DecodedRecord>>>>,
    sentence: Arc<RwLock<Option<Arc<DecodedSentence>>>>,
}

impl LatestValueHandle {
    /// Get the latest record snapshot.
    pub fn latest_record(&self) -> Option<Arc<DecodedRecord>> {
        self.record.read().ok().and_then(|r| r.clone())
    }

    /// Get the latest sentence snapshot.
    pub fn latest_sentence(&self) -> Option<Arc<DecodedSentence>> {
        self.sentence.read().ok().and_then(|s| s.clone())
    }
}

/// Listener that always keeps the latest record and sentence available via a shared handle.
#[derive(Clone, Default)]
pub struct LatestValueListener {
    handle: LatestValueHandle,
}

impl LatestValueListener {
    pub fn new() -> (Self, LatestValueHandle) {
        let handle = LatestValueHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl Listener for LatestValueListener {
    fn on_decoded_record(&self, record: &DecodedRecord) {
        if let Ok(mut w) = self.handle.record.write() {
            *w = Some(Arc::new(record.clone()));
        }
    }

    fn on_decoded_sentence(&self, sentence: &DecodedSentence) {
        if let Ok(mut w) = self.handle.sentence.write() {
            *w = Some(Arc::new(sentence.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn latest_value_keeps_last_record() {
        let (listener, handle) = LatestValueListener::new();
        assert!(handle.latest_record().is_none());

        let first = DecodedRecord::from_body(&[0x04, 0x00, 0x10, 0x00]).unwrap();
        let second = DecodedRecord::from_body(&[0x08, 0x00, 0x20, 0x00]).unwrap();
        listener.on_decoded_record(&first);
        listener.on_decoded_record(&second);
        assert_eq!(handle.latest_record().unwrap().as_ref(), &second);
    }

    #[test]
    fn channel_listener_forwards_in_order() {
        let (tx, rx) = unbounded();
        let listener = ChannelListener::new(tx);
        listener.on_message(Severity::Info, "hello");
        listener.on_error("STM", "oops");
        listener.on_command_echo("stop_InitialSetting");

        let events: Vec<ListenerEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ListenerEvent::Message {
                    severity: Severity::Info,
                    text: "hello".into()
                },
                ListenerEvent::Error {
                    tag: "STM".into(),
                    text: "oops".into()
                },
                ListenerEvent::CommandEcho("stop_InitialSetting".into()),
            ]
        );
    }
}
