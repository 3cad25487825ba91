//! Decoder actor that runs a protocol decoder against the reader's byte stream.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use super::post;
use crate::decoder::{Decoded, Decoder, Output};
use crate::message::Message;

pub struct DecoderActor {
    decoder: Box<dyn Decoder>,
    data: Receiver<Option<u8>>,
    decoded: Sender<Decoded>,
    duplicate: Sender<u8>,
    messages: Sender<Message>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl DecoderActor {
    pub(crate) fn new(
        decoder: Box<dyn Decoder>,
        data: Receiver<Option<u8>>,
        decoded: Sender<Decoded>,
        duplicate: Sender<u8>,
        messages: Sender<Message>,
        stop: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            decoder,
            data,
            decoded,
            duplicate,
            messages,
            stop,
            poll_interval,
        }
    }

    /// Decode until the data channel closes, or until stopped and the channel
    /// has gone quiet. Returns the number of bytes consumed.
    ///
    /// A panic in the decoder is caught here and reported as a Critical message.
    pub fn run(mut self) -> u64 {
        let mut consumed = 0;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.decode_loop(&mut consumed)));
        if let Err(payload) = result {
            post(
                &self.messages,
                Message::critical(format!(
                    "Decoder stopped unexpectedly after {consumed} bytes: {}",
                    panic_text(payload.as_ref())
                )),
            );
        }
        consumed
    }

    fn decode_loop(&mut self, consumed: &mut u64) {
        // A port stuck at end of stream repeats the marker every poll,
        // so only the first marker of a run is reported
        let mut at_end = false;
        loop {
            match self.data.recv_timeout(self.poll_interval) {
                Ok(Some(byte)) => {
                    at_end = false;
                    *consumed += 1;
                    // Mirror before decoding so that the log has every byte,
                    // including those of malformed frames
                    let _ = self.duplicate.send(byte);
                    match self.decoder.feed(byte) {
                        Some(Output::Decoded(d)) => {
                            let _ = self.decoded.send(d);
                        }
                        Some(Output::Message(m)) => post(&self.messages, m),
                        None => {}
                    }
                }
                Ok(None) => {
                    if !at_end {
                        at_end = true;
                        post(
                            &self.messages,
                            Message::warning("Skipped an end-of-stream marker from the port"),
                        );
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.stop.load(Ordering::Relaxed) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
