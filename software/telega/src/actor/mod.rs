//! Reader and decoder threads, and the handle used to stop and join them.

pub mod decoder;
pub mod reader;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;

use crate::error::{Error, Result};
use crate::message::Message;

pub use decoder::DecoderActor;
pub use reader::ReaderActor;

/// Stop flag and join handle for a running actor thread.
pub struct ActorHandle<T> {
    name: &'static str,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> ActorHandle<T> {
    /// Run `f` on a new named thread sharing `stop` with the caller.
    pub(crate) fn spawn<F>(name: &'static str, stop: Arc<AtomicBool>, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let join = thread::Builder::new()
            .name(format!("telega-{name}"))
            .spawn(f)
            .expect("Failed to spawn actor thread");
        Self {
            name,
            stop,
            join: Some(join),
        }
    }
}

impl<T> ActorHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Write to shared stop signal, indicating that the
    /// thread should exit.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Check if the thread is still running.
    pub fn is_running(&self) -> bool {
        self.join
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the thread to finish running.
    pub fn join(&mut self) -> Result<T> {
        match self.join.take() {
            Some(h) => h.join().map_err(|_| Error::ActorPanicked(self.name)),
            None => Err(Error::ActorStopped(self.name)),
        }
    }

    /// Wait at most `timeout` for the thread to finish.
    /// A thread still running after that is detached.
    pub fn join_timeout(&mut self, timeout: Duration, poll: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                // Dropping the join handle detaches the thread
                self.join = None;
                return Err(Error::ActorUnresponsive(self.name));
            }
            thread::sleep(poll);
        }
        self.join()
    }
}

impl<T> Drop for ActorHandle<T> {
    /// Make sure to stop the thread when we exit to avoid leaking resources.
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Send a message to the collector. The collector may already be
/// gone during shutdown, in which case the message is dropped.
pub(crate) fn post(messages: &Sender<Message>, message: Message) {
    let _ = messages.send(message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_returns_thread_result() {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let mut handle = ActorHandle::spawn("test", stop, move || {
            while !flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(1));
            }
            7
        });
        assert!(handle.is_running());
        handle.stop();
        assert_eq!(handle.join_timeout(Duration::from_secs(5), Duration::from_millis(1)).unwrap(), 7);
        assert!(matches!(handle.join(), Err(Error::ActorStopped("test"))));
    }

    #[test]
    fn unresponsive_thread_is_detached() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handle = ActorHandle::spawn("stuck", stop, || thread::sleep(Duration::from_millis(300)));
        let err = handle
            .join_timeout(Duration::from_millis(10), Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, Error::ActorUnresponsive("stuck")));
        assert!(!handle.is_running());
    }

    #[test]
    fn panic_is_reported() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handle: ActorHandle<()> = ActorHandle::spawn("boom", stop, || panic!("boom"));
        assert!(matches!(
            handle.join_timeout(Duration::from_secs(5), Duration::from_millis(1)),
            Err(Error::ActorPanicked("boom"))
        ));
    }
}
