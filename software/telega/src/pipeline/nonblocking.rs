//! Readiness signaling between the supervisor and the reader thread.
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Boolean predicates to support the ReadySignal condvar
/// because condvars can generate spurious wake signals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ReadyState {
    /// The port is open
    pub(crate) ready: bool,
    /// The reader has exited
    pub(crate) finished: bool,
}

/// Predicate-signal pair for the reader to announce that its port is open.
#[derive(Debug, Default)]
pub(crate) struct ReadySignal {
    state: Mutex<ReadyState>,
    cvar: Condvar,
}

impl ReadySignal {
    fn state(&self) -> MutexGuard<'_, ReadyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set ready predicate and signal condvar.
    pub(crate) fn mark_ready(&self) {
        let mut state = self.state();
        if !state.ready {
            state.ready = true;
            self.cvar.notify_all();
        }
    }

    /// Set finished predicate and signal condvar.
    pub(crate) fn mark_finished(&self) {
        let mut state = self.state();
        state.finished = true;
        self.cvar.notify_all();
    }

    /// Wait until the reader is either ready or already finished,
    /// or until `timeout` elapses, and return the predicates at that point.
    pub(crate) fn wait_ready_or_finished(&self, timeout: Duration) -> ReadyState {
        let state = self.state();
        let (state, _) = self
            .cvar
            .wait_timeout_while(state, timeout, |s| !s.ready && !s.finished)
            .unwrap_or_else(PoisonError::into_inner);
        *state
    }
}

/// Drop-guard to guarantee that the ready signal is marked
/// finished if the reader exits for any reason.
pub(crate) struct ReadyFinishGuard {
    pub(crate) ready: Arc<ReadySignal>,
}

impl Drop for ReadyFinishGuard {
    fn drop(&mut self) {
        self.ready.mark_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_returns_on_ready() {
        let signal = Arc::new(ReadySignal::default());
        let s = signal.clone();
        let t = thread::spawn(move || s.mark_ready());
        let state = signal.wait_ready_or_finished(Duration::from_secs(5));
        assert!(state.ready);
        t.join().unwrap();
    }

    #[test]
    fn guard_marks_finished() {
        let signal = Arc::new(ReadySignal::default());
        let s = signal.clone();
        thread::spawn(move || {
            let _guard = ReadyFinishGuard { ready: s };
        })
        .join()
        .unwrap();
        let state = signal.wait_ready_or_finished(Duration::from_secs(5));
        assert_eq!(
            state,
            ReadyState {
                ready: false,
                finished: true
            }
        );
    }

    #[test]
    fn wait_is_bounded() {
        let signal = ReadySignal::default();
        let start = Instant::now();
        let state = signal.wait_ready_or_finished(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(state, ReadyState::default());
    }
}
