//! Binary signals with bounded waits.

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use crate::IpcError;

/// Result of waiting on a [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The signal was raised, and the wait consumed it.
    Signaled,
    /// The timeout elapsed first. This is the expected outcome of an idle poll.
    TimedOut,
}

/// A binary semaphore / auto-reset event.
///
/// Posting a signal that is already pending is a no-op: signals *coalesce*, so at most one is ever
/// outstanding. A successful wait consumes the pending signal.
pub trait Signal: Send + Sync {
    /// Raises the signal, waking one waiter.
    fn post(&self) -> Result<(), IpcError>;

    /// Waits until the signal is raised or `timeout` elapses.
    fn wait_timeout(&self, timeout: Duration) -> Result<WaitOutcome, IpcError>;
}

impl<S: Signal + ?Sized> Signal for Box<S> {
    fn post(&self) -> Result<(), IpcError> {
        (**self).post()
    }

    fn wait_timeout(&self, timeout: Duration) -> Result<WaitOutcome, IpcError> {
        (**self).wait_timeout(timeout)
    }
}

/// An in-process [`Signal`]. Clones refer to the same signal.
#[derive(Clone)]
pub struct LocalSignal {
    name: Arc<str>,
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl LocalSignal {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Signal for LocalSignal {
    fn post(&self) -> Result<(), IpcError> {
        let (pending, cvar) = &*self.inner;
        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
        if !*pending {
            *pending = true;
            cvar.notify_one();
        }
        Ok(())
    }

    fn wait_timeout(&self, timeout: Duration) -> Result<WaitOutcome, IpcError> {
        // A timeout too large to represent as an `Instant` never expires.
        let deadline = Instant::now().checked_add(timeout);
        let (pending, cvar) = &*self.inner;
        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
        while !*pending {
            pending = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitOutcome::TimedOut);
                    }
                    cvar.wait_timeout(pending, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
                None => cvar.wait(pending).unwrap_or_else(|e| e.into_inner()),
            };
        }
        *pending = false;
        Ok(WaitOutcome::Signaled)
    }
}

impl fmt::Debug for LocalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalSignal").field(&self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    const SHORT: Duration = Duration::from_millis(10);

    #[test]
    fn times_out_when_not_posted() {
        let sig = LocalSignal::new("ready");
        assert_eq!(sig.wait_timeout(SHORT).unwrap(), WaitOutcome::TimedOut);
    }

    #[test]
    fn wait_consumes_signal() {
        let sig = LocalSignal::new("ready");
        sig.post().unwrap();
        assert_eq!(sig.wait_timeout(SHORT).unwrap(), WaitOutcome::Signaled);
        assert_eq!(sig.wait_timeout(SHORT).unwrap(), WaitOutcome::TimedOut);
    }

    #[test]
    fn posts_coalesce() {
        let sig = LocalSignal::new("ready");
        sig.post().unwrap();
        sig.post().unwrap();
        assert_eq!(sig.wait_timeout(SHORT).unwrap(), WaitOutcome::Signaled);
        assert_eq!(sig.wait_timeout(SHORT).unwrap(), WaitOutcome::TimedOut);
    }

    #[test]
    fn unbounded_timeout_waits_for_post() {
        let sig = LocalSignal::new("ready");
        sig.post().unwrap();
        assert_eq!(sig.wait_timeout(Duration::MAX).unwrap(), WaitOutcome::Signaled);

        let poster = sig.clone();
        let handle = thread::spawn(move || {
            thread::sleep(SHORT);
            poster.post().unwrap();
        });
        assert_eq!(
            sig.wait_timeout(Duration::from_millis(u64::MAX)).unwrap(),
            WaitOutcome::Signaled
        );
        handle.join().unwrap();
    }

    #[test]
    fn wakes_waiter_on_other_thread() {
        let sig = LocalSignal::new("ready");
        let poster = sig.clone();
        let handle = thread::spawn(move || {
            thread::sleep(SHORT);
            poster.post().unwrap();
        });
        assert_eq!(
            sig.wait_timeout(Duration::from_secs(5)).unwrap(),
            WaitOutcome::Signaled
        );
        handle.join().unwrap();
    }
}
