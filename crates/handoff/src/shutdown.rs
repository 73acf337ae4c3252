//! Cooperative shutdown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;

/// A shared flag requesting the frame loop to stop.
///
/// The loop checks the flag after every bounded wait, so a request takes effect within one poll
/// interval.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag that is raised on Ctrl-C and `SIGTERM`.
    ///
    /// The handler is process-wide, so this may only be called once.
    pub fn on_interrupt() -> anyhow::Result<Self> {
        let shutdown = Self::new();
        let flag = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupted, shutting down");
            flag.request();
        })
        .context("failed to install the interrupt handler")?;
        Ok(shutdown)
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        assert!(!other.is_requested());
        shutdown.request();
        assert!(other.is_requested());
    }
}
