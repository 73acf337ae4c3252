//! Frame and result exchange between a producer (host) and a consumer (worker) process.
//!
//! A link consists of two [`SharedBuffer`]s and two [`Signal`]s:
//!
//! * the *frame buffer*, written by the host and read by the worker,
//! * the *result buffer*, written by the worker and read by the host,
//! * the *ready* signal, raised by the host once a frame is in place,
//! * the *done* signal, raised by the worker once the result is in place.
//!
//! This is a strict two-phase handshake rather than a queue: at most one frame is ever in flight,
//! and a host that writes faster than the worker drains simply overwrites its own frame.
//!
//! The worker and host capabilities are expressed by the [`WorkerSide`] and [`HostSide`] traits.
//! Two backends implement them:
//!
//! * [`posix`] (Linux only): POSIX shared memory and named semaphores, for use across processes.
//! * [`local`]: heap buffers and condition variables, connecting two threads of one process.

pub mod buffer;
pub mod local;
#[cfg(target_os = "linux")]
pub mod posix;
pub mod signal;

mod error;

use std::{fmt, str::FromStr, time::Duration};

pub use buffer::SharedBuffer;
pub use error::IpcError;
pub use signal::{Signal, WaitOutcome};

/// Names of the OS objects making up a link.
///
/// These are a fixed contract between both processes. POSIX requires them to start with a `/`
/// and contain no other slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Names {
    pub frame: String,
    pub result: String,
    pub ready: String,
    pub done: String,
}

impl Names {
    /// Derives all four names from a common prefix.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            frame: format!("/{prefix}_frame"),
            result: format!("/{prefix}_result"),
            ready: format!("/{prefix}_frame_ready"),
            done: format!("/{prefix}_result_done"),
        }
    }
}

impl Default for Names {
    fn default() -> Self {
        Self::with_prefix("handoff")
    }
}

/// Capacities of the two buffers of a link, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub frame_len: usize,
    pub result_len: usize,
}

/// The capabilities the consumer needs.
pub trait WorkerSide {
    /// The buffer the host writes frames into.
    fn frame_buffer(&self) -> &SharedBuffer;

    /// The buffer this side writes results into.
    fn result_buffer(&self) -> &SharedBuffer;

    /// Waits for the host to announce a frame.
    fn wait_ready(&self, timeout: Duration) -> Result<WaitOutcome, IpcError>;

    /// Announces that the result for the last frame is in place.
    fn signal_done(&self) -> Result<(), IpcError>;

    /// Releases all resources, reporting failures.
    ///
    /// Dropping the value releases them too, but can only log failures.
    fn close(self) -> Result<(), IpcError>
    where
        Self: Sized;
}

/// The capabilities the producer needs.
pub trait HostSide {
    /// The buffer this side writes frames into.
    fn frame_buffer(&self) -> &SharedBuffer;

    /// The buffer the worker writes results into.
    fn result_buffer(&self) -> &SharedBuffer;

    /// Announces that a frame is in place.
    fn signal_ready(&self) -> Result<(), IpcError>;

    /// Waits for the worker to finish the announced frame.
    fn wait_done(&self, timeout: Duration) -> Result<WaitOutcome, IpcError>;

    /// Releases all resources, reporting failures.
    fn close(self) -> Result<(), IpcError>
    where
        Self: Sized;
}

/// Selects which implementation of the link to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Named POSIX shared memory and semaphores.
    Posix,
    /// Threads of the current process.
    Local,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posix" => Ok(Self::Posix),
            "local" => Ok(Self::Local),
            _ => Err(format!("unknown IPC backend '{s}' (expected 'posix' or 'local')")),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Posix => "posix",
            Self::Local => "local",
        })
    }
}
