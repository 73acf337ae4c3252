//! In-process backend.
//!
//! Both ends alias the same heap buffers and signals. This is used by tests and by the worker's
//! loopback mode, where a synthetic producer runs on another thread.

use std::time::Duration;

use crate::{
    signal::LocalSignal, HostSide, IpcError, Layout, Names, SharedBuffer, Signal, WaitOutcome,
    WorkerSide,
};

/// Creates a connected host/worker pair.
pub fn pair(names: &Names, layout: Layout) -> (LocalHost, LocalWorker) {
    let frame = SharedBuffer::heap(&names.frame, layout.frame_len);
    let result = SharedBuffer::heap(&names.result, layout.result_len);
    let ready = LocalSignal::new(&names.ready);
    let done = LocalSignal::new(&names.done);

    log::trace!("created local link {names:?} with {layout:?}");

    let host = LocalHost {
        ready: ready.clone(),
        done: done.clone(),
        frame: frame.clone(),
        result: result.clone(),
    };
    let worker = LocalWorker {
        ready,
        done,
        frame,
        result,
    };
    (host, worker)
}

/// Worker end of an in-process link.
pub struct LocalWorker {
    ready: LocalSignal,
    done: LocalSignal,
    frame: SharedBuffer,
    result: SharedBuffer,
}

impl WorkerSide for LocalWorker {
    fn frame_buffer(&self) -> &SharedBuffer {
        &self.frame
    }

    fn result_buffer(&self) -> &SharedBuffer {
        &self.result
    }

    fn wait_ready(&self, timeout: Duration) -> Result<WaitOutcome, IpcError> {
        self.ready.wait_timeout(timeout)
    }

    fn signal_done(&self) -> Result<(), IpcError> {
        self.done.post()
    }

    fn close(self) -> Result<(), IpcError> {
        Ok(())
    }
}

/// Host end of an in-process link.
pub struct LocalHost {
    ready: LocalSignal,
    done: LocalSignal,
    frame: SharedBuffer,
    result: SharedBuffer,
}

impl HostSide for LocalHost {
    fn frame_buffer(&self) -> &SharedBuffer {
        &self.frame
    }

    fn result_buffer(&self) -> &SharedBuffer {
        &self.result
    }

    fn signal_ready(&self) -> Result<(), IpcError> {
        self.ready.post()
    }

    fn wait_done(&self, timeout: Duration) -> Result<WaitOutcome, IpcError> {
        self.done.wait_timeout(timeout)
    }

    fn close(self) -> Result<(), IpcError> {
        Ok(())
    }
}
