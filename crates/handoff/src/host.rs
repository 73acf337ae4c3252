//! The producer's end of the exchange.

use std::{mem, time::Duration};

use handoff_ipc::{HostSide, IpcError, WaitOutcome};

use crate::{
    frame::{bgra_to_rgb, FrameFormat},
    result::{HandLandmarks, RESULT_LEN},
};

/// Hands frames to a worker and reads back its results, one frame at a time.
pub struct Host<H: HostSide> {
    link: H,
    format: FrameFormat,
    /// Whether a frame timed out and its *done* has not arrived yet. The worker may still be
    /// reading the frame buffer while this is set.
    stale_done: bool,
    scratch: Vec<u8>,
}

impl<H: HostSide> Host<H> {
    /// Wraps an established link, checking its buffer sizes against `format`.
    pub fn new(link: H, format: FrameFormat) -> Result<Self, IpcError> {
        link.frame_buffer()
            .expect_capacity("frame buffer", format.byte_len())?;
        link.result_buffer()
            .expect_capacity("result buffer", RESULT_LEN)?;
        Ok(Self {
            link,
            format,
            stale_done: false,
            scratch: Vec::new(),
        })
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Sends a packed frame in the link's format and waits up to `timeout` for the hands found in
    /// it.
    ///
    /// Returns [`None`] if the worker did not finish in time. The frame is then dropped; there is
    /// no retry.
    ///
    /// If an earlier frame was dropped, this first waits up to `timeout` for the worker to finish
    /// it and discards that late result. Should the worker still be busy, `frame` is dropped
    /// without being sent.
    pub fn process_frame(
        &mut self,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<Option<HandLandmarks>, IpcError> {
        if self.stale_done {
            match self.link.wait_done(timeout)? {
                WaitOutcome::Signaled => {
                    log::debug!("discarded late result of a dropped frame");
                    self.stale_done = false;
                }
                WaitOutcome::TimedOut => {
                    log::debug!("worker still busy with a dropped frame, skipping this one");
                    return Ok(None);
                }
            }
        }

        self.link.frame_buffer().write_all(frame)?;
        self.link.signal_ready()?;

        match self.link.wait_done(timeout)? {
            WaitOutcome::Signaled => {
                // SAFETY: the worker writes the result buffer only between observing *ready* and
                // raising *done*, and *ready* is not raised again while `record` is alive.
                let record = unsafe { self.link.result_buffer().read_all() };
                HandLandmarks::decode(record).map(Some)
            }
            WaitOutcome::TimedOut => {
                log::debug!("no result within {timeout:?}, dropping frame");
                self.stale_done = true;
                Ok(None)
            }
        }
    }

    /// Like [`Host::process_frame`], but takes a BGRA image (as delivered by most webcam APIs) and
    /// converts it to RGB first.
    ///
    /// The link's format must have 3 channels, and `bgra` must have 4 bytes per pixel of it.
    pub fn process_bgra_frame(
        &mut self,
        bgra: &[u8],
        timeout: Duration,
    ) -> Result<Option<HandLandmarks>, IpcError> {
        let mut rgb = mem::take(&mut self.scratch);
        rgb.resize(self.format.byte_len(), 0);
        let res = bgra_to_rgb(bgra, &mut rgb).and_then(|()| self.process_frame(&rgb, timeout));
        self.scratch = rgb;
        res
    }

    pub fn close(self) -> Result<(), IpcError> {
        self.link.close()
    }
}
