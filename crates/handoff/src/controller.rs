//! The worker's frame loop.

use std::time::{Duration, Instant};

use anyhow::Context;
use handoff_ipc::{IpcError, WaitOutcome, WorkerSide};

use crate::{
    config::Config,
    frame::{Frame, FrameFormat},
    hand::{HandDetector, TrackerState},
    result::{FrameResult, RESULT_LEN},
    shutdown::Shutdown,
    timer::{FpsCounter, Timer},
};

/// Lifecycle of a [`FrameLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Created, but no frame has been waited for yet.
    Idle,
    Running,
    /// Stopped by a shutdown request or a fatal error. A terminated loop does nothing.
    Terminated,
}

/// Outcome of one [`FrameLoop::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The wait timed out without a frame.
    Idle,
    /// A frame was processed and its result published.
    Processed(FrameResult),
    /// The loop has terminated.
    Stopped,
}

/// Waits for frames, runs hand detection and tracking on them, and publishes the results.
///
/// Each iteration follows the ready/done handshake: the worker only touches the frame buffer after
/// observing *ready*, and raises *done* only once the complete result is in the result buffer.
pub struct FrameLoop<W: WorkerSide, D: HandDetector> {
    link: W,
    detector: D,
    tracker: TrackerState,
    format: FrameFormat,
    poll_interval: Duration,
    shutdown: Shutdown,
    state: LoopState,
    epoch: Instant,
    last_timestamp: Option<u64>,
    frames: u64,
    timings: bool,
    t_read: Timer,
    t_infer: Timer,
    t_track: Timer,
    t_write: Timer,
    fps: FpsCounter,
}

impl<W: WorkerSide, D: HandDetector> FrameLoop<W, D> {
    /// Creates a frame loop on an established link.
    ///
    /// Fails if the link's buffers do not have the sizes `config` prescribes.
    pub fn new(
        link: W,
        detector: D,
        config: &Config,
        shutdown: Shutdown,
    ) -> Result<Self, IpcError> {
        link.frame_buffer()
            .expect_capacity("frame buffer", config.format.byte_len())?;
        link.result_buffer()
            .expect_capacity("result buffer", RESULT_LEN)?;

        Ok(Self {
            link,
            detector,
            tracker: TrackerState::new(config.tracker, config.format.resolution),
            format: config.format,
            poll_interval: config.poll_interval,
            shutdown,
            state: LoopState::Idle,
            epoch: Instant::now(),
            last_timestamp: None,
            frames: 0,
            timings: config.timings,
            t_read: Timer::new("read"),
            t_infer: Timer::new("infer"),
            t_track: Timer::new("track"),
            t_write: Timer::new("write"),
            fps: FpsCounter::new("frame loop"),
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn tracker(&self) -> &TrackerState {
        &self.tracker
    }

    /// Returns the number of frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs until shutdown is requested or an error occurs.
    ///
    /// Errors terminate the loop; the link stays owned by the loop and is released by
    /// [`FrameLoop::close`] or on drop.
    pub fn run(&mut self) -> anyhow::Result<()> {
        while self.step()? != Step::Stopped {}
        Ok(())
    }

    /// Performs a single iteration: one bounded wait and, if a frame arrived, processing it.
    pub fn step(&mut self) -> anyhow::Result<Step> {
        match self.state {
            LoopState::Terminated => return Ok(Step::Stopped),
            LoopState::Idle => {
                log::info!(
                    "waiting for {} frames (polling every {:?})",
                    self.format,
                    self.poll_interval
                );
                self.state = LoopState::Running;
            }
            LoopState::Running => {}
        }

        let res = self.iterate();
        if res.is_err() {
            self.terminate();
        }
        res
    }

    fn iterate(&mut self) -> anyhow::Result<Step> {
        if self.shutdown.is_requested() {
            self.terminate();
            return Ok(Step::Stopped);
        }

        match self.link.wait_ready(self.poll_interval)? {
            WaitOutcome::TimedOut => return Ok(Step::Idle),
            WaitOutcome::Signaled => {}
        }

        let timestamp = self.next_timestamp();

        let read_guard = self.t_read.start();
        // SAFETY: the host does not write the frame buffer between raising *ready* and observing
        // *done*, and *done* is raised only after `frame` is gone.
        let data = unsafe { self.link.frame_buffer().read_all() };
        let frame = Frame::new(self.format, data)?;
        drop(read_guard);

        let detections = self
            .t_infer
            .time(|| self.detector.detect(&frame, timestamp))
            .context("hand detection failed")?;
        log::trace!("frame {timestamp}ms: {} detection(s)", detections.len());

        let result = self.t_track.time(|| self.tracker.track(&detections));

        self.t_write
            .time(|| self.link.result_buffer().write_all(&result.encode()))?;

        if self.shutdown.is_requested() {
            // The host will time out waiting for this frame.
            self.terminate();
            return Ok(Step::Stopped);
        }
        self.link.signal_done()?;

        self.frames += 1;
        if self.timings {
            self.fps
                .tick_with(&[&self.t_read, &self.t_infer, &self.t_track, &self.t_write]);
        }

        Ok(Step::Processed(result))
    }

    /// Returns a millisecond timestamp that is strictly greater than the previous one.
    fn next_timestamp(&mut self) -> u64 {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        let timestamp = match self.last_timestamp {
            Some(last) if elapsed <= last => last + 1,
            _ => elapsed,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    fn terminate(&mut self) {
        if self.state != LoopState::Terminated {
            log::info!("frame loop stopped after {} frame(s)", self.frames);
            self.state = LoopState::Terminated;
        }
    }

    /// Terminates the loop and releases the link.
    pub fn close(mut self) -> Result<(), IpcError> {
        self.terminate();
        self.link.close()
    }
}

#[cfg(test)]
mod tests {
    use handoff_ipc::{local, HostSide, Names};

    use crate::{
        frame::Resolution,
        hand::{
            landmark::{Axes, NUM_LANDMARKS},
            Detection, Handedness, NoHands, Provenance,
        },
    };

    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        config.format.resolution = Resolution::new(8, 4);
        config.poll_interval = Duration::from_millis(5);
        config.tracker.axes = Axes::ImagePlane;
        config
    }

    fn link(config: &Config) -> (local::LocalHost, local::LocalWorker) {
        local::pair(&Names::with_prefix("controller_test"), config.layout())
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let config = config();
        let mut other = config.clone();
        other.format.resolution = Resolution::new(4, 4);
        let (_host, worker) = link(&other);
        match FrameLoop::new(worker, NoHands, &config, Shutdown::new()) {
            Err(IpcError::SizeMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 8 * 4 * 3);
                assert_eq!(actual, 4 * 4 * 3);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("mismatched layout accepted"),
        }
    }

    #[test]
    fn timeout_is_idle() {
        let config = config();
        let (_host, worker) = link(&config);
        let mut frame_loop = FrameLoop::new(worker, NoHands, &config, Shutdown::new()).unwrap();
        assert_eq!(frame_loop.state(), LoopState::Idle);
        assert_eq!(frame_loop.step().unwrap(), Step::Idle);
        assert_eq!(frame_loop.state(), LoopState::Running);
    }

    #[test]
    fn processes_a_frame() {
        let config = config();
        let (host, worker) = link(&config);
        let mut seen = Vec::new();
        let detector = |frame: &Frame<'_>, ts: u64| -> anyhow::Result<Vec<Detection>> {
            seen.push((frame.pixel(7, 3)[0], ts));
            Ok(vec![Detection::new(
                Handedness::Left,
                1.0,
                [[0.5, 0.5, 0.0]; NUM_LANDMARKS],
            )])
        };
        let mut frame_loop = FrameLoop::new(worker, detector, &config, Shutdown::new()).unwrap();

        let mut frame = vec![0; config.format.byte_len()];
        frame[(3 * 8 + 7) * 3] = 42;
        host.frame_buffer().write_all(&frame).unwrap();
        host.signal_ready().unwrap();

        let Step::Processed(result) = frame_loop.step().unwrap() else {
            panic!("frame not processed");
        };
        let left = result.left.unwrap();
        assert_eq!(left.provenance, Provenance::Detected);
        assert_eq!(left.pose.wrist(), [4.0, 2.0, 0.0]);
        assert!(result.right.is_none());

        assert_eq!(
            host.wait_done(Duration::from_secs(1)).unwrap(),
            WaitOutcome::Signaled
        );
        let record = unsafe { host.result_buffer().read_all() };
        assert_eq!(record, &result.encode()[..]);

        host.signal_ready().unwrap();
        frame_loop.step().unwrap();
        assert_eq!(frame_loop.frames(), 2);
        drop(frame_loop);
        assert_eq!(seen[0].0, 42);
        assert!(seen[1].1 > seen[0].1, "timestamps not increasing: {seen:?}");
    }

    #[test]
    fn detector_failure_terminates() {
        let config = config();
        let (host, worker) = link(&config);
        let detector = |_: &Frame<'_>, _: u64| -> anyhow::Result<Vec<Detection>> {
            anyhow::bail!("model crashed")
        };
        let mut frame_loop = FrameLoop::new(worker, detector, &config, Shutdown::new()).unwrap();
        host.signal_ready().unwrap();
        assert!(frame_loop.run().is_err());
        assert_eq!(frame_loop.state(), LoopState::Terminated);
        assert_eq!(frame_loop.step().unwrap(), Step::Stopped);
        assert_eq!(
            host.wait_done(Duration::from_millis(10)).unwrap(),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let config = config();
        let (_host, worker) = link(&config);
        let shutdown = Shutdown::new();
        let mut frame_loop = FrameLoop::new(worker, NoHands, &config, shutdown.clone()).unwrap();
        assert_eq!(frame_loop.step().unwrap(), Step::Idle);
        shutdown.request();
        frame_loop.run().unwrap();
        assert_eq!(frame_loop.state(), LoopState::Terminated);
        frame_loop.close().unwrap();
    }

    #[test]
    fn shutdown_mid_frame_withholds_done() {
        let config = config();
        let (host, worker) = link(&config);
        let shutdown = Shutdown::new();
        let flag = shutdown.clone();
        let detector = move |_: &Frame<'_>, _: u64| -> anyhow::Result<Vec<Detection>> {
            flag.request();
            Ok(Vec::new())
        };
        let mut frame_loop = FrameLoop::new(worker, detector, &config, shutdown).unwrap();
        host.signal_ready().unwrap();
        assert_eq!(frame_loop.step().unwrap(), Step::Stopped);
        assert_eq!(
            host.wait_done(Duration::from_millis(10)).unwrap(),
            WaitOutcome::TimedOut
        );
    }
}
