//! Runtime configuration.
//!
//! The defaults pin the canonical policy. Every field can be overridden with an environment
//! variable:
//!
//! * `HANDOFF_IPC`: `posix` (default on Linux) or `local`.
//! * `HANDOFF_NAME_PREFIX`: prefix of the shared memory and semaphore names (default `handoff`).
//! * `HANDOFF_FRAME_WIDTH`, `HANDOFF_FRAME_HEIGHT`, `HANDOFF_FRAME_CHANNELS`: frame dimensions
//!   (default 1920, 1080, 3).
//! * `HANDOFF_POLL_MS`: how long each wait for a frame may block before the shutdown flag is
//!   checked again (default 100).
//! * `HANDOFF_PROJECTION`: whether missed hands are replaced by projected poses (default on).
//! * `HANDOFF_TOLERANCE`: how many consecutive missed frames are projected (default 2).
//! * `HANDOFF_AXES`: `depth-up` (default) or `image-plane`.
//! * `HANDOFF_FLIP_HANDEDNESS`: swap the reported handedness, for mirrored images (default off).
//! * `HANDOFF_TIMINGS`: log per-stage timings and FPS (default off).
//!
//! Boolean variables accept `1`/`true`/`on` and `0`/`false`/`off`.

use std::{env, env::VarError, fmt, str::FromStr, time::Duration};

use anyhow::{anyhow, bail};
use handoff_ipc::{Backend, Layout, Names};

use crate::{
    frame::{FrameFormat, Resolution},
    hand::TrackerConfig,
    result::RESULT_LEN,
};

/// Configuration of the worker (and of the host end of the probe).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend: Backend,
    pub name_prefix: String,
    pub format: FrameFormat,
    pub poll_interval: Duration,
    pub tracker: TrackerConfig,
    pub timings: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: if cfg!(target_os = "linux") {
                Backend::Posix
            } else {
                Backend::Local
            },
            name_prefix: String::from("handoff"),
            format: FrameFormat::default(),
            poll_interval: Duration::from_millis(100),
            tracker: TrackerConfig::default(),
            timings: false,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| env::var(name))
    }

    /// Reads the configuration through `lookup`, which behaves like [`std::env::var`].
    pub fn from_vars(lookup: impl Fn(&str) -> Result<String, VarError>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        let var = |name: &'static str| Var {
            name,
            value: lookup(name),
        };

        var("HANDOFF_IPC").parse_into(&mut config.backend)?;
        var("HANDOFF_NAME_PREFIX").parse_into(&mut config.name_prefix)?;

        let mut width = config.format.resolution.width();
        let mut height = config.format.resolution.height();
        var("HANDOFF_FRAME_WIDTH").parse_into(&mut width)?;
        var("HANDOFF_FRAME_HEIGHT").parse_into(&mut height)?;
        var("HANDOFF_FRAME_CHANNELS").parse_into(&mut config.format.channels)?;
        if width == 0 || height == 0 || config.format.channels == 0 {
            bail!(
                "frame dimensions must be non-zero, got {width}x{height}x{}",
                config.format.channels
            );
        }
        config.format.resolution = Resolution::new(width, height);

        let mut poll_ms = config.poll_interval.as_millis() as u64;
        var("HANDOFF_POLL_MS").parse_into(&mut poll_ms)?;
        if poll_ms == 0 {
            bail!("`HANDOFF_POLL_MS` must be at least 1");
        }
        config.poll_interval = Duration::from_millis(poll_ms);

        var("HANDOFF_PROJECTION").flag_into(&mut config.tracker.projection)?;
        var("HANDOFF_TOLERANCE").parse_into(&mut config.tracker.tolerance)?;
        var("HANDOFF_AXES").parse_into(&mut config.tracker.axes)?;
        var("HANDOFF_FLIP_HANDEDNESS").flag_into(&mut config.tracker.flip_handedness)?;
        var("HANDOFF_TIMINGS").flag_into(&mut config.timings)?;

        if config.name_prefix.is_empty() || config.name_prefix.contains('/') {
            bail!(
                "invalid value set for `HANDOFF_NAME_PREFIX` variable: '{}'",
                config.name_prefix
            );
        }

        Ok(config)
    }

    pub fn names(&self) -> Names {
        Names::with_prefix(&self.name_prefix)
    }

    pub fn layout(&self) -> Layout {
        Layout {
            frame_len: self.format.byte_len(),
            result_len: RESULT_LEN,
        }
    }
}

struct Var {
    name: &'static str,
    value: Result<String, VarError>,
}

impl Var {
    /// Overwrites `dest` with the parsed value, if the variable is set.
    fn parse_into<T>(self, dest: &mut T) -> anyhow::Result<()>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if let Some(v) = self.value()? {
            *dest = v.parse().map_err(|e| {
                anyhow!("invalid value set for `{}` variable: '{v}' ({e})", self.name)
            })?;
        }
        Ok(())
    }

    fn flag_into(self, dest: &mut bool) -> anyhow::Result<()> {
        match self.value()?.as_deref() {
            None => {}
            Some("1" | "true" | "on") => *dest = true,
            Some("0" | "false" | "off") => *dest = false,
            Some(v) => bail!("invalid value set for `{}` variable: '{v}'", self.name),
        }
        Ok(())
    }

    fn value(&self) -> anyhow::Result<Option<String>> {
        match &self.value {
            Ok(v) => Ok(Some(v.clone())),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(s)) => bail!(
                "invalid value set for `{}` variable: {}",
                self.name,
                s.to_string_lossy()
            ),
        }
    }
}
