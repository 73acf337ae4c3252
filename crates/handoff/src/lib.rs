//! Hand tracking worker fed over shared memory.
//!
//! A host process (the *producer*) writes video frames into a shared frame buffer and raises a
//! *ready* signal. The worker (the *consumer*, driven by [`controller::FrameLoop`]) runs a
//! [`hand::HandDetector`] on the frame, assigns the detected hands to a fixed left and right slot
//! with [`hand::TrackerState`], writes a fixed-size [`result::FrameResult`] record into the shared
//! result buffer and raises *done*. [`host::Host`] implements the producer's side of this exchange.
//!
//! The transport itself lives in the [`handoff_ipc`] crate.
//!
//! # Coordinates
//!
//! Detectors report landmarks normalized to the frame. The tracker converts them into pixel-scaled
//! coordinates according to [`hand::landmark::Axes`]; by default the model's depth is mapped onto
//! the Y axis of the host's scene (`(x·W, -z·W, y·H)`).
//!
//! # Environment Variables
//!
//! The worker and probe binaries read their configuration from `HANDOFF_*` environment variables,
//! see [`config`] for the full list. Logging is configured with `RUST_LOG`.

use log::LevelFilter;

pub mod config;
pub mod controller;
pub mod drop;
pub mod frame;
pub mod hand;
pub mod host;
pub mod result;
pub mod shutdown;
pub mod timer;

pub use handoff_ipc as ipc;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("handoff_ipc"), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and handoff will log at *trace* level.
/// Otherwise, they will log at *debug* level. Everything else logs at *info* level.
///
/// `RUST_LOG` overrides these defaults.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
