//! Sends a few black frames to a running worker and logs what comes back.
//!
//! Uses the same `HANDOFF_*` configuration as the worker, which must already be running.

use std::time::Duration;

use handoff::{config::Config, hand::Handedness, timer::Timer};

const PROBE_FRAMES: usize = 5;
const TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    handoff::init_logger!();

    let config = Config::from_env()?;
    probe(&config)
}

#[cfg(target_os = "linux")]
fn probe(config: &Config) -> anyhow::Result<()> {
    use anyhow::Context;
    use handoff::{host::Host, ipc::posix::PosixHost};

    let link = PosixHost::open(&config.names(), config.layout())
        .context("failed to open the shared memory link (is the worker running?)")?;
    let mut host = Host::new(link, config.format)?;

    let frame = vec![0; config.format.byte_len()];
    let t_roundtrip = Timer::new("roundtrip");
    for i in 0..PROBE_FRAMES {
        let hands = t_roundtrip.time(|| host.process_frame(&frame, TIMEOUT))?;
        let Some(hands) = hands else {
            log::warn!("frame {i}: no result within {TIMEOUT:?}");
            continue;
        };
        for hand in [Handedness::Left, Handedness::Right] {
            match hands.hand(hand) {
                Some(pose) => log::info!("frame {i}: {hand:?} hand, wrist at {:?}", pose.wrist()),
                None => log::info!("frame {i}: no {hand:?} hand"),
            }
        }
    }
    log::info!("{t_roundtrip}");

    host.close()?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn probe(_config: &Config) -> anyhow::Result<()> {
    anyhow::bail!("the probe needs the posix backend, which is only available on Linux")
}
