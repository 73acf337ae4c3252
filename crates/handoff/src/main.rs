//! The hand tracking worker.
//!
//! With `HANDOFF_IPC=posix` (the default on Linux), this creates the shared memory objects and
//! serves the host process that opens them. With `HANDOFF_IPC=local`, it runs a synthetic producer
//! on another thread instead, which is useful for checking the frame loop without a host.
//!
//! No hand landmark network is bundled, so the worker reports no hands.

use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use handoff::{
    config::Config,
    controller::FrameLoop,
    drop::defer,
    hand::NoHands,
    host::Host,
    ipc::{local, Backend, WorkerSide},
    shutdown::Shutdown,
};

const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn main() -> anyhow::Result<()> {
    handoff::init_logger!();

    let config = Config::from_env()?;
    let shutdown = Shutdown::on_interrupt()?;

    log::info!(
        "starting worker with {} backend on {:?}",
        config.backend,
        config.names()
    );
    match config.backend {
        Backend::Posix => run_posix(&config, shutdown),
        Backend::Local => run_loopback(&config, shutdown),
    }
}

#[cfg(target_os = "linux")]
fn run_posix(config: &Config, shutdown: Shutdown) -> anyhow::Result<()> {
    let link = handoff::ipc::posix::PosixWorker::create(&config.names(), config.layout())
        .context("failed to create the shared memory link")?;
    serve(link, config, shutdown)
}

#[cfg(not(target_os = "linux"))]
fn run_posix(_config: &Config, _shutdown: Shutdown) -> anyhow::Result<()> {
    anyhow::bail!("the posix backend is only available on Linux; set `HANDOFF_IPC=local`")
}

fn serve<W: WorkerSide>(link: W, config: &Config, shutdown: Shutdown) -> anyhow::Result<()> {
    let mut frame_loop = FrameLoop::new(link, NoHands, config, shutdown)?;
    let res = frame_loop.run();
    let closed = frame_loop.close();
    res?;
    closed?;
    Ok(())
}

fn run_loopback(config: &Config, shutdown: Shutdown) -> anyhow::Result<()> {
    let (host, worker) = local::pair(&config.names(), config.layout());

    let producer = {
        let shutdown = shutdown.clone();
        let format = config.format;
        let timeout = config.poll_interval * 10;
        thread::Builder::new()
            .name("synthetic producer".into())
            .spawn(move || -> anyhow::Result<()> {
                // The worker has nothing to do once the producer is gone.
                let _stop = defer(|| shutdown.request());

                let mut host = Host::new(host, format)?;
                let frame = vec![0; format.byte_len()];
                let start = Instant::now();
                let (mut answered, mut dropped) = (0u64, 0u64);
                while !shutdown.is_requested() {
                    match host.process_frame(&frame, timeout)? {
                        Some(_) => answered += 1,
                        None => dropped += 1,
                    }
                    thread::sleep(SYNTHETIC_FRAME_INTERVAL);
                }
                log::info!(
                    "synthetic producer: {answered} frames answered, {dropped} dropped in {:.1?}",
                    start.elapsed()
                );
                Ok(())
            })?
    };

    let res = serve(worker, config, shutdown.clone());
    shutdown.request();
    let produced = producer
        .join()
        .map_err(|_| anyhow!("synthetic producer panicked"))?;
    res?;
    produced
}
