//! POSIX shared memory and named semaphore backend.
//!
//! The worker creates all four objects (replacing stale ones left behind by a crashed run) and
//! unlinks them again when it is closed or dropped. The host only opens existing objects and
//! checks that the buffers have the agreed size.
//!
//! POSIX semaphores count, but [`Signal::post`] only posts when the semaphore is at zero, which
//! turns them into the coalescing binary signals the handshake expects. The check is not atomic
//! with the post, but each semaphore has exactly one posting side and the other side can only
//! decrement it, so the value cannot rise between the check and the post.

use std::{
    ffi::CString,
    fs::File,
    io,
    os::fd::FromRawFd,
    ptr,
    time::Duration,
};

use memmap2::MmapOptions;

use crate::{HostSide, IpcError, Layout, Names, SharedBuffer, Signal, WaitOutcome, WorkerSide};

fn c_name(name: &str) -> Result<CString, IpcError> {
    let valid = name.len() > 1 && name.starts_with('/') && !name[1..].contains('/');
    if !valid {
        return Err(IpcError::InvalidName(name.to_string()));
    }
    CString::new(name).map_err(|_| IpcError::InvalidName(name.to_string()))
}

fn last_os_error(op: &'static str, name: &str) -> IpcError {
    IpcError::os(op, name, io::Error::last_os_error())
}

/// A named POSIX semaphore used as a binary signal.
struct Semaphore {
    name: String,
    cname: CString,
    sem: *mut libc::sem_t,
    owner: bool,
}

// `sem_t` handles are safe to use from any thread.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    fn create(name: &str) -> Result<Self, IpcError> {
        let cname = c_name(name)?;
        unsafe {
            if libc::sem_unlink(cname.as_ptr()) == 0 {
                log::debug!("removed stale semaphore `{name}`");
            }
        }
        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                0 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(last_os_error("sem_open", name));
        }
        Ok(Self {
            name: name.to_string(),
            cname,
            sem,
            owner: true,
        })
    }

    fn open(name: &str) -> Result<Self, IpcError> {
        let cname = c_name(name)?;
        let sem = unsafe { libc::sem_open(cname.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(last_os_error("sem_open", name));
        }
        Ok(Self {
            name: name.to_string(),
            cname,
            sem,
            owner: false,
        })
    }

    fn value(&self) -> Result<i32, IpcError> {
        let mut value = 0;
        if unsafe { libc::sem_getvalue(self.sem, &mut value) } != 0 {
            return Err(last_os_error("sem_getvalue", &self.name));
        }
        Ok(value)
    }

    /// Closes the handle and, on the creating side, unlinks the name. Idempotent.
    fn close(&mut self) -> Result<(), IpcError> {
        if self.sem.is_null() {
            return Ok(());
        }
        let sem = std::mem::replace(&mut self.sem, ptr::null_mut());
        if unsafe { libc::sem_close(sem) } != 0 {
            return Err(last_os_error("sem_close", &self.name));
        }
        if self.owner && unsafe { libc::sem_unlink(self.cname.as_ptr()) } != 0 {
            return Err(last_os_error("sem_unlink", &self.name));
        }
        Ok(())
    }
}

impl Signal for Semaphore {
    fn post(&self) -> Result<(), IpcError> {
        if self.value()? > 0 {
            log::trace!("`{}` already pending", self.name);
            return Ok(());
        }
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(last_os_error("sem_post", &self.name));
        }
        Ok(())
    }

    fn wait_timeout(&self, timeout: Duration) -> Result<WaitOutcome, IpcError> {
        // `sem_timedwait` takes an absolute `CLOCK_REALTIME` deadline.
        let mut deadline: libc::timespec = unsafe { std::mem::zeroed() };
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut deadline) } != 0 {
            return Err(last_os_error("clock_gettime", &self.name));
        }
        let nanos = deadline.tv_nsec as i64 + i64::from(timeout.subsec_nanos());
        let secs = timeout.as_secs().saturating_add((nanos / 1_000_000_000) as u64);
        let secs = libc::time_t::try_from(secs).unwrap_or(libc::time_t::MAX);
        deadline.tv_sec = deadline.tv_sec.saturating_add(secs);
        deadline.tv_nsec = (nanos % 1_000_000_000) as _;

        loop {
            if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
                return Ok(WaitOutcome::Signaled);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(WaitOutcome::TimedOut),
                _ => return Err(IpcError::os("sem_timedwait", &self.name, err)),
            }
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("failed to release semaphore: {e}");
        }
    }
}

/// The name of a shared memory object, unlinked on drop by the creating side.
struct ShmName {
    name: String,
    cname: CString,
    owner: bool,
}

impl ShmName {
    /// Unlinks the name if this side created it. Idempotent.
    fn unlink(&mut self) -> Result<(), IpcError> {
        if !self.owner {
            return Ok(());
        }
        self.owner = false;
        if unsafe { libc::shm_unlink(self.cname.as_ptr()) } != 0 {
            return Err(last_os_error("shm_unlink", &self.name));
        }
        Ok(())
    }
}

impl Drop for ShmName {
    fn drop(&mut self) {
        if let Err(e) = self.unlink() {
            log::error!("failed to release shared memory: {e}");
        }
    }
}

fn create_shm(name: &str, len: usize) -> Result<(SharedBuffer, ShmName), IpcError> {
    let cname = c_name(name)?;
    unsafe {
        if libc::shm_unlink(cname.as_ptr()) == 0 {
            log::debug!("removed stale shared memory `{name}`");
        }
    }
    let fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600,
        )
    };
    if fd < 0 {
        return Err(last_os_error("shm_open", name));
    }
    let shm = ShmName {
        name: name.to_string(),
        cname,
        owner: true,
    };

    // SAFETY: `fd` was just returned by `shm_open` and is owned by nothing else.
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(len as u64)
        .map_err(|e| IpcError::os("ftruncate", name, e))?;
    let map = MmapOptions::new()
        .len(len)
        .map_raw(&file)
        .map_err(|e| IpcError::os("mmap", name, e))?;

    Ok((SharedBuffer::mapped(name, map), shm))
}

fn open_shm(name: &str, len: usize, what: &'static str) -> Result<SharedBuffer, IpcError> {
    let cname = c_name(name)?;
    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0) };
    if fd < 0 {
        return Err(last_os_error("shm_open", name));
    }

    // SAFETY: `fd` was just returned by `shm_open` and is owned by nothing else.
    let file = unsafe { File::from_raw_fd(fd) };
    let actual = file
        .metadata()
        .map_err(|e| IpcError::os("fstat", name, e))?
        .len() as usize;
    if actual != len {
        return Err(IpcError::SizeMismatch {
            what,
            expected: len,
            actual,
        });
    }
    let map = MmapOptions::new()
        .len(len)
        .map_raw(&file)
        .map_err(|e| IpcError::os("mmap", name, e))?;

    Ok(SharedBuffer::mapped(name, map))
}

/// Worker end of a POSIX link. Creates and owns all objects.
///
/// Field order is drop order: signals are released before the shared memory.
pub struct PosixWorker {
    ready: Semaphore,
    done: Semaphore,
    frame: SharedBuffer,
    result: SharedBuffer,
    frame_shm: ShmName,
    result_shm: ShmName,
}

impl PosixWorker {
    /// Creates the shared memory objects and semaphores named by `names`.
    pub fn create(names: &Names, layout: Layout) -> Result<Self, IpcError> {
        let (frame, frame_shm) = create_shm(&names.frame, layout.frame_len)?;
        let (result, result_shm) = create_shm(&names.result, layout.result_len)?;
        let ready = Semaphore::create(&names.ready)?;
        let done = Semaphore::create(&names.done)?;

        log::debug!("created POSIX link {names:?} with {layout:?}");

        Ok(Self {
            ready,
            done,
            frame,
            result,
            frame_shm,
            result_shm,
        })
    }
}

impl WorkerSide for PosixWorker {
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

    fn close(mut self) -> Result<(), IpcError> {
        let results = [
            self.ready.close(),
            self.done.close(),
            self.frame_shm.unlink(),
            self.result_shm.unlink(),
        ];
        log::debug!("closed POSIX link");
        results.into_iter().collect()
    }
}

/// Host end of a POSIX link. Opens objects created by a [`PosixWorker`].
pub struct PosixHost {
    ready: Semaphore,
    done: Semaphore,
    frame: SharedBuffer,
    result: SharedBuffer,
}

impl PosixHost {
    /// Opens the objects named by `names`, failing if the buffers don't match `layout`.
    pub fn open(names: &Names, layout: Layout) -> Result<Self, IpcError> {
        let frame = open_shm(&names.frame, layout.frame_len, "frame buffer")?;
        let result = open_shm(&names.result, layout.result_len, "result buffer")?;
        let ready = Semaphore::open(&names.ready)?;
        let done = Semaphore::open(&names.done)?;
        Ok(Self {
            ready,
            done,
            frame,
            result,
        })
    }
}

impl HostSide for PosixHost {
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

    fn close(mut self) -> Result<(), IpcError> {
        let results = [self.ready.close(), self.done.close()];
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    const LAYOUT: Layout = Layout {
        frame_len: 64 * 48 * 3,
        result_len: 504,
    };

    const SHORT: Duration = Duration::from_millis(20);

    fn unique_names() -> Names {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Names::with_prefix(&format!("handoff_test_{}_{n}", std::process::id()))
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(matches!(c_name("noslash"), Err(IpcError::InvalidName(_))));
        assert!(matches!(c_name("/a/b"), Err(IpcError::InvalidName(_))));
        assert!(matches!(c_name("/"), Err(IpcError::InvalidName(_))));
        assert!(matches!(c_name("/a\0b"), Err(IpcError::InvalidName(_))));
        assert!(c_name("/handoff_frame").is_ok());
    }

    #[test]
    fn exchange_across_handles() {
        let names = unique_names();
        let worker = PosixWorker::create(&names, LAYOUT).unwrap();
        let host = PosixHost::open(&names, LAYOUT).unwrap();

        host.frame_buffer().write_all(&[7; 64 * 48 * 3]).unwrap();
        host.signal_ready().unwrap();
        host.signal_ready().unwrap();
        assert_eq!(worker.wait_ready(SHORT).unwrap(), WaitOutcome::Signaled);
        assert_eq!(worker.wait_ready(SHORT).unwrap(), WaitOutcome::TimedOut);
        assert!(unsafe { worker.frame_buffer().read_all() }
            .iter()
            .all(|&b| b == 7));

        worker.result_buffer().write_all(&[1; 504]).unwrap();
        worker.signal_done().unwrap();
        assert_eq!(host.wait_done(SHORT).unwrap(), WaitOutcome::Signaled);
        assert_eq!(unsafe { host.result_buffer().read_all() }, &[1; 504][..]);

        host.close().unwrap();
        worker.close().unwrap();

        assert!(PosixHost::open(&names, LAYOUT).is_err());
    }

    #[test]
    fn huge_timeout_still_returns_posted_signal() {
        let names = unique_names();
        let worker = PosixWorker::create(&names, LAYOUT).unwrap();
        let host = PosixHost::open(&names, LAYOUT).unwrap();

        for timeout in [Duration::from_millis(u64::MAX), Duration::MAX] {
            host.signal_ready().unwrap();
            assert_eq!(worker.wait_ready(timeout).unwrap(), WaitOutcome::Signaled);
        }
    }

    #[test]
    fn host_checks_layout() {
        let names = unique_names();
        let _worker = PosixWorker::create(&names, LAYOUT).unwrap();
        let wrong = Layout {
            frame_len: 1920 * 1080 * 3,
            ..LAYOUT
        };
        assert!(matches!(
            PosixHost::open(&names, wrong),
            Err(IpcError::SizeMismatch {
                expected: 6220800,
                actual: 9216,
                ..
            })
        ));
    }
}
