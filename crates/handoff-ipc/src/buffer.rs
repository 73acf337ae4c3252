//! Fixed-capacity byte regions shared between the two sides of a link.

use std::{cell::UnsafeCell, fmt, ptr, slice, sync::Arc};

use crate::IpcError;

enum Backing {
    Heap(Box<[UnsafeCell<u8>]>),
    #[cfg(target_os = "linux")]
    Mapped(memmap2::MmapRaw),
}

struct Region {
    backing: Backing,
}

// Access to the contents is serialized by the ready/done handshake, not by this type. The region
// itself is just memory that both sides alias, exactly like a mapping shared with another process.
unsafe impl Sync for Region {}

impl Region {
    fn as_mut_ptr(&self) -> *mut u8 {
        match &self.backing {
            Backing::Heap(cells) => UnsafeCell::raw_get(cells.as_ptr()),
            #[cfg(target_os = "linux")]
            Backing::Mapped(map) => map.as_mut_ptr(),
        }
    }

    fn len(&self) -> usize {
        match &self.backing {
            Backing::Heap(cells) => cells.len(),
            #[cfg(target_os = "linux")]
            Backing::Mapped(map) => map.len(),
        }
    }
}

/// A fixed-capacity byte region with one writer and one reader.
///
/// The buffer never grows. Writers must stay inside the declared capacity, and whole-buffer
/// writes must produce exactly `capacity` bytes; anything else is reported as
/// [`IpcError::SizeMismatch`], since both processes rely on a layout that is agreed out-of-band.
///
/// [`SharedBuffer`] performs no locking. Whoever holds the buffer has to follow the handshake:
/// the producer only writes the frame buffer before raising *ready*, and the consumer only reads
/// it after observing *ready* and before raising *done* (and the reverse for the result buffer).
#[derive(Clone)]
pub struct SharedBuffer {
    name: String,
    region: Arc<Region>,
}

impl SharedBuffer {
    /// Creates a zero-filled, heap-backed buffer.
    ///
    /// Clones of the returned buffer alias the same memory, which is what the in-process backend
    /// uses to connect both sides.
    pub fn heap(name: impl Into<String>, capacity: usize) -> Self {
        let cells = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
        Self {
            name: name.into(),
            region: Arc::new(Region {
                backing: Backing::Heap(cells),
            }),
        }
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn mapped(name: impl Into<String>, map: memmap2::MmapRaw) -> Self {
        Self {
            name: name.into(),
            region: Arc::new(Region {
                backing: Backing::Mapped(map),
            }),
        }
    }

    /// Returns the name this buffer was created or opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Fails with [`IpcError::SizeMismatch`] unless the buffer holds exactly `expected` bytes.
    pub fn expect_capacity(&self, what: &'static str, expected: usize) -> Result<(), IpcError> {
        if self.capacity() == expected {
            Ok(())
        } else {
            Err(IpcError::SizeMismatch {
                what,
                expected,
                actual: self.capacity(),
            })
        }
    }

    /// Returns the whole contents of the buffer.
    ///
    /// # Safety
    ///
    /// The other side must not write to the buffer while the returned slice is alive. Under the
    /// ready/done handshake this holds for the frame buffer between observing *ready* and raising
    /// *done*, and for the result buffer between observing *done* and raising the next *ready*.
    pub unsafe fn read_all(&self) -> &[u8] {
        slice::from_raw_parts(self.region.as_mut_ptr(), self.capacity())
    }

    /// Copies `bytes` into the buffer, starting at `offset`.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<(), IpcError> {
        let end = offset.saturating_add(bytes.len());
        if end > self.capacity() {
            return Err(IpcError::SizeMismatch {
                what: "write past the end of a shared buffer",
                expected: self.capacity(),
                actual: end,
            });
        }

        // SAFETY: `offset..end` is in bounds (checked above), and `bytes` cannot overlap the
        // region since nothing hands out mutable slices of it.
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.region.as_mut_ptr().add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Overwrites the entire buffer with `bytes`, which must be exactly `capacity` bytes long.
    pub fn write_all(&self, bytes: &[u8]) -> Result<(), IpcError> {
        if bytes.len() != self.capacity() {
            return Err(IpcError::SizeMismatch {
                what: "whole-buffer write",
                expected: self.capacity(),
                actual: bytes.len(),
            });
        }
        self.write_at(0, bytes)
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_buffer_starts_zeroed() {
        let buf = SharedBuffer::heap("test", 16);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(unsafe { buf.read_all() }, &[0; 16]);
    }

    #[test]
    fn clones_alias_the_same_memory() {
        let a = SharedBuffer::heap("test", 4);
        let b = a.clone();
        a.write_all(&[1, 2, 3, 4]).unwrap();
        assert_eq!(unsafe { b.read_all() }, &[1, 2, 3, 4]);
    }

    #[test]
    fn write_at_offset() {
        let buf = SharedBuffer::heap("test", 6);
        buf.write_at(2, &[7, 8]).unwrap();
        buf.write_at(6, &[]).unwrap();
        assert_eq!(unsafe { buf.read_all() }, &[0, 0, 7, 8, 0, 0]);
    }

    #[test]
    fn rejects_size_mismatch() {
        let buf = SharedBuffer::heap("test", 4);
        assert!(matches!(
            buf.write_all(&[0; 3]),
            Err(IpcError::SizeMismatch {
                expected: 4,
                actual: 3,
                ..
            })
        ));
        assert!(matches!(
            buf.write_at(3, &[0; 2]),
            Err(IpcError::SizeMismatch {
                expected: 4,
                actual: 5,
                ..
            })
        ));
        assert!(buf.write_at(usize::MAX, &[0]).is_err());
        assert!(buf.expect_capacity("frame", 4).is_ok());
        assert!(buf.expect_capacity("frame", 5).is_err());
    }
}
