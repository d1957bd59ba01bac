//! A tiny anonymous `MAP_SHARED` mapping created before `fork()`.
//!
//! Everything else a `Worker` hands its child crosses through a channel, but
//! `current_run` and the stop flag are polled/written far more often than
//! that justifies a message round-trip, and they only ever need "latest
//! value wins" semantics. A `mmap`'d region created before the fork stays
//! backed by the same physical pages in both processes - unlike ordinary
//! heap memory, which diverges under copy-on-write the moment either side
//! writes to it - so a plain atomic store in the child is visible to the
//! parent's very next load, no syscall required.

use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use nix::sys::mman::{mmap_anonymous, MapFlags, ProtFlags};

/// Two atomics living in shared memory: the worker's current run index, and
/// whether the parent has requested a graceful stop.
pub struct SharedProgress {
    current_run: NonNull<AtomicU64>,
    stop_requested: NonNull<AtomicBool>,
    len: usize,
}

// SAFETY: both pointers reference an anonymous `MAP_SHARED` region; the
// atomics themselves provide the synchronization that makes sharing across
// processes (and, within a process, across the handle's clones) sound.
unsafe impl Send for SharedProgress {}
unsafe impl Sync for SharedProgress {}

impl SharedProgress {
    pub fn new() -> nix::Result<Self> {
        let run_size = std::mem::size_of::<AtomicU64>();
        let stop_size = std::mem::size_of::<AtomicBool>();
        let len = run_size + stop_size;
        let map_len = NonZeroUsize::new(len).expect("layout size is nonzero");

        // SAFETY: anonymous mapping, no file descriptor involved.
        let base = unsafe {
            mmap_anonymous(
                None,
                map_len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )?
        };

        let current_run: NonNull<AtomicU64> = base.cast();
        // SAFETY: freshly mapped, zeroed pages; writing an `AtomicU64::new`
        // in place is a valid initialization of that memory.
        unsafe {
            current_run.as_ptr().write(AtomicU64::new(0));
        }

        let stop_ptr = unsafe { base.as_ptr().add(run_size) } as *mut AtomicBool;
        let stop_requested = NonNull::new(stop_ptr).expect("offset pointer is non-null");
        // SAFETY: same reasoning as above, at the computed offset.
        unsafe {
            stop_requested.as_ptr().write(AtomicBool::new(false));
        }

        Ok(Self {
            current_run,
            stop_requested,
            len,
        })
    }

    pub fn current_run(&self) -> u64 {
        unsafe { self.current_run.as_ref() }.load(Ordering::Acquire)
    }

    pub fn set_current_run(&self, value: u64) {
        unsafe { self.current_run.as_ref() }.store(value, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        unsafe { self.stop_requested.as_ref() }.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        unsafe { self.stop_requested.as_ref() }.store(true, Ordering::Release);
    }
}

impl Drop for SharedProgress {
    fn drop(&mut self) {
        // SAFETY: `self.current_run` is the base address returned by the
        // `mmap_anonymous` call that sized this mapping to `self.len`.
        unsafe {
            let _ = nix::sys::mman::munmap(self.current_run.cast(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_zero_run_and_no_stop_request() {
        let shared = SharedProgress::new().unwrap();
        assert_eq!(shared.current_run(), 0);
        assert!(!shared.stop_requested());
    }

    #[test]
    fn current_run_and_stop_flag_are_independently_settable() {
        let shared = SharedProgress::new().unwrap();
        shared.set_current_run(7);
        shared.request_stop();
        assert_eq!(shared.current_run(), 7);
        assert!(shared.stop_requested());
    }
}
