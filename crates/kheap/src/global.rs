//! [`GlobalAlloc`] adapter over the kernel heap.

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
};

use log::warn;
use snafu::ensure;
use spin::Mutex;

use crate::{
    fault::{AlreadyInitializedSnafu, InitError},
    heap::{Heap, HeapConfig},
    layout::GRANULARITY,
    platform::{CriticalSection, Platform},
};

/// A heap that can live in a `static` and serve as `#[global_allocator]`.
///
/// The critical section is entered before the lock is taken, so an
/// interrupt handler never spins on a lock held by the code it interrupted.
pub struct LockedHeap<P>
where
    P: Platform,
{
    inner: Mutex<Option<Heap<P>>>,
}

impl<P> Default for LockedHeap<P>
where
    P: Platform,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> LockedHeap<P>
where
    P: Platform,
{
    /// Creates an uninitialized heap. Every allocation fails until
    /// [`init`](Self::init) succeeds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Maps and seeds the heap. Must succeed exactly once.
    pub fn init(&self, platform: P, config: &HeapConfig) -> Result<(), InitError> {
        let _critical = CriticalSection::<P>::enter();
        let mut inner = self.inner.lock();
        ensure!(inner.is_none(), AlreadyInitializedSnafu);
        *inner = Some(Heap::init(platform, config)?);
        Ok(())
    }

    /// Runs `f` on the heap, or returns `None` if it is not initialized.
    pub fn with<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Heap<P>) -> R,
    {
        let _critical = CriticalSection::<P>::enter();
        self.inner.lock().as_mut().map(f)
    }

    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.with(|heap| heap.allocate(size)).flatten()
    }

    /// # Safety
    ///
    /// See [`Heap::release`].
    pub unsafe fn release(&self, ptr: *mut u8) {
        self.with(|heap| unsafe { heap.release(ptr) });
    }
}

unsafe impl<P> GlobalAlloc for LockedHeap<P>
where
    P: Platform + Send,
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > GRANULARITY {
            warn!(
                "refusing allocation with alignment {} (max {GRANULARITY})",
                layout.align()
            );
            return ptr::null_mut();
        }
        self.allocate(layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.release(ptr) }
    }
}
