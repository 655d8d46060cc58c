//! Interrupt masking on the boot hart.

use core::marker::PhantomData;

mod imp;

pub use self::imp::State;

/// Masks interrupts until the returned guard is dropped.
pub fn disable() -> Guard {
    Guard {
        state: imp::read_and_disable(),
        _not_send: PhantomData,
    }
}

/// Sleeps until the next interrupt.
pub fn wait() {
    imp::wait();
}

/// Masks interrupts and parks the hart for good.
pub fn halt() -> ! {
    let _ = imp::read_and_disable();
    loop {
        imp::wait();
    }
}

#[derive(Debug)]
pub struct Guard {
    state: State,
    _not_send: PhantomData<*mut ()>,
}

impl Drop for Guard {
    fn drop(&mut self) {
        imp::restore(self.state);
    }
}

/// `sstatus.SIE` masking for the kernel heap.
#[derive(Debug)]
pub struct KernelInterrupts;

impl kheap::Interrupts for KernelInterrupts {
    type State = State;

    fn disable() -> Self::State {
        imp::read_and_disable()
    }

    fn restore(state: Self::State) {
        imp::restore(state);
    }

    fn halt() -> ! {
        halt()
    }
}
