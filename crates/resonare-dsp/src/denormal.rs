/// Flush-to-zero guard for the audio thread.
///
/// Decaying IIR tails fall into subnormal range and cost orders of magnitude
/// more per operation on most CPUs. `DenormalGuard::new()` sets FTZ/DAZ
/// (x86, x86_64) or FZ (aarch64) and restores the previous mode on drop. On
/// other targets it does nothing.

use std::marker::PhantomData;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod imp {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::{_mm_getcsr, _mm_setcsr};
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};

    /// MXCSR flush-to-zero (bit 15) and denormals-are-zero (bit 6).
    const FTZ_DAZ: u32 = 0x8040;

    pub type State = u32;

    #[allow(deprecated)]
    pub fn enable() -> State {
        // SAFETY: SSE is baseline on every target this branch compiles for.
        // Only the FTZ and DAZ bits are set; exception masks and rounding mode
        // are written back unchanged, and the caller restores `prev` on this
        // same thread.
        unsafe {
            let prev = _mm_getcsr();
            _mm_setcsr(prev | FTZ_DAZ);
            prev
        }
    }

    #[allow(deprecated)]
    pub fn restore(prev: State) {
        // SAFETY: `prev` was read from MXCSR on this thread by `enable`.
        unsafe { _mm_setcsr(prev) }
    }
}

#[cfg(target_arch = "aarch64")]
mod imp {
    use std::arch::asm;

    /// FPCR flush-to-zero.
    const FZ: u64 = 1 << 24;

    pub type State = u64;

    pub fn enable() -> State {
        let prev: u64;
        // SAFETY: FPCR is readable and writable at EL0. Only FZ is set, the
        // other control bits are written back as read.
        unsafe {
            asm!("mrs {}, fpcr", out(reg) prev, options(nomem, nostack, preserves_flags));
            asm!("msr fpcr, {}", in(reg) prev | FZ, options(nomem, nostack, preserves_flags));
        }
        prev
    }

    pub fn restore(prev: State) {
        // SAFETY: `prev` was read from FPCR on this thread by `enable`.
        unsafe {
            asm!("msr fpcr, {}", in(reg) prev, options(nomem, nostack, preserves_flags));
        }
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
mod imp {
    pub type State = ();

    pub fn enable() -> State {}

    pub fn restore(_prev: State) {}
}

/// Scoped denormal flushing. Keep it alive for the whole block.
///
/// The float control register is per thread, so the guard is `!Send`: it must
/// be dropped on the thread that created it.
#[must_use = "flushing stops as soon as the guard is dropped"]
pub struct DenormalGuard {
    prev: imp::State,
    _thread_bound: PhantomData<*const ()>,
}

impl DenormalGuard {
    pub fn new() -> Self {
        Self {
            prev: imp::enable(),
            _thread_bound: PhantomData,
        }
    }
}

impl Default for DenormalGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DenormalGuard {
    fn drop(&mut self) {
        imp::restore(self.prev);
    }
}
