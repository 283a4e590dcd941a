// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
This module implements the dirty tracking for a managed resource.

A managed resource has two sides, the device-local resource and its CPU mirror.  Each side
can hold changes the other has not seen yet, and each is tracked by its own flag:

* `cpu` - the mirror was written and the device-local resource is stale
* `gpu` - the device-local resource was written (e.g. mip regeneration) and the mirror is stale

The flags are independent.  Anyone may set them; only the sync engine in
[`crate::coherence`] clears them, and it does so while holding the resource's exclusive lock.

Reading a flag needs no lock.  This is a best-effort signal rather than a transaction:
two threads can both observe a flag set and both run a transfer.  The second transfer copies
the same data again, so the outcome is still correct.
*/

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct DirtyState {
    //each flag can be independently set and unset
    cpu: AtomicBool,
    gpu: AtomicBool,
}

/// The flags of a [`DirtyState`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtySnapshot {
    pub cpu: bool,
    pub gpu: bool,
}

impl DirtyState {
    pub const fn new() -> Self {
        DirtyState {
            cpu: AtomicBool::new(false),
            gpu: AtomicBool::new(false),
        }
    }

    /// The mirror holds writes the device-local resource has not seen.
    pub fn mark_cpu_dirty(&self) {
        self.cpu.store(true, Ordering::Release);
    }

    /// The device-local resource holds writes the mirror has not seen.
    pub fn mark_gpu_dirty(&self) {
        self.gpu.store(true, Ordering::Release);
    }

    pub fn is_cpu_dirty(&self) -> bool {
        self.cpu.load(Ordering::Acquire)
    }

    pub fn is_gpu_dirty(&self) -> bool {
        self.gpu.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> DirtySnapshot {
        DirtySnapshot {
            cpu: self.is_cpu_dirty(),
            gpu: self.is_gpu_dirty(),
        }
    }

    pub(crate) fn clear_cpu(&self) {
        self.cpu.store(false, Ordering::Release);
    }

    pub(crate) fn clear_gpu(&self) {
        self.gpu.store(false, Ordering::Release);
    }

    /**
    Records that a mirror was just allocated.

    A fresh mirror has no CPU writes to push, and its contents are undefined until the
    device-local contents are pulled into it.
    */
    pub(crate) fn mirror_allocated(&self) {
        self.clear_cpu();
        self.mark_gpu_dirty();
    }
}
