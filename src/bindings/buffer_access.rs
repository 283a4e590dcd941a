/*!
Defines flags for CPU locks of mirrors and device resources.
*/

bitflags::bitflags! {
    /// Flags passed when locking a resource for CPU access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LockFlags: u32 {
        /// The caller will only read.  Releasing such a lock does not mark the CPU side dirty.
        const READ_ONLY = 0x0000_0010;
        /// Previous contents may be thrown away.
        const DISCARD = 0x0000_2000;
        /// The caller promises not to touch bytes the GPU may be reading.
        const NO_OVERWRITE = 0x0000_1000;
        /// Do not record a dirty region for this lock.
        const NO_DIRTY_UPDATE = 0x0000_8000;
    }
}

impl LockFlags {
    pub const fn is_read_only(self) -> bool {
        self.contains(LockFlags::READ_ONLY)
    }
}
