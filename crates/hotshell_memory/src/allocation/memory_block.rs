use std::ptr::NonNull;

use bitflags::bitflags;

bitflags! {
    /// Flags an arena passes along with every block request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlockFlags: u32 {
        /// Excluded from the live-code-editing snapshot.
        const NOT_RESTORED = 1 << 0;
        /// Guard region after the block payload.
        const OVERFLOW_CHECK = 1 << 1;
        /// Guard region before the block payload.
        const UNDERFLOW_CHECK = 1 << 2;
    }
}

impl BlockFlags {
    pub fn is_bounds_checked(&self) -> bool {
        self.intersects(Self::OVERFLOW_CHECK | Self::UNDERFLOW_CHECK)
    }
}

impl Default for BlockFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Header of a raw memory region handed out by a
/// [BlockProvider](crate::BlockProvider).
///
/// Blocks of one arena form an intrusive LIFO chain through `prev`, newest
/// first. The header is owned by the provider allocation it describes, so it
/// lives exactly as long as the block.
#[derive(Debug)]
pub struct MemoryBlock {
    flags: BlockFlags,
    size: usize,
    base: NonNull<u8>,
    used: usize,
    prev: Option<NonNull<MemoryBlock>>,
    serial: u64,
}

impl MemoryBlock {
    /// A fresh, unlinked block over `size` bytes starting at `base`.
    pub fn new(flags: BlockFlags, base: NonNull<u8>, size: usize) -> Self {
        Self {
            flags,
            size,
            base,
            used: 0,
            prev: None,
            serial: 0,
        }
    }

    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.size - self.used
    }

    pub fn prev(&self) -> Option<NonNull<MemoryBlock>> {
        self.prev
    }

    /// Position of the block in its arena's acquisition order, starting at 1.
    /// Zero while the block is not linked into an arena.
    ///
    /// A recycled header at the same address gets a new serial, so
    /// `(address, serial)` identifies one stay of a block in a chain.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Address the next bump allocation starts from, before alignment.
    pub fn cursor(&self) -> usize {
        self.base.as_ptr() as usize + self.used
    }

    /// Whether `[ptr, ptr + len)` lies inside the payload of this block.
    pub fn contains(&self, ptr: *const u8, len: usize) -> bool {
        let start = self.base.as_ptr() as usize;
        let address = ptr as usize;
        address >= start
            && address
                .checked_add(len)
                .is_some_and(|end| end <= start + self.size)
    }

    pub(crate) fn set_used(&mut self, used: usize) {
        debug_assert!(used <= self.size);
        self.used = used;
    }

    pub(crate) fn link(&mut self, prev: Option<NonNull<MemoryBlock>>, serial: u64) {
        self.prev = prev;
        self.serial = serial;
    }
}
