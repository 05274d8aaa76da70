use bitflags::bitflags;

use super::{allocation_error::ArenaError, memory_block::BlockFlags};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PushFlags: u32 {
        /// Zero the requested bytes before handing them out.
        const CLEAR_TO_ZERO = 1 << 0;
    }
}

pub const DEFAULT_ALIGNMENT: usize = 4;

/// Per-call configuration of a push.
///
/// The default clears the memory and aligns to [DEFAULT_ALIGNMENT].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushParams {
    pub flags: PushFlags,
    pub alignment: usize,
}

impl Default for PushParams {
    fn default() -> Self {
        Self {
            flags: PushFlags::CLEAR_TO_ZERO,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl PushParams {
    pub fn aligned(alignment: usize) -> Self {
        Self {
            alignment,
            ..Default::default()
        }
    }

    pub fn no_clear() -> Self {
        Self {
            flags: PushFlags::empty(),
            ..Default::default()
        }
    }

    pub fn aligned_no_clear(alignment: usize) -> Self {
        Self {
            flags: PushFlags::empty(),
            alignment,
        }
    }

    pub fn with_alignment(self, alignment: usize) -> Self {
        Self { alignment, ..self }
    }

    /// Raises the alignment to at least `alignment`, never lowers it.
    pub fn at_least_aligned(self, alignment: usize) -> Self {
        self.with_alignment(self.alignment.max(alignment))
    }

    pub fn without_clear(self) -> Self {
        Self {
            flags: self.flags - PushFlags::CLEAR_TO_ZERO,
            ..self
        }
    }

    pub fn clears_to_zero(&self) -> bool {
        self.flags.contains(PushFlags::CLEAR_TO_ZERO)
    }

    pub(crate) fn validate(&self) -> Result<(), ArenaError> {
        if !self.alignment.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment {
                alignment: self.alignment,
            });
        }
        Ok(())
    }
}

/// Seeds a brand-new arena, usually one that will live inside the struct it
/// is about to allocate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapParams {
    pub allocation_flags: BlockFlags,
    pub minimum_block_size: usize,
}

impl BootstrapParams {
    pub fn new(allocation_flags: BlockFlags, minimum_block_size: usize) -> Self {
        Self {
            allocation_flags,
            minimum_block_size,
        }
    }

    /// Arena whose blocks are left out of live-code-editing snapshots.
    pub fn non_restored() -> Self {
        Self::new(BlockFlags::NOT_RESTORED, 0)
    }
}
