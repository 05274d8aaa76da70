use std::{
    alloc::{alloc, dealloc, Layout},
    ptr::NonNull,
};

use hotshell_logger::core_critical;

use super::{
    block_provider::{BlockProvider, BlockProviderError},
    memory_block::{BlockFlags, MemoryBlock},
};

/// Alignment of every allocation and of every block payload.
pub const BLOCK_ALIGN: usize = 64;
/// Size of each guard region around a bounds-checked block.
pub const GUARD_SIZE: usize = 64;
const GUARD_PATTERN: u8 = 0xFD;

/// Provider backed by the global allocator.
///
/// Each allocation is laid out as `[header][underflow guard][payload][overflow guard]`,
/// the guards only being present when the matching [BlockFlags] bit is set.
/// Guards are filled with a canary pattern and verified on release.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapBlockProvider;

struct BlockFootprint {
    layout: Layout,
    base_offset: usize,
}

impl BlockFootprint {
    fn new(size: usize, flags: BlockFlags) -> Result<Self, BlockProviderError> {
        let header = std::mem::size_of::<MemoryBlock>().next_multiple_of(BLOCK_ALIGN);
        let underflow = if flags.contains(BlockFlags::UNDERFLOW_CHECK) {
            GUARD_SIZE
        } else {
            0
        };
        let overflow = if flags.contains(BlockFlags::OVERFLOW_CHECK) {
            GUARD_SIZE
        } else {
            0
        };

        let total = header
            .checked_add(underflow)
            .and_then(|n| n.checked_add(size))
            .and_then(|n| n.checked_add(overflow))
            .ok_or(BlockProviderError::InvalidLayout { size })?;
        let layout = Layout::from_size_align(total, BLOCK_ALIGN)
            .map_err(|_| BlockProviderError::InvalidLayout { size })?;

        Ok(Self {
            layout,
            base_offset: header + underflow,
        })
    }
}

impl HeapBlockProvider {
    /// Verifies the guard regions of a block allocated by this provider.
    pub fn check_guards(block: &MemoryBlock) -> Result<(), BlockProviderError> {
        let flags = block.flags();
        let base = block.base().as_ptr();

        if flags.contains(BlockFlags::UNDERFLOW_CHECK) {
            // SAFETY: the underflow guard precedes the payload inside the allocation.
            let guard = unsafe { std::slice::from_raw_parts(base.sub(GUARD_SIZE), GUARD_SIZE) };
            if guard.iter().any(|&b| b != GUARD_PATTERN) {
                return Err(BlockProviderError::GuardCorrupted {
                    region: "underflow",
                    size: block.size(),
                });
            }
        }

        if flags.contains(BlockFlags::OVERFLOW_CHECK) {
            // SAFETY: the overflow guard follows the payload inside the allocation.
            let guard = unsafe { std::slice::from_raw_parts(base.add(block.size()), GUARD_SIZE) };
            if guard.iter().any(|&b| b != GUARD_PATTERN) {
                return Err(BlockProviderError::GuardCorrupted {
                    region: "overflow",
                    size: block.size(),
                });
            }
        }

        Ok(())
    }
}

impl BlockProvider for HeapBlockProvider {
    fn allocate_block(
        &self,
        size: usize,
        flags: BlockFlags,
    ) -> Result<NonNull<MemoryBlock>, BlockProviderError> {
        let footprint = BlockFootprint::new(size, flags)?;

        // SAFETY: the layout is never zero-sized, the header alone is BLOCK_ALIGN bytes.
        let raw = unsafe { alloc(footprint.layout) };
        let raw = NonNull::new(raw).ok_or(BlockProviderError::OutOfMemory { size })?;

        // SAFETY: every offset below stays inside the allocation computed by the footprint.
        unsafe {
            let base = NonNull::new_unchecked(raw.as_ptr().add(footprint.base_offset));

            if flags.contains(BlockFlags::UNDERFLOW_CHECK) {
                std::ptr::write_bytes(base.as_ptr().sub(GUARD_SIZE), GUARD_PATTERN, GUARD_SIZE);
            }
            if flags.contains(BlockFlags::OVERFLOW_CHECK) {
                std::ptr::write_bytes(base.as_ptr().add(size), GUARD_PATTERN, GUARD_SIZE);
            }

            let header = raw.cast::<MemoryBlock>();
            header.as_ptr().write(MemoryBlock::new(flags, base, size));
            Ok(header)
        }
    }

    unsafe fn deallocate_block(&self, block: NonNull<MemoryBlock>) {
        let header = block.as_ref();
        if let Err(e) = Self::check_guards(header) {
            core_critical!("Releasing a corrupted arena block: {}", e);
        }

        match BlockFootprint::new(header.size(), header.flags()) {
            Ok(footprint) => dealloc(block.as_ptr().cast::<u8>(), footprint.layout),
            // Unreachable for blocks this provider allocated; leaking is the only safe option.
            Err(e) => core_critical!("Leaking an arena block with an invalid footprint: {}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_plain_block() -> Result<(), BlockProviderError> {
        let provider = HeapBlockProvider;
        let block = provider.allocate_block(100, BlockFlags::empty())?;
        let header = unsafe { block.as_ref() };

        assert_eq!(header.size(), 100);
        assert_eq!(header.used(), 0);
        assert_eq!(header.prev(), None);
        assert_eq!(header.base().as_ptr() as usize % BLOCK_ALIGN, 0);
        assert!(HeapBlockProvider::check_guards(header).is_ok());

        unsafe { provider.deallocate_block(block) };
        Ok(())
    }

    #[test]
    fn test_payload_is_writable() -> Result<(), BlockProviderError> {
        let provider = HeapBlockProvider;
        let block = provider.allocate_block(256, BlockFlags::NOT_RESTORED)?;
        unsafe {
            let base = block.as_ref().base().as_ptr();
            std::ptr::write_bytes(base, 0x5A, 256);
            assert_eq!(*base.add(255), 0x5A);
            assert!(block.as_ref().flags().contains(BlockFlags::NOT_RESTORED));
            provider.deallocate_block(block);
        }
        Ok(())
    }

    #[test]
    fn test_guards_detect_overflow() -> Result<(), BlockProviderError> {
        let provider = HeapBlockProvider;
        let block = provider.allocate_block(32, BlockFlags::OVERFLOW_CHECK)?;
        unsafe {
            let header = block.as_ref();
            assert!(HeapBlockProvider::check_guards(header).is_ok());

            // One byte past the payload lands in the overflow guard.
            *header.base().as_ptr().add(32) = 0;
            assert_eq!(
                HeapBlockProvider::check_guards(header),
                Err(BlockProviderError::GuardCorrupted {
                    region: "overflow",
                    size: 32
                })
            );
            provider.deallocate_block(block);
        }
        Ok(())
    }

    #[test]
    fn test_guards_detect_underflow() -> Result<(), BlockProviderError> {
        let provider = HeapBlockProvider;
        let flags = BlockFlags::UNDERFLOW_CHECK | BlockFlags::OVERFLOW_CHECK;
        let block = provider.allocate_block(8, flags)?;
        unsafe {
            let header = block.as_ref();
            *header.base().as_ptr().sub(1) = 0;
            assert_eq!(
                HeapBlockProvider::check_guards(header),
                Err(BlockProviderError::GuardCorrupted {
                    region: "underflow",
                    size: 8
                })
            );
            provider.deallocate_block(block);
        }
        Ok(())
    }

    #[test]
    fn test_huge_block_is_rejected() {
        let provider = HeapBlockProvider;
        assert_eq!(
            provider.allocate_block(usize::MAX, BlockFlags::empty()),
            Err(BlockProviderError::InvalidLayout { size: usize::MAX })
        );
    }
}
