use std::{cell::Cell, ptr::NonNull};

use super::{
    block_provider::{BlockProvider, BlockProviderError},
    heap_block_provider::HeapBlockProvider,
    memory_block::{BlockFlags, MemoryBlock},
};

/// Wraps another provider and keeps count of what passes through it.
///
/// Counters use [Cell], so share the provider by reference (`&TrackingBlockProvider`
/// is itself a [BlockProvider]) between the arenas being observed.
#[derive(Debug, Default)]
pub struct TrackingBlockProvider<P: BlockProvider = HeapBlockProvider> {
    inner: P,
    live_blocks: Cell<usize>,
    live_bytes: Cell<usize>,
    peak_live_blocks: Cell<usize>,
    total_allocations: Cell<usize>,
    total_deallocations: Cell<usize>,
}

impl TrackingBlockProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: BlockProvider> TrackingBlockProvider<P> {
    pub fn wrap(inner: P) -> Self {
        Self {
            inner,
            live_blocks: Cell::new(0),
            live_bytes: Cell::new(0),
            peak_live_blocks: Cell::new(0),
            total_allocations: Cell::new(0),
            total_deallocations: Cell::new(0),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn live_blocks(&self) -> usize {
        self.live_blocks.get()
    }

    /// Payload bytes of all live blocks, guard regions and headers excluded.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.get()
    }

    pub fn peak_live_blocks(&self) -> usize {
        self.peak_live_blocks.get()
    }

    pub fn total_allocations(&self) -> usize {
        self.total_allocations.get()
    }

    pub fn total_deallocations(&self) -> usize {
        self.total_deallocations.get()
    }
}

impl<P: BlockProvider> BlockProvider for TrackingBlockProvider<P> {
    fn allocate_block(
        &self,
        size: usize,
        flags: BlockFlags,
    ) -> Result<NonNull<MemoryBlock>, BlockProviderError> {
        let block = self.inner.allocate_block(size, flags)?;
        // SAFETY: the inner provider just handed out a valid header.
        let size = unsafe { block.as_ref() }.size();

        let live = self.live_blocks.get() + 1;
        self.live_blocks.set(live);
        self.peak_live_blocks.set(self.peak_live_blocks.get().max(live));
        self.live_bytes.set(self.live_bytes.get() + size);
        self.total_allocations.set(self.total_allocations.get() + 1);
        Ok(block)
    }

    unsafe fn deallocate_block(&self, block: NonNull<MemoryBlock>) {
        let size = block.as_ref().size();
        self.inner.deallocate_block(block);

        self.live_blocks.set(self.live_blocks.get() - 1);
        self.live_bytes.set(self.live_bytes.get() - size);
        self.total_deallocations.set(self.total_deallocations.get() + 1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_counts_follow_blocks() -> Result<(), BlockProviderError> {
        let provider = TrackingBlockProvider::new();

        let first = provider.allocate_block(128, BlockFlags::empty())?;
        let second = provider.allocate_block(64, BlockFlags::NOT_RESTORED)?;
        assert_eq!(provider.live_blocks(), 2);
        assert_eq!(provider.live_bytes(), 192);

        unsafe { provider.deallocate_block(second) };
        assert_eq!(provider.live_blocks(), 1);
        assert_eq!(provider.live_bytes(), 128);

        unsafe { provider.deallocate_block(first) };
        assert_eq!(provider.live_blocks(), 0);
        assert_eq!(provider.peak_live_blocks(), 2);
        assert_eq!(provider.total_allocations(), 2);
        assert_eq!(provider.total_deallocations(), 2);
        Ok(())
    }

    #[test]
    fn test_failed_allocation_is_not_counted() {
        let provider = TrackingBlockProvider::new();
        assert!(provider
            .allocate_block(usize::MAX, BlockFlags::empty())
            .is_err());
        assert_eq!(provider.total_allocations(), 0);
        assert_eq!(provider.live_blocks(), 0);
    }

    #[test]
    fn test_shared_by_reference() -> Result<(), BlockProviderError> {
        fn allocate_and_release<P: BlockProvider>(provider: P) -> Result<(), BlockProviderError> {
            let block = provider.allocate_block(16, BlockFlags::empty())?;
            unsafe { provider.deallocate_block(block) };
            Ok(())
        }

        let provider = TrackingBlockProvider::new();
        allocate_and_release(&provider)?;
        allocate_and_release(&provider)?;
        assert_eq!(provider.total_allocations(), 2);
        assert_eq!(provider.live_blocks(), 0);
        Ok(())
    }
}
