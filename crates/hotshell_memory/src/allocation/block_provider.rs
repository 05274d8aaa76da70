use std::{ptr::NonNull, rc::Rc};

use thiserror::Error;

use super::memory_block::{BlockFlags, MemoryBlock};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockProviderError {
    #[error("Out of memory: could not allocate a block of {size} bytes")]
    OutOfMemory { size: usize },
    #[error("A block of {size} bytes cannot be described by a valid layout")]
    InvalidLayout { size: usize },
    #[error("The {region} guard of a {size} byte block was overwritten")]
    GuardCorrupted { region: &'static str, size: usize },
}

/// Source of the raw blocks an arena bump-allocates from.
///
/// Blocks are returned in LIFO order: an arena only ever hands back its
/// current (most recent) block.
pub trait BlockProvider {
    /// Allocates a block with at least `size` usable bytes, `used == 0` and no
    /// predecessor.
    fn allocate_block(
        &self,
        size: usize,
        flags: BlockFlags,
    ) -> Result<NonNull<MemoryBlock>, BlockProviderError>;

    /// # Safety
    ///
    /// `block` must come from [allocate_block](BlockProvider::allocate_block)
    /// of this provider and must not have been deallocated yet. Nothing may
    /// point into the block afterwards.
    unsafe fn deallocate_block(&self, block: NonNull<MemoryBlock>);
}

impl<P: BlockProvider + ?Sized> BlockProvider for &P {
    fn allocate_block(
        &self,
        size: usize,
        flags: BlockFlags,
    ) -> Result<NonNull<MemoryBlock>, BlockProviderError> {
        (**self).allocate_block(size, flags)
    }

    unsafe fn deallocate_block(&self, block: NonNull<MemoryBlock>) {
        (**self).deallocate_block(block)
    }
}

impl<P: BlockProvider + ?Sized> BlockProvider for Rc<P> {
    fn allocate_block(
        &self,
        size: usize,
        flags: BlockFlags,
    ) -> Result<NonNull<MemoryBlock>, BlockProviderError> {
        (**self).allocate_block(size, flags)
    }

    unsafe fn deallocate_block(&self, block: NonNull<MemoryBlock>) {
        (**self).deallocate_block(block)
    }
}
