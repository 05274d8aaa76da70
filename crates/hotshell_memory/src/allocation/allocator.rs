use std::{
    mem::{align_of, size_of, size_of_val},
    ptr::NonNull,
};

use anyhow::Result;

use super::{arena::MemoryArena, block_provider::BlockProvider, push_params::PushParams};

/// Hands out uninitialized memory of a given size and alignment.
pub trait RawAllocator {
    fn alloc_raw(&mut self, size: usize, align: usize) -> Result<NonNull<u8>>;
}

/// A contractual trait for allocators that never move what they allocated
pub trait StableAllocator {}

/// Moves values into memory taken from a [RawAllocator].
///
/// Implemented for every raw allocator. Nothing placed this way is ever
/// dropped by the allocator.
pub trait Constructor {
    fn construct<T>(&mut self, value: T) -> Result<NonNull<T>>;
    fn construct_slice<T: Copy>(&mut self, values: &[T]) -> Result<NonNull<[T]>>;
}

impl<R: RawAllocator + ?Sized> Constructor for R {
    fn construct<T>(&mut self, value: T) -> Result<NonNull<T>> {
        let ptr = self.alloc_raw(size_of::<T>(), align_of::<T>())?.cast::<T>();
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    fn construct_slice<T: Copy>(&mut self, values: &[T]) -> Result<NonNull<[T]>> {
        let ptr = self
            .alloc_raw(size_of_val(values), align_of::<T>())?
            .cast::<T>();
        unsafe { std::ptr::copy_nonoverlapping(values.as_ptr(), ptr.as_ptr(), values.len()) };
        Ok(NonNull::slice_from_raw_parts(ptr, values.len()))
    }
}

impl<P: BlockProvider> RawAllocator for MemoryArena<P> {
    fn alloc_raw(&mut self, size: usize, align: usize) -> Result<NonNull<u8>> {
        Ok(self.push_size(size, PushParams::aligned_no_clear(align))?)
    }
}

impl<P: BlockProvider> StableAllocator for MemoryArena<P> {}
