use std::{
    fmt,
    marker::PhantomData,
    mem::{align_of, size_of, size_of_val},
    ptr::NonNull,
    sync::atomic::{AtomicU64, Ordering},
};

use hotshell_logger::{core_debug, core_error, core_warn};

use super::{
    allocation_error::ArenaError,
    block_provider::BlockProvider,
    heap_block_provider::HeapBlockProvider,
    memory_block::{BlockFlags, MemoryBlock},
    push_params::{BootstrapParams, PushParams},
    raw::{self, alignment_offset},
};

/// Block size used when an arena has no minimum block size of its own.
pub const DEFAULT_MINIMUM_BLOCK_SIZE: usize = 1024 * 1024;

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// The block hosting a bootstrapped arena and the bytes its host struct uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BootstrapMark {
    pub(crate) arena_id: u64,
    pub(crate) block: NonNull<MemoryBlock>,
    pub(crate) serial: u64,
    pub(crate) used: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub block_count: usize,
    pub total_size: usize,
    pub total_used: usize,
}

/// A bump allocator over a chain of blocks requested from a [BlockProvider].
///
/// Memory is only ever handed back in bulk: by ending a
/// [TemporaryMemory](crate::TemporaryMemory) scope, by [clear](Self::clear)
/// or by dropping the arena. Values placed in the arena are never dropped.
///
/// A new block is requested whenever the current one cannot fit a push, so a
/// push only fails when the provider does.
pub struct MemoryArena<P: BlockProvider = HeapBlockProvider> {
    pub(crate) current_block: Option<NonNull<MemoryBlock>>,
    pub(crate) minimum_block_size: usize,
    pub(crate) allocation_flags: BlockFlags,
    pub(crate) temp_count: u32,
    pub(crate) id: u64,
    pub(crate) blocks_acquired: u64,
    pub(crate) bootstrap_mark: Option<BootstrapMark>,
    pub(crate) provider: P,
}

impl MemoryArena {
    pub fn new() -> Self {
        Self::with_provider(HeapBlockProvider)
    }
}

impl Default for MemoryArena {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: BlockProvider> MemoryArena<P> {
    pub fn with_provider(provider: P) -> Self {
        Self::with_params(provider, BootstrapParams::default())
    }

    /// An empty arena; no block is requested until the first push.
    pub fn with_params(provider: P, params: BootstrapParams) -> Self {
        Self {
            current_block: None,
            minimum_block_size: params.minimum_block_size,
            allocation_flags: params.allocation_flags,
            temp_count: 0,
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            blocks_acquired: 0,
            bootstrap_mark: None,
            provider,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn minimum_block_size(&self) -> usize {
        self.minimum_block_size
    }

    pub fn allocation_flags(&self) -> BlockFlags {
        self.allocation_flags
    }

    pub fn temp_count(&self) -> u32 {
        self.temp_count
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Whether this arena lives inside a struct allocated from itself.
    pub fn is_self_hosted(&self) -> bool {
        self.bootstrap_mark.is_some()
    }

    pub fn current_block(&self) -> Option<&MemoryBlock> {
        // SAFETY: blocks in the chain stay alive while the arena is borrowed.
        self.current_block.map(|block| unsafe { block.as_ref() })
    }

    /// Blocks from the most recent to the oldest.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            next: self.current_block,
            _arena: PhantomData,
        }
    }

    pub fn stats(&self) -> ArenaStats {
        self.blocks().fold(ArenaStats::default(), |stats, block| ArenaStats {
            block_count: stats.block_count + 1,
            total_size: stats.total_size + block.size(),
            total_used: stats.total_used + block.used(),
        })
    }

    /// Padding the next push with `params` would need in the current block.
    pub fn alignment_offset(&self, params: PushParams) -> usize {
        match self.current_block() {
            Some(block) if params.alignment.is_power_of_two() => {
                alignment_offset(block.cursor(), params.alignment)
            }
            _ => 0,
        }
    }

    /// Bytes the next push with `params` can take without a new block.
    pub fn size_remaining(&self, params: PushParams) -> usize {
        self.current_block()
            .map(|block| block.remaining().saturating_sub(self.alignment_offset(params)))
            .unwrap_or(0)
    }

    pub fn has_room_for(&self, size: usize, params: PushParams) -> bool {
        params.validate().is_ok() && size <= self.size_remaining(params)
    }

    /// Bump-allocates `size` bytes aligned to `params.alignment`.
    ///
    /// Only the requested bytes are zeroed, never the alignment padding.
    pub fn push_size(
        &mut self,
        size: usize,
        params: PushParams,
    ) -> Result<NonNull<u8>, ArenaError> {
        self.push_size_in_block(size, params).map(|(ptr, _)| ptr)
    }

    pub(crate) fn push_size_in_block(
        &mut self,
        size: usize,
        params: PushParams,
    ) -> Result<(NonNull<u8>, NonNull<MemoryBlock>), ArenaError> {
        params.validate()?;
        let alignment = params.alignment;

        // SAFETY: the current block is live and owned by this arena.
        let current = self
            .current_block
            .filter(|block| fits(unsafe { block.as_ref() }, size, alignment));
        let mut block_ptr = match current {
            Some(block) => block,
            None => self.acquire_block(size, alignment)?,
        };

        // SAFETY: as above, and no other reference to the header is alive.
        let block = unsafe { block_ptr.as_mut() };
        // Both paths above checked that the push fits.
        let offset = alignment_offset(block.cursor(), alignment);
        let effective_size = size + offset;

        // SAFETY: used + offset + size stays within the block payload.
        let result =
            unsafe { NonNull::new_unchecked(block.base().as_ptr().add(block.used() + offset)) };
        block.set_used(block.used() + effective_size);

        if params.clears_to_zero() {
            // SAFETY: the range was just carved out of the block.
            unsafe { raw::zero_size(result, size) };
        }

        Ok((result, block_ptr))
    }

    /// Room for one `T`, aligned to at least `align_of::<T>()`.
    pub fn push_struct<T>(&mut self, params: PushParams) -> Result<NonNull<T>, ArenaError> {
        params.validate()?;
        self.push_size(size_of::<T>(), params.at_least_aligned(align_of::<T>()))
            .map(NonNull::cast)
    }

    /// Room for `count` consecutive `T`s; returns the first element.
    pub fn push_array<T>(
        &mut self,
        count: usize,
        params: PushParams,
    ) -> Result<NonNull<T>, ArenaError> {
        params.validate()?;
        let alignment = params.alignment.max(align_of::<T>());
        let size = size_of::<T>()
            .checked_mul(count)
            .ok_or(ArenaError::SizeOverflow {
                requested: size_of::<T>().saturating_mul(count),
                alignment,
            })?;
        self.push_size(size, params.with_alignment(alignment))
            .map(NonNull::cast)
    }

    pub fn push_copy(
        &mut self,
        source: &[u8],
        params: PushParams,
    ) -> Result<NonNull<u8>, ArenaError> {
        let dest = self.push_size(source.len(), params.without_clear())?;
        // SAFETY: `dest` is a fresh allocation of `source.len()` bytes.
        Ok(unsafe { raw::copy(source, dest) })
    }

    pub fn push_slice_copy<T: Copy>(
        &mut self,
        source: &[T],
        params: PushParams,
    ) -> Result<NonNull<T>, ArenaError> {
        params.validate()?;
        let params = params.without_clear().at_least_aligned(align_of::<T>());
        let dest = self.push_size(size_of_val(source), params)?.cast::<T>();
        // SAFETY: `dest` is fresh, aligned for `T` and holds `source.len()` elements.
        unsafe { std::ptr::copy_nonoverlapping(source.as_ptr(), dest.as_ptr(), source.len()) };
        Ok(dest)
    }

    /// NUL-terminated copy of a C-style string, read up to its first NUL.
    ///
    /// Meant for diagnostics and test harnesses.
    pub fn push_string(&mut self, source: &[u8]) -> Result<NonNull<u8>, ArenaError> {
        self.push_and_null_terminate(&source[..raw::string_length(source)])
    }

    /// Copies all of `source` and appends a NUL, without scanning.
    pub fn push_and_null_terminate(&mut self, source: &[u8]) -> Result<NonNull<u8>, ArenaError> {
        let size = source
            .len()
            .checked_add(1)
            .ok_or(ArenaError::SizeOverflow {
                requested: source.len(),
                alignment: 1,
            })?;
        let dest = self.push_size(size, PushParams::no_clear())?;
        // SAFETY: `dest` holds `source.len() + 1` bytes.
        unsafe {
            raw::copy(source, dest);
            dest.as_ptr().add(source.len()).write(0);
        }
        Ok(dest)
    }

    /// Releases every block. A self-hosted arena keeps the footprint of
    /// the struct that hosts it.
    pub fn clear(&mut self) {
        if self.temp_count != 0 {
            core_warn!(
                "Arena #{} is cleared with {} temporary memory scope(s) open",
                self.id,
                self.temp_count
            );
        }

        self.release_to_bootstrap_mark();
        if let (Some(mark), Some(mut block)) = (self.bootstrap_mark, self.current_block) {
            // SAFETY: the host block is never released by the arena itself.
            unsafe { block.as_mut().set_used(mark.used) };
        }
    }

    /// Fails when a temporary memory scope was begun but never ended.
    pub fn check_arena(&self) -> Result<(), ArenaError> {
        if self.temp_count != 0 {
            core_error!(
                "Arena #{} has {} unbalanced temporary memory scope(s)",
                self.id,
                self.temp_count
            );
            return Err(ArenaError::UnbalancedScopes {
                temp_count: self.temp_count,
            });
        }
        Ok(())
    }

    /// Whether the block at `target` is in the chain and is still the block
    /// that carried `serial`, not a recycled header at the same address.
    pub(crate) fn contains_block(&self, target: NonNull<MemoryBlock>, serial: u64) -> bool {
        self.blocks()
            .any(|block| std::ptr::eq(block, target.as_ptr()) && block.serial() == serial)
    }

    pub(crate) fn free_last_block(&mut self) {
        if let Some(block) = self.current_block {
            // SAFETY: the current block is live; it is unlinked before being released.
            unsafe {
                self.current_block = block.as_ref().prev();
                self.provider.deallocate_block(block);
            }
        }
    }

    fn release_to_bootstrap_mark(&mut self) {
        let keep = self.bootstrap_mark.map(|mark| mark.block);
        while self.current_block.is_some() && self.current_block != keep {
            self.free_last_block();
        }
    }

    fn acquire_block(
        &mut self,
        size: usize,
        alignment: usize,
    ) -> Result<NonNull<MemoryBlock>, ArenaError> {
        // Worst-case padding, whatever the alignment of the new base.
        let required = size
            .checked_add(alignment - 1)
            .ok_or(ArenaError::SizeOverflow {
                requested: size,
                alignment,
            })?;

        // Bounds-checked blocks hold a single push so the guards sit right around it.
        let block_size = if self.allocation_flags.is_bounds_checked() {
            required
        } else {
            let minimum = match self.minimum_block_size {
                0 => DEFAULT_MINIMUM_BLOCK_SIZE,
                minimum => minimum,
            };
            required.max(minimum)
        };

        let mut block = self
            .provider
            .allocate_block(block_size, self.allocation_flags)?;

        // SAFETY: the provider hands out a live, unlinked header.
        let header = unsafe { block.as_mut() };
        if !fits(header, size, alignment) {
            let requested = size + alignment_offset(header.cursor(), alignment);
            let available = header.remaining();
            // SAFETY: the block was never linked or pushed into.
            unsafe { self.provider.deallocate_block(block) };
            return Err(ArenaError::BlockTooSmall {
                requested,
                available,
            });
        }

        self.blocks_acquired += 1;
        header.link(self.current_block, self.blocks_acquired);
        self.current_block = Some(block);

        core_debug!("Arena #{} acquired a block of {} bytes", self.id, block_size);
        Ok(block)
    }
}

fn fits(block: &MemoryBlock, size: usize, alignment: usize) -> bool {
    size.checked_add(alignment_offset(block.cursor(), alignment))
        .is_some_and(|effective_size| effective_size <= block.remaining())
}

impl<P: BlockProvider> Drop for MemoryArena<P> {
    fn drop(&mut self) {
        if self.temp_count != 0 {
            core_warn!(
                "Arena #{} is dropped with {} temporary memory scope(s) open",
                self.id,
                self.temp_count
            );
        }
        // The host block of a self-hosted arena belongs to its
        // `Bootstrapped` handle, which releases it after the host struct.
        self.release_to_bootstrap_mark();
    }
}

impl<P: BlockProvider> fmt::Debug for MemoryArena<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryArena")
            .field("id", &self.id)
            .field("minimum_block_size", &self.minimum_block_size)
            .field("allocation_flags", &self.allocation_flags)
            .field("temp_count", &self.temp_count)
            .field("self_hosted", &self.is_self_hosted())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

pub struct Blocks<'a> {
    next: Option<NonNull<MemoryBlock>>,
    _arena: PhantomData<&'a MemoryBlock>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = &'a MemoryBlock;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the arena this iterator borrows keeps its chain alive.
        let block: &'a MemoryBlock = unsafe { self.next?.as_ref() };
        self.next = block.prev();
        Some(block)
    }
}
