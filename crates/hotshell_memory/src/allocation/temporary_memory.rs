use std::ptr::NonNull;

use super::{
    allocation_error::ArenaError, arena::MemoryArena, block_provider::BlockProvider,
    memory_block::MemoryBlock,
};

/// Restore point of a [MemoryArena].
///
/// Holds no memory. Pass it back to
/// [end_temporary_memory](MemoryArena::end_temporary_memory) to roll the
/// arena back to the moment it was taken.
#[must_use = "temporary memory must be ended with `end_temporary_memory`"]
#[derive(Debug, PartialEq, Eq)]
pub struct TemporaryMemory {
    arena_id: u64,
    block: Option<NonNull<MemoryBlock>>,
    block_serial: u64,
    used: usize,
}

impl TemporaryMemory {
    pub fn arena_id(&self) -> u64 {
        self.arena_id
    }

    /// Used bytes of the checkpoint block when the scope began.
    pub fn used(&self) -> usize {
        self.used
    }
}

impl<P: BlockProvider> MemoryArena<P> {
    pub fn begin_temporary_memory(&mut self) -> TemporaryMemory {
        self.temp_count += 1;
        TemporaryMemory {
            arena_id: self.id,
            block: self.current_block,
            block_serial: self.current_block().map_or(0, MemoryBlock::serial),
            used: self.current_block().map_or(0, MemoryBlock::used),
        }
    }

    /// Releases the blocks acquired since `temp` began and restores the used
    /// count of its checkpoint block.
    ///
    /// The scope is validated first; on error the arena is left untouched.
    /// Nested scopes must end innermost first.
    pub fn end_temporary_memory(&mut self, temp: TemporaryMemory) -> Result<(), ArenaError> {
        if temp.arena_id != self.id {
            return Err(ArenaError::ForeignScope {
                scope_arena: temp.arena_id,
                arena: self.id,
            });
        }
        if self.temp_count == 0 {
            return Err(ArenaError::NoOpenScope);
        }
        if let Some(checkpoint) = temp.block {
            if !self.contains_block(checkpoint, temp.block_serial) {
                return Err(ArenaError::ScopeBlockReleased);
            }
            // SAFETY: the checkpoint block is still part of the chain.
            let used = unsafe { checkpoint.as_ref() }.used();
            if used < temp.used {
                return Err(ArenaError::ScopeOutOfOrder {
                    checkpoint: temp.used,
                    used,
                });
            }
        }

        while self.current_block != temp.block {
            self.free_last_block();
        }
        if let Some(mut block) = self.current_block {
            // SAFETY: the checkpoint block is live and now current again.
            unsafe { block.as_mut().set_used(temp.used) };
        }

        self.temp_count -= 1;
        Ok(())
    }

    /// Runs `body` between a begin/end pair and returns its result.
    pub fn with_temporary_memory<R>(
        &mut self,
        body: impl FnOnce(&mut Self) -> R,
    ) -> Result<R, ArenaError> {
        let temp = self.begin_temporary_memory();
        let result = body(self);
        self.end_temporary_memory(temp)?;
        Ok(result)
    }
}
