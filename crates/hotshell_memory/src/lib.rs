pub mod allocation;
pub use allocation::{
    allocation_error::ArenaError,
    allocator::*,
    arena::{ArenaStats, Blocks, MemoryArena, DEFAULT_MINIMUM_BLOCK_SIZE},
    block_provider::{BlockProvider, BlockProviderError},
    bootstrap::{bootstrap_push_size, bootstrap_push_struct, Bootstrapped},
    heap_block_provider::HeapBlockProvider,
    memory_block::{BlockFlags, MemoryBlock},
    push_params::{BootstrapParams, PushFlags, PushParams, DEFAULT_ALIGNMENT},
    temporary_memory::TemporaryMemory,
    tracking_block_provider::TrackingBlockProvider,
};
