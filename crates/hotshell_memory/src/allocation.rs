pub mod allocation_error;
pub mod allocator;
pub mod arena;
pub mod block_provider;
pub mod bootstrap;
pub mod heap_block_provider;
pub mod memory_block;
pub mod push_params;
pub mod raw;
pub mod temporary_memory;
pub mod tracking_block_provider;
