use thiserror::Error;

use super::block_provider::BlockProviderError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("Alignment {alignment} is not a power of two")]
    InvalidAlignment { alignment: usize },
    #[error("Allocation of {requested} bytes aligned to {alignment} overflows the address space")]
    SizeOverflow { requested: usize, alignment: usize },
    #[error("Block has {available} bytes left, {requested} bytes are required")]
    BlockTooSmall { requested: usize, available: usize },
    #[error(transparent)]
    Provider(#[from] BlockProviderError),
    #[error("Temporary memory of arena #{scope_arena} cannot be ended on arena #{arena}")]
    ForeignScope { scope_arena: u64, arena: u64 },
    #[error("Temporary memory is ended while no temporary memory is open")]
    NoOpenScope,
    #[error("Temporary memory checkpoint block was already released by another scope")]
    ScopeBlockReleased,
    #[error("Temporary memory checkpoint at {checkpoint} bytes is past its block's {used} bytes")]
    ScopeOutOfOrder { checkpoint: usize, used: usize },
    #[error("Arena has {temp_count} temporary memory scope(s) that were never ended")]
    UnbalancedScopes { temp_count: u32 },
}
