//! Structs that live inside the arena they own.
//!
//! A bootstrapped struct is pushed from a transient arena, which is then
//! moved into one of the struct's own fields. The result is a single
//! allocation holding both the struct and its control block:
//!
//! ```text
//! block #1 [ AppState { .., arena: MemoryArena ─┐ } | later pushes .. ]
//!            ▲                                   │
//!            └────────── current_block chain ────┘
//! ```
//!
//! [Bootstrapped] owns that allocation and tears it down in the only safe
//! order: the arena is moved out, the struct is dropped in place, then the
//! arena releases every block including the one the struct lived in.

use std::{
    marker::PhantomData,
    mem::{align_of, size_of},
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use hotshell_logger::core_warn;

use super::{
    allocation_error::ArenaError,
    arena::{BootstrapMark, MemoryArena},
    block_provider::BlockProvider,
    heap_block_provider::HeapBlockProvider,
    memory_block::MemoryBlock,
    push_params::{BootstrapParams, PushParams},
};

/// Owning handle to a struct that hosts its own [MemoryArena].
pub struct Bootstrapped<T, P: BlockProvider + Copy = HeapBlockProvider> {
    host: NonNull<T>,
    arena_offset: usize,
    mark: BootstrapMark,
    _owns: PhantomData<(T, P)>,
}

impl<T, P: BlockProvider + Copy> Bootstrapped<T, P> {
    pub fn as_ptr(&self) -> NonNull<T> {
        self.host
    }

    /// Byte offset of the embedded arena inside `T`.
    pub fn arena_offset(&self) -> usize {
        self.arena_offset
    }

    /// The block the struct lives in.
    pub fn host_block(&self) -> &MemoryBlock {
        // SAFETY: the host block is released only when the handle drops.
        unsafe { self.mark.block.as_ref() }
    }

    pub fn arena(&self) -> &MemoryArena<P> {
        // SAFETY: the offset was checked to address a `MemoryArena<P>` inside `T`.
        unsafe { &*self.arena_ptr() }
    }

    pub fn arena_mut(&mut self) -> &mut MemoryArena<P> {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { &mut *self.arena_ptr() }
    }

    fn arena_ptr(&self) -> *mut MemoryArena<P> {
        // SAFETY: offset + size_of::<MemoryArena<P>>() <= size_of::<T>().
        unsafe {
            self.host
                .as_ptr()
                .cast::<u8>()
                .add(self.arena_offset)
                .cast::<MemoryArena<P>>()
        }
    }
}

impl<T, P: BlockProvider + Copy> Deref for Bootstrapped<T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the host struct is initialized and outlives the handle's borrows.
        unsafe { self.host.as_ref() }
    }
}

impl<T, P: BlockProvider + Copy> DerefMut for Bootstrapped<T, P> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { self.host.as_mut() }
    }
}

impl<T, P: BlockProvider + Copy> Drop for Bootstrapped<T, P> {
    fn drop(&mut self) {
        let arena_ptr = self.arena_ptr();
        // SAFETY: the arena is read out and replaced with an empty one, so
        // dropping the host struct in place never touches the block chain.
        // `P: Copy` makes the duplicated provider harmless.
        let mut arena = unsafe {
            let arena = arena_ptr.read();
            arena_ptr.write(MemoryArena::with_provider(arena.provider));
            std::ptr::drop_in_place(self.host.as_ptr());
            arena
        };

        if arena.bootstrap_mark == Some(self.mark) {
            arena.bootstrap_mark = None;
        } else {
            // The hosting arena was swapped out of the struct. The host
            // block stays reachable from wherever it went, so it is leaked.
            core_warn!(
                "Self-hosted arena was moved out of its host struct, leaking the host block"
            );
        }
        drop(arena);
    }
}

/// Allocates a `T` that owns the arena it was allocated from.
///
/// `init` receives the arena after the struct's footprint was pushed and must
/// store it in the `MemoryArena<P>` field at byte offset `arena_offset`. Pushes
/// made by `init` stay in the arena.
///
/// # Safety
///
/// `arena_offset` must be the offset of a field of type `MemoryArena<P>` in `T`.
/// [bootstrap_push_struct] derives it from a field projection instead.
///
/// # Panics
///
/// Panics when `init` does not store the arena it received at `arena_offset`.
pub unsafe fn bootstrap_push_size<T, P, F>(
    provider: P,
    arena_offset: usize,
    bootstrap: BootstrapParams,
    params: PushParams,
    init: F,
) -> Result<Bootstrapped<T, P>, ArenaError>
where
    P: BlockProvider + Copy,
    F: FnOnce(MemoryArena<P>) -> T,
{
    debug_assert!(arena_offset + size_of::<MemoryArena<P>>() <= size_of::<T>());

    let (host, mark) = push_host::<T, P, F>(provider, bootstrap, params, init)?;
    finish(host, arena_offset, mark)
}

/// Safe form of [bootstrap_push_size]: the embedded arena is located through
/// `field`, usually `|host| &host.arena`.
///
/// # Panics
///
/// Panics when `field` does not point into `T`, or when `init` does not store
/// the arena it received in that field.
pub fn bootstrap_push_struct<T, P, F>(
    provider: P,
    field: fn(&T) -> &MemoryArena<P>,
    bootstrap: BootstrapParams,
    params: PushParams,
    init: F,
) -> Result<Bootstrapped<T, P>, ArenaError>
where
    P: BlockProvider + Copy,
    F: FnOnce(MemoryArena<P>) -> T,
{
    let (host, mark) = push_host::<T, P, F>(provider, bootstrap, params, init)?;

    // SAFETY: `push_host` initialized the struct.
    let field_address = field(unsafe { host.as_ref() }) as *const MemoryArena<P> as usize;
    let arena_offset = field_address.wrapping_sub(host.as_ptr() as usize);
    assert!(
        arena_offset
            .checked_add(size_of::<MemoryArena<P>>())
            .is_some_and(|end| end <= size_of::<T>()),
        "the arena field projection must point into the bootstrapped struct"
    );

    finish(host, arena_offset, mark)
}

fn push_host<T, P, F>(
    provider: P,
    bootstrap: BootstrapParams,
    params: PushParams,
    init: F,
) -> Result<(NonNull<T>, BootstrapMark), ArenaError>
where
    P: BlockProvider + Copy,
    F: FnOnce(MemoryArena<P>) -> T,
{
    params.validate()?;
    let mut arena = MemoryArena::with_params(provider, bootstrap);
    let (host, block) =
        arena.push_size_in_block(size_of::<T>(), params.at_least_aligned(align_of::<T>()))?;
    // SAFETY: `block` was just pushed into and belongs to `arena`.
    let host_block = unsafe { block.as_ref() };
    let mark = BootstrapMark {
        arena_id: arena.id(),
        block,
        serial: host_block.serial(),
        used: host_block.used(),
    };
    arena.bootstrap_mark = Some(mark);

    let host = host.cast::<T>();
    let value = init(arena);
    // SAFETY: `host` is a fresh allocation sized and aligned for `T`.
    unsafe { host.as_ptr().write(value) };
    Ok((host, mark))
}

fn finish<T, P: BlockProvider + Copy>(
    host: NonNull<T>,
    arena_offset: usize,
    mark: BootstrapMark,
) -> Result<Bootstrapped<T, P>, ArenaError> {
    // SAFETY: callers guarantee a `MemoryArena<P>` lives at `arena_offset`.
    let embedded = unsafe {
        &*host
            .as_ptr()
            .cast::<u8>()
            .add(arena_offset)
            .cast::<MemoryArena<P>>()
    };
    // On failure the struct and its arena are leaked, never freed under it.
    assert!(
        embedded.bootstrap_mark == Some(mark),
        "bootstrap init must store the arena it received in the host struct"
    );

    Ok(Bootstrapped {
        host,
        arena_offset,
        mark,
        _owns: PhantomData,
    })
}

/// Bootstraps `$ty` with its `$field` arena, e.g.
/// `bootstrap_push_struct!(AppState, arena, provider, |arena| AppState { arena, .. })`.
#[macro_export]
macro_rules! bootstrap_push_struct {
    ($ty: ty, $field: ident, $provider: expr, $init: expr) => {
        $crate::bootstrap_push_struct!(
            $ty,
            $field,
            $provider,
            $crate::BootstrapParams::default(),
            $crate::PushParams::default(),
            $init
        )
    };
    ($ty: ty, $field: ident, $provider: expr, $bootstrap: expr, $params: expr, $init: expr) => {
        $crate::bootstrap_push_struct::<$ty, _, _>(
            $provider,
            |host: &$ty| &host.$field,
            $bootstrap,
            $params,
            $init,
        )
    };
}

#[cfg(test)]
mod test {
    use std::{
        mem::offset_of,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use anyhow::Result;

    use super::*;
    use crate::{BlockFlags, TrackingBlockProvider};

    type Provider = &'static TrackingBlockProvider;

    #[repr(C)]
    struct Host {
        header: u64,
        arena: MemoryArena<Provider>,
        window_count: u32,
    }

    fn leaked_provider() -> Provider {
        Box::leak(Box::new(TrackingBlockProvider::new()))
    }

    #[test]
    fn test_bootstrap_at_offset() -> Result<()> {
        let provider = leaked_provider();
        let offset = offset_of!(Host, arena);
        assert_eq!(offset, 8);

        let host = unsafe {
            bootstrap_push_size(
                provider,
                offset,
                BootstrapParams::new(BlockFlags::empty(), 4096),
                PushParams::default(),
                |arena| Host {
                    header: 0xC0FFEE,
                    arena,
                    window_count: 3,
                },
            )?
        };

        let base = host.as_ptr().as_ptr().cast::<u8>();
        assert_eq!(unsafe { base.cast::<u64>().read() }, 0xC0FFEE);
        assert_eq!(host.window_count, 3);
        assert_eq!(host.arena_offset(), 8);

        let arena = host.arena();
        assert!(std::ptr::eq(arena, &host.arena));
        assert!(arena.is_self_hosted());
        let block = arena.current_block().expect("bootstrap materializes a block");
        assert!(block.contains(base, size_of::<Host>()));
        assert!(block.used() >= size_of::<Host>());
        assert_eq!(block.size(), 4096);
        assert_eq!(provider.live_blocks(), 1);

        drop(host);
        assert_eq!(provider.live_blocks(), 0);
        Ok(())
    }

    #[test]
    fn test_bootstrap_macro_and_later_pushes() -> Result<()> {
        let provider = leaked_provider();
        let mut host = bootstrap_push_struct!(
            Host,
            arena,
            provider,
            BootstrapParams::new(BlockFlags::empty(), 128),
            PushParams::default(),
            |arena| Host {
                header: 1,
                arena,
                window_count: 0,
            }
        )?;

        let footprint = host.host_block().used();
        host.arena.push_size(100, PushParams::default())?;
        host.arena.push_size(100, PushParams::default())?;
        host.window_count += 2;
        assert_eq!(provider.live_blocks(), 3);

        let temp = host.arena.begin_temporary_memory();
        host.arena.push_size(1000, PushParams::default())?;
        host.arena.end_temporary_memory(temp)?;
        assert_eq!(provider.live_blocks(), 3);

        host.arena_mut().clear();
        assert_eq!(provider.live_blocks(), 1);
        assert_eq!(host.host_block().used(), footprint);
        assert_eq!(host.header, 1);
        assert_eq!(host.window_count, 2);

        drop(host);
        assert_eq!(provider.live_blocks(), 0);
        Ok(())
    }

    #[test]
    fn test_init_may_push() -> Result<()> {
        let provider = leaked_provider();
        let host = bootstrap_push_struct!(Host, arena, provider, |mut arena: MemoryArena<_>| {
            let header = arena
                .push_struct::<u64>(PushParams::default())
                .map(|ptr| ptr.as_ptr() as u64)
                .unwrap_or_default();
            Host {
                header,
                arena,
                window_count: 0,
            }
        })?;

        assert_ne!(host.header, 0);
        assert!(host
            .host_block()
            .contains(host.header as usize as *const u8, size_of::<u64>()));
        Ok(())
    }

    #[test]
    fn test_host_struct_is_dropped_before_blocks() -> Result<()> {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Title(&'static str);

        impl Drop for Title {
            fn drop(&mut self) {
                assert_eq!(self.0, "Main window");
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        struct Window {
            arena: MemoryArena,
            title: Title,
        }

        let window = bootstrap_push_struct!(Window, arena, HeapBlockProvider, |arena| Window {
            arena,
            title: Title("Main window"),
        })?;
        assert_eq!(window.title.0, "Main window");
        assert!(window.arena.is_self_hosted());

        drop(window);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_swapped_out_arena_leaks_instead_of_freeing() -> Result<()> {
        let provider = leaked_provider();
        let mut host = bootstrap_push_struct!(Host, arena, provider, |arena| Host {
            header: 0,
            arena,
            window_count: 0,
        })?;

        let stolen = std::mem::replace(&mut host.arena, MemoryArena::with_provider(provider));
        drop(stolen);
        // The stolen arena keeps the host block alive.
        assert_eq!(provider.live_blocks(), 1);
        assert_eq!(host.header, 0);

        drop(host);
        assert_eq!(provider.live_blocks(), 1);
        Ok(())
    }

    #[test]
    fn test_swapped_hosts_keep_their_host_blocks() -> Result<()> {
        let provider = leaked_provider();
        let mut login = bootstrap_push_struct!(Host, arena, provider, |arena| Host {
            header: 1,
            arena,
            window_count: 0,
        })?;
        let mut main = bootstrap_push_struct!(Host, arena, provider, |arena| Host {
            header: 2,
            arena,
            window_count: 0,
        })?;
        assert_eq!(login.host_block().serial(), 1);
        assert_eq!(main.host_block().serial(), 1);

        std::mem::swap(&mut login.arena, &mut main.arena);
        login.arena.push_size(64, PushParams::default())?;
        assert_eq!(provider.live_blocks(), 2);

        // Neither handle owns the arena it finds, so both host blocks leak.
        drop(login);
        assert_eq!(provider.live_blocks(), 2);
        drop(main);
        assert_eq!(provider.live_blocks(), 2);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "bootstrap init must store the arena")]
    fn test_init_must_store_the_arena() {
        let provider = leaked_provider();
        let _ = bootstrap_push_struct!(Host, arena, provider, |_arena| Host {
            header: 0,
            arena: MemoryArena::with_provider(provider),
            window_count: 0,
        });
    }

    #[test]
    fn test_invalid_params_fail_before_allocating() {
        let provider = leaked_provider();
        let result = bootstrap_push_struct!(
            Host,
            arena,
            provider,
            BootstrapParams::default(),
            PushParams::aligned(6),
            |arena| Host {
                header: 0,
                arena,
                window_count: 0,
            }
        );
        assert!(matches!(
            result,
            Err(ArenaError::InvalidAlignment { alignment: 6 })
        ));
        assert_eq!(provider.total_allocations(), 0);
    }
}
