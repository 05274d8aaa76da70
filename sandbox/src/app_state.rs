use std::ptr::NonNull;

use anyhow::Result;
use hotshell::memory::{
    bootstrap_push_struct, BlockFlags, BootstrapParams, Bootstrapped, MemoryArena, PushParams,
    TrackingBlockProvider,
};

pub type ShellProvider = &'static TrackingBlockProvider;

const PERMANENT_BLOCK_SIZE: usize = 64 * 1024;
const TRANSIENT_BLOCK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Main,
    Sub,
}

impl Screen {
    pub fn title(&self) -> &'static [u8] {
        match self {
            Screen::Login => b"Login\0",
            Screen::Main => b"Main window\0",
            Screen::Sub => b"Sub window\0",
        }
    }

    pub fn widget_count(&self) -> usize {
        match self {
            Screen::Login => 4,
            Screen::Main => 32,
            Screen::Sub => 12,
        }
    }

    pub fn next(&self) -> Screen {
        match self {
            Screen::Login => Screen::Main,
            Screen::Main => Screen::Sub,
            Screen::Sub => Screen::Main,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Application state living in its own permanent arena.
pub struct AppState {
    pub arena: MemoryArena<ShellProvider>,
    /// Per-frame scratch, rolled back at the end of every frame.
    pub transient: MemoryArena<ShellProvider>,
    pub screen: Screen,
    pub frame_index: u64,
    pub user_name: Option<NonNull<u8>>,
}

impl AppState {
    pub fn bootstrap(provider: ShellProvider) -> Result<Bootstrapped<AppState, ShellProvider>> {
        let mut state = bootstrap_push_struct!(
            AppState,
            arena,
            provider,
            BootstrapParams::new(BlockFlags::empty(), PERMANENT_BLOCK_SIZE),
            PushParams::default(),
            |arena| AppState {
                arena,
                transient: MemoryArena::with_params(
                    provider,
                    BootstrapParams::new(BlockFlags::empty(), TRANSIENT_BLOCK_SIZE),
                ),
                screen: Screen::Login,
                frame_index: 0,
                user_name: None,
            }
        )?;

        let user_name = state.arena.push_string(b"guest\0")?;
        state.user_name = Some(user_name);
        Ok(state)
    }
}
