mod app_state;

use std::ffi::CStr;

use anyhow::Result;
use app_state::{AppState, Rect, ShellProvider};
use hotshell::{
    log::{debug, error, info, logging_thread_join, logging_thread_start, warn},
    memory::{Constructor, PushParams, TrackingBlockProvider},
};

const FRAME_COUNT: u64 = 8;

#[derive(Debug, Clone, Copy)]
struct FrameInput {
    frame_index: u64,
    cursor: (i32, i32),
}

fn main() -> Result<()> {
    logging_thread_start(None)?;

    let result = run();
    if let Err(e) = &result {
        error!("Sandbox failed: {e:#}");
    }

    logging_thread_join()?;
    result
}

fn run() -> Result<()> {
    let provider: ShellProvider = Box::leak(Box::new(TrackingBlockProvider::new()));

    let mut state = AppState::bootstrap(provider)?;
    if let Some(user_name) = state.user_name {
        let user_name = unsafe { CStr::from_ptr(user_name.as_ptr().cast()) };
        info!("Logged in as {}", user_name.to_string_lossy());
    }

    for _ in 0..FRAME_COUNT {
        update_and_render(&mut state)?;
    }

    info!("Permanent arena: {:?}", state.arena.stats());
    info!("Transient arena: {:?}", state.transient.stats());
    info!(
        "Blocks: {} live, {} peak, {} allocated in total",
        provider.live_blocks(),
        provider.peak_live_blocks(),
        provider.total_allocations()
    );

    drop(state);
    if provider.live_blocks() != 0 {
        warn!("{} block(s) outlived the application state", provider.live_blocks());
    }
    Ok(())
}

fn update_and_render(state: &mut AppState) -> Result<()> {
    state.frame_index += 1;
    let screen = state.screen;
    let frame_index = state.frame_index;
    let transient = &mut state.transient;

    let frame = transient.begin_temporary_memory();

    let input = transient.construct(FrameInput {
        frame_index,
        cursor: (frame_index as i32 * 16, 120),
    })?;
    let title = transient.push_string(screen.title())?;

    let widget_count = screen.widget_count();
    let rects = transient.push_array::<Rect>(widget_count, PushParams::default())?;
    let rects = unsafe { std::slice::from_raw_parts_mut(rects.as_ptr(), widget_count) };
    for (i, rect) in rects.iter_mut().enumerate() {
        *rect = Rect {
            x: 8,
            y: 8 + i as i32 * 24,
            width: 200,
            height: 20,
        };
    }

    // Tooltip text only lives for the hit test.
    let hovered = transient.with_temporary_memory(|scratch| -> Result<Option<usize>> {
        let (x, y) = unsafe { input.as_ref() }.cursor;
        let hovered = rects
            .iter()
            .position(|r| x >= r.x && x < r.x + r.width && y >= r.y && y < r.y + r.height);
        if let Some(index) = hovered {
            let tooltip = format!("Widget #{index}");
            scratch.push_and_null_terminate(tooltip.as_bytes())?;
        }
        Ok(hovered)
    })??;

    let title = unsafe { CStr::from_ptr(title.as_ptr().cast()) };
    debug!(
        "Frame {}: \"{}\" with {} widget(s), hovered {:?}, {} scratch bytes",
        unsafe { input.as_ref() }.frame_index,
        title.to_string_lossy(),
        widget_count,
        hovered,
        transient.stats().total_used
    );

    transient.end_temporary_memory(frame)?;
    transient.check_arena()?;
    state.arena.check_arena()?;

    state.screen = screen.next();
    Ok(())
}
