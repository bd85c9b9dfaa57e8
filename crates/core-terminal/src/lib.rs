//! Terminal back-end abstraction and crossterm implementation.
//!
//! The core calls the display driver only through `TerminalBackend`; the
//! driver owns raw-mode state, translates device input into raw `Event`s,
//! and executes the row writes redisplay hands it. `MemoryBackend` is the
//! in-process double used by tests.

use anyhow::Result;
use core_events::Event;
use core_value::FrameId;

pub mod capabilities;
mod crossterm_backend;
mod memory;

pub use capabilities::TerminalCapabilities;
pub use crossterm_backend::CrosstermBackend;
pub use memory::{MemoryBackend, RecordedOp};

/// Pointer position report, in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MousePos {
    pub x: i32,
    pub y: i32,
    pub timestamp: u64,
}

/// Hooks the core requires from a display driver.
///
/// The frame/visibility hooks take a `FrameId` even though a terminal
/// driver only has one frame to show; a window-system driver keys its
/// native windows off the id.
pub trait TerminalBackend {
    // -- lifecycle -------------------------------------------------------------------------------
    fn enter(&mut self) -> Result<()>;
    fn leave(&mut self) -> Result<()>;
    fn set_title(&mut self, title: &str) -> Result<()>;
    fn size(&self) -> (u16, u16);
    fn capabilities(&self) -> TerminalCapabilities;

    // -- input -----------------------------------------------------------------------------------
    /// Drain pending device events without blocking. `expected` hints that
    /// the caller believes input is ready (post-wakeup).
    fn read_avail_input(&mut self, expected: bool) -> Result<Vec<Event>>;

    /// Current pointer position, if the device can report one.
    fn mouse_position(&mut self) -> Option<MousePos>;

    fn set_mouse_position(&mut self, frame: FrameId, x: i32, y: i32);

    // -- frame management ------------------------------------------------------------------------
    fn set_window_size(&mut self, frame: FrameId, cols: u16, rows: u16);
    fn make_frame_visible(&mut self, frame: FrameId);
    fn make_frame_invisible(&mut self, frame: FrameId);
    fn iconify_frame(&mut self, frame: FrameId);
    fn destroy_window(&mut self, frame: FrameId);
    /// Reassert input-focus highlighting after a focus redirect change.
    fn frame_rehighlight(&mut self);

    // -- output ----------------------------------------------------------------------------------
    fn cursor_to(&mut self, row: u16, col: u16) -> Result<()>;
    /// Write `text` at (row, col), optionally in inverse video.
    fn write_run(&mut self, row: u16, col: u16, text: &str, inverse: bool) -> Result<()>;
    fn clear_row(&mut self, row: u16) -> Result<()>;
    fn clear_screen(&mut self) -> Result<()>;
    fn ring_bell(&mut self);
    fn flush(&mut self) -> Result<()>;

    /// Stop the process (debug stop character). Terminal drivers suspend;
    /// window-system drivers ignore it.
    fn suspend(&mut self);
}

/// RAII guard ensuring terminal state restoration even if the caller
/// early-returns or panics.
pub struct TerminalGuard<'a> {
    backend: &'a mut dyn TerminalBackend,
    active: bool,
}

impl<'a> TerminalGuard<'a> {
    pub fn new(backend: &'a mut dyn TerminalBackend) -> Result<Self> {
        backend.enter()?;
        Ok(Self {
            backend,
            active: true,
        })
    }

    pub fn backend(&mut self) -> &mut dyn TerminalBackend {
        self.backend
    }

    pub fn release(mut self) -> Result<()> {
        self.active = false;
        self.backend.leave()
    }
}

impl<'a> Drop for TerminalGuard<'a> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.backend.leave();
        }
    }
}
