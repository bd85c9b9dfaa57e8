//! Minimal window tree: enough structure to own buffers, map mouse
//! coordinates, and carry the caches the command loop's fast paths check.

use crate::Frame;
use core_events::WindowPart;
use core_value::{BufferId, FrameId, WindowId};

#[derive(Debug, Clone)]
pub struct Window {
    pub frame: FrameId,
    pub buffer: BufferId,
    pub left: usize,
    pub top: usize,
    pub width: usize,
    pub height: usize,
    pub is_minibuffer: bool,
    /// Caches consulted by the direct-output fast paths: the point and
    /// buffer tick observed at the end of the last full redisplay.
    pub last_point: usize,
    pub last_modified: u64,
}

impl Window {
    /// Classify frame coordinates against this window, or `None` when
    /// they fall outside it. The bottom row of a non-minibuffer window is
    /// its mode line; the rightmost column of a window not flush with the
    /// frame edge is the vertical separator.
    pub fn part_at(&self, x: i32, y: i32, frame_width: usize) -> Option<WindowPart> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x < self.left || x >= self.left + self.width || y < self.top
            || y >= self.top + self.height
        {
            return None;
        }
        if !self.is_minibuffer && y == self.top + self.height - 1 {
            return Some(WindowPart::ModeLine);
        }
        if self.left + self.width < frame_width && x == self.left + self.width - 1 {
            return Some(WindowPart::VerticalLine);
        }
        Some(WindowPart::Text)
    }
}

#[derive(Debug, Default)]
pub struct WindowStore {
    windows: Vec<Window>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, window: Window) -> WindowId {
        let id = WindowId(self.windows.len() as u32);
        self.windows.push(window);
        id
    }

    pub fn get(&self, id: WindowId) -> &Window {
        &self.windows[id.index()]
    }

    pub fn get_mut(&mut self, id: WindowId) -> &mut Window {
        &mut self.windows[id.index()]
    }

    pub fn on_frame(&self, frame: FrameId) -> Vec<WindowId> {
        self.windows
            .iter()
            .enumerate()
            .filter(|(_, w)| w.frame == frame)
            .map(|(i, _)| WindowId(i as u32))
            .collect()
    }
}

/// Find the window containing frame coordinates `(x, y)` and the part of
/// it they touch. Minibuffer windows are checked last so an overlapping
/// mode line wins.
pub fn window_from_coordinates(
    store: &WindowStore,
    frame: FrameId,
    frame_width: usize,
    x: i32,
    y: i32,
) -> Option<(WindowId, WindowPart)> {
    let ids = store.on_frame(frame);
    let (mini, normal): (Vec<_>, Vec<_>) = ids
        .into_iter()
        .partition(|id| store.get(*id).is_minibuffer);
    for id in normal.into_iter().chain(mini) {
        if let Some(part) = store.get(id).part_at(x, y, frame_width) {
            return Some((id, part));
        }
    }
    None
}

/// Map window coordinates to a buffer position through the current
/// matrix's per-row buffer offsets.
pub fn buffer_position(frame: &Frame, window: &Window, x: i32, y: i32) -> Option<usize> {
    if y < 0 || x < 0 {
        return None;
    }
    let row = y as usize;
    if row >= frame.current.height() {
        return None;
    }
    let col = (x as usize).saturating_sub(window.left);
    let base = frame.current.bufp[row];
    Some(base + col.min(frame.current.used[row]))
}
