//! In-memory backend double: scripts input, records output.

use crate::{MousePos, TerminalBackend, TerminalCapabilities};
use anyhow::Result;
use core_events::Event;
use core_value::FrameId;
use std::collections::VecDeque;

/// One recorded output operation, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    CursorTo(u16, u16),
    Write {
        row: u16,
        col: u16,
        text: String,
        inverse: bool,
    },
    ClearRow(u16),
    ClearScreen,
    Bell,
    Title(String),
    Suspended,
}

#[derive(Debug)]
pub struct MemoryBackend {
    pub cols: u16,
    pub rows: u16,
    pub ops: Vec<RecordedOp>,
    pub pending: VecDeque<Event>,
    pub mouse: Option<MousePos>,
    caps: TerminalCapabilities,
    entered: bool,
}

impl MemoryBackend {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            ops: Vec::new(),
            pending: VecDeque::new(),
            mouse: None,
            caps: TerminalCapabilities::tty(),
            entered: false,
        }
    }

    pub fn with_capabilities(mut self, caps: TerminalCapabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Queue an event for the next `read_avail_input` call.
    pub fn push_input(&mut self, ev: Event) {
        self.pending.push_back(ev);
    }

    /// All text written, concatenated in call order. Handy for "did the
    /// echo area show X" assertions.
    pub fn written_text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                RecordedOp::Write { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn bell_count(&self) -> usize {
        self.ops.iter().filter(|op| **op == RecordedOp::Bell).count()
    }
}

impl TerminalBackend for MemoryBackend {
    fn enter(&mut self) -> Result<()> {
        self.entered = true;
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        self.entered = false;
        Ok(())
    }

    fn set_title(&mut self, title: &str) -> Result<()> {
        self.ops.push(RecordedOp::Title(title.to_string()));
        Ok(())
    }

    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn capabilities(&self) -> TerminalCapabilities {
        self.caps
    }

    fn read_avail_input(&mut self, _expected: bool) -> Result<Vec<Event>> {
        Ok(self.pending.drain(..).collect())
    }

    fn mouse_position(&mut self) -> Option<MousePos> {
        self.mouse
    }

    fn set_mouse_position(&mut self, _frame: FrameId, x: i32, y: i32) {
        self.mouse = Some(MousePos {
            x,
            y,
            timestamp: 0,
        });
    }

    fn set_window_size(&mut self, _frame: FrameId, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
    }

    fn make_frame_visible(&mut self, _frame: FrameId) {}
    fn make_frame_invisible(&mut self, _frame: FrameId) {}
    fn iconify_frame(&mut self, _frame: FrameId) {}
    fn destroy_window(&mut self, _frame: FrameId) {}
    fn frame_rehighlight(&mut self) {}

    fn cursor_to(&mut self, row: u16, col: u16) -> Result<()> {
        self.ops.push(RecordedOp::CursorTo(row, col));
        Ok(())
    }

    fn write_run(&mut self, row: u16, col: u16, text: &str, inverse: bool) -> Result<()> {
        self.ops.push(RecordedOp::Write {
            row,
            col,
            text: text.to_string(),
            inverse,
        });
        Ok(())
    }

    fn clear_row(&mut self, row: u16) -> Result<()> {
        self.ops.push(RecordedOp::ClearRow(row));
        Ok(())
    }

    fn clear_screen(&mut self) -> Result<()> {
        self.ops.push(RecordedOp::ClearScreen);
        Ok(())
    }

    fn ring_bell(&mut self) {
        self.ops.push(RecordedOp::Bell);
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn suspend(&mut self) {
        self.ops.push(RecordedOp::Suspended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::Mods;
    use pretty_assertions::assert_eq;

    #[test]
    fn records_and_drains() {
        let mut b = MemoryBackend::new(80, 24);
        b.push_input(Event::ascii(b'x' as u32, None, 1));
        b.push_input(Event::mouse_click(0, Mods::empty(), None, 1, 2, 3));
        let drained = b.read_avail_input(false).unwrap();
        assert_eq!(drained.len(), 2);
        assert!(b.read_avail_input(false).unwrap().is_empty());

        b.write_run(0, 0, "hi", false).unwrap();
        b.ring_bell();
        assert_eq!(b.written_text(), "hi");
        assert_eq!(b.bell_count(), 1);
    }
}
