//! Crossterm-backed driver for plain terminals.

use crate::{MousePos, TerminalBackend, TerminalCapabilities};
use anyhow::Result;
use core_events::{Event, Mods};
use core_value::FrameId;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{
        DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode as CKeyCode,
        KeyEvent as CKeyEvent, KeyEventKind as CKind, KeyModifiers as CMods,
        MouseButton as CButton, MouseEvent as CMouseEvent, MouseEventKind as CMouseKind,
    },
    execute, queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{
        Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetTitle, disable_raw_mode,
        enable_raw_mode, size,
    },
};
use std::io::{Write, stdout};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub struct CrosstermBackend {
    entered: bool,
    started: Instant,
    last_mouse: Option<MousePos>,
}

impl Default for CrosstermBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosstermBackend {
    pub fn new() -> Self {
        Self {
            entered: false,
            started: Instant::now(),
            last_mouse: None,
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn translate(&mut self, ev: CEvent) -> Option<Event> {
        let ts = self.now_ms();
        match ev {
            CEvent::Key(key) => translate_key(key, ts),
            CEvent::Mouse(mouse) => self.translate_mouse(mouse, ts),
            CEvent::Resize(cols, rows) => {
                debug!(target: "terminal", cols, rows, "resize");
                None
            }
            _ => None,
        }
    }

    fn translate_mouse(&mut self, mouse: CMouseEvent, ts: u64) -> Option<Event> {
        let mods = translate_mods(mouse.modifiers);
        let (x, y) = (mouse.column as i32, mouse.row as i32);
        match mouse.kind {
            CMouseKind::Down(button) => {
                Some(Event::mouse_click(button_code(button), mods, None, x, y, ts))
            }
            CMouseKind::Up(button) => Some(Event::mouse_click(
                button_code(button),
                mods | Mods::UP,
                None,
                x,
                y,
                ts,
            )),
            // Wheel clicks use the classic button-4/5 numbering.
            CMouseKind::ScrollUp => Some(Event::mouse_click(3, mods, None, x, y, ts)),
            CMouseKind::ScrollDown => Some(Event::mouse_click(4, mods, None, x, y, ts)),
            CMouseKind::Moved | CMouseKind::Drag(_) => {
                self.last_mouse = Some(MousePos {
                    x,
                    y,
                    timestamp: ts,
                });
                Some(Event {
                    kind: core_events::EventKind::MouseMovement,
                    x,
                    y,
                    timestamp: ts,
                    ..Event::no_event()
                })
            }
            CMouseKind::ScrollLeft | CMouseKind::ScrollRight => None,
        }
    }
}

fn button_code(button: CButton) -> u32 {
    match button {
        CButton::Left => 0,
        CButton::Middle => 1,
        CButton::Right => 2,
    }
}

fn translate_mods(m: CMods) -> Mods {
    let mut out = Mods::empty();
    if m.contains(CMods::CONTROL) {
        out |= Mods::CTRL;
    }
    if m.contains(CMods::ALT) {
        out |= Mods::META;
    }
    if m.contains(CMods::SHIFT) {
        out |= Mods::SHIFT;
    }
    out
}

/// Map a key event onto the raw event model: characters (with control
/// folding and the meta bit) become `Ascii`, everything else `NonAscii`
/// keyed by keysym number.
fn translate_key(key: CKeyEvent, ts: u64) -> Option<Event> {
    if key.kind == CKind::Release {
        return None;
    }
    let mods = translate_mods(key.modifiers);
    match key.code {
        CKeyCode::Char(c) => {
            let mut code = c as u32;
            if code > 0xff {
                // Outside the byte range the terminal model speaks; drop.
                trace!(target: "terminal", code, "non_latin1_key_dropped");
                return None;
            }
            if mods.contains(Mods::CTRL) {
                code = fold_control(code);
            }
            if mods.contains(Mods::META) {
                code |= 0x80;
            }
            Some(Event::ascii(code, None, ts))
        }
        CKeyCode::Enter => Some(Event::ascii(0x0d, None, ts)),
        CKeyCode::Tab => Some(Event::ascii(0x09, None, ts)),
        CKeyCode::Backspace => Some(Event::ascii(0x7f, None, ts)),
        CKeyCode::Esc => Some(Event::ascii(0x1b, None, ts)),
        other => keysym_for(other).map(|sym| Event::function_key(sym, mods, None, ts)),
    }
}

/// Control folding for the printable range: `C-a` is 0x01, `C-@` is 0x00.
fn fold_control(code: u32) -> u32 {
    match code {
        0x40..=0x5f => code - 0x40,
        0x61..=0x7a => code - 0x60,
        0x3f => 0x7f, // C-? is DEL
        other => other,
    }
}

fn keysym_for(code: CKeyCode) -> Option<u32> {
    let sym = match code {
        CKeyCode::Up => 0xff52,
        CKeyCode::Down => 0xff54,
        CKeyCode::Left => 0xff51,
        CKeyCode::Right => 0xff53,
        CKeyCode::Home => 0xff50,
        CKeyCode::End => 0xff57,
        CKeyCode::PageUp => 0xff55,
        CKeyCode::PageDown => 0xff56,
        CKeyCode::Insert => 0xff63,
        CKeyCode::Delete => 0xffff,
        CKeyCode::F(n) if (1..=12).contains(&n) => 0xffbe + (n as u32 - 1),
        _ => return None,
    };
    Some(sym)
}

impl TerminalBackend for CrosstermBackend {
    fn enter(&mut self) -> Result<()> {
        if !self.entered {
            enable_raw_mode()?;
            execute!(stdout(), EnterAlternateScreen, EnableMouseCapture, Hide)?;
            self.entered = true;
        }
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        if self.entered {
            execute!(stdout(), DisableMouseCapture, LeaveAlternateScreen, Show)?;
            disable_raw_mode()?;
            self.entered = false;
        }
        Ok(())
    }

    fn set_title(&mut self, title: &str) -> Result<()> {
        execute!(stdout(), SetTitle(title))?;
        Ok(())
    }

    fn size(&self) -> (u16, u16) {
        size().unwrap_or((80, 24))
    }

    fn capabilities(&self) -> TerminalCapabilities {
        TerminalCapabilities::tty()
    }

    fn read_avail_input(&mut self, expected: bool) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        // First poll may wait a moment when the caller expects input; the
        // rest drain whatever is already buffered.
        let mut timeout = if expected {
            Duration::from_millis(10)
        } else {
            Duration::ZERO
        };
        while crossterm::event::poll(timeout)? {
            timeout = Duration::ZERO;
            if let Some(ev) = self.translate(crossterm::event::read()?) {
                out.push(ev);
            }
        }
        Ok(out)
    }

    fn mouse_position(&mut self) -> Option<MousePos> {
        self.last_mouse
    }

    fn set_mouse_position(&mut self, _frame: FrameId, x: i32, y: i32) {
        // Terminals cannot warp the pointer; remember it as the last
        // reported position so `mouse_position` stays coherent.
        self.last_mouse = Some(MousePos {
            x,
            y,
            timestamp: self.now_ms(),
        });
    }

    fn set_window_size(&mut self, _frame: FrameId, _cols: u16, _rows: u16) {}
    fn make_frame_visible(&mut self, _frame: FrameId) {}
    fn make_frame_invisible(&mut self, _frame: FrameId) {}
    fn iconify_frame(&mut self, _frame: FrameId) {}
    fn destroy_window(&mut self, _frame: FrameId) {}
    fn frame_rehighlight(&mut self) {}

    fn cursor_to(&mut self, row: u16, col: u16) -> Result<()> {
        queue!(stdout(), MoveTo(col, row))?;
        Ok(())
    }

    fn write_run(&mut self, row: u16, col: u16, text: &str, inverse: bool) -> Result<()> {
        let mut out = stdout();
        queue!(out, MoveTo(col, row))?;
        if inverse {
            queue!(out, SetAttribute(Attribute::Reverse))?;
        }
        queue!(out, Print(text))?;
        if inverse {
            queue!(out, SetAttribute(Attribute::NoReverse))?;
        }
        Ok(())
    }

    fn clear_row(&mut self, row: u16) -> Result<()> {
        queue!(stdout(), MoveTo(0, row), Clear(ClearType::CurrentLine))?;
        Ok(())
    }

    fn clear_screen(&mut self) -> Result<()> {
        queue!(stdout(), Clear(ClearType::All))?;
        Ok(())
    }

    fn ring_bell(&mut self) {
        let mut out = stdout();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }

    fn flush(&mut self) -> Result<()> {
        stdout().flush()?;
        Ok(())
    }

    fn suspend(&mut self) {
        // Re-raising SIGTSTP would be the full story; leaving and
        // re-entering raw mode keeps the terminal sane meanwhile.
        let _ = self.leave();
        let _ = self.enter();
    }
}

impl Drop for CrosstermBackend {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_folding() {
        assert_eq!(fold_control('a' as u32), 0x01);
        assert_eq!(fold_control('z' as u32), 0x1a);
        assert_eq!(fold_control('@' as u32), 0x00);
        assert_eq!(fold_control('_' as u32), 0x1f);
        assert_eq!(fold_control('?' as u32), 0x7f);
    }

    #[test]
    fn arrow_keysyms() {
        assert_eq!(keysym_for(CKeyCode::Up), Some(0xff52));
        assert_eq!(keysym_for(CKeyCode::F(5)), Some(0xffc2));
        assert_eq!(keysym_for(CKeyCode::F(13)), None);
    }
}
