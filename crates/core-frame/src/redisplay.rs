//! Reconciling the desired matrix against the current one, plus the
//! direct-output shortcuts the command loop's fast paths use.

use crate::{FaceId, Frame, Glyph};
use anyhow::Result;
use core_terminal::TerminalBackend;
use tracing::trace;
use unicode_width::UnicodeWidthChar;

/// Emit every enabled desired row to the device and fold it into the
/// current matrix. A garbaged frame is cleared and fully redrawn first.
///
/// After this returns, a disabled current row is genuinely blank on the
/// device, and the desired matrix is fully disabled.
pub fn update_frame(frame: &mut Frame, backend: &mut dyn TerminalBackend) -> Result<()> {
    if frame.garbaged {
        backend.clear_screen()?;
        for n in 0..frame.current.height() {
            frame.current.blank_row(n);
            frame.current.enable[n] = false;
            // Everything must be repainted from the desired matrix.
            if frame.desired.used[n] > 0 {
                frame.desired.enable[n] = true;
            }
        }
        frame.garbaged = false;
    }

    let rows = frame.desired.height().min(frame.current.height());
    let mut updated = 0usize;
    for n in 0..rows {
        if !frame.desired.enable[n] {
            continue;
        }
        updated += 1;
        let text = frame.desired.row_text(n);
        backend.clear_row(n as u16)?;
        if !text.is_empty() {
            backend.write_run(n as u16, 0, &text, frame.desired.highlight[n])?;
        }
        frame.current.copy_row_from(&frame.desired, n);
        // On the current matrix a disabled row means blank-on-device.
        frame.current.enable[n] = frame.desired.used[n] > 0;
        frame.desired.enable[n] = false;
    }

    backend.cursor_to(frame.cursor.0 as u16, frame.cursor.1 as u16)?;
    backend.flush()?;
    if updated > 0 {
        trace!(target: "frame.redisplay", rows = updated, "update_frame");
    }
    Ok(())
}

/// Fast path: the command only moved the cursor. Skip matrix work and
/// reposition the device cursor.
pub fn direct_output_cursor_move(
    frame: &mut Frame,
    backend: &mut dyn TerminalBackend,
    row: usize,
    col: usize,
) -> Result<()> {
    frame.cursor = (row, col);
    backend.cursor_to(row as u16, col as u16)?;
    backend.flush()?;
    Ok(())
}

/// Fast path for self-inserting a printable character at the cursor:
/// write it straight through to the device and into the *current* matrix
/// so the next full update sees an accurate mirror. Returns false (and
/// does nothing) when the insert would wrap or the character is not
/// simply spacing, in which case the caller falls back to full redisplay.
pub fn direct_output_self_insert(
    frame: &mut Frame,
    backend: &mut dyn TerminalBackend,
    ch: char,
) -> Result<bool> {
    let (row, col) = frame.cursor;
    if ch.width().unwrap_or(0) != 1 {
        return Ok(false);
    }
    if row >= frame.current.height() || col + 1 >= frame.current.width() {
        return Ok(false);
    }
    frame.current.put_glyph(row, col, Glyph::new(ch, FaceId(0)));
    frame.current.enable[row] = true;
    backend.write_run(row as u16, col as u16, &ch.to_string(), false)?;
    frame.cursor = (row, col + 1);
    backend.cursor_to(row as u16, (col + 1) as u16)?;
    backend.flush()?;
    trace!(target: "frame.redisplay", row, col, "direct_output_insert");
    Ok(true)
}

/// Write `msg` into the echo area: the bottom matrix row, clipped to the
/// frame width, under the same used/enable discipline as any other row.
pub fn echo_area_display(frame: &mut Frame, msg: &str) {
    let row = frame.desired.height().saturating_sub(1);
    frame.desired.blank_row(row);
    if !msg.is_empty() {
        frame.desired.write_str(row, 0, msg, FaceId(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameStore, WindowStore};
    use core_terminal::{MemoryBackend, RecordedOp};
    use core_value::BufferId;
    use pretty_assertions::assert_eq;

    fn frame_fixture() -> (FrameStore, core_value::FrameId, MemoryBackend) {
        let mut frames = FrameStore::new();
        let mut windows = WindowStore::new();
        let id = frames.make_frame(&mut windows, BufferId(0), "t", true);
        (frames, id, MemoryBackend::new(10, 10))
    }

    #[test]
    fn update_writes_enabled_rows_and_disables_them() {
        let (mut frames, id, mut backend) = frame_fixture();
        let frame = frames.get_mut(id);
        frame.desired.write_str(2, 0, "hello", FaceId(0));
        update_frame(frame, &mut backend).unwrap();

        assert!(!frame.desired.enable[2]);
        assert!(frame.current.enable[2]);
        assert_eq!(frame.current.row_text(2), "hello");
        assert!(backend.written_text().contains("hello"));

        // A second update with nothing enabled writes nothing new.
        let ops_before = backend.ops.len();
        update_frame(frame, &mut backend).unwrap();
        let text_ops = backend.ops[ops_before..]
            .iter()
            .filter(|op| matches!(op, RecordedOp::Write { .. }))
            .count();
        assert_eq!(text_ops, 0);
    }

    #[test]
    fn blank_desired_row_blanks_current() {
        let (mut frames, id, mut backend) = frame_fixture();
        let frame = frames.get_mut(id);
        frame.desired.write_str(1, 0, "xyz", FaceId(0));
        update_frame(frame, &mut backend).unwrap();
        assert!(frame.current.enable[1]);

        frame.desired.blank_row(1);
        update_frame(frame, &mut backend).unwrap();
        // Disabled current row ⇔ blank on the device.
        assert!(!frame.current.enable[1]);
        assert_eq!(frame.current.used[1], 0);
    }

    #[test]
    fn garbaged_frame_clears_screen() {
        let (mut frames, id, mut backend) = frame_fixture();
        let frame = frames.get_mut(id);
        frame.garbaged = true;
        update_frame(frame, &mut backend).unwrap();
        assert!(backend.ops.contains(&RecordedOp::ClearScreen));
        assert!(!frame.garbaged);
    }

    #[test]
    fn direct_insert_updates_current_matrix_and_cursor() {
        let (mut frames, id, mut backend) = frame_fixture();
        let frame = frames.get_mut(id);
        frame.cursor = (0, 0);
        assert!(direct_output_self_insert(frame, &mut backend, 'a').unwrap());
        assert_eq!(frame.cursor, (0, 1));
        assert_eq!(frame.current.row_text(0), "a");

        // At the right edge the fast path declines.
        frame.cursor = (0, 9);
        assert!(!direct_output_self_insert(frame, &mut backend, 'b').unwrap());
    }

    #[test]
    fn echo_area_occupies_bottom_row() {
        let (mut frames, id, _backend) = frame_fixture();
        let frame = frames.get_mut(id);
        echo_area_display(frame, "C-x -");
        let bottom = frame.desired.height() - 1;
        assert!(frame.desired.enable[bottom]);
        assert_eq!(frame.desired.row_text(bottom), "C-x -");
        // Clearing takes the same path.
        echo_area_display(frame, "");
        assert_eq!(frame.desired.used[bottom], 0);
        assert!(frame.desired.enable[bottom]);
    }
}
