//! core-buffer: the minimal text substrate the command loop edits, plus
//! the undo log.
//!
//! Positions are 1-based character positions, `1 ..= len + 1`; a region
//! `[beg, end)` excludes `end`. The editing primitives here feed the undo
//! log before mutating; everything richer (markers, intervals, file I/O)
//! belongs to outer layers.

pub mod undo;

use core_value::{EdError, KeymapId, Result};
use tracing::debug;
use undo::{UndoEntry, UndoList};

#[derive(Debug)]
pub struct Buffer {
    pub name: String,
    text: String,
    /// Cached character count of `text`.
    chars: usize,
    pub point: usize,
    pub modified: bool,
    /// Snapshot of the visited file's modification time, split into
    /// (high, low) second halves the way the undo log stores it.
    pub modtime: Option<(i64, i64)>,
    pub undo: UndoList,
    pub local_map: Option<KeymapId>,
    /// Bumped on every text change; windows cache it for the
    /// direct-output fast paths.
    pub tick: u64,
}

impl Buffer {
    pub fn new(name: &str) -> Self {
        Self::with_text(name, "")
    }

    pub fn with_text(name: &str, text: &str) -> Self {
        Buffer {
            name: name.to_string(),
            text: text.to_string(),
            chars: text.chars().count(),
            point: 1,
            modified: false,
            modtime: None,
            undo: UndoList::new(),
            local_map: None,
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Last valid position (one past the final character).
    pub fn max_pos(&self) -> usize {
        self.chars + 1
    }

    fn byte_of(&self, pos: usize) -> usize {
        self.text
            .char_indices()
            .nth(pos - 1)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    fn check_pos(&self, pos: usize) -> Result<()> {
        if pos < 1 || pos > self.max_pos() {
            return Err(EdError::WrongRange(format!(
                "position {pos} in buffer of {} characters",
                self.chars
            )));
        }
        Ok(())
    }

    pub fn substring(&self, beg: usize, end: usize) -> Result<String> {
        self.check_pos(beg)?;
        self.check_pos(end)?;
        if beg > end {
            return Err(EdError::WrongRange(format!("region {beg}..{end}")));
        }
        let b = self.byte_of(beg);
        let e = self.byte_of(end);
        Ok(self.text[b..e].to_string())
    }

    pub fn char_after(&self, pos: usize) -> Option<char> {
        if pos < 1 || pos > self.chars {
            return None;
        }
        self.text.chars().nth(pos - 1)
    }

    /// Record a modtime stamp ahead of the first change since the buffer
    /// matched its file, so undoing back to here can clear `modified`.
    fn note_first_change(&mut self) {
        if !self.modified {
            if let Some((hi, lo)) = self.modtime {
                self.undo.record_first_change(hi, lo);
            }
        }
    }

    /// Insert `text` at `pos`, recording undo and shifting point.
    pub fn insert(&mut self, pos: usize, text: &str) -> Result<()> {
        self.check_pos(pos)?;
        let n = text.chars().count();
        if n == 0 {
            return Ok(());
        }
        self.note_first_change();
        self.undo.record_insert(pos, n);
        self.splice_in(pos, text, n);
        Ok(())
    }

    fn splice_in(&mut self, pos: usize, text: &str, n: usize) {
        let at = self.byte_of(pos);
        self.text.insert_str(at, text);
        self.chars += n;
        if self.point >= pos {
            self.point += n;
        }
        self.modified = true;
        self.tick += 1;
    }

    /// Delete `[beg, end)`, recording the removed text for undo.
    pub fn delete_region(&mut self, beg: usize, end: usize) -> Result<String> {
        let removed = self.substring(beg, end)?;
        let n = end - beg;
        if n == 0 {
            return Ok(removed);
        }
        self.note_first_change();
        let at_end = self.point == end;
        self.undo.record_delete(beg, removed.clone(), at_end);
        self.splice_out(beg, end, n);
        Ok(removed)
    }

    fn splice_out(&mut self, beg: usize, end: usize, n: usize) {
        let b = self.byte_of(beg);
        let e = self.byte_of(end);
        self.text.replace_range(b..e, "");
        self.chars -= n;
        if self.point >= end {
            self.point -= n;
        } else if self.point > beg {
            self.point = beg;
        }
        self.modified = true;
        self.tick += 1;
    }

    /// Number of lines; an empty buffer has one.
    pub fn line_count(&self) -> usize {
        self.text.chars().filter(|&c| c == '\n').count() + 1
    }

    /// Text of line `n` (0-based), without the newline.
    pub fn line_text(&self, n: usize) -> Option<&str> {
        self.text.split('\n').nth(n)
    }

    /// 1-based position of the first character of line `n`.
    pub fn line_start(&self, n: usize) -> usize {
        let mut pos = 1usize;
        for (i, line) in self.text.split('\n').enumerate() {
            if i == n {
                break;
            }
            pos += line.chars().count() + 1;
        }
        pos
    }

    /// (line, column) of a position, both 0-based.
    pub fn line_col(&self, pos: usize) -> (usize, usize) {
        let mut line = 0usize;
        let mut col = 0usize;
        for (i, ch) in self.text.chars().enumerate() {
            if i + 1 >= pos {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// Undo `count` change groups from the undo list. Each group runs to
    /// the next boundary; a boundary sitting at the head of the list
    /// (freshly pushed by `undo_boundary`) is skipped, not treated as an
    /// empty group. Applying entries does not itself record undo.
    pub fn primitive_undo(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            if matches!(self.undo.front(), Some(UndoEntry::Boundary)) {
                self.undo.pop_front();
            }
            loop {
                let Some(entry) = self.undo.pop_front() else {
                    return Ok(());
                };
                match entry {
                    UndoEntry::Boundary => break,
                    UndoEntry::Insertion { beg, end } => {
                        self.check_pos(beg)?;
                        self.check_pos(end)?;
                        let n = end - beg;
                        self.splice_out(beg, end, n);
                        self.point = beg;
                    }
                    UndoEntry::Deletion { text, pos } => {
                        let at = pos.unsigned_abs() as usize;
                        self.check_pos(at)?;
                        let n = text.chars().count();
                        self.splice_in(at, &text, n);
                        self.point = if pos < 0 { at + n } else { at };
                    }
                    UndoEntry::Modtime { hi, lo } => {
                        if self.modtime == Some((hi, lo)) {
                            self.modified = false;
                            debug!(target: "buffer.undo", buffer = %self.name, "modified_flag_restored");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct BufferStore {
    buffers: Vec<Buffer>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, buffer: Buffer) -> core_value::BufferId {
        let id = core_value::BufferId(self.buffers.len() as u32);
        self.buffers.push(buffer);
        id
    }

    pub fn get(&self, id: core_value::BufferId) -> &Buffer {
        &self.buffers[id.index()]
    }

    pub fn get_mut(&mut self, id: core_value::BufferId) -> &mut Buffer {
        &mut self.buffers[id.index()]
    }

    pub fn find_by_name(&self, name: &str) -> Option<core_value::BufferId> {
        self.buffers
            .iter()
            .position(|b| b.name == name)
            .map(|i| core_value::BufferId(i as u32))
    }

    pub fn ids(&self) -> Vec<core_value::BufferId> {
        (0..self.buffers.len() as u32).map(core_value::BufferId).collect()
    }

    /// Get-or-create by name; fresh buffers start empty.
    pub fn get_or_create(&mut self, name: &str) -> core_value::BufferId {
        self.find_by_name(name)
            .unwrap_or_else(|| self.add(Buffer::new(name)))
    }
}
