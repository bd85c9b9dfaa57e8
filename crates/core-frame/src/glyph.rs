//! Glyphs and the per-frame glyph matrix.

/// One display cell: a character code in the low 21 bits, a face index
/// above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph(u32);

const CHAR_BITS: u32 = 21;
const CHAR_MASK: u32 = (1 << CHAR_BITS) - 1;

impl Glyph {
    pub const BLANK: Glyph = Glyph(' ' as u32);

    pub fn new(ch: char, face: super::FaceId) -> Self {
        Glyph((ch as u32 & CHAR_MASK) | ((face.0 as u32) << CHAR_BITS))
    }

    pub fn ch(self) -> char {
        char::from_u32(self.0 & CHAR_MASK).unwrap_or(' ')
    }

    pub fn face(self) -> super::FaceId {
        super::FaceId((self.0 >> CHAR_BITS) as u16)
    }

    pub fn is_blank(self) -> bool {
        self.ch() == ' '
    }
}

/// Per-row pixel metadata, populated only under a window system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowMetrics {
    pub top_left_x: i32,
    pub top_left_y: i32,
    pub pix_width: i32,
    pub pix_height: i32,
    pub max_ascent: i32,
}

/// A height × width grid of glyphs plus the per-row bookkeeping vectors.
///
/// The meaning of `enable` depends on the matrix role: on a *desired*
/// matrix, a disabled row matches `current` and needs no work; on a
/// *current* matrix, a disabled row is known blank on the device.
/// `used[n] ≤ width` always; columns past `used[n]` are blank.
#[derive(Debug, Clone)]
pub struct GlyphMatrix {
    width: usize,
    height: usize,
    glyphs: Vec<Vec<Glyph>>,
    pub enable: Vec<bool>,
    pub used: Vec<usize>,
    pub highlight: Vec<bool>,
    /// Buffer offset of the first character on each row; drives
    /// mouse-to-position mapping.
    pub bufp: Vec<usize>,
    pub metrics: Option<Vec<RowMetrics>>,
}

impl GlyphMatrix {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            width,
            height,
            glyphs: vec![vec![Glyph::BLANK; width]; height],
            enable: vec![false; height],
            used: vec![0; height],
            highlight: vec![false; height],
            bufp: vec![0; height],
            metrics: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Reallocate the per-row arrays for a new geometry. Contents are
    /// discarded; the caller is expected to mark the frame garbaged.
    pub fn resize(&mut self, height: usize, width: usize) {
        *self = GlyphMatrix::new(height, width);
    }

    pub fn row(&self, n: usize) -> &[Glyph] {
        &self.glyphs[n]
    }

    /// Text content of row `n` up to its used extent.
    pub fn row_text(&self, n: usize) -> String {
        self.glyphs[n][..self.used[n]].iter().map(|g| g.ch()).collect()
    }

    /// Write `text` into row `row` starting at `col`, clipping at the
    /// right edge. `used` and `enable` advance only when something was
    /// actually written.
    pub fn write_str(&mut self, row: usize, col: usize, text: &str, face: super::FaceId) {
        if row >= self.height || col >= self.width {
            return;
        }
        let mut at = col;
        for ch in text.chars() {
            if at >= self.width {
                break;
            }
            self.glyphs[row][at] = Glyph::new(ch, face);
            at += 1;
        }
        if at > col {
            self.used[row] = self.used[row].max(at);
            self.enable[row] = true;
        }
    }

    pub fn put_glyph(&mut self, row: usize, col: usize, glyph: Glyph) {
        if row < self.height && col < self.width {
            self.glyphs[row][col] = glyph;
            self.used[row] = self.used[row].max(col + 1);
            self.enable[row] = true;
        }
    }

    /// Mark row `row` blank (used = 0) and enabled so the update pass
    /// clears it on the device.
    pub fn blank_row(&mut self, row: usize) {
        if row < self.height {
            for g in &mut self.glyphs[row] {
                *g = Glyph::BLANK;
            }
            self.used[row] = 0;
            self.highlight[row] = false;
            self.enable[row] = true;
        }
    }

    /// Disable every row (desired-matrix "nothing to do" state).
    pub fn disable_all(&mut self) {
        self.enable.iter_mut().for_each(|e| *e = false);
    }

    /// Copy row `n` of `src` into this matrix (same geometry assumed).
    pub fn copy_row_from(&mut self, src: &GlyphMatrix, n: usize) {
        self.glyphs[n].clone_from(&src.glyphs[n]);
        self.used[n] = src.used[n];
        self.highlight[n] = src.highlight[n];
        self.bufp[n] = src.bufp[n];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FaceId;
    use pretty_assertions::assert_eq;

    #[test]
    fn glyph_packs_char_and_face() {
        let g = Glyph::new('é', FaceId(3));
        assert_eq!(g.ch(), 'é');
        assert_eq!(g.face(), FaceId(3));
        assert!(Glyph::BLANK.is_blank());
    }

    #[test]
    fn write_clips_at_width_and_tracks_used() {
        let mut m = GlyphMatrix::new(2, 5);
        m.write_str(0, 3, "abcdef", FaceId(0));
        assert_eq!(m.used[0], 5);
        assert!(m.enable[0]);
        assert_eq!(m.row_text(0), "   ab");
        assert!(m.used.iter().all(|&u| u <= m.width()));
    }

    #[test]
    fn blank_row_resets_used() {
        let mut m = GlyphMatrix::new(2, 5);
        m.write_str(1, 0, "xyz", FaceId(0));
        m.blank_row(1);
        assert_eq!(m.used[1], 0);
        assert!(m.enable[1]);
        assert_eq!(m.row_text(1), "");
    }

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut m = GlyphMatrix::new(2, 5);
        m.write_str(9, 0, "abc", FaceId(0));
        m.put_glyph(0, 9, Glyph::BLANK);
        assert!(!m.enable[0]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // used[n] ≤ width for any write pattern.
            #[test]
            fn used_never_exceeds_width(
                width in 1usize..40,
                writes in proptest::collection::vec((0usize..6, 0usize..50, "[ -~]{0,60}"), 0..20),
            ) {
                let mut m = GlyphMatrix::new(6, width);
                for (row, col, text) in writes {
                    m.write_str(row, col, &text, FaceId(0));
                }
                prop_assert!(m.used.iter().all(|&u| u <= width));
                for n in 0..m.height() {
                    prop_assert!(m.row_text(n).chars().count() <= width);
                }
            }
        }
    }
}
