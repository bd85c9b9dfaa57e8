//! Modifier bitset and the canonical C-M-S-U- name prefix.

bitflags::bitflags! {
    /// Event modifier bits. `UP` marks a button release. The upper bits are
    /// reserved for future back-ends.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Mods: u16 {
        const CTRL  = 1;
        const META  = 2;
        const SHIFT = 4;
        const UP    = 8;
    }
}

/// Canonical order of prefix letters. Symbol names spell modifiers in
/// exactly this order, e.g. `C-M-mouse-1`, never `M-C-mouse-1`.
const PREFIX_ORDER: [(Mods, char); 4] = [
    (Mods::CTRL, 'C'),
    (Mods::META, 'M'),
    (Mods::SHIFT, 'S'),
    (Mods::UP, 'U'),
];

impl Mods {
    /// Render the canonical `C-M-S-U-` prefix for this bitset (empty string
    /// for no modifiers).
    pub fn prefix(self) -> String {
        let mut out = String::new();
        for (bit, letter) in PREFIX_ORDER {
            if self.contains(bit) {
                out.push(letter);
                out.push('-');
            }
        }
        out
    }

    /// Parse leading two-character modifier prefixes off `name`. Returns the
    /// accumulated bitset and the byte offset where the base name starts.
    /// Accepts prefixes in any order; rendering back through `prefix()` is
    /// what canonicalizes.
    pub fn parse_prefix(name: &str) -> (Mods, usize) {
        let mut mods = Mods::empty();
        let mut at = 0usize;
        let bytes = name.as_bytes();
        while at + 1 < bytes.len() && bytes[at + 1] == b'-' {
            let bit = match bytes[at] {
                b'C' => Mods::CTRL,
                b'M' => Mods::META,
                b'S' => Mods::SHIFT,
                b'U' => Mods::UP,
                _ => break,
            };
            // A lone "C-" with nothing after it is a base name, not a prefix.
            if at + 2 >= bytes.len() {
                break;
            }
            mods |= bit;
            at += 2;
        }
        (mods, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_renders_in_fixed_order() {
        assert_eq!(Mods::empty().prefix(), "");
        assert_eq!((Mods::META | Mods::CTRL).prefix(), "C-M-");
        assert_eq!((Mods::UP | Mods::SHIFT | Mods::CTRL).prefix(), "C-S-U-");
    }

    #[test]
    fn parse_accepts_any_order() {
        let (m, rest) = Mods::parse_prefix("M-C-x");
        assert_eq!(m, Mods::CTRL | Mods::META);
        assert_eq!(rest, 4);

        let (m, rest) = Mods::parse_prefix("mouse-1");
        assert_eq!(m, Mods::empty());
        assert_eq!(rest, 0);
    }

    #[test]
    fn lone_prefix_is_a_base_name() {
        // "C-" by itself names a key, it is not an empty-base prefix.
        let (m, rest) = Mods::parse_prefix("C-");
        assert_eq!(m, Mods::empty());
        assert_eq!(rest, 0);
    }

    #[test]
    fn parse_then_render_is_canonical() {
        let (m, rest) = Mods::parse_prefix("S-C-f5");
        assert_eq!(format!("{}{}", m.prefix(), &"S-C-f5"[rest..]), "C-S-f5");
    }
}
