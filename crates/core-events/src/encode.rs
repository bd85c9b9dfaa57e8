//! Canonical-symbol construction for non-character events.
//!
//! Symbols like `C-M-f5` or `U-mouse-2` are built once and cached: the
//! cache is a per-kind vector indexed by base key, each slot being either
//! empty, the unmodified symbol, or a secondary table indexed by the
//! modifier bitset.

use crate::Mods;
use core_value::{Heap, SymbolId};
use tracing::trace;

/// Size of the per-base secondary table: one slot per modifier combination.
const MOD_TABLE_LEN: usize = 16;

/// Base names for the function keys the terminal and X back-ends deliver,
/// keyed by X keysym number. Order defines the cache index.
pub const FUNCTION_KEY_NAMES: &[(u32, &str)] = &[
    (0xff08, "backspace"),
    (0xff09, "tab"),
    (0xff0a, "linefeed"),
    (0xff0b, "clear"),
    (0xff0d, "return"),
    (0xff13, "pause"),
    (0xff1b, "escape"),
    (0xff50, "home"),
    (0xff51, "left"),
    (0xff52, "up"),
    (0xff53, "right"),
    (0xff54, "down"),
    (0xff55, "prior"),
    (0xff56, "next"),
    (0xff57, "end"),
    (0xff58, "begin"),
    (0xff60, "select"),
    (0xff61, "print"),
    (0xff62, "execute"),
    (0xff63, "insert"),
    (0xff65, "undo"),
    (0xff66, "redo"),
    (0xff67, "menu"),
    (0xff68, "find"),
    (0xff69, "cancel"),
    (0xff6a, "help"),
    (0xff6b, "break"),
    (0xffbe, "f1"),
    (0xffbf, "f2"),
    (0xffc0, "f3"),
    (0xffc1, "f4"),
    (0xffc2, "f5"),
    (0xffc3, "f6"),
    (0xffc4, "f7"),
    (0xffc5, "f8"),
    (0xffc6, "f9"),
    (0xffc7, "f10"),
    (0xffc8, "f11"),
    (0xffc9, "f12"),
    (0xffff, "delete"),
];

/// Cache index for a function-key code, if the code is known.
pub fn function_key_index(code: u32) -> Option<usize> {
    FUNCTION_KEY_NAMES.iter().position(|&(c, _)| c == code)
}

/// Number of directly named mouse buttons; higher buttons get formatted
/// names but no cache slot.
pub const NUM_MOUSE_BUTTONS: usize = 5;

pub fn mouse_button_index(button: u32) -> Option<usize> {
    ((button as usize) < NUM_MOUSE_BUTTONS).then_some(button as usize)
}

pub fn mouse_button_name(button: u32) -> String {
    format!("mouse-{}", button + 1)
}

#[derive(Debug, Clone)]
enum CacheSlot {
    Empty,
    /// Only the unmodified symbol has been requested for this base.
    Unmodified(SymbolId),
    /// Secondary table indexed by modifier bitset.
    Table(Box<[Option<SymbolId>; MOD_TABLE_LEN]>),
}

/// Per-kind symbol cache: one slot per base key.
#[derive(Debug)]
pub struct SymbolCache {
    slots: Vec<CacheSlot>,
}

impl SymbolCache {
    pub fn new(n_base: usize) -> Self {
        Self {
            slots: vec![CacheSlot::Empty; n_base],
        }
    }

    fn lookup(&self, base: usize, mods: Mods) -> Option<SymbolId> {
        match self.slots.get(base)? {
            CacheSlot::Empty => None,
            CacheSlot::Unmodified(sym) => mods.is_empty().then_some(*sym),
            CacheSlot::Table(table) => table[mods.bits() as usize],
        }
    }

    fn store(&mut self, base: usize, mods: Mods, sym: SymbolId) {
        if base >= self.slots.len() {
            return;
        }
        let slot = &mut self.slots[base];
        match slot {
            CacheSlot::Empty if mods.is_empty() => *slot = CacheSlot::Unmodified(sym),
            CacheSlot::Table(table) => table[mods.bits() as usize] = Some(sym),
            _ => {
                // Promote to a secondary table, keeping any unmodified entry.
                let mut table = Box::new([None; MOD_TABLE_LEN]);
                if let CacheSlot::Unmodified(prev) = slot {
                    table[0] = Some(*prev);
                }
                table[mods.bits() as usize] = Some(sym);
                *slot = CacheSlot::Table(table);
            }
        }
    }
}

/// The two caches the encoder needs, bundled.
#[derive(Debug)]
pub struct EventSymbolCaches {
    pub function_keys: SymbolCache,
    pub mouse_buttons: SymbolCache,
}

impl Default for EventSymbolCaches {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSymbolCaches {
    pub fn new() -> Self {
        Self {
            function_keys: SymbolCache::new(FUNCTION_KEY_NAMES.len()),
            mouse_buttons: SymbolCache::new(NUM_MOUSE_BUTTONS),
        }
    }
}

/// Return the symbol naming `base_name` under `mods`, consulting and
/// filling `cache` at `base_index`. The symbol's name carries the modifier
/// prefix in canonical C-M-S-U order.
pub fn modify_event_symbol(
    heap: &mut Heap,
    cache: &mut SymbolCache,
    base_index: usize,
    mods: Mods,
    base_name: &str,
) -> SymbolId {
    if let Some(sym) = cache.lookup(base_index, mods) {
        return sym;
    }
    let name = format!("{}{}", mods.prefix(), base_name);
    let sym = heap.intern(&name);
    cache.store(base_index, mods, sym);
    trace!(target: "input.encode", name = %name, base_index, "symbol_cached");
    sym
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cache_returns_same_symbol() {
        let mut heap = Heap::new();
        let mut cache = SymbolCache::new(FUNCTION_KEY_NAMES.len());
        let idx = function_key_index(0xff52).unwrap(); // up
        let a = modify_event_symbol(&mut heap, &mut cache, idx, Mods::empty(), "up");
        let b = modify_event_symbol(&mut heap, &mut cache, idx, Mods::empty(), "up");
        assert_eq!(a, b);
        assert_eq!(heap.symbol_name(a), "up");
    }

    #[test]
    fn modified_symbols_get_canonical_prefix() {
        let mut heap = Heap::new();
        let mut cache = SymbolCache::new(FUNCTION_KEY_NAMES.len());
        let idx = function_key_index(0xffc2).unwrap(); // f5
        let sym = modify_event_symbol(
            &mut heap,
            &mut cache,
            idx,
            Mods::META | Mods::CTRL,
            "f5",
        );
        assert_eq!(heap.symbol_name(sym), "C-M-f5");
        // Promotion to the secondary table keeps the unmodified entry intact.
        let bare = modify_event_symbol(&mut heap, &mut cache, idx, Mods::empty(), "f5");
        assert_eq!(heap.symbol_name(bare), "f5");
        let again = modify_event_symbol(&mut heap, &mut cache, idx, Mods::META | Mods::CTRL, "f5");
        assert_eq!(sym, again);
    }

    #[test]
    fn unknown_keysym_has_no_index() {
        assert_eq!(function_key_index(0x1234), None);
        assert!(function_key_index(0xff1b).is_some());
    }

    #[test]
    fn mouse_button_names() {
        assert_eq!(mouse_button_name(0), "mouse-1");
        assert_eq!(mouse_button_index(4), Some(4));
        assert_eq!(mouse_button_index(5), None);
    }
}
