//! core-keymap: keymap containers and the binding-resolution engine.
//!
//! A keymap is either *dense* (a 128-slot direct-indexed table for ASCII
//! codes plus an association list for symbolic keys) or *sparse* (the
//! association list alone). Keymaps live in a `KeymapStore` arena and are
//! referenced by `KeymapId`; a binding value is any `Value`, and a binding
//! that is itself a keymap (directly or through a symbol's function slot)
//! makes its key a prefix.

use core_events::Mods;
use core_value::{EdError, Heap, KeymapId, Result, SymbolId, Value};
use smallvec::SmallVec;
use tracing::trace;

mod describe;
mod lookup;
mod traverse;

pub use describe::{key_description, single_key_description};
pub use lookup::{Lookup, define_key, get_keyelt, lookup_key};
pub use traverse::{accessible_keymaps, where_is};

/// Slot count of a dense keymap's direct table.
pub const DENSE_TABLE_SIZE: usize = 128;

/// Bound on symbol-function indirection when resolving a possible keymap,
/// so a self-referential function slot cannot loop the resolver.
pub const INDIRECTION_LIMIT: usize = 8;

/// A normalized key: a character/keysym code or a canonicalized symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Code(u32),
    Sym(SymbolId),
}

impl EventKey {
    pub fn to_value(self) -> Value {
        match self {
            EventKey::Code(c) => Value::Int(c as i64),
            EventKey::Sym(s) => Value::Sym(s),
        }
    }
}

/// Association list of symbolic (and, on sparse maps, integer) keys.
/// Most maps carry only a handful of entries.
pub type Alist = SmallVec<[(EventKey, Value); 4]>;

#[derive(Debug, Clone)]
pub enum KeymapRepr {
    Dense {
        table: Box<[Value; DENSE_TABLE_SIZE]>,
        alist: Alist,
    },
    Sparse {
        alist: Alist,
    },
}

#[derive(Debug, Default)]
pub struct KeymapStore {
    maps: Vec<KeymapRepr>,
}

impl KeymapStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_dense(&mut self) -> KeymapId {
        let id = KeymapId(self.maps.len() as u32);
        self.maps.push(KeymapRepr::Dense {
            table: Box::new([Value::Nil; DENSE_TABLE_SIZE]),
            alist: Alist::new(),
        });
        id
    }

    pub fn make_sparse(&mut self) -> KeymapId {
        let id = KeymapId(self.maps.len() as u32);
        self.maps.push(KeymapRepr::Sparse {
            alist: Alist::new(),
        });
        id
    }

    pub fn repr(&self, id: KeymapId) -> &KeymapRepr {
        &self.maps[id.index()]
    }

    fn repr_mut(&mut self, id: KeymapId) -> &mut KeymapRepr {
        &mut self.maps[id.index()]
    }

    pub fn is_dense(&self, id: KeymapId) -> bool {
        matches!(self.repr(id), KeymapRepr::Dense { .. })
    }

    /// Store `def` under `key`. Integer keys land in the dense table when
    /// the map is dense and the code fits; symbolic keys always go to the
    /// association list.
    pub fn store(&mut self, id: KeymapId, key: EventKey, def: Value) -> Result<()> {
        match (self.repr_mut(id), key) {
            (KeymapRepr::Dense { table, .. }, EventKey::Code(c)) => {
                if (c as usize) < DENSE_TABLE_SIZE {
                    table[c as usize] = def;
                    Ok(())
                } else {
                    Err(EdError::error("Command key is not an ASCII character"))
                }
            }
            (KeymapRepr::Dense { alist, .. }, key @ EventKey::Sym(_))
            | (KeymapRepr::Sparse { alist }, key) => {
                if let Some(entry) = alist.iter_mut().find(|(k, _)| *k == key) {
                    entry.1 = def;
                } else {
                    alist.push((key, def));
                }
                Ok(())
            }
        }
    }

    /// Raw binding of `key` in this one map; `Nil` when unbound.
    pub fn access(&self, id: KeymapId, key: EventKey) -> Value {
        match (self.repr(id), key) {
            (KeymapRepr::Dense { table, .. }, EventKey::Code(c)) => {
                if (c as usize) < DENSE_TABLE_SIZE {
                    table[c as usize]
                } else {
                    Value::Nil
                }
            }
            (KeymapRepr::Dense { alist, .. }, key) | (KeymapRepr::Sparse { alist }, key) => alist
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .unwrap_or(Value::Nil),
        }
    }

    /// Resolve `v` to a keymap if it is one, directly or through at most
    /// `INDIRECTION_LIMIT` symbol function-slot hops.
    pub fn as_keymap(&self, heap: &Heap, mut v: Value) -> Option<KeymapId> {
        for _ in 0..INDIRECTION_LIMIT {
            match v {
                Value::Keymap(id) => return Some(id),
                Value::Sym(s) => v = heap.symbol_function(s),
                _ => return None,
            }
        }
        None
    }

    /// Deep copy: the top alist (and table, when dense) plus every
    /// sub-keymap reachable through direct keymap values, so mutating the
    /// copy or its descendants never affects the original.
    pub fn copy_keymap(&mut self, id: KeymapId) -> KeymapId {
        let repr = self.repr(id).clone();
        let copy = match repr {
            KeymapRepr::Dense { mut table, alist } => {
                for slot in table.iter_mut() {
                    *slot = self.copy_entry(*slot);
                }
                let alist = alist
                    .into_iter()
                    .map(|(k, v)| (k, self.copy_entry(v)))
                    .collect();
                KeymapRepr::Dense { table, alist }
            }
            KeymapRepr::Sparse { alist } => {
                let alist = alist
                    .into_iter()
                    .map(|(k, v)| (k, self.copy_entry(v)))
                    .collect();
                KeymapRepr::Sparse { alist }
            }
        };
        let new_id = KeymapId(self.maps.len() as u32);
        self.maps.push(copy);
        trace!(target: "keymap.store", from = id.0, to = new_id.0, "copy_keymap");
        new_id
    }

    fn copy_entry(&mut self, v: Value) -> Value {
        match v {
            Value::Keymap(sub) => Value::Keymap(self.copy_keymap(sub)),
            other => other,
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Key normalization
// -------------------------------------------------------------------------------------------------

/// Rewrite a symbol so its modifier prefix appears in the canonical
/// C, M, S, U order. Already-canonical symbols come back unchanged.
pub fn reorder_modifiers(heap: &mut Heap, sym: SymbolId) -> SymbolId {
    let name = heap.symbol_name(sym);
    let (mods, base_at) = Mods::parse_prefix(name);
    if mods.is_empty() {
        return sym;
    }
    let canonical = format!("{}{}", mods.prefix(), &name[base_at..]);
    if canonical == name {
        sym
    } else {
        heap.intern(&canonical)
    }
}

/// Normalize an index value into an `EventKey`: a pair contributes its
/// head (mouse clicks carry position data in the tail), integers become
/// codes, symbols are canonicalized.
pub fn normalize_key(heap: &mut Heap, idx: Value) -> Result<EventKey> {
    let idx = if idx.is_cons() { heap.car(idx)? } else { idx };
    match idx {
        Value::Int(n) => {
            if n < 0 {
                Err(EdError::WrongRange(format!("key code {n}")))
            } else {
                Ok(EventKey::Code(n as u32))
            }
        }
        Value::Sym(s) => Ok(EventKey::Sym(reorder_modifiers(heap, s))),
        other => Err(EdError::wrong_type("character or symbol", other)),
    }
}

/// Turn a key-sequence value (string of ASCII codes) into element values.
pub fn keyseq_from_str(s: &str) -> Vec<Value> {
    s.chars().map(|c| Value::Int(c as i64)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dense_table_has_128_unbound_slots() {
        let mut store = KeymapStore::new();
        let id = store.make_dense();
        match store.repr(id) {
            KeymapRepr::Dense { table, alist } => {
                assert_eq!(table.len(), DENSE_TABLE_SIZE);
                assert!(table.iter().all(|v| v.is_nil()));
                assert!(alist.is_empty());
            }
            _ => panic!("expected dense"),
        }
    }

    #[test]
    fn dense_rejects_non_ascii_codes() {
        let mut store = KeymapStore::new();
        let id = store.make_dense();
        let err = store
            .store(id, EventKey::Code(200), Value::Int(1))
            .unwrap_err();
        assert!(err.to_string().contains("not an ASCII character"));
    }

    #[test]
    fn sparse_stores_any_code() {
        let mut store = KeymapStore::new();
        let id = store.make_sparse();
        store.store(id, EventKey::Code(200), Value::Int(1)).unwrap();
        assert_eq!(store.access(id, EventKey::Code(200)), Value::Int(1));
        // update in place, no duplicate entries
        store.store(id, EventKey::Code(200), Value::Int(2)).unwrap();
        assert_eq!(store.access(id, EventKey::Code(200)), Value::Int(2));
        match store.repr(id) {
            KeymapRepr::Sparse { alist } => assert_eq!(alist.len(), 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn reorder_modifiers_is_idempotent() {
        let mut heap = Heap::new();
        let messy = heap.intern("S-C-f5");
        let once = reorder_modifiers(&mut heap, messy);
        let twice = reorder_modifiers(&mut heap, once);
        assert_eq!(heap.symbol_name(once), "C-S-f5");
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_takes_pair_head() {
        let mut heap = Heap::new();
        let sym = heap.intern("mouse-1");
        let pos = Value::Int(42);
        let pair = heap.cons(Value::Sym(sym), pos);
        assert_eq!(
            normalize_key(&mut heap, pair).unwrap(),
            EventKey::Sym(sym)
        );
    }

    #[test]
    fn as_keymap_follows_symbol_chain() {
        let mut heap = Heap::new();
        let mut store = KeymapStore::new();
        let map = store.make_sparse();
        let a = heap.intern("ctl-x-map");
        let b = heap.intern("indirect");
        heap.set_symbol_function(a, Value::Keymap(map));
        heap.set_symbol_function(b, Value::Sym(a));
        assert_eq!(store.as_keymap(&heap, Value::Sym(b)), Some(map));
        // A cycle hits the indirection bound instead of spinning.
        let c = heap.intern("loop");
        heap.set_symbol_function(c, Value::Sym(c));
        assert_eq!(store.as_keymap(&heap, Value::Sym(c)), None);
    }

    #[test]
    fn copy_is_deep() {
        let mut store = KeymapStore::new();
        let outer = store.make_sparse();
        let inner = store.make_sparse();
        store
            .store(inner, EventKey::Code(b'f' as u32), Value::Int(7))
            .unwrap();
        store
            .store(outer, EventKey::Code(0x18), Value::Keymap(inner))
            .unwrap();

        let copy = store.copy_keymap(outer);
        let copied_inner = match store.access(copy, EventKey::Code(0x18)) {
            Value::Keymap(id) => id,
            other => panic!("expected keymap, got {other:?}"),
        };
        assert_ne!(copied_inner, inner);

        store
            .store(copied_inner, EventKey::Code(b'f' as u32), Value::Int(9))
            .unwrap();
        assert_eq!(
            store.access(inner, EventKey::Code(b'f' as u32)),
            Value::Int(7)
        );
    }
}
