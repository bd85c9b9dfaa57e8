//! Binding resolution: element indirection, `define_key`, `lookup_key`.

use crate::{EventKey, KeymapStore, normalize_key};
use core_value::{EdError, Heap, KeymapId, Result, Value};
use tracing::trace;

/// Outcome of `lookup_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The sequence resolved to a non-keymap binding (`Nil` when unbound
    /// at the final element).
    Binding(Value),
    /// The sequence is a valid but incomplete prefix; this is the keymap
    /// it reached.
    Prefix(KeymapId),
    /// A mid-sequence element was unbound or bound to a non-keymap; the
    /// payload is the number of elements consumed.
    Undefined(usize),
}

/// Resolve the indirections a stored key element may carry: while the
/// object is `(MAP . INDEX)` with MAP a keymap, access INDEX in MAP; a
/// `(STRING . VALUE)` pair sheds its menu-prompt string. Anything else is
/// the definition itself (`Nil` meaning unbound). The walk is bounded so
/// malformed self-referential entries cannot loop.
pub fn get_keyelt(heap: &mut Heap, store: &KeymapStore, mut object: Value) -> Result<Value> {
    for _ in 0..crate::INDIRECTION_LIMIT {
        if !object.is_cons() {
            return Ok(object);
        }
        let head = heap.car(object)?;
        if let Some(map) = store.as_keymap(heap, head) {
            let idx = heap.cdr(object)?;
            let key = normalize_key(heap, idx)?;
            object = store.access(map, key);
        } else if matches!(head, Value::Str(_)) {
            object = heap.cdr(object)?;
        } else {
            return Ok(object);
        }
    }
    Ok(Value::Nil)
}

/// One step of the shared define/lookup walk: pull the next element,
/// folding integers with the high bit set into a two-step
/// `meta_prefix_char` sequence. Returns the key for this step and whether
/// the cursor advanced (it does not advance when the meta prefix was
/// synthesized).
fn next_element(
    heap: &mut Heap,
    key: &[Value],
    idx: &mut usize,
    metized: &mut bool,
    meta_prefix_char: u32,
) -> Result<(EventKey, bool)> {
    let elt = key[*idx];
    if let Value::Int(c) = elt {
        if c >= 0x80 && !*metized {
            *metized = true;
            return Ok((EventKey::Code(meta_prefix_char), false));
        }
        let folded = if *metized { c & 0x7f } else { c };
        *metized = false;
        *idx += 1;
        return normalize_key(heap, Value::Int(folded)).map(|k| (k, true));
    }
    *metized = false;
    *idx += 1;
    normalize_key(heap, elt).map(|k| (k, true))
}

/// Define `key` (a sequence of integer and symbol elements, length ≥ 1) to
/// run `def` in `keymap`, creating fresh sparse keymaps for undefined
/// prefixes along the way.
pub fn define_key(
    heap: &mut Heap,
    store: &mut KeymapStore,
    keymap: KeymapId,
    key: &[Value],
    def: Value,
    meta_prefix_char: u32,
) -> Result<()> {
    if key.is_empty() {
        return Err(EdError::WrongRange("empty key sequence".into()));
    }
    let mut idx = 0usize;
    let mut metized = false;
    let mut current = keymap;
    loop {
        let (ekey, advanced) = next_element(heap, key, &mut idx, &mut metized, meta_prefix_char)?;
        if advanced && idx == key.len() {
            trace!(target: "keymap.define", map = current.0, ?ekey, "store");
            return store.store(current, ekey, def);
        }
        let binding = store.access(current, ekey);
        let cmd = get_keyelt(heap, store, binding)?;
        current = match store.as_keymap(heap, cmd) {
            Some(map) => map,
            None if cmd.is_nil() => {
                let fresh = store.make_sparse();
                store.store(current, ekey, Value::Keymap(fresh))?;
                fresh
            }
            None => {
                return Err(EdError::error(
                    "Key sequence uses invalid prefix characters",
                ));
            }
        };
    }
}

/// Look `key` up in `keymap`. See `Lookup` for the trichotomy. An empty
/// sequence names the keymap itself.
pub fn lookup_key(
    heap: &mut Heap,
    store: &KeymapStore,
    keymap: KeymapId,
    key: &[Value],
    meta_prefix_char: u32,
) -> Result<Lookup> {
    if key.is_empty() {
        return Ok(Lookup::Prefix(keymap));
    }
    let mut idx = 0usize;
    let mut metized = false;
    let mut current = keymap;
    loop {
        let (ekey, advanced) = next_element(heap, key, &mut idx, &mut metized, meta_prefix_char)?;
        let binding = store.access(current, ekey);
        let cmd = get_keyelt(heap, store, binding)?;
        if advanced && idx == key.len() {
            return Ok(match store.as_keymap(heap, cmd) {
                Some(map) => Lookup::Prefix(map),
                None => Lookup::Binding(cmd),
            });
        }
        match store.as_keymap(heap, cmd) {
            Some(map) => current = map,
            None => return Ok(Lookup::Undefined(idx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyseq_from_str;
    use pretty_assertions::assert_eq;

    const ESC: u32 = 0x1b;

    fn fixture() -> (Heap, KeymapStore, KeymapId) {
        let mut store = KeymapStore::new();
        let map = store.make_sparse();
        (Heap::new(), store, map)
    }

    #[test]
    fn define_then_lookup_round_trip() {
        let (mut heap, mut store, map) = fixture();
        let seq = keyseq_from_str("\x18f"); // C-x f
        define_key(&mut heap, &mut store, map, &seq, Value::Int(42), ESC).unwrap();
        assert_eq!(
            lookup_key(&mut heap, &store, map, &seq, ESC).unwrap(),
            Lookup::Binding(Value::Int(42))
        );
        // Every strict prefix is a keymap.
        match lookup_key(&mut heap, &store, map, &seq[..1], ESC).unwrap() {
            Lookup::Prefix(_) => {}
            other => panic!("expected prefix, got {other:?}"),
        }
    }

    #[test]
    fn unbound_mid_sequence_reports_consumed_length() {
        let (mut heap, mut store, map) = fixture();
        let seq = keyseq_from_str("\x18f");
        define_key(&mut heap, &mut store, map, &seq, Value::Int(1), ESC).unwrap();
        let probe = keyseq_from_str("\x18zq");
        assert_eq!(
            lookup_key(&mut heap, &store, map, &probe, ESC).unwrap(),
            Lookup::Undefined(2)
        );
    }

    #[test]
    fn defining_through_bound_non_prefix_errors() {
        let (mut heap, mut store, map) = fixture();
        define_key(
            &mut heap,
            &mut store,
            map,
            &keyseq_from_str("a"),
            Value::Int(1),
            ESC,
        )
        .unwrap();
        let err = define_key(
            &mut heap,
            &mut store,
            map,
            &keyseq_from_str("ab"),
            Value::Int(2),
            ESC,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid prefix"));
    }

    #[test]
    fn meta_bit_folds_to_prefix_char_sequence() {
        let (mut heap, mut store, map) = fixture();
        // Define via the fused form, look up via the two-step form.
        define_key(
            &mut heap,
            &mut store,
            map,
            &[Value::Int(0xf8)], // 'x' | 0x80
            Value::Int(7),
            ESC,
        )
        .unwrap();
        let two_step = [Value::Int(ESC as i64), Value::Int('x' as i64)];
        assert_eq!(
            lookup_key(&mut heap, &store, map, &two_step, ESC).unwrap(),
            Lookup::Binding(Value::Int(7))
        );
        // And the fused form finds the same definition.
        assert_eq!(
            lookup_key(&mut heap, &store, map, &[Value::Int(0xf8)], ESC).unwrap(),
            Lookup::Binding(Value::Int(7))
        );
    }

    #[test]
    fn get_keyelt_strips_menu_prompt_and_follows_indirection() {
        let (mut heap, mut store, map) = fixture();
        store
            .store(map, EventKey::Code(b'f' as u32), Value::Int(42))
            .unwrap();

        // (STRING . VALUE) sheds the prompt.
        let prompt = heap.make_string("Find file");
        let entry = heap.cons(prompt, Value::Int(9));
        assert_eq!(get_keyelt(&mut heap, &store, entry).unwrap(), Value::Int(9));

        // (MAP . INDEX) accesses INDEX in MAP.
        let indirect = heap.cons(Value::Keymap(map), Value::Int(b'f' as i64));
        assert_eq!(
            get_keyelt(&mut heap, &store, indirect).unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn empty_lookup_names_the_map() {
        let (mut heap, store, map) = fixture();
        assert_eq!(
            lookup_key(&mut heap, &store, map, &[], ESC).unwrap(),
            Lookup::Prefix(map)
        );
    }
}
