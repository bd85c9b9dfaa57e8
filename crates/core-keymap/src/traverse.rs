//! Whole-map traversals: `accessible_keymaps` and `where_is`.

use crate::{EventKey, KeymapRepr, KeymapStore, Lookup, get_keyelt, lookup_key};
use core_value::{Heap, KeymapId, Result, Value};
use tracing::trace;

/// Every `(key, binding)` entry of one map, dense table first.
fn collect_entries(store: &KeymapStore, map: KeymapId) -> Vec<(EventKey, Value)> {
    let mut out = Vec::new();
    match store.repr(map) {
        KeymapRepr::Dense { table, alist } => {
            for (code, &binding) in table.iter().enumerate() {
                if !binding.is_nil() {
                    out.push((EventKey::Code(code as u32), binding));
                }
            }
            out.extend(alist.iter().filter(|(_, v)| !v.is_nil()).copied());
        }
        KeymapRepr::Sparse { alist } => {
            out.extend(alist.iter().filter(|(_, v)| !v.is_nil()).copied());
        }
    }
    out
}

/// Breadth-first enumeration of `(prefix, keymap)` pairs reachable from
/// `root` through prefix bindings. Each reached keymap appears once (the
/// first prefix wins, checked by map identity). A map reached through a
/// trailing `meta_prefix_char` contributes fused meta-characters
/// `ch | 0x80` for its ASCII entries, inserted immediately after the
/// current entry so the result stays in breadth-first order.
pub fn accessible_keymaps(
    heap: &mut Heap,
    store: &KeymapStore,
    root: KeymapId,
    meta_prefix_char: u32,
) -> Result<Vec<(Vec<EventKey>, KeymapId)>> {
    let mut maps: Vec<(Vec<EventKey>, KeymapId)> = vec![(Vec::new(), root)];
    let mut i = 0usize;
    while i < maps.len() {
        let (prefix, map) = maps[i].clone();
        let meta_tail = prefix.last() == Some(&EventKey::Code(meta_prefix_char));
        let mut insert_at = i + 1;
        for (key, binding) in collect_entries(store, map) {
            let cmd = get_keyelt(heap, store, binding)?;
            let Some(sub) = store.as_keymap(heap, cmd) else {
                continue;
            };
            if maps.iter().any(|(_, m)| *m == sub) {
                continue;
            }
            if meta_tail {
                if let EventKey::Code(c) = key {
                    if c <= 0x7f {
                        let mut fused = prefix[..prefix.len() - 1].to_vec();
                        fused.push(EventKey::Code(c | 0x80));
                        maps.insert(insert_at, (fused, sub));
                        insert_at += 1;
                        continue;
                    }
                }
            }
            let mut seq = prefix.clone();
            seq.push(key);
            maps.push((seq, sub));
        }
        i += 1;
    }
    trace!(target: "keymap.traverse", root = root.0, reachable = maps.len(), "accessible_keymaps");
    Ok(maps)
}

/// Look `seq` up the way the reader would: local map first, then global.
fn chain_lookup(
    heap: &mut Heap,
    store: &KeymapStore,
    local: Option<KeymapId>,
    global: KeymapId,
    seq: &[Value],
    meta_prefix_char: u32,
) -> Result<Value> {
    if let Some(local) = local {
        match lookup_key(heap, store, local, seq, meta_prefix_char)? {
            Lookup::Binding(v) if !v.is_nil() => return Ok(v),
            Lookup::Prefix(m) => return Ok(Value::Keymap(m)),
            _ => {}
        }
    }
    match lookup_key(heap, store, global, seq, meta_prefix_char)? {
        Lookup::Binding(v) => Ok(v),
        Lookup::Prefix(m) => Ok(Value::Keymap(m)),
        Lookup::Undefined(_) => Ok(Value::Nil),
    }
}

/// All key sequences whose binding is `equal` to `def`, searching the
/// local map (if any) then the global map, discarding sequences whose
/// binding is shadowed by a more specific map.
pub fn where_is(
    heap: &mut Heap,
    store: &KeymapStore,
    def: Value,
    local: Option<KeymapId>,
    global: KeymapId,
    meta_prefix_char: u32,
) -> Result<Vec<Vec<EventKey>>> {
    let mut maps = Vec::new();
    if let Some(local) = local {
        maps.extend(accessible_keymaps(heap, store, local, meta_prefix_char)?);
    }
    maps.extend(accessible_keymaps(heap, store, global, meta_prefix_char)?);

    let mut found: Vec<Vec<EventKey>> = Vec::new();
    for (prefix, map) in &maps {
        for (key, binding) in collect_entries(store, *map) {
            let cmd = get_keyelt(heap, store, binding)?;
            if !heap.equal(cmd, def) {
                continue;
            }
            let mut seq = prefix.clone();
            seq.push(key);
            if found.contains(&seq) {
                continue;
            }
            let values: Vec<Value> = seq.iter().map(|k| k.to_value()).collect();
            let effective = chain_lookup(heap, store, local, global, &values, meta_prefix_char)?;
            if heap.equal(effective, def) {
                found.push(seq);
            } else {
                trace!(target: "keymap.traverse", ?seq, "where_is_shadowed");
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{define_key, keyseq_from_str};
    use pretty_assertions::assert_eq;

    const ESC: u32 = 0x1b;

    #[test]
    fn accessible_finds_nested_prefixes() {
        let mut heap = Heap::new();
        let mut store = KeymapStore::new();
        let root = store.make_sparse();
        // C-x 4 f and C-c c
        define_key(
            &mut heap,
            &mut store,
            root,
            &keyseq_from_str("\x184f"),
            Value::Int(1),
            ESC,
        )
        .unwrap();
        define_key(
            &mut heap,
            &mut store,
            root,
            &keyseq_from_str("\x03c"),
            Value::Int(2),
            ESC,
        )
        .unwrap();

        let maps = accessible_keymaps(&mut heap, &store, root, ESC).unwrap();
        let prefixes: Vec<Vec<EventKey>> = maps.iter().map(|(p, _)| p.clone()).collect();
        assert!(prefixes.contains(&vec![]));
        assert!(prefixes.contains(&vec![EventKey::Code(0x18)]));
        assert!(prefixes.contains(&vec![EventKey::Code(0x18), EventKey::Code(b'4' as u32)]));
        assert!(prefixes.contains(&vec![EventKey::Code(0x03)]));
        assert_eq!(maps.len(), 4);
    }

    #[test]
    fn accessible_fuses_meta_prefixes() {
        let mut heap = Heap::new();
        let mut store = KeymapStore::new();
        let root = store.make_sparse();
        // ESC v f: the ESC v map should be listed under the fused M-v code.
        let seq = [
            Value::Int(ESC as i64),
            Value::Int('v' as i64),
            Value::Int('f' as i64),
        ];
        define_key(&mut heap, &mut store, root, &seq, Value::Int(3), ESC).unwrap();

        let maps = accessible_keymaps(&mut heap, &store, root, ESC).unwrap();
        let prefixes: Vec<Vec<EventKey>> = maps.iter().map(|(p, _)| p.clone()).collect();
        assert!(
            prefixes.contains(&vec![EventKey::Code('v' as u32 | 0x80)]),
            "fused meta prefix missing: {prefixes:?}"
        );
        // The fused entry stands in for the two-step form.
        assert!(!prefixes.contains(&vec![EventKey::Code(ESC), EventKey::Code('v' as u32)]));
    }

    #[test]
    fn where_is_finds_and_respects_shadowing() {
        let mut heap = Heap::new();
        let mut store = KeymapStore::new();
        let global = store.make_sparse();
        let local = store.make_sparse();
        let cmd = Value::Sym(heap.intern("find-file"));
        let other = Value::Sym(heap.intern("other-command"));

        define_key(
            &mut heap,
            &mut store,
            global,
            &keyseq_from_str("\x18f"),
            cmd,
            ESC,
        )
        .unwrap();
        let hits = where_is(&mut heap, &store, cmd, Some(local), global, ESC).unwrap();
        assert_eq!(
            hits,
            vec![vec![EventKey::Code(0x18), EventKey::Code(b'f' as u32)]]
        );

        // A local rebinding of the same sequence shadows the global one.
        define_key(
            &mut heap,
            &mut store,
            local,
            &keyseq_from_str("\x18f"),
            other,
            ESC,
        )
        .unwrap();
        let hits = where_is(&mut heap, &store, cmd, Some(local), global, ESC).unwrap();
        assert!(hits.is_empty(), "shadowed binding still reported: {hits:?}");
    }
}
