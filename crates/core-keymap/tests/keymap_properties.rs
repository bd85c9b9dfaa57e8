//! Cross-module keymap invariants.

use core_keymap::{
    DENSE_TABLE_SIZE, EventKey, KeymapRepr, KeymapStore, Lookup, accessible_keymaps, define_key,
    lookup_key, reorder_modifiers,
};
use core_value::{Heap, Value};
use proptest::prelude::*;

const ESC: u32 = 0x1b;

#[test]
fn dense_maps_have_exactly_128_unbound_slots() {
    let mut store = KeymapStore::new();
    let id = store.make_dense();
    match store.repr(id) {
        KeymapRepr::Dense { table, .. } => {
            assert_eq!(table.len(), DENSE_TABLE_SIZE);
            assert!(table.iter().all(|v| v.is_nil()));
        }
        _ => panic!("make_dense produced a sparse map"),
    }
}

#[test]
fn meta_folding_definitions_are_equivalent() {
    // Defining [ESC, c] and [c | 0x80] must yield keymaps that behave
    // identically under lookup for both spellings.
    let c = 'x' as i64;
    for fused_define in [false, true] {
        let mut heap = Heap::new();
        let mut store = KeymapStore::new();
        let map = store.make_sparse();
        let def = Value::Int(99);
        let seq: Vec<Value> = if fused_define {
            vec![Value::Int(c | 0x80)]
        } else {
            vec![Value::Int(ESC as i64), Value::Int(c)]
        };
        define_key(&mut heap, &mut store, map, &seq, def, ESC).unwrap();

        let two_step = [Value::Int(ESC as i64), Value::Int(c)];
        let fused = [Value::Int(c | 0x80)];
        assert_eq!(
            lookup_key(&mut heap, &store, map, &two_step, ESC).unwrap(),
            Lookup::Binding(def)
        );
        assert_eq!(
            lookup_key(&mut heap, &store, map, &fused, ESC).unwrap(),
            Lookup::Binding(def)
        );
    }
}

#[test]
fn accessible_keymaps_is_complete() {
    // Build a three-level nesting plus a sibling branch; every reachable
    // (prefix, map) pair must be enumerated.
    let mut heap = Heap::new();
    let mut store = KeymapStore::new();
    let root = store.make_sparse();
    let seqs: [&[i64]; 3] = [&[0x18, b'4' as i64, b'f' as i64], &[0x18, b'r' as i64], &[0x03, b'a' as i64]];
    for seq in seqs {
        let values: Vec<Value> = seq.iter().map(|&c| Value::Int(c)).collect();
        define_key(&mut heap, &mut store, root, &values, Value::Int(1), ESC).unwrap();
    }

    let maps = accessible_keymaps(&mut heap, &store, root, ESC).unwrap();
    // Reachable prefixes: "", C-x, C-x 4, C-c.
    assert_eq!(maps.len(), 4);
    for expected in [
        vec![],
        vec![EventKey::Code(0x18)],
        vec![EventKey::Code(0x18), EventKey::Code(b'4' as u32)],
        vec![EventKey::Code(0x03)],
    ] {
        let hit = maps.iter().find(|(p, _)| *p == expected);
        assert!(hit.is_some(), "missing prefix {expected:?}");
        // And the pair really is reachable: walking the prefix from the
        // root lands on the recorded map.
        let (prefix, map) = hit.unwrap();
        if prefix.is_empty() {
            assert_eq!(*map, root);
        } else {
            let values: Vec<Value> = prefix.iter().map(|k| k.to_value()).collect();
            match lookup_key(&mut heap, &store, root, &values, ESC).unwrap() {
                Lookup::Prefix(reached) => assert_eq!(reached, *map),
                other => panic!("prefix {prefix:?} did not reach a keymap: {other:?}"),
            }
        }
    }
}

proptest! {
    #[test]
    fn reorder_modifiers_idempotent(
        perm in proptest::sample::subsequence(vec!["C-", "M-", "S-", "U-"], 0..=4),
        shuffled in any::<u64>(),
        base in "[a-z][a-z0-9]{0,6}",
    ) {
        // Assemble the prefixes in a pseudo-random order.
        let mut parts = perm.clone();
        if parts.len() > 1 {
            let rot = (shuffled as usize) % parts.len();
            parts.rotate_left(rot);
        }
        let name = format!("{}{}", parts.concat(), base);

        let mut heap = Heap::new();
        let sym = heap.intern(&name);
        let once = reorder_modifiers(&mut heap, sym);
        let twice = reorder_modifiers(&mut heap, once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn define_lookup_round_trip(
        seq in proptest::collection::vec(0u32..128, 1..6),
        def in 0i64..1_000_000,
    ) {
        let mut heap = Heap::new();
        let mut store = KeymapStore::new();
        let map = store.make_sparse();
        let values: Vec<Value> = seq.iter().map(|&c| Value::Int(c as i64)).collect();
        let def = Value::Int(def);

        // A fresh sparse map accepts any ASCII sequence.
        define_key(&mut heap, &mut store, map, &values, def, ESC).unwrap();
        prop_assert_eq!(
            lookup_key(&mut heap, &store, map, &values, ESC).unwrap(),
            Lookup::Binding(def)
        );
        // Every strict prefix reaches a keymap.
        for n in 1..values.len() {
            match lookup_key(&mut heap, &store, map, &values[..n], ESC).unwrap() {
                Lookup::Prefix(_) => {}
                other => prop_assert!(false, "prefix of len {} gave {:?}", n, other),
            }
        }
    }
}
