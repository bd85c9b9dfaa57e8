//! Reader scenarios: prefix walks, meta folding, case fallback, and
//! function-key splicing.

use core_command::{EditorContext, read_key_sequence, register_builtins, standard_context};
use core_config::Config;
use core_events::Event;
use core_keymap::{EventKey, define_key, keyseq_from_str};
use core_terminal::MemoryBackend;
use core_value::Value;
use pretty_assertions::assert_eq;

fn bare_ctx() -> EditorContext {
    let mut ctx = EditorContext::new(Box::new(MemoryBackend::new(40, 10)), Config::default());
    register_builtins(&mut ctx);
    ctx
}

fn full_ctx() -> EditorContext {
    standard_context(Box::new(MemoryBackend::new(40, 10)), Config::default()).unwrap()
}

fn feed(ctx: &EditorContext, codes: &[u32]) {
    for &code in codes {
        ctx.kboard.deliver(Event::ascii(code, None, 0));
    }
}

#[test]
fn prefix_key_then_key_resolves_binding() {
    let mut ctx = bare_ctx();
    let foo = Value::Sym(ctx.heap.intern("foo"));
    let seq = keyseq_from_str("\x18f");
    define_key(
        &mut ctx.heap,
        &mut ctx.keymaps,
        ctx.global_map,
        &seq,
        foo,
        ctx.meta_prefix_char,
    )
    .unwrap();

    feed(&ctx, &[0x18, 'f' as u32]);
    let result = read_key_sequence(&mut ctx, None).unwrap();
    assert_eq!(result.binding, foo);
    assert_eq!(
        result.keys,
        vec![EventKey::Code(0x18), EventKey::Code('f' as u32)]
    );
    assert_eq!(ctx.this_command_keys, result.keys);
}

#[test]
fn meta_bit_and_prefix_char_resolve_identically() {
    let mut ctx = full_ctx();
    let expected = Value::Sym(ctx.heap.intern("execute-extended-command"));

    feed(&ctx, &[0x1b, 'x' as u32]);
    let two_step = read_key_sequence(&mut ctx, None).unwrap();
    assert_eq!(two_step.binding, expected);

    feed(&ctx, &['x' as u32 | 0x80]);
    let fused = read_key_sequence(&mut ctx, None).unwrap();
    assert_eq!(fused.binding, expected);
    assert_eq!(fused.keys, vec![EventKey::Code('x' as u32 | 0x80)]);
}

#[test]
fn unbound_upper_case_falls_back_to_lower() {
    let mut ctx = bare_ctx();
    let cmd_a = Value::Sym(ctx.heap.intern("cmd-a"));
    ctx.keymaps
        .store(ctx.global_map, EventKey::Code('a' as u32), cmd_a)
        .unwrap();

    feed(&ctx, &['A' as u32]);
    let result = read_key_sequence(&mut ctx, None).unwrap();
    assert_eq!(result.binding, cmd_a);
    assert_eq!(result.keys, vec![EventKey::Code('a' as u32)]);

    // A real binding for the upper-case key takes precedence.
    let cmd_shift_a = Value::Sym(ctx.heap.intern("cmd-A"));
    ctx.keymaps
        .store(ctx.global_map, EventKey::Code('A' as u32), cmd_shift_a)
        .unwrap();
    feed(&ctx, &['A' as u32]);
    let result = read_key_sequence(&mut ctx, None).unwrap();
    assert_eq!(result.binding, cmd_shift_a);
    assert_eq!(result.keys, vec![EventKey::Code('A' as u32)]);
}

#[test]
fn escape_sequence_splices_to_function_key() {
    let mut ctx = full_ctx();
    let expected = Value::Sym(ctx.heap.intern("previous-line"));
    let up = ctx.heap.intern("up");

    feed(&ctx, &[0x1b, '[' as u32, 'A' as u32]);
    let result = read_key_sequence(&mut ctx, None).unwrap();
    assert_eq!(result.keys, vec![EventKey::Sym(up)]);
    assert_eq!(result.binding, expected);
}

#[test]
fn wholly_unbound_sequence_returns_nil() {
    let mut ctx = bare_ctx();
    feed(&ctx, &[0x01]);
    let result = read_key_sequence(&mut ctx, None).unwrap();
    assert_eq!(result.binding, Value::Nil);
    assert_eq!(result.keys, vec![EventKey::Code(0x01)]);
}

#[test]
fn end_of_source_reads_zero_keys() {
    let mut ctx = bare_ctx();
    let result = read_key_sequence(&mut ctx, None).unwrap();
    assert!(result.keys.is_empty());
    assert_eq!(result.binding, Value::Nil);
}
