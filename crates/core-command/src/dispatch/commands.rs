//! Builtin commands and the default key bindings.

use crate::EditorContext;
use crate::dispatch::{self, execute_kbd_macro};
use crate::unwind::throw;
use core_events::EventKind;
use core_keymap::{EventKey, define_key, key_description, where_is};
use core_value::{EdError, Result, Value};
use std::sync::atomic::Ordering;
use tracing::info;

// -------------------------------------------------------------------------------------------------
// Prefix arguments
// -------------------------------------------------------------------------------------------------

/// Numeric value of a raw prefix argument: `nil` is 1, `(4)` is its car,
/// the `-` symbol is −1.
pub fn prefix_numeric_value(ctx: &EditorContext, raw: Value) -> i64 {
    match raw {
        Value::Nil => 1,
        Value::Int(n) => n,
        Value::Sym(s) if ctx.heap.symbol_name(s) == "-" => -1,
        Value::Cons(_) => ctx
            .heap
            .car(raw)
            .ok()
            .and_then(|car| car.as_int().ok())
            .unwrap_or(1),
        _ => 1,
    }
}

fn cmd_universal_argument(ctx: &mut EditorContext) -> Result<Value> {
    let next = match ctx.current_prefix_arg {
        Value::Cons(_) => prefix_numeric_value(ctx, ctx.current_prefix_arg) * 4,
        _ => 4,
    };
    ctx.prefix_arg = {
        let n = Value::Int(next);
        ctx.heap.cons(n, Value::Nil)
    };
    Ok(Value::Nil)
}

fn cmd_digit_argument(ctx: &mut EditorContext) -> Result<Value> {
    let Some(&EventKey::Code(code)) = ctx.this_command_keys.last() else {
        return Err(EdError::error("digit-argument needs a digit key"));
    };
    let digit = (code & 0x7f)
        .checked_sub('0' as u32)
        .filter(|d| *d <= 9)
        .ok_or_else(|| EdError::error("digit-argument needs a digit key"))? as i64;
    let accumulated = match ctx.current_prefix_arg {
        Value::Int(n) if n < 0 => n * 10 - digit,
        Value::Int(n) => n * 10 + digit,
        Value::Sym(s) if ctx.heap.symbol_name(s) == "-" => -digit,
        _ => digit,
    };
    ctx.prefix_arg = Value::Int(accumulated);
    Ok(Value::Nil)
}

fn cmd_negative_argument(ctx: &mut EditorContext) -> Result<Value> {
    ctx.prefix_arg = match ctx.current_prefix_arg {
        Value::Int(n) => Value::Int(-n),
        Value::Nil => Value::Sym(ctx.heap.intern("-")),
        _ => Value::Nil,
    };
    Ok(Value::Nil)
}

// -------------------------------------------------------------------------------------------------
// Motion and editing
// -------------------------------------------------------------------------------------------------

fn move_point(ctx: &mut EditorContext, delta: i64) {
    let buffer = ctx.buffer_mut();
    let target = (buffer.point as i64 + delta).clamp(1, buffer.max_pos() as i64);
    buffer.point = target as usize;
}

fn cmd_forward_char(ctx: &mut EditorContext) -> Result<Value> {
    let n = prefix_numeric_value(ctx, ctx.current_prefix_arg);
    move_point(ctx, n);
    Ok(Value::Nil)
}

fn cmd_backward_char(ctx: &mut EditorContext) -> Result<Value> {
    let n = prefix_numeric_value(ctx, ctx.current_prefix_arg);
    move_point(ctx, -n);
    Ok(Value::Nil)
}

fn move_lines(ctx: &mut EditorContext, delta: i64) {
    let buffer = ctx.buffer_mut();
    let (line, col) = buffer.line_col(buffer.point);
    let last = buffer.line_count() as i64 - 1;
    let target = (line as i64 + delta).clamp(0, last) as usize;
    let width = buffer
        .line_text(target)
        .map(|l| l.chars().count())
        .unwrap_or(0);
    buffer.point = buffer.line_start(target) + col.min(width);
}

fn cmd_next_line(ctx: &mut EditorContext) -> Result<Value> {
    let n = prefix_numeric_value(ctx, ctx.current_prefix_arg);
    move_lines(ctx, n);
    Ok(Value::Nil)
}

fn cmd_previous_line(ctx: &mut EditorContext) -> Result<Value> {
    let n = prefix_numeric_value(ctx, ctx.current_prefix_arg);
    move_lines(ctx, -n);
    Ok(Value::Nil)
}

fn cmd_beginning_of_line(ctx: &mut EditorContext) -> Result<Value> {
    let buffer = ctx.buffer_mut();
    let (line, _) = buffer.line_col(buffer.point);
    buffer.point = buffer.line_start(line);
    Ok(Value::Nil)
}

fn cmd_end_of_line(ctx: &mut EditorContext) -> Result<Value> {
    let buffer = ctx.buffer_mut();
    let (line, _) = buffer.line_col(buffer.point);
    let width = buffer
        .line_text(line)
        .map(|l| l.chars().count())
        .unwrap_or(0);
    buffer.point = buffer.line_start(line) + width;
    Ok(Value::Nil)
}

fn cmd_self_insert(ctx: &mut EditorContext) -> Result<Value> {
    let Some(&EventKey::Code(code)) = ctx.this_command_keys.last() else {
        return Err(EdError::error("self-insert-command needs a character key"));
    };
    let ch = char::from_u32(code & 0x7f)
        .ok_or_else(|| EdError::WrongRange(format!("character code {code}")))?;
    let count = prefix_numeric_value(ctx, ctx.current_prefix_arg).max(0) as usize;
    let text: String = std::iter::repeat(ch).take(count).collect();
    let point = ctx.buffer().point;
    ctx.buffer_mut().insert(point, &text)?;
    Ok(Value::Nil)
}

fn cmd_newline(ctx: &mut EditorContext) -> Result<Value> {
    let point = ctx.buffer().point;
    ctx.buffer_mut().insert(point, "\n")?;
    Ok(Value::Nil)
}

fn cmd_delete_backward_char(ctx: &mut EditorContext) -> Result<Value> {
    let n = prefix_numeric_value(ctx, ctx.current_prefix_arg).max(0) as usize;
    let buffer = ctx.buffer_mut();
    let end = buffer.point;
    let beg = end.saturating_sub(n).max(1);
    if beg < end {
        buffer.delete_region(beg, end)?;
    }
    Ok(Value::Nil)
}

fn cmd_undo(ctx: &mut EditorContext) -> Result<Value> {
    let count = prefix_numeric_value(ctx, ctx.current_prefix_arg).max(1) as usize;
    let buffer = ctx.buffer_mut();
    buffer.undo.undo_boundary();
    buffer.primitive_undo(count)?;
    ctx.message("Undo!");
    Ok(Value::Nil)
}

// -------------------------------------------------------------------------------------------------
// Control
// -------------------------------------------------------------------------------------------------

fn cmd_keyboard_quit(_ctx: &mut EditorContext) -> Result<Value> {
    Err(EdError::Quit)
}

fn cmd_recursive_edit(ctx: &mut EditorContext) -> Result<Value> {
    dispatch::recursive_edit(ctx)
}

fn cmd_exit_recursive_edit(ctx: &mut EditorContext) -> Result<Value> {
    if ctx.command_loop_level > 0 {
        return Err(throw(ctx.sym_exit, Value::Nil));
    }
    Err(EdError::error("No recursive edit is in progress"))
}

fn cmd_abort_recursive_edit(ctx: &mut EditorContext) -> Result<Value> {
    if ctx.command_loop_level > 0 {
        return Err(throw(ctx.sym_exit, Value::True));
    }
    Err(EdError::error("No recursive edit is in progress"))
}

fn cmd_top_level(ctx: &mut EditorContext) -> Result<Value> {
    Err(throw(ctx.sym_top_level, Value::Nil))
}

fn cmd_kill_emacs(ctx: &mut EditorContext) -> Result<Value> {
    let code = match ctx.current_prefix_arg {
        Value::Nil => 0,
        raw => prefix_numeric_value(ctx, raw),
    };
    ctx.exit_code = Some(code as i32);
    info!(target: "command.loop", code, "kill_emacs");
    Err(throw(ctx.sym_top_level, Value::Nil))
}

// -------------------------------------------------------------------------------------------------
// Keyboard macros
// -------------------------------------------------------------------------------------------------

fn cmd_start_kbd_macro(ctx: &mut EditorContext) -> Result<Value> {
    if ctx.defining_kbd_macro {
        return Err(EdError::error("Already defining kbd macro"));
    }
    ctx.kbd_macro.clear();
    ctx.kbd_macro_pending.clear();
    ctx.defining_kbd_macro = true;
    ctx.message("Defining kbd macro...");
    Ok(Value::Nil)
}

fn cmd_end_kbd_macro(ctx: &mut EditorContext) -> Result<Value> {
    if !ctx.defining_kbd_macro {
        return Err(EdError::error("Not defining kbd macro"));
    }
    ctx.defining_kbd_macro = false;
    // The keys that invoked this command are pending; they are not part
    // of the macro.
    ctx.kbd_macro_pending.clear();
    ctx.message("Keyboard macro defined");
    Ok(Value::Nil)
}

fn cmd_call_last_kbd_macro(ctx: &mut EditorContext) -> Result<Value> {
    if ctx.defining_kbd_macro {
        return Err(EdError::error(
            "Can't execute anonymous macro while defining one",
        ));
    }
    let keys = ctx.kbd_macro.clone();
    if keys.is_empty() {
        return Err(EdError::error("No kbd macro defined"));
    }
    let count = prefix_numeric_value(ctx, ctx.current_prefix_arg).max(0);
    for _ in 0..count {
        execute_kbd_macro(ctx, keys.clone())?;
    }
    Ok(Value::Nil)
}

// -------------------------------------------------------------------------------------------------
// Minibuffer-style line reading
// -------------------------------------------------------------------------------------------------

/// Read a line of characters with a prompt in the echo area. RET
/// finishes, DEL edits, the quit character quits; `None` when the input
/// source ends first.
fn read_line(ctx: &mut EditorContext, prompt: &str) -> Result<Option<String>> {
    let mut text = String::new();
    loop {
        ctx.message(&format!("{prompt}{text}"));
        let kboard = ctx.kboard.clone();
        let timeout = if ctx.interactive {
            None
        } else {
            Some(std::time::Duration::from_millis(200))
        };
        let event = {
            let backend = ctx.backend.as_mut();
            let mut poll = || backend.read_avail_input(false).unwrap_or_default();
            kboard.get_event(timeout, Some(&mut poll))
        };
        let Some(event) = event else {
            return Ok(None);
        };
        if event.kind != EventKind::Ascii {
            continue;
        }
        let quit = ctx.kboard.quit_char.load(Ordering::Relaxed);
        match event.code {
            0x0d => return Ok(Some(text)),
            0x7f => {
                text.pop();
            }
            code if code == quit => return Err(EdError::Quit),
            code => {
                if let Some(ch) = char::from_u32(code).filter(|c| !c.is_control()) {
                    text.push(ch);
                }
            }
        }
    }
}

fn cmd_execute_extended_command(ctx: &mut EditorContext) -> Result<Value> {
    let Some(name) = read_line(ctx, "M-x ")? else {
        return Ok(Value::Nil);
    };
    if name.is_empty() {
        return Ok(Value::Nil);
    }
    let sym = ctx.heap.intern(&name);
    if ctx.heap.symbol_function(sym).is_nil() {
        return Err(EdError::VoidFunction(name));
    }
    ctx.this_command = Value::Sym(sym);
    dispatch::command_execute(ctx, Value::Sym(sym))
}

fn cmd_where_is(ctx: &mut EditorContext) -> Result<Value> {
    let Some(name) = read_line(ctx, "Where is command: ")? else {
        return Ok(Value::Nil);
    };
    if name.is_empty() {
        return Ok(Value::Nil);
    }
    let sym = ctx.heap.intern(&name);
    let local = ctx.buffer().local_map;
    let hits = where_is(
        &mut ctx.heap,
        &ctx.keymaps,
        Value::Sym(sym),
        local,
        ctx.global_map,
        ctx.meta_prefix_char,
    )?;
    let message = match hits.first() {
        Some(keys) => format!("{} is on {}", name, key_description(&ctx.heap, keys)),
        None => format!("{} is not on any key", name),
    };
    ctx.message(&message);
    Ok(Value::Nil)
}

// -------------------------------------------------------------------------------------------------
// Registration and default bindings
// -------------------------------------------------------------------------------------------------

/// Register every builtin against its command symbol.
pub fn register_builtins(ctx: &mut EditorContext) {
    ctx.defsubr("forward-char", cmd_forward_char);
    ctx.defsubr("backward-char", cmd_backward_char);
    ctx.defsubr("next-line", cmd_next_line);
    ctx.defsubr("previous-line", cmd_previous_line);
    ctx.defsubr("beginning-of-line", cmd_beginning_of_line);
    ctx.defsubr("end-of-line", cmd_end_of_line);
    ctx.defsubr("self-insert-command", cmd_self_insert);
    ctx.defsubr("newline", cmd_newline);
    ctx.defsubr("delete-backward-char", cmd_delete_backward_char);
    ctx.defsubr("undo", cmd_undo);
    ctx.defsubr("keyboard-quit", cmd_keyboard_quit);
    ctx.defsubr("universal-argument", cmd_universal_argument);
    ctx.defsubr("digit-argument", cmd_digit_argument);
    ctx.defsubr("negative-argument", cmd_negative_argument);
    ctx.defsubr("recursive-edit", cmd_recursive_edit);
    ctx.defsubr("exit-recursive-edit", cmd_exit_recursive_edit);
    ctx.defsubr("abort-recursive-edit", cmd_abort_recursive_edit);
    ctx.defsubr("top-level", cmd_top_level);
    ctx.defsubr("kill-emacs", cmd_kill_emacs);
    ctx.defsubr("start-kbd-macro", cmd_start_kbd_macro);
    ctx.defsubr("end-kbd-macro", cmd_end_kbd_macro);
    ctx.defsubr("call-last-kbd-macro", cmd_call_last_kbd_macro);
    ctx.defsubr("execute-extended-command", cmd_execute_extended_command);
    ctx.defsubr("where-is", cmd_where_is);
}

fn bind(ctx: &mut EditorContext, keys: &[i64], name: &str) -> Result<()> {
    let sym = Value::Sym(ctx.heap.intern(name));
    let seq: Vec<Value> = keys.iter().map(|&c| Value::Int(c)).collect();
    define_key(
        &mut ctx.heap,
        &mut ctx.keymaps,
        ctx.global_map,
        &seq,
        sym,
        ctx.meta_prefix_char,
    )
}

fn bind_symbol_key(ctx: &mut EditorContext, key_name: &str, command: &str) -> Result<()> {
    let key = EventKey::Sym(ctx.heap.intern(key_name));
    let command = Value::Sym(ctx.heap.intern(command));
    ctx.keymaps.store(ctx.global_map, key, command)
}

/// The stock global map and function-key map.
pub fn install_default_bindings(ctx: &mut EditorContext) -> Result<()> {
    const ESC: i64 = 0x1b;
    const CTL_X: i64 = 0x18;

    let self_insert = Value::Sym(ctx.heap.intern("self-insert-command"));
    for code in 0x20..=0x7e {
        ctx.keymaps
            .store(ctx.global_map, EventKey::Code(code), self_insert)?;
    }

    bind(ctx, &[0x06], "forward-char")?; // C-f
    bind(ctx, &[0x02], "backward-char")?; // C-b
    bind(ctx, &[0x0e], "next-line")?; // C-n
    bind(ctx, &[0x10], "previous-line")?; // C-p
    bind(ctx, &[0x01], "beginning-of-line")?; // C-a
    bind(ctx, &[0x05], "end-of-line")?; // C-e
    bind(ctx, &[0x0d], "newline")?; // RET
    bind(ctx, &[0x7f], "delete-backward-char")?; // DEL
    bind(ctx, &[0x07], "keyboard-quit")?; // C-g
    bind(ctx, &[0x15], "universal-argument")?; // C-u
    bind(ctx, &[0x1f], "undo")?; // C-_
    bind(ctx, &[0x1d], "abort-recursive-edit")?; // C-]
    bind(ctx, &[CTL_X, 'u' as i64], "undo")?;
    bind(ctx, &[CTL_X, 0x03], "kill-emacs")?; // C-x C-c
    bind(ctx, &[CTL_X, '(' as i64], "start-kbd-macro")?;
    bind(ctx, &[CTL_X, ')' as i64], "end-kbd-macro")?;
    bind(ctx, &[CTL_X, 'e' as i64], "call-last-kbd-macro")?;
    bind(ctx, &[ESC, 'x' as i64], "execute-extended-command")?;
    bind(ctx, &[ESC, 'w' as i64], "where-is")?;
    for digit in '0'..='9' {
        bind(ctx, &[ESC, digit as i64], "digit-argument")?;
    }
    bind(ctx, &[ESC, '-' as i64], "negative-argument")?;

    bind_symbol_key(ctx, "left", "backward-char")?;
    bind_symbol_key(ctx, "right", "forward-char")?;
    bind_symbol_key(ctx, "up", "previous-line")?;
    bind_symbol_key(ctx, "down", "next-line")?;
    bind_symbol_key(ctx, "home", "beginning-of-line")?;
    bind_symbol_key(ctx, "end", "end-of-line")?;

    // ANSI and application-mode arrow sequences rewrite to the function
    // key symbols.
    for (suffix, name) in [('A', "up"), ('B', "down"), ('C', "right"), ('D', "left")] {
        let replacement = {
            let sym = Value::Sym(ctx.heap.intern(name));
            ctx.heap.vector_from(vec![sym])
        };
        for introducer in ['[', 'O'] {
            define_key(
                &mut ctx.heap,
                &mut ctx.keymaps,
                ctx.function_key_map,
                &[
                    Value::Int(ESC),
                    Value::Int(introducer as i64),
                    Value::Int(suffix as i64),
                ],
                replacement,
                ctx.meta_prefix_char,
            )?;
        }
    }
    Ok(())
}

/// Convenience: a fully wired context over `backend`.
pub fn standard_context(
    backend: Box<dyn core_terminal::TerminalBackend>,
    config: core_config::Config,
) -> Result<EditorContext> {
    let mut ctx = EditorContext::new(backend, config);
    register_builtins(&mut ctx);
    install_default_bindings(&mut ctx)?;
    Ok(ctx)
}
