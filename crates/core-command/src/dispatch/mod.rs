//! The command loop: read a sequence, execute its binding, repeat.
//!
//! Decomposed as the loop skeleton here and the builtin command set in
//! `commands`. The public surface is `command_loop`, `command_execute`,
//! and `recursive_edit`.

pub mod commands;

use crate::EditorContext;
use crate::reader::{ReadResult, read_key_sequence};
use crate::unwind::{UnwindRecord, catch, record_unwind, unbind_to};
use core_events::Event;
use core_frame::{
    FaceId, direct_output_cursor_move, direct_output_self_insert, echo_area_display, update_frame,
};
use core_keymap::EventKey;
use core_value::{EdError, Result, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Ran,
    EndOfInput,
}

// -------------------------------------------------------------------------------------------------
// Top level
// -------------------------------------------------------------------------------------------------

/// Run the top-level command loop until `kill-emacs` or the end of a
/// non-interactive input source. Returns the process exit code.
pub fn command_loop(ctx: &mut EditorContext) -> Result<i32> {
    info!(target: "command.loop", "command_loop_start");
    loop {
        let tag = ctx.sym_top_level;
        catch(ctx, tag, command_loop_2)?;
        if let Some(code) = ctx.exit_code {
            info!(target: "command.loop", code, "command_loop_exit");
            return Ok(code);
        }
        if !ctx.interactive && !ctx.kboard.readable_events() {
            // Input source exhausted.
            return Ok(0);
        }
        // A throw to top-level resumes reading.
    }
}

/// The error-handling loop: every reportable error lands here, is shown,
/// and the loop resumes reading.
fn command_loop_2(ctx: &mut EditorContext) -> Result<Value> {
    loop {
        if ctx.kboard.emergency_exit.swap(false, Ordering::SeqCst) {
            warn!(target: "command.loop", "emergency_exit");
            let _ = do_auto_save(ctx);
            ctx.exit_code = Some(1);
            return Ok(Value::Nil);
        }
        match command_loop_step(ctx) {
            Ok(Step::Ran) => {
                if ctx.exit_code.is_some() {
                    return Ok(Value::Nil);
                }
            }
            Ok(Step::EndOfInput) => return Ok(Value::Nil),
            Err(e) if e.is_reportable() => cmd_error(ctx, e),
            Err(throw) => return Err(throw),
        }
    }
}

/// Report an error in the echo area, bell, discard pending input, and
/// leave the loop ready to read again.
fn cmd_error(ctx: &mut EditorContext, error: EdError) {
    let text = error.to_string();
    debug!(target: "command.loop", error = %text, "command_error");
    ctx.kboard.quit_flag.store(false, Ordering::SeqCst);
    ctx.kboard.waiting_for_input.store(false, Ordering::SeqCst);
    ctx.echo.clear();
    ctx.discard_input();
    ctx.defining_kbd_macro = false;
    ctx.kbd_macro_pending.clear();
    ctx.prefix_arg = Value::Nil;
    ctx.bell();
    ctx.message(&text);
}

// -------------------------------------------------------------------------------------------------
// One iteration
// -------------------------------------------------------------------------------------------------

fn command_loop_step(ctx: &mut EditorContext) -> Result<Step> {
    // Commit executed keys to the macro being defined, unless a prefix
    // argument is still accumulating.
    if ctx.defining_kbd_macro && ctx.prefix_arg.is_nil() {
        let pending = std::mem::take(&mut ctx.kbd_macro_pending);
        ctx.kbd_macro.extend(pending);
    }

    // Keep the current buffer in step with the selected window.
    ctx.current_buffer = ctx.windows.get(ctx.selected_window()).buffer;

    if let Some(warning) = ctx.pending_warnings.pop() {
        ctx.message(&warning);
    }

    // With the minibuffer active and a message on display, give the user
    // a moment to read it; a quit typed during the pause becomes the next
    // input event instead of throwing.
    if ctx.windows.get(ctx.selected_window()).is_minibuffer && !ctx.echo.is_empty() {
        let depth = record_unwind(ctx, UnwindRecord::InhibitQuit(ctx.inhibit_quit));
        ctx.inhibit_quit = true;
        ctx.sit_for(Duration::from_secs(2));
        unbind_to(ctx, depth);
        if ctx.kboard.quit_flag.swap(false, Ordering::SeqCst) {
            let quit = ctx.kboard.quit_char.load(Ordering::Relaxed);
            ctx.unread_command_event =
                Some(Event::ascii(quit, None, ctx.kboard.timestamp_now()));
        }
    }

    let ReadResult { keys, binding } = read_key_sequence(ctx, None)?;
    if keys.is_empty() {
        return Ok(Step::EndOfInput);
    }
    ctx.echo.clear();

    if binding.is_nil() {
        ctx.bell();
        ctx.defining_kbd_macro = false;
        ctx.kbd_macro_pending.clear();
        ctx.prefix_arg = Value::Nil;
        redisplay(ctx)?;
        return Ok(Step::Ran);
    }

    ctx.this_command = binding;
    ctx.current_prefix_arg = ctx.prefix_arg;
    ctx.prefix_arg = Value::Nil;

    // Direct-output fast paths, recognized by symbol identity.
    if ctx.current_prefix_arg.is_nil() && !ctx.kboard.readable_events() {
        if let Value::Sym(sym) = binding {
            let handled = if sym == ctx.sym_forward_char {
                fast_cursor_move(ctx, 1)?
            } else if sym == ctx.sym_backward_char {
                fast_cursor_move(ctx, -1)?
            } else if sym == ctx.sym_self_insert {
                fast_self_insert(ctx)?
            } else {
                false
            };
            if handled {
                ctx.last_command = ctx.this_command;
                return Ok(Step::Ran);
            }
        }
    }

    // Each command gets its own undo unit unless a prefix argument tied
    // it to the previous one.
    if ctx.current_prefix_arg.is_nil() {
        ctx.buffer_mut().undo.undo_boundary();
    }

    command_execute(ctx, binding)?;
    ctx.check_quit()?;
    redisplay(ctx)?;

    if ctx.prefix_arg.is_nil() {
        ctx.last_command = ctx.this_command;
    }

    maybe_autosave_and_gc(ctx)?;
    Ok(Step::Ran)
}

// -------------------------------------------------------------------------------------------------
// Execution
// -------------------------------------------------------------------------------------------------

/// Execute a command binding: resolve symbol function slots, call subrs,
/// and interpret strings/vectors as keyboard macros.
pub fn command_execute(ctx: &mut EditorContext, command: Value) -> Result<Value> {
    let mut resolved = command;
    for _ in 0..8 {
        match resolved {
            Value::Sym(sym) => {
                let function = ctx.heap.symbol_function(sym);
                if function.is_nil() {
                    return Err(EdError::VoidFunction(
                        ctx.heap.symbol_name(sym).to_string(),
                    ));
                }
                resolved = function;
            }
            Value::Subr(id) => {
                let func = ctx.subrs[id.index()].func;
                trace!(target: "command.loop", subr = ctx.subrs[id.index()].name, "execute");
                return func(ctx);
            }
            Value::Str(id) => {
                let keys: Vec<EventKey> = ctx
                    .heap
                    .string(id)
                    .chars()
                    .map(|c| EventKey::Code(c as u32))
                    .collect();
                return execute_kbd_macro(ctx, keys);
            }
            Value::Vector(id) => {
                let items: Vec<Value> = ctx.heap.vector_items(id).to_vec();
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    keys.push(core_keymap::normalize_key(&mut ctx.heap, item)?);
                }
                return execute_kbd_macro(ctx, keys);
            }
            other => return Err(EdError::wrong_type("command", other)),
        }
    }
    Err(EdError::error("Function indirection too deep"))
}

/// Run `keys` as if typed, through the ordinary loop machinery.
pub fn execute_kbd_macro(ctx: &mut EditorContext, keys: Vec<EventKey>) -> Result<Value> {
    let previous = ctx.executing_macro.take();
    ctx.executing_macro = Some((keys, 0));
    let run = (|| loop {
        match command_loop_step(ctx)? {
            Step::EndOfInput => return Ok(Value::Nil),
            Step::Ran => {
                if ctx.exit_code.is_some() {
                    return Ok(Value::Nil);
                }
            }
        }
    })();
    ctx.executing_macro = previous;
    run
}

/// Enter a nested command loop. `exit-recursive-edit` leaves it normally;
/// `abort-recursive-edit` converts to a quit at this level.
pub fn recursive_edit(ctx: &mut EditorContext) -> Result<Value> {
    ctx.command_loop_level += 1;
    debug!(target: "command.loop", level = ctx.command_loop_level, "recursive_edit_enter");
    let tag = ctx.sym_exit;
    let result = catch(ctx, tag, command_loop_2);
    ctx.command_loop_level -= 1;
    debug!(target: "command.loop", level = ctx.command_loop_level, "recursive_edit_leave");
    match result {
        Ok(thrown) if thrown.is_truthy() => Err(EdError::Quit),
        Ok(_) => Ok(Value::Nil),
        Err(e) => Err(e),
    }
}

// -------------------------------------------------------------------------------------------------
// Fast paths
// -------------------------------------------------------------------------------------------------

fn window_cache_valid(ctx: &EditorContext) -> bool {
    let window = ctx.windows.get(ctx.selected_window());
    let buffer = ctx.buffer();
    window.last_modified == buffer.tick && window.last_point == buffer.point
}

fn refresh_window_cache(ctx: &mut EditorContext) {
    let window = ctx.selected_window();
    let (point, tick) = {
        let b = ctx.buffer();
        (b.point, b.tick)
    };
    let w = ctx.windows.get_mut(window);
    w.last_point = point;
    w.last_modified = tick;
}

/// `forward-char`/`backward-char` without full redisplay: move point and
/// reposition the device cursor.
fn fast_cursor_move(ctx: &mut EditorContext, delta: i64) -> Result<bool> {
    if !window_cache_valid(ctx) {
        return Ok(false);
    }
    let frame_id = ctx.selected_frame();
    let text_rows = ctx.frames.get(frame_id).height.saturating_sub(2);
    let width = ctx.frames.get(frame_id).width;
    let (new_point, row, col) = {
        let buffer = ctx.buffer();
        let target = buffer.point as i64 + delta;
        if target < 1 || target > buffer.max_pos() as i64 {
            return Ok(false);
        }
        let (row, col) = buffer.line_col(target as usize);
        (target as usize, row, col)
    };
    if row >= text_rows || col >= width {
        return Ok(false);
    }
    ctx.buffer_mut().point = new_point;
    direct_output_cursor_move(ctx.frames.get_mut(frame_id), ctx.backend.as_mut(), row, col)
        .map_err(|e| EdError::error(e.to_string()))?;
    refresh_window_cache(ctx);
    trace!(target: "command.loop", "fast_cursor_move");
    Ok(true)
}

/// `self-insert-command` without full redisplay for plain printable
/// characters that stay on the row.
fn fast_self_insert(ctx: &mut EditorContext) -> Result<bool> {
    if !window_cache_valid(ctx) {
        return Ok(false);
    }
    let Some(&EventKey::Code(code)) = ctx.this_command_keys.last() else {
        return Ok(false);
    };
    if !(0x20..=0x7e).contains(&code) {
        return Ok(false);
    }
    let ch = char::from_u32(code).unwrap_or(' ');

    let frame_id = ctx.selected_frame();
    let (point, row, col) = {
        let buffer = ctx.buffer();
        let (row, col) = buffer.line_col(buffer.point);
        (buffer.point, row, col)
    };
    let frame = ctx.frames.get(frame_id);
    if row >= frame.height.saturating_sub(2) || col + 1 >= frame.width {
        return Ok(false);
    }
    if frame.cursor != (row, col) {
        return Ok(false);
    }

    ctx.buffer_mut().insert(point, &ch.to_string())?;
    let wrote = direct_output_self_insert(
        ctx.frames.get_mut(frame_id),
        ctx.backend.as_mut(),
        ch,
    )
    .map_err(|e| EdError::error(e.to_string()))?;
    if !wrote {
        // Buffer already changed; fall back to a full frame.
        redisplay(ctx)?;
    }
    refresh_window_cache(ctx);
    trace!(target: "command.loop", "fast_self_insert");
    Ok(true)
}

// -------------------------------------------------------------------------------------------------
// Redisplay driver
// -------------------------------------------------------------------------------------------------

/// Rebuild the desired matrix of the selected frame (buffer text, mode
/// line, echo area), disable rows that already match the current matrix,
/// and push the result to the device.
pub fn redisplay(ctx: &mut EditorContext) -> Result<()> {
    let frame_id = ctx.selected_frame();
    let (height, width) = {
        let frame = ctx.frames.get(frame_id);
        (frame.height, frame.width)
    };
    let text_rows = height.saturating_sub(2);

    let (rows, mode_line, cursor) = {
        let buffer = ctx.buffer();
        let mut rows = Vec::with_capacity(text_rows);
        for n in 0..text_rows {
            let text: String = buffer
                .line_text(n)
                .unwrap_or("")
                .chars()
                .take(width)
                .collect();
            let bufp = if n < buffer.line_count() {
                buffer.line_start(n)
            } else {
                buffer.max_pos()
            };
            rows.push((text, bufp));
        }
        let flag = if buffer.modified { "**" } else { "--" };
        let mut mode_line = format!("--{flag}- {} ", buffer.name);
        while mode_line.chars().count() < width {
            mode_line.push('-');
        }
        let (line, col) = buffer.line_col(buffer.point);
        (rows, mode_line, (line, col))
    };
    let echo_text = ctx.echo.text().to_string();

    let frame = ctx.frames.get_mut(frame_id);
    for (n, (text, bufp)) in rows.iter().enumerate() {
        frame.desired.blank_row(n);
        if !text.is_empty() {
            frame.desired.write_str(n, 0, text, FaceId(0));
        }
        frame.desired.bufp[n] = *bufp;
    }
    if height >= 2 {
        let mode_row = height - 2;
        frame.desired.blank_row(mode_row);
        frame.desired.write_str(mode_row, 0, &mode_line, FaceId(0));
        frame.desired.highlight[mode_row] = true;
    }
    echo_area_display(frame, &echo_text);

    // A desired row that matches what the device already shows needs no
    // work; disabling it is what keeps updates cheap.
    for n in 0..frame.desired.height() {
        if !frame.desired.enable[n] {
            continue;
        }
        let matches_device = if frame.desired.used[n] == 0 {
            !frame.current.enable[n]
        } else {
            frame.current.enable[n]
                && frame.desired.highlight[n] == frame.current.highlight[n]
                && frame.desired.row_text(n) == frame.current.row_text(n)
        };
        if matches_device {
            frame.desired.enable[n] = false;
        }
    }

    frame.cursor = (
        cursor.0.min(text_rows.saturating_sub(1)),
        cursor.1.min(width.saturating_sub(1)),
    );
    update_frame(frame, ctx.backend.as_mut()).map_err(|e| EdError::error(e.to_string()))?;
    refresh_window_cache(ctx);
    Ok(())
}

// -------------------------------------------------------------------------------------------------
// Autosave & GC timing
// -------------------------------------------------------------------------------------------------

fn maybe_autosave_and_gc(ctx: &mut EditorContext) -> Result<()> {
    if ctx.kboard.readable_events() {
        return Ok(());
    }
    let since = ctx
        .num_nonmacro_input_chars
        .saturating_sub(ctx.last_auto_save);
    if since < ctx.config.autosave.interval {
        return Ok(());
    }
    // Idle requirement scales logarithmically with buffer size, floor 4.
    let size = ctx.buffer().len().max(2);
    let delay_level = ((size as f64).log2().ceil() as u64).max(4);
    if !ctx.sit_for(Duration::from_millis(delay_level * 10)) {
        return Ok(());
    }
    do_auto_save(ctx)?;
    ctx.last_auto_save = ctx.num_nonmacro_input_chars;

    if !ctx.kboard.readable_events() && ctx.heap.consing_since_gc > ctx.gc_cons_threshold / 2 {
        garbage_collect(ctx);
    }
    Ok(())
}

/// Write modified file-backed buffers to their `#name#` autosave files.
pub fn do_auto_save(ctx: &mut EditorContext) -> Result<()> {
    let mut saved = 0usize;
    for id in ctx.buffers.ids() {
        let buffer = ctx.buffers.get(id);
        if !buffer.modified || buffer.name.starts_with('*') {
            continue;
        }
        let path = format!("#{}#", buffer.name);
        match std::fs::write(&path, buffer.text()) {
            Ok(()) => saved += 1,
            Err(e) => warn!(target: "command.loop", buffer = %buffer.name, error = %e, "auto_save_failed"),
        }
    }
    if saved > 0 {
        info!(target: "command.loop", saved, "auto_save");
        ctx.message("Auto-saving...done");
    }
    Ok(())
}

/// The collector's visible job here: bound every buffer's undo list.
pub fn garbage_collect(ctx: &mut EditorContext) {
    let (soft, hard) = (ctx.config.undo.soft_limit, ctx.config.undo.hard_limit);
    for id in ctx.buffers.ids() {
        ctx.buffers.get_mut(id).undo.truncate(soft, hard);
    }
    debug!(target: "command.loop", consed = ctx.heap.consing_since_gc, "garbage_collect");
    ctx.heap.consing_since_gc = 0;
}
