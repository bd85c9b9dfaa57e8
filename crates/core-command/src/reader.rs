//! `read_key_sequence`: the multi-keymap prefix walk with function-key
//! translation, case fallback, and buffer-switch restart.

use crate::EditorContext;
use crate::unwind::{record_window_config, unbind_to};
use core_events::{
    Event, EventKind, WindowPart, function_key_index, make_click_list, make_movement_list,
    make_notify_list, make_scrollbar_list, modify_event_symbol, mouse_button_index,
};
use core_frame::{buffer_position, echo_area_display, update_frame, window_from_coordinates};
use core_keymap::{EventKey, Lookup, get_keyelt, lookup_key, single_key_description};
use core_value::{BufferId, Result, Value};
use std::time::Duration;
use tracing::{debug, trace};

/// Result of reading one key sequence: the keys and the binding they
/// resolved to (`Nil` when unbound or when the input source ended with
/// nothing read).
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub keys: Vec<EventKey>,
    pub binding: Value,
}

// -------------------------------------------------------------------------------------------------
// Event → key encoding
// -------------------------------------------------------------------------------------------------

/// Buffer an event was directed at: the window under a mouse event, or
/// the selected window of the frame the keystroke's focus redirects to.
fn event_buffer(ctx: &EditorContext, event: &Event) -> Option<BufferId> {
    let frame_id = ctx
        .frames
        .focus_target(event.frame.unwrap_or_else(|| ctx.selected_frame()));
    match event.kind {
        EventKind::MouseClick | EventKind::ScrollbarClick | EventKind::MouseMovement => {
            let frame = ctx.frames.get(frame_id);
            window_from_coordinates(&ctx.windows, frame_id, frame.width, event.x, event.y)
                .map(|(w, _)| ctx.windows.get(w).buffer)
        }
        EventKind::Ascii | EventKind::NonAscii => {
            let frame = ctx.frames.get(frame_id);
            Some(ctx.windows.get(frame.selected_window).buffer)
        }
        _ => None,
    }
}

/// Canonicalize a raw event into a lookup key, stashing the full lispy
/// form of non-character events in `last_input_event`.
pub fn encode_key(ctx: &mut EditorContext, event: &Event) -> Result<EventKey> {
    match event.kind {
        EventKind::Ascii => Ok(EventKey::Code(event.code)),
        EventKind::NonAscii => {
            let sym = match function_key_index(event.code) {
                Some(idx) => {
                    let name = core_events::FUNCTION_KEY_NAMES[idx].1;
                    modify_event_symbol(
                        &mut ctx.heap,
                        &mut ctx.caches.function_keys,
                        idx,
                        event.modifiers,
                        name,
                    )
                }
                None => {
                    let name = format!(
                        "{}keysym-{:x}",
                        event.modifiers.prefix(),
                        event.code
                    );
                    ctx.heap.intern(&name)
                }
            };
            Ok(EventKey::Sym(sym))
        }
        EventKind::MouseClick => {
            let name = core_events::mouse_button_name(event.code);
            let sym = match mouse_button_index(event.code) {
                Some(idx) => modify_event_symbol(
                    &mut ctx.heap,
                    &mut ctx.caches.mouse_buttons,
                    idx,
                    event.modifiers,
                    &name,
                ),
                None => {
                    let full = format!("{}{}", event.modifiers.prefix(), name);
                    ctx.heap.intern(&full)
                }
            };
            let (window, position) = resolve_position(ctx, event);
            ctx.last_input_event = make_click_list(
                &mut ctx.heap,
                sym,
                window,
                position,
                event.x,
                event.y,
                event.timestamp,
            );
            Ok(EventKey::Sym(sym))
        }
        EventKind::ScrollbarClick => {
            let part = event.part.unwrap_or(core_events::ScrollPart::Handle);
            let part_sym = ctx.heap.intern(part.symbol_name());
            let button = ctx
                .heap
                .intern(&core_events::mouse_button_name(event.code));
            let (window, _) = resolve_position(ctx, event);
            ctx.last_input_event = make_scrollbar_list(
                &mut ctx.heap,
                part,
                window,
                button,
                event.x as i64,
                event.y as i64,
                event.timestamp,
            );
            Ok(EventKey::Sym(part_sym))
        }
        EventKind::MouseMovement => {
            let sym = ctx.heap.intern("mouse-movement");
            let (window, position) = resolve_position(ctx, event);
            ctx.last_input_event = make_movement_list(
                &mut ctx.heap,
                window,
                position,
                event.x,
                event.y,
                event.timestamp,
            );
            Ok(EventKey::Sym(sym))
        }
        EventKind::FileNotify => {
            let sym = ctx.heap.intern("file-notify");
            if let Some(info) = &event.notify {
                ctx.last_input_event = make_notify_list(&mut ctx.heap, event.code, info);
            }
            Ok(EventKey::Sym(sym))
        }
        EventKind::NoEvent => Ok(EventKey::Code(0)),
    }
}

/// Window and buffer position under a positioned event. Text-area hits
/// get an integer buffer position; the mode line and separators get
/// their part symbol instead.
fn resolve_position(ctx: &mut EditorContext, event: &Event) -> (Value, Value) {
    let frame_id = event.frame.unwrap_or_else(|| ctx.selected_frame());
    let hit = {
        let frame = ctx.frames.get(frame_id);
        window_from_coordinates(&ctx.windows, frame_id, frame.width, event.x, event.y).map(
            |(window_id, part)| {
                let pos = buffer_position(frame, ctx.windows.get(window_id), event.x, event.y);
                (window_id, part, pos)
            },
        )
    };
    match hit {
        Some((window_id, part, pos)) => {
            let position = match part {
                WindowPart::Text => pos.map(|p| Value::Int(p as i64)).unwrap_or(Value::Nil),
                other => Value::Sym(ctx.heap.intern(other.symbol_name())),
            };
            (Value::Window(window_id), position)
        }
        None => (Value::Nil, Value::Nil),
    }
}

// -------------------------------------------------------------------------------------------------
// Event acquisition
// -------------------------------------------------------------------------------------------------

/// Pull the next key: an executing macro's next element, the unread
/// event, or a fresh device event (with help-character interception and
/// the mid-sequence echo policy). `None` means the input source ended.
fn next_key(ctx: &mut EditorContext, mid_sequence: bool) -> Result<Option<(EventKey, Option<BufferId>)>> {
    if let Some((keys, idx)) = &mut ctx.executing_macro {
        if *idx >= keys.len() {
            return Ok(None);
        }
        let key = keys[*idx];
        *idx += 1;
        ctx.num_input_keys += 1;
        return Ok(Some((key, None)));
    }

    loop {
        let event = if let Some(event) = ctx.unread_command_event.take() {
            event
        } else {
            match wait_for_event(ctx, mid_sequence) {
                Some(event) => event,
                None => return Ok(None),
            }
        };

        // Help character: show the help form, read the continuation.
        if event.kind == EventKind::Ascii
            && event.code == ctx.help_char
            && ctx.help_form.is_some()
        {
            show_help(ctx)?;
            continue;
        }

        ctx.num_input_keys += 1;
        ctx.num_nonmacro_input_chars += 1;
        let buffer = event_buffer(ctx, &event);
        let key = encode_key(ctx, &event)?;
        if ctx.defining_kbd_macro {
            ctx.kbd_macro_pending.push(key);
        }
        return Ok(Some((key, buffer)));
    }
}

/// Block for a device event. Mid-sequence, an idle stretch of
/// `echo.keystrokes` seconds starts echoing the pending keys first.
fn wait_for_event(ctx: &mut EditorContext, mid_sequence: bool) -> Option<Event> {
    let echo_delay = ctx.config.echo.keystrokes;
    let base_timeout = if ctx.interactive {
        None
    } else {
        Some(Duration::from_millis(200))
    };

    if mid_sequence && !ctx.echo.echoing && echo_delay > 0.0 {
        let idle = Duration::from_secs_f64(echo_delay);
        let idle = base_timeout.map_or(idle, |cap| idle.min(cap));
        let kboard = ctx.kboard.clone();
        let first = {
            let backend = ctx.backend.as_mut();
            let mut poll = || backend.read_avail_input(false).unwrap_or_default();
            kboard.get_event(Some(idle), Some(&mut poll))
        };
        if let Some(event) = first {
            return Some(event);
        }
        if base_timeout.is_some() {
            // Non-interactive source drained: end of input.
            return None;
        }
        // Idle past the threshold: begin echoing, then wait for real.
        ctx.echo.echoing = true;
        show_echo(ctx);
    }

    let kboard = ctx.kboard.clone();
    let backend = ctx.backend.as_mut();
    let mut poll = || backend.read_avail_input(false).unwrap_or_default();
    kboard.get_event(base_timeout, Some(&mut poll))
}

/// Paint the echo accumulator into the selected frame's echo area.
pub(crate) fn show_echo(ctx: &mut EditorContext) {
    let text = ctx.echo.text().to_string();
    let frame = ctx.selected_frame();
    echo_area_display(ctx.frames.get_mut(frame), &text);
    let _ = update_frame(ctx.frames.get_mut(frame), ctx.backend.as_mut());
}

/// Save the window configuration, show the help form in `*Help*`, wait
/// for a continuation key (SPC keeps reading), reinject anything else.
fn show_help(ctx: &mut EditorContext) -> Result<()> {
    let depth = record_window_config(ctx);
    let form = ctx.help_form.unwrap_or(Value::Nil);
    let text = core_value::print_value(&ctx.heap, form);
    let text = match form {
        Value::Str(s) => ctx.heap.string(s).to_string(),
        _ => text,
    };

    let help_buffer = ctx.buffers.get_or_create("*Help*");
    {
        let b = ctx.buffers.get_mut(help_buffer);
        if !b.is_empty() {
            let end = b.max_pos();
            b.delete_region(1, end)?;
        }
        b.insert(1, &text)?;
    }
    let window = ctx.selected_window();
    ctx.windows.get_mut(window).buffer = help_buffer;
    crate::dispatch::redisplay(ctx)?;

    loop {
        let Some(event) = wait_for_event(ctx, false) else {
            break;
        };
        if event.kind == EventKind::Ascii && event.code == b' ' as u32 {
            continue;
        }
        ctx.unread_command_event = Some(event);
        break;
    }
    unbind_to(ctx, depth);
    Ok(())
}

// -------------------------------------------------------------------------------------------------
// The reader proper
// -------------------------------------------------------------------------------------------------

/// Advance one map by one key. Integer keys with the meta bit walk the
/// two-step `meta_prefix_char` path. Returns the resolved definition.
fn follow_key(ctx: &mut EditorContext, map: core_value::KeymapId, key: EventKey) -> Result<Value> {
    match key {
        EventKey::Code(c) if c >= 0x80 && c < 0x100 => {
            let esc = ctx
                .keymaps
                .access(map, EventKey::Code(ctx.meta_prefix_char));
            let esc = get_keyelt(&mut ctx.heap, &ctx.keymaps, esc)?;
            match ctx.keymaps.as_keymap(&ctx.heap, esc) {
                Some(meta_map) => {
                    let binding = ctx.keymaps.access(meta_map, EventKey::Code(c & 0x7f));
                    get_keyelt(&mut ctx.heap, &ctx.keymaps, binding)
                }
                None => Ok(Value::Nil),
            }
        }
        key => {
            let binding = ctx.keymaps.access(map, key);
            get_keyelt(&mut ctx.heap, &ctx.keymaps, binding)
        }
    }
}

/// Elements of a vector or string binding in the function-key map,
/// normalized to keys.
fn translation_keys(ctx: &mut EditorContext, binding: Value) -> Result<Option<Vec<EventKey>>> {
    match binding {
        Value::Vector(id) => {
            let items: Vec<Value> = ctx.heap.vector_items(id).to_vec();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(core_keymap::normalize_key(&mut ctx.heap, item)?);
            }
            Ok(Some(out))
        }
        Value::Str(id) => {
            let chars: Vec<char> = ctx.heap.string(id).chars().collect();
            Ok(Some(
                chars.into_iter().map(|c| EventKey::Code(c as u32)).collect(),
            ))
        }
        _ => Ok(None),
    }
}

/// Read one complete key sequence. Returns the keys and the binding the
/// highest-priority active map resolves them to.
pub fn read_key_sequence(ctx: &mut EditorContext, prompt: Option<&str>) -> Result<ReadResult> {
    let echo_start = ctx.echo.len();
    if let Some(prompt) = prompt {
        ctx.message(prompt);
    }

    let mut keybuf: Vec<EventKey> = Vec::new();
    let mut mock_input = 0usize;
    let mut fkey_start = 0usize;
    let mut fkey_end = 0usize;

    'restart: loop {
        let maps = ctx.active_maps();
        let nmaps = maps.len();
        let mut submaps: Vec<Option<core_value::KeymapId>> =
            maps.iter().copied().map(Some).collect();
        let mut defs: Vec<Value> = vec![Value::Nil; nmaps];
        let mut t = 0usize;

        loop {
            let key = if t < mock_input {
                keybuf[t]
            } else {
                match next_key(ctx, t > 0)? {
                    None => {
                        keybuf.truncate(t);
                        debug!(target: "command.reader", read = t, "input_source_ended");
                        ctx.this_command_keys = keybuf.clone();
                        return Ok(ReadResult {
                            keys: keybuf,
                            binding: Value::Nil,
                        });
                    }
                    Some((key, event_buffer)) => {
                        if let Some(event_buffer) = event_buffer {
                            if t > 0 && ctx.last_event_buffer.is_some_and(|b| b != event_buffer) {
                                // Typed at a different buffer: drop the
                                // partial sequence and restart there.
                                ctx.last_event_buffer = Some(event_buffer);
                                keybuf.clear();
                                keybuf.push(key);
                                mock_input = 1;
                                fkey_start = 0;
                                fkey_end = 0;
                                ctx.echo.truncate(echo_start);
                                trace!(target: "command.reader", "buffer_switch_restart");
                                continue 'restart;
                            }
                            ctx.last_event_buffer = Some(event_buffer);
                        }
                        keybuf.truncate(t);
                        keybuf.push(key);
                        if ctx.echo.echoing {
                            let desc = single_key_description(&ctx.heap, key);
                            ctx.echo.echo_key(&desc);
                            ctx.echo.echo_dash();
                            show_echo(ctx);
                        }
                        key
                    }
                }
            };
            t += 1;

            for i in 0..nmaps {
                match submaps[i] {
                    Some(map) => {
                        let resolved = follow_key(ctx, map, key)?;
                        submaps[i] = ctx.keymaps.as_keymap(&ctx.heap, resolved);
                        defs[i] = resolved;
                    }
                    None => defs[i] = Value::Nil,
                }
            }
            let first_binding = defs
                .iter()
                .position(|d| !d.is_nil())
                .unwrap_or(nmaps);

            if first_binding < nmaps {
                if submaps[first_binding].is_none() {
                    // Non-prefix binding in the best map: done.
                    let binding = defs[first_binding];
                    ctx.this_command_keys = keybuf.clone();
                    trace!(target: "command.reader", keys = t, "sequence_resolved");
                    return Ok(ReadResult {
                        keys: keybuf,
                        binding,
                    });
                }
                // A prefix: keep reading.
                continue;
            }

            // Unbound in every active map: advance the function-key scan.
            let mut await_more = false;
            while fkey_end < t {
                fkey_end += 1;
                let slice: Vec<Value> = keybuf[fkey_start..fkey_end]
                    .iter()
                    .map(|k| k.to_value())
                    .collect();
                let looked = lookup_key(
                    &mut ctx.heap,
                    &ctx.keymaps,
                    ctx.function_key_map,
                    &slice,
                    ctx.meta_prefix_char,
                )?;
                match looked {
                    Lookup::Prefix(_) => {
                        if fkey_end == t {
                            await_more = true;
                        }
                    }
                    Lookup::Binding(binding) => {
                        if let Some(replacement) = translation_keys(ctx, binding)? {
                            // Splice the translation over the matched range.
                            let tail: Vec<EventKey> = keybuf[fkey_end..].to_vec();
                            keybuf.truncate(fkey_start);
                            keybuf.extend_from_slice(&replacement);
                            let new_end = keybuf.len();
                            keybuf.extend_from_slice(&tail);
                            mock_input = keybuf.len();
                            fkey_start = new_end;
                            fkey_end = new_end;
                            ctx.echo.truncate(echo_start);
                            trace!(target: "command.reader", "function_key_spliced");
                            continue 'restart;
                        }
                        fkey_start += 1;
                        fkey_end = fkey_start;
                    }
                    Lookup::Undefined(_) => {
                        fkey_start += 1;
                        fkey_end = fkey_start;
                    }
                }
            }
            if await_more {
                continue;
            }

            // Case fallback: an unbound uppercase character retries in
            // lower case.
            if let EventKey::Code(c) = keybuf[t - 1] {
                if c < 0x80 && (c as u8).is_ascii_uppercase() {
                    keybuf[t - 1] = EventKey::Code(c + 0x20);
                    mock_input = t;
                    fkey_start = 0;
                    fkey_end = 0;
                    trace!(target: "command.reader", "case_fallback");
                    continue 'restart;
                }
            }

            // Genuinely unbound.
            ctx.this_command_keys = keybuf.clone();
            return Ok(ReadResult {
                keys: keybuf,
                binding: Value::Nil,
            });
        }
    }
}
