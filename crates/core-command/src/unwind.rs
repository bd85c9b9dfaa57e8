//! The dynamic unwind stack and catch/throw.
//!
//! Unwind records are typed restore operations pushed before a scoped
//! change and popped (applying the restore) on both normal and error
//! exits. Catch frames are an index into this stack plus a tag; `throw`
//! travels as an error variant until the matching catch converts it back
//! into a value.

use crate::EditorContext;
use core_value::{BufferId, EdError, Result, SymbolId, Value, WindowId};

/// One restore-on-unwind entry.
#[derive(Debug, Clone)]
pub enum UnwindRecord {
    InhibitQuit(bool),
    CurrentBuffer(BufferId),
    /// Selected window plus each window's buffer at save time.
    WindowConfig {
        selected: WindowId,
        buffers: Vec<(WindowId, BufferId)>,
    },
}

/// Push a record; returns the stack depth before the push, suitable for
/// `unbind_to`.
pub fn record_unwind(ctx: &mut EditorContext, record: UnwindRecord) -> usize {
    let depth = ctx.unwind_stack.len();
    ctx.unwind_stack.push(record);
    depth
}

/// Capture the current window configuration as an unwind record.
pub fn record_window_config(ctx: &mut EditorContext) -> usize {
    let selected = ctx.selected_window();
    let frame = ctx.selected_frame();
    let buffers = ctx
        .windows
        .on_frame(frame)
        .into_iter()
        .map(|w| (w, ctx.windows.get(w).buffer))
        .collect();
    record_unwind(ctx, UnwindRecord::WindowConfig { selected, buffers })
}

/// Pop and apply records down to `depth`.
pub fn unbind_to(ctx: &mut EditorContext, depth: usize) {
    while ctx.unwind_stack.len() > depth {
        match ctx.unwind_stack.pop().expect("depth checked") {
            UnwindRecord::InhibitQuit(prev) => ctx.inhibit_quit = prev,
            UnwindRecord::CurrentBuffer(prev) => ctx.current_buffer = prev,
            UnwindRecord::WindowConfig { selected, buffers } => {
                for (window, buffer) in buffers {
                    ctx.windows.get_mut(window).buffer = buffer;
                }
                let frame = ctx.selected_frame();
                ctx.frames.get_mut(frame).selected_window = selected;
            }
        }
    }
}

/// Construct the throw carrier for `tag`.
pub fn throw(tag: SymbolId, value: Value) -> EdError {
    EdError::Throw { tag, value }
}

/// Run `body` inside a catch frame for `tag`. A matching throw unwinds
/// the record stack to the frame and yields the thrown value; other
/// errors unwind and propagate.
pub fn catch(
    ctx: &mut EditorContext,
    tag: SymbolId,
    body: impl FnOnce(&mut EditorContext) -> Result<Value>,
) -> Result<Value> {
    let depth = ctx.unwind_stack.len();
    match body(ctx) {
        Err(EdError::Throw { tag: thrown, value }) if thrown == tag => {
            unbind_to(ctx, depth);
            Ok(value)
        }
        Err(other) => {
            unbind_to(ctx, depth);
            Err(other)
        }
        Ok(value) => {
            unbind_to(ctx, depth);
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;
    use core_terminal::MemoryBackend;

    fn ctx() -> EditorContext {
        EditorContext::new(Box::new(MemoryBackend::new(40, 10)), Config::default())
    }

    #[test]
    fn unbind_restores_in_reverse_order() {
        let mut ctx = ctx();
        ctx.inhibit_quit = false;
        let depth = record_unwind(&mut ctx, UnwindRecord::InhibitQuit(false));
        ctx.inhibit_quit = true;
        let current_buffer = ctx.current_buffer;
        record_unwind(&mut ctx, UnwindRecord::CurrentBuffer(current_buffer));
        unbind_to(&mut ctx, depth);
        assert!(!ctx.inhibit_quit);
        assert!(ctx.unwind_stack.is_empty());
    }

    #[test]
    fn catch_intercepts_matching_throw_only() {
        let mut ctx = ctx();
        let tag = ctx.heap.intern("exit");
        let other = ctx.heap.intern("top-level");

        let caught = catch(&mut ctx, tag, |_| Err(throw(tag, Value::True))).unwrap();
        assert_eq!(caught, Value::True);

        let passed = catch(&mut ctx, tag, |_| Err(throw(other, Value::Nil)));
        assert!(matches!(passed, Err(EdError::Throw { .. })));
    }

    #[test]
    fn catch_unwinds_records_on_throw() {
        let mut ctx = ctx();
        let tag = ctx.heap.intern("exit");
        ctx.inhibit_quit = false;
        let result = catch(&mut ctx, tag, |ctx| {
            record_unwind(ctx, UnwindRecord::InhibitQuit(ctx.inhibit_quit));
            ctx.inhibit_quit = true;
            Err(throw(tag, Value::Nil))
        });
        assert!(result.is_ok());
        assert!(!ctx.inhibit_quit, "unwind record must have been applied");
    }
}
