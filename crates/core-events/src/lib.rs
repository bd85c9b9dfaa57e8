//! core-events: raw and canonical input event types shared by the queue,
//! the encoder, and the key-sequence reader.
//!
//! A raw `Event` is what the back-end hands the producer side of the input
//! queue. The canonical external form — an integer for plain keystrokes, a
//! parameterized list for everything else — is produced on the consumer
//! side by the encoder in this crate plus the window-resolution half that
//! lives with the frame code.

use core_value::{FrameId, Heap, SymbolId, Value};
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;

mod encode;
mod mods;

pub use encode::{
    EventSymbolCaches, FUNCTION_KEY_NAMES, NUM_MOUSE_BUTTONS, SymbolCache, function_key_index,
    modify_event_symbol, mouse_button_index, mouse_button_name,
};
pub use mods::Mods;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed atomic counters; inspected in tests and periodically logged by the
// runtime. Nothing here is load-bearing for correctness.
pub static EVENTS_ENQUEUED: AtomicU64 = AtomicU64::new(0);
pub static EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0); // producer overflow drops
pub static QUIT_REQUESTS: AtomicU64 = AtomicU64::new(0);
pub static MOUSE_MOVES_COALESCED: AtomicU64 = AtomicU64::new(0);

// -------------------------------------------------------------------------------------------------
// Raw events
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Queue slot holding nothing (also the post-consumption state).
    NoEvent,
    /// Plain character keystroke; `code` is the (possibly meta-bit-carrying)
    /// character code.
    Ascii,
    /// Function key or other non-character key; `code` indexes the keysym
    /// base-name table.
    NonAscii,
    /// Mouse button press or release; `code` is the zero-based button.
    MouseClick,
    /// Scroll-bar click; `part` says which portion of the bar was hit.
    ScrollbarClick,
    /// Pointer motion. Never queued; materialized from the coalescing slot.
    MouseMovement,
    /// File-watch notification; `notify` carries the payload.
    FileNotify,
}

/// Which portion of a scroll bar a click landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPart {
    AboveHandle,
    Handle,
    BelowHandle,
}

impl ScrollPart {
    pub fn symbol_name(self) -> &'static str {
        match self {
            ScrollPart::AboveHandle => "above-handle",
            ScrollPart::Handle => "handle",
            ScrollPart::BelowHandle => "below-handle",
        }
    }
}

/// Region of a window a set of frame coordinates falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPart {
    Text,
    ModeLine,
    VerticalLine,
}

impl WindowPart {
    pub fn symbol_name(self) -> &'static str {
        match self {
            WindowPart::Text => "text",
            WindowPart::ModeLine => "mode-line",
            WindowPart::VerticalLine => "vertical-line",
        }
    }
}

/// File-watch actions delivered to watch callbacks, in the closed §6 set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    Changed,
    ChangesDoneHint,
    Deleted,
    Created,
    AttributeChanged,
    PreUnmount,
    Unmounted,
    Moved,
}

impl NotifyAction {
    pub fn symbol_name(self) -> &'static str {
        match self {
            NotifyAction::Changed => "changed",
            NotifyAction::ChangesDoneHint => "changes-done-hint",
            NotifyAction::Deleted => "deleted",
            NotifyAction::Created => "created",
            NotifyAction::AttributeChanged => "attribute-changed",
            NotifyAction::PreUnmount => "pre-unmount",
            NotifyAction::Unmounted => "unmounted",
            NotifyAction::Moved => "moved",
        }
    }
}

/// Payload of a `FileNotify` event. `other` is present only for `Moved`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyInfo {
    pub action: NotifyAction,
    pub file: PathBuf,
    pub other: Option<PathBuf>,
}

/// A raw input event as produced by the back-end or the watch subsystem.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub code: u32,
    pub part: Option<ScrollPart>,
    pub frame: Option<FrameId>,
    pub modifiers: Mods,
    pub x: i32,
    pub y: i32,
    pub timestamp: u64,
    pub notify: Option<NotifyInfo>,
}

impl Event {
    pub fn no_event() -> Self {
        Event {
            kind: EventKind::NoEvent,
            code: 0,
            part: None,
            frame: None,
            modifiers: Mods::empty(),
            x: 0,
            y: 0,
            timestamp: 0,
            notify: None,
        }
    }

    pub fn ascii(code: u32, frame: Option<FrameId>, timestamp: u64) -> Self {
        Event {
            kind: EventKind::Ascii,
            code,
            frame,
            timestamp,
            ..Event::no_event()
        }
    }

    pub fn function_key(code: u32, mods: Mods, frame: Option<FrameId>, timestamp: u64) -> Self {
        Event {
            kind: EventKind::NonAscii,
            code,
            modifiers: mods,
            frame,
            timestamp,
            ..Event::no_event()
        }
    }

    pub fn mouse_click(
        button: u32,
        mods: Mods,
        frame: Option<FrameId>,
        x: i32,
        y: i32,
        timestamp: u64,
    ) -> Self {
        Event {
            kind: EventKind::MouseClick,
            code: button,
            modifiers: mods,
            frame,
            x,
            y,
            timestamp,
            ..Event::no_event()
        }
    }

    pub fn file_notify(descriptor: u32, info: NotifyInfo, timestamp: u64) -> Self {
        Event {
            kind: EventKind::FileNotify,
            code: descriptor,
            timestamp,
            notify: Some(info),
            ..Event::no_event()
        }
    }

    /// Button release, as opposed to press. Encoded in the `up` modifier bit.
    pub fn is_button_up(&self) -> bool {
        self.kind == EventKind::MouseClick && self.modifiers.contains(Mods::UP)
    }
}

// -------------------------------------------------------------------------------------------------
// Canonical list construction
// -------------------------------------------------------------------------------------------------

/// Build the canonical mouse-click form
/// `(BUTTON-SYMBOL WINDOW POSITION (X . Y) TIMESTAMP)`.
pub fn make_click_list(
    heap: &mut Heap,
    button: SymbolId,
    window: Value,
    position: Value,
    x: i32,
    y: i32,
    timestamp: u64,
) -> Value {
    let coords = heap.cons(Value::Int(x as i64), Value::Int(y as i64));
    heap.list(&[
        Value::Sym(button),
        window,
        position,
        coords,
        Value::Int(timestamp as i64),
    ])
}

/// Build the canonical scroll-bar form
/// `(PART-SYMBOL WINDOW BUTTON-SYMBOL (POS . LENGTH) TIMESTAMP)`.
pub fn make_scrollbar_list(
    heap: &mut Heap,
    part: ScrollPart,
    window: Value,
    button: SymbolId,
    pos: i64,
    length: i64,
    timestamp: u64,
) -> Value {
    let part_sym = heap.intern(part.symbol_name());
    let extent = heap.cons(Value::Int(pos), Value::Int(length));
    heap.list(&[
        Value::Sym(part_sym),
        window,
        Value::Sym(button),
        extent,
        Value::Int(timestamp as i64),
    ])
}

/// Build the canonical movement form
/// `(mouse-movement WINDOW POSITION (X . Y) TIMESTAMP)`.
pub fn make_movement_list(
    heap: &mut Heap,
    window: Value,
    position: Value,
    x: i32,
    y: i32,
    timestamp: u64,
) -> Value {
    let head = heap.intern("mouse-movement");
    let coords = heap.cons(Value::Int(x as i64), Value::Int(y as i64));
    heap.list(&[
        Value::Sym(head),
        window,
        position,
        coords,
        Value::Int(timestamp as i64),
    ])
}

/// Build the watch-callback form `(DESCRIPTOR ACTION FILE [FILE2])`.
pub fn make_notify_list(heap: &mut Heap, descriptor: u32, info: &NotifyInfo) -> Value {
    let action = heap.intern(info.action.symbol_name());
    let file = heap.make_string(&info.file.to_string_lossy());
    let mut items = vec![Value::Int(descriptor as i64), Value::Sym(action), file];
    if let Some(other) = &info.other {
        let other = heap.make_string(&other.to_string_lossy());
        items.push(other);
    }
    heap.list(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_value::print_value;
    use pretty_assertions::assert_eq;

    #[test]
    fn button_up_detection() {
        let mut ev = Event::mouse_click(0, Mods::empty(), None, 4, 5, 7);
        assert!(!ev.is_button_up());
        ev.modifiers |= Mods::UP;
        assert!(ev.is_button_up());
    }

    #[test]
    fn click_list_shape() {
        let mut h = Heap::new();
        let button = h.intern("mouse-1");
        let list = make_click_list(&mut h, button, Value::Nil, Value::Int(12), 3, 9, 1000);
        assert_eq!(print_value(&h, list), "(mouse-1 nil 12 (3 . 9) 1000)");
    }

    #[test]
    fn notify_list_includes_second_file_only_for_moves() {
        let mut h = Heap::new();
        let plain = NotifyInfo {
            action: NotifyAction::Changed,
            file: PathBuf::from("/tmp/a"),
            other: None,
        };
        let l = make_notify_list(&mut h, 4, &plain);
        assert_eq!(h.list_len(l).unwrap(), 3);

        let moved = NotifyInfo {
            action: NotifyAction::Moved,
            file: PathBuf::from("/tmp/a"),
            other: Some(PathBuf::from("/tmp/b")),
        };
        let l = make_notify_list(&mut h, 4, &moved);
        assert_eq!(h.list_len(l).unwrap(), 4);
    }
}
