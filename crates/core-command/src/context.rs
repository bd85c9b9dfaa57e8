//! The editor context: stores, interpreter globals, and the subr
//! registry.

use crate::echo::EchoState;
use crate::unwind::UnwindRecord;
use core_buffer::BufferStore;
use core_config::Config;
use core_events::{Event, EventSymbolCaches};
use core_frame::{
    FaceTable, FrameStore, Minibuffer, WindowStore, echo_area_display, update_frame,
};
use core_input::Kboard;
use core_keymap::{EventKey, KeymapStore};
use core_terminal::TerminalBackend;
use core_value::{
    BufferId, EdError, FrameId, Heap, KeymapId, Result, SubrId, SymbolId, Value, WindowId,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::debug;

pub type CommandFn = fn(&mut EditorContext) -> Result<Value>;

/// A builtin command: name plus function pointer. Identity (the `SubrId`)
/// is what the fast paths compare.
pub struct Subr {
    pub name: &'static str,
    pub func: CommandFn,
}

/// Keymaps contributed ahead of the buffer-local map, highest priority
/// first (minor modes hang their maps off this hook).
pub type MinorMapProvider = fn(&EditorContext) -> Vec<KeymapId>;

pub struct EditorContext {
    pub heap: Heap,
    pub keymaps: KeymapStore,
    pub frames: FrameStore,
    pub windows: WindowStore,
    pub buffers: BufferStore,
    pub faces: FaceTable,
    pub kboard: Arc<Kboard>,
    pub backend: Box<dyn TerminalBackend>,
    pub caches: EventSymbolCaches,
    pub config: Config,

    // keymap globals
    pub global_map: KeymapId,
    pub function_key_map: KeymapId,
    pub meta_prefix_char: u32,
    pub minor_map_providers: Vec<MinorMapProvider>,

    // interpreter globals
    pub current_buffer: BufferId,
    pub last_command: Value,
    pub this_command: Value,
    pub prefix_arg: Value,
    pub current_prefix_arg: Value,
    pub command_loop_level: u32,
    pub inhibit_quit: bool,
    pub num_input_keys: u64,
    pub num_nonmacro_input_chars: u64,
    pub last_auto_save: u64,
    pub unread_command_event: Option<Event>,
    pub this_command_keys: Vec<EventKey>,
    /// Buffer the last event was typed over; a change restarts the
    /// key-sequence reader.
    pub last_event_buffer: Option<BufferId>,
    /// Canonical form of the last non-character event, for commands that
    /// inspect click positions.
    pub last_input_event: Value,

    // keyboard macros
    pub defining_kbd_macro: bool,
    pub kbd_macro: Vec<EventKey>,
    pub kbd_macro_pending: Vec<EventKey>,
    pub executing_macro: Option<(Vec<EventKey>, usize)>,

    // echo & help
    pub echo: EchoState,
    pub help_char: u32,
    pub help_form: Option<Value>,

    // gc
    pub gc_cons_threshold: u64,

    // unwind/catch machinery
    pub unwind_stack: Vec<UnwindRecord>,

    pub subrs: Vec<Subr>,
    pub pending_warnings: Vec<String>,
    pub exit_code: Option<i32>,
    /// True when a pump thread keeps the ring fed and reads may block
    /// forever; false (tests, batch) treats a drained source as EOF.
    pub interactive: bool,

    // interned symbols the loop compares by identity
    pub sym_forward_char: SymbolId,
    pub sym_backward_char: SymbolId,
    pub sym_self_insert: SymbolId,
    pub sym_exit: SymbolId,
    pub sym_top_level: SymbolId,
}

impl EditorContext {
    /// Assemble a context over the given back-end. Creates the initial
    /// frame (with minibuffer) showing a scratch buffer.
    pub fn new(backend: Box<dyn TerminalBackend>, config: Config) -> Self {
        let mut heap = Heap::new();
        let mut keymaps = KeymapStore::new();
        let mut frames = FrameStore::new();
        let mut windows = WindowStore::new();
        let mut buffers = BufferStore::new();

        let scratch = buffers.add(core_buffer::Buffer::new("*scratch*"));
        let frame = frames.make_frame(&mut windows, scratch, "ember", true);
        let (cols, rows) = backend.size();
        let (cols, rows) = (cols as usize, rows as usize);
        frames.change_size(frame, rows, cols, false);
        {
            // Fit the window tree to the real geometry.
            let (root, minibuffer) = {
                let f = frames.get(frame);
                (f.root_window, f.minibuffer)
            };
            let text_rows = rows.saturating_sub(1);
            let w = windows.get_mut(root);
            w.width = cols;
            w.height = text_rows;
            if let Minibuffer::Own(mini) = minibuffer {
                let m = windows.get_mut(mini);
                m.top = text_rows;
                m.width = cols;
                m.height = 1;
            }
        }

        let kboard = Arc::new(Kboard::new(backend.capabilities().queue_capacity()));
        kboard
            .quit_char
            .store(config.input.quit_char, Ordering::Relaxed);
        kboard
            .meta_key
            .store(config.input.meta_sends_escape, Ordering::Relaxed);

        let global_map = keymaps.make_dense();
        let function_key_map = keymaps.make_sparse();

        let sym_forward_char = heap.intern("forward-char");
        let sym_backward_char = heap.intern("backward-char");
        let sym_self_insert = heap.intern("self-insert-command");
        let sym_exit = heap.intern("exit");
        let sym_top_level = heap.intern("top-level");

        EditorContext {
            heap,
            keymaps,
            frames,
            windows,
            buffers,
            faces: FaceTable::new(),
            kboard,
            backend,
            caches: EventSymbolCaches::new(),
            config,
            global_map,
            function_key_map,
            meta_prefix_char: 0x1b,
            minor_map_providers: Vec::new(),
            current_buffer: scratch,
            last_command: Value::Nil,
            this_command: Value::Nil,
            prefix_arg: Value::Nil,
            current_prefix_arg: Value::Nil,
            command_loop_level: 0,
            inhibit_quit: false,
            num_input_keys: 0,
            num_nonmacro_input_chars: 0,
            last_auto_save: 0,
            unread_command_event: None,
            this_command_keys: Vec::new(),
            last_event_buffer: None,
            last_input_event: Value::Nil,
            defining_kbd_macro: false,
            kbd_macro: Vec::new(),
            kbd_macro_pending: Vec::new(),
            executing_macro: None,
            echo: EchoState::new(),
            help_char: 0x08, // C-h
            help_form: None,
            gc_cons_threshold: 100_000,
            unwind_stack: Vec::new(),
            subrs: Vec::new(),
            pending_warnings: Vec::new(),
            exit_code: None,
            interactive: false,
            sym_forward_char,
            sym_backward_char,
            sym_self_insert,
            sym_exit,
            sym_top_level,
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Subrs
    // ---------------------------------------------------------------------------------------------

    /// Register a builtin and bind it to the symbol of the same name.
    pub fn defsubr(&mut self, name: &'static str, func: CommandFn) -> SymbolId {
        let id = SubrId(self.subrs.len() as u32);
        self.subrs.push(Subr { name, func });
        let sym = self.heap.intern(name);
        self.heap.set_symbol_function(sym, Value::Subr(id));
        sym
    }

    // ---------------------------------------------------------------------------------------------
    // Selection helpers
    // ---------------------------------------------------------------------------------------------

    pub fn selected_frame(&self) -> FrameId {
        self.frames.selected()
    }

    pub fn selected_window(&self) -> WindowId {
        self.frames.get(self.selected_frame()).selected_window
    }

    pub fn buffer(&self) -> &core_buffer::Buffer {
        self.buffers.get(self.current_buffer)
    }

    pub fn buffer_mut(&mut self) -> &mut core_buffer::Buffer {
        self.buffers.get_mut(self.current_buffer)
    }

    /// The keymaps active for lookup, highest priority first: minor-mode
    /// maps, the local map of the buffer the last event was typed over,
    /// then the global map.
    pub fn active_maps(&self) -> Vec<KeymapId> {
        let mut maps = Vec::new();
        for provider in &self.minor_map_providers {
            maps.extend(provider(self));
        }
        let local_buffer = self.last_event_buffer.unwrap_or(self.current_buffer);
        if let Some(local) = self.buffers.get(local_buffer).local_map {
            maps.push(local);
        }
        maps.push(self.global_map);
        maps
    }

    // ---------------------------------------------------------------------------------------------
    // Quit
    // ---------------------------------------------------------------------------------------------

    /// The cooperative QUIT check: observes a pending quit unless quits
    /// are inhibited, in which case the flag stays set for later.
    pub fn check_quit(&mut self) -> Result<()> {
        if self.inhibit_quit {
            return Ok(());
        }
        if self.kboard.quit_flag.swap(false, Ordering::SeqCst) {
            return Err(EdError::Quit);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------------------
    // Display
    // ---------------------------------------------------------------------------------------------

    /// Show `msg` in the echo area now.
    pub fn message(&mut self, msg: &str) {
        let frame = self.selected_frame();
        echo_area_display(self.frames.get_mut(frame), msg);
        if let Err(e) = update_frame(self.frames.get_mut(frame), self.backend.as_mut()) {
            debug!(target: "command.loop", error = %e, "message_display_failed");
        }
    }

    pub fn bell(&mut self) {
        self.backend.ring_bell();
    }

    /// Wait `duration` or until input becomes available; true when the
    /// wait ran its course undisturbed.
    pub fn sit_for(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.kboard.readable_events() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            self.kboard.ring.wait(Some(deadline - now));
        }
    }

    /// Throw pending input away (error recovery path).
    pub fn discard_input(&mut self) {
        while self.kboard.ring.dequeue().is_some() {}
        self.unread_command_event = None;
    }
}
