//! core-command: the key-sequence reader and the command loop.
//!
//! `EditorContext` bundles every store the interpreter's globals used to
//! be: the heap, keymaps, frames, windows, buffers, the keyboard state,
//! and the back-end. The reader walks the active keymaps over incoming
//! events; the loop executes what it finds, records undo boundaries, and
//! keeps autosave/GC timing.

pub mod context;
pub mod dispatch;
pub mod echo;
pub mod reader;
pub mod unwind;

pub use context::{EditorContext, Subr};
pub use dispatch::commands::{install_default_bindings, register_builtins, standard_context};
pub use dispatch::{command_execute, command_loop, recursive_edit};
pub use reader::read_key_sequence;
pub use unwind::{UnwindRecord, catch, throw};
