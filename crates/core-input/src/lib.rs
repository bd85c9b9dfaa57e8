//! core-input: the circular event queue, its producer/consumer
//! discipline, the input pump thread, and the file-watch subsystem.
//!
//! The queue is the only state shared with an asynchronous flow of
//! control. The producer (pump thread, or a back-end poll on the consumer
//! thread) writes at `store_ptr`; the consumer reads at `fetch_ptr`; the
//! quit character never enters the queue at all.

mod kboard;
mod pump;
mod ring;
mod watch;

pub use kboard::{Delivery, Kboard};
pub use pump::{InputPump, RawInputSource, spawn_input_pump};
pub use ring::EventRing;
pub use watch::{FileWatcher, WatchFlags};
