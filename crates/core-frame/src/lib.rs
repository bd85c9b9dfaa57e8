//! core-frame: frames, glyph matrices, the window tree, and redisplay
//! reconciliation.
//!
//! A frame owns two glyph matrices: `current` mirrors what the device
//! shows, `desired` is what the next update should make it show.
//! Redisplay walks the desired rows whose `enable` flag is set, emits
//! them through the terminal back-end, and copies them into `current`.

mod face;
mod frame;
mod glyph;
mod redisplay;
mod window;

pub use face::{Face, FaceId, FaceTable};
pub use frame::{
    FRAME_PARAM_NAMES, Frame, FrameStore, Minibuffer, Visibility, modify_frame_parameters,
};
pub use glyph::{Glyph, GlyphMatrix, RowMetrics};
pub use redisplay::{
    direct_output_cursor_move, direct_output_self_insert, echo_area_display, update_frame,
};
pub use window::{Window, WindowStore, buffer_position, window_from_coordinates};
