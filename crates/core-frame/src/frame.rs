//! Frame objects, the frame store, and the frame-parameter surface.

use crate::{GlyphMatrix, Window, WindowStore};
use core_terminal::TerminalBackend;
use core_value::{BufferId, EdError, FrameId, Heap, Result, SymbolId, Value, WindowId};
use tracing::{debug, info};

/// Geometry frames start with; real sizes arrive with the first
/// `change_size` from the back-end.
const INITIAL_ROWS: usize = 10;
const INITIAL_COLS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Invisible,
    Iconified,
}

/// Where a frame's minibuffer lives: its own window, or borrowed from
/// another frame. A minibufferless frame must name a live surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Minibuffer {
    Own(WindowId),
    Surrogate(FrameId),
}

/// Display-back-end parameters every frame recognizes.
pub const FRAME_PARAM_NAMES: &[&str] = &[
    "name",
    "height",
    "width",
    "modeline",
    "minibuffer",
    "unsplittable",
    "left",
    "top",
    "border-width",
    "internal-border-width",
    "foreground-color",
    "background-color",
    "mouse-color",
    "cursor-color",
    "border-color",
    "icon-type",
    "font",
    "auto-raise",
    "auto-lower",
    "vertical-scroll-bar",
    "horizontal-scroll-bar",
];

#[derive(Debug)]
pub struct Frame {
    pub name: String,
    /// Geometry redisplay works against.
    pub width: usize,
    pub height: usize,
    /// Geometry last reported to the window manager; `change_size` with
    /// `pretend` leaves these alone.
    pub real_width: usize,
    pub real_height: usize,
    pub current: GlyphMatrix,
    pub desired: GlyphMatrix,
    pub cursor: (usize, usize),
    pub root_window: WindowId,
    pub selected_window: WindowId,
    pub minibuffer: Minibuffer,
    pub minibuffer_only: bool,
    /// Frame keystrokes typed here are delivered to; `None` means self.
    pub focus_redirect: Option<FrameId>,
    pub visibility: Visibility,
    pub params: Vec<(SymbolId, Value)>,
    /// Forces a full redraw on the next update.
    pub garbaged: bool,
    pub live: bool,
}

#[derive(Debug, Default)]
pub struct FrameStore {
    frames: Vec<Frame>,
    pub selected: Option<FrameId>,
    pub default_minibuffer_frame: Option<FrameId>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FrameId) -> &Frame {
        &self.frames[id.index()]
    }

    pub fn get_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id.index()]
    }

    pub fn live_frames(&self) -> Vec<FrameId> {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.live)
            .map(|(i, _)| FrameId(i as u32))
            .collect()
    }

    pub fn selected(&self) -> FrameId {
        self.selected.expect("no frame has been created")
    }

    /// Frame that keystrokes typed on `id` should be delivered to,
    /// following the focus redirect one hop.
    pub fn focus_target(&self, id: FrameId) -> FrameId {
        match self.get(id).focus_redirect {
            Some(target) if self.get(target).live => target,
            _ => id,
        }
    }

    /// Create a frame with a root window showing `buffer`, and its own
    /// minibuffer window when `mini_p` is set (a minibufferless frame
    /// must instead borrow via `make_frame_surrogate`).
    pub fn make_frame(
        &mut self,
        windows: &mut WindowStore,
        buffer: BufferId,
        name: &str,
        mini_p: bool,
    ) -> FrameId {
        let id = FrameId(self.frames.len() as u32);
        let text_rows = if mini_p {
            INITIAL_ROWS - 1
        } else {
            INITIAL_ROWS
        };
        let root_window = windows.add(Window {
            frame: id,
            buffer,
            left: 0,
            top: 0,
            width: INITIAL_COLS,
            height: text_rows,
            is_minibuffer: false,
            last_point: 0,
            last_modified: 0,
        });
        let minibuffer = if mini_p {
            Minibuffer::Own(windows.add(Window {
                frame: id,
                buffer,
                left: 0,
                top: text_rows,
                width: INITIAL_COLS,
                height: 1,
                is_minibuffer: true,
                last_point: 0,
                last_modified: 0,
            }))
        } else {
            let surrogate = self
                .default_minibuffer_frame
                .expect("first frame must own a minibuffer");
            Minibuffer::Surrogate(surrogate)
        };
        self.frames.push(Frame {
            name: name.to_string(),
            width: INITIAL_COLS,
            height: INITIAL_ROWS,
            real_width: INITIAL_COLS,
            real_height: INITIAL_ROWS,
            current: GlyphMatrix::new(INITIAL_ROWS, INITIAL_COLS),
            desired: GlyphMatrix::new(INITIAL_ROWS, INITIAL_COLS),
            cursor: (0, 0),
            root_window,
            selected_window: root_window,
            minibuffer,
            minibuffer_only: false,
            focus_redirect: None,
            visibility: Visibility::Invisible,
            params: Vec::new(),
            garbaged: false,
            live: true,
        });
        if self.selected.is_none() {
            self.selected = Some(id);
        }
        if mini_p && self.default_minibuffer_frame.is_none() {
            self.default_minibuffer_frame = Some(id);
        }
        info!(target: "frame", frame = id.0, name, mini_p, "make_frame");
        id
    }

    /// Resize the redisplay geometry; with `pretend`, the recorded
    /// window-manager extent stays untouched. Either way the matrices are
    /// reallocated and the frame needs a full redraw.
    pub fn change_size(&mut self, id: FrameId, rows: usize, cols: usize, pretend: bool) {
        let frame = self.get_mut(id);
        frame.width = cols;
        frame.height = rows;
        if !pretend {
            frame.real_width = cols;
            frame.real_height = rows;
        }
        frame.current.resize(rows, cols);
        frame.desired.resize(rows, cols);
        frame.garbaged = true;
        debug!(target: "frame", frame = id.0, rows, cols, pretend, "change_size");
    }

    /// Delete `id`, enforcing the liveness policies: the last frame and a
    /// frame serving as another's surrogate minibuffer are undeletable.
    pub fn delete_frame(&mut self, id: FrameId, backend: &mut dyn TerminalBackend) -> Result<()> {
        let live = self.live_frames();
        if live.len() <= 1 {
            return Err(EdError::error("Attempt to delete the only frame"));
        }
        for &other in &live {
            if other != id && self.get(other).minibuffer == Minibuffer::Surrogate(id) {
                return Err(EdError::error(
                    "Attempt to delete a surrogate minibuffer frame",
                ));
            }
        }
        self.get_mut(id).live = false;
        backend.destroy_window(id);

        if self.selected == Some(id) {
            let next = self
                .live_frames()
                .first()
                .copied()
                .expect("a live frame remains");
            self.selected = Some(next);
        }
        if self.default_minibuffer_frame == Some(id) {
            self.default_minibuffer_frame = Some(self.pick_default_minibuffer_frame()?);
        }
        info!(target: "frame", frame = id.0, "delete_frame");
        Ok(())
    }

    /// Choose a replacement default-minibuffer frame, preferring
    /// minibuffer-only frames. Running out means every remaining frame is
    /// minibufferless, which the surrogate invariant forbids.
    fn pick_default_minibuffer_frame(&self) -> Result<FrameId> {
        let live = self.live_frames();
        if let Some(&id) = live.iter().find(|&&f| self.get(f).minibuffer_only) {
            return Ok(id);
        }
        live.iter()
            .find(|&&f| matches!(self.get(f).minibuffer, Minibuffer::Own(_)))
            .copied()
            .ok_or_else(|| EdError::error("No frames with a minibuffer remain"))
    }

    pub fn make_visible(&mut self, id: FrameId, backend: &mut dyn TerminalBackend) {
        backend.make_frame_visible(id);
        let frame = self.get_mut(id);
        frame.visibility = Visibility::Visible;
        frame.garbaged = true;
    }

    pub fn make_invisible(&mut self, id: FrameId, backend: &mut dyn TerminalBackend) {
        backend.make_frame_invisible(id);
        self.get_mut(id).visibility = Visibility::Invisible;
    }

    pub fn iconify(&mut self, id: FrameId, backend: &mut dyn TerminalBackend) {
        backend.iconify_frame(id);
        self.get_mut(id).visibility = Visibility::Iconified;
    }

    pub fn redirect_focus(
        &mut self,
        id: FrameId,
        target: Option<FrameId>,
        backend: &mut dyn TerminalBackend,
    ) {
        self.get_mut(id).focus_redirect = target;
        backend.frame_rehighlight();
    }
}

/// Apply a parameter alist to a frame. `name` reaches the back-end title
/// hook; `height`/`width` resize; everything else recognized is recorded
/// on the frame's parameter alist for the back-end to read.
pub fn modify_frame_parameters(
    heap: &mut Heap,
    frames: &mut FrameStore,
    backend: &mut dyn TerminalBackend,
    id: FrameId,
    params: &[(SymbolId, Value)],
) -> Result<()> {
    for &(sym, value) in params {
        let key = heap.symbol_name(sym).to_string();
        match key.as_str() {
            "name" => {
                let name = match value {
                    Value::Str(s) => heap.string(s).to_string(),
                    other => return Err(EdError::wrong_type("string", other)),
                };
                backend
                    .set_title(&name)
                    .map_err(|e| EdError::error(e.to_string()))?;
                frames.get_mut(id).name = name;
            }
            "height" => {
                let rows = value.as_int()? as usize;
                let cols = frames.get(id).width;
                frames.change_size(id, rows, cols, false);
            }
            "width" => {
                let cols = value.as_int()? as usize;
                let rows = frames.get(id).height;
                frames.change_size(id, rows, cols, false);
            }
            _ => {
                if !FRAME_PARAM_NAMES.contains(&key.as_str()) {
                    debug!(target: "frame", param = %key, "unrecognized_frame_parameter");
                }
                let frame = frames.get_mut(id);
                if let Some(entry) = frame.params.iter_mut().find(|(k, _)| *k == sym) {
                    entry.1 = value;
                } else {
                    frame.params.push((sym, value));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_terminal::MemoryBackend;
    use pretty_assertions::assert_eq;

    fn setup() -> (FrameStore, WindowStore, MemoryBackend) {
        (FrameStore::new(), WindowStore::new(), MemoryBackend::new(80, 24))
    }

    #[test]
    fn make_frame_builds_windows_and_matrices() {
        let (mut frames, mut windows, _backend) = setup();
        let f = frames.make_frame(&mut windows, BufferId(0), "main", true);
        let frame = frames.get(f);
        assert_eq!(frame.current.height(), 10);
        assert_eq!(frame.desired.width(), 10);
        assert_eq!(frame.cursor, (0, 0));
        assert!(matches!(frame.minibuffer, Minibuffer::Own(_)));
        assert!(windows.get(frame.root_window).height < 10);
        assert_eq!(frames.default_minibuffer_frame, Some(f));
    }

    #[test]
    fn cannot_delete_only_frame() {
        let (mut frames, mut windows, mut backend) = setup();
        let f = frames.make_frame(&mut windows, BufferId(0), "main", true);
        let err = frames.delete_frame(f, &mut backend).unwrap_err();
        assert!(err.to_string().contains("only frame"));
    }

    #[test]
    fn cannot_delete_surrogate_minibuffer_frame() {
        let (mut frames, mut windows, mut backend) = setup();
        let owner = frames.make_frame(&mut windows, BufferId(0), "owner", true);
        let borrower = frames.make_frame(&mut windows, BufferId(0), "borrower", false);
        assert_eq!(
            frames.get(borrower).minibuffer,
            Minibuffer::Surrogate(owner)
        );
        let err = frames.delete_frame(owner, &mut backend).unwrap_err();
        assert!(err.to_string().contains("surrogate minibuffer"));
        // Deleting the borrower is fine.
        frames.delete_frame(borrower, &mut backend).unwrap();
        assert_eq!(frames.live_frames(), vec![owner]);
    }

    #[test]
    fn deleting_default_minibuffer_frame_picks_replacement() {
        let (mut frames, mut windows, mut backend) = setup();
        let first = frames.make_frame(&mut windows, BufferId(0), "a", true);
        let second = frames.make_frame(&mut windows, BufferId(0), "b", true);
        assert_eq!(frames.default_minibuffer_frame, Some(first));
        frames.delete_frame(first, &mut backend).unwrap();
        assert_eq!(frames.default_minibuffer_frame, Some(second));
        assert_eq!(frames.selected, Some(second));
    }

    #[test]
    fn pretend_resize_keeps_real_extent() {
        let (mut frames, mut windows, _backend) = setup();
        let f = frames.make_frame(&mut windows, BufferId(0), "main", true);
        frames.change_size(f, 24, 80, true);
        let frame = frames.get(f);
        assert_eq!((frame.height, frame.width), (24, 80));
        assert_eq!((frame.real_height, frame.real_width), (10, 10));
        assert!(frame.garbaged);
        assert_eq!(frame.current.height(), 24);
    }

    #[test]
    fn name_parameter_sets_backend_title() {
        let (mut frames, mut windows, mut backend) = setup();
        let f = frames.make_frame(&mut windows, BufferId(0), "main", true);
        let mut heap = Heap::new();
        let name_sym = heap.intern("name");
        let title = heap.make_string("scratch");
        modify_frame_parameters(&mut heap, &mut frames, &mut backend, f, &[(name_sym, title)])
            .unwrap();
        assert_eq!(frames.get(f).name, "scratch");
        assert!(
            backend
                .ops
                .iter()
                .any(|op| matches!(op, core_terminal::RecordedOp::Title(t) if t == "scratch"))
        );
    }
}
