//! Ember entrypoint: CLI, logging, terminal setup, runtime wiring.

use anyhow::{Context as _, Result};
use clap::Parser;
use core_command::dispatch::redisplay;
use core_command::{EditorContext, command_loop, standard_context};
use core_frame::Minibuffer;
use core_input::{FileWatcher, WatchFlags, spawn_input_pump};
use core_keymap::EventKey;
use core_terminal::{CrosstermBackend, TerminalBackend};
use core_value::{print_value, Value};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "ember", version, about = "Ember editor core")]
struct Args {
    /// Optional path to open at startup (UTF-8 text). Without one a
    /// scratch buffer is shown.
    pub path: Option<PathBuf>,
    /// Configuration file path (overrides discovery of `ember.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            // Fatal startup errors go to stderr; the terminal may never
            // have entered raw mode.
            restore_terminal();
            eprintln!("ember: {e:#}");
            -1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let args = Args::parse();
    let _log_guard = configure_logging()?;
    install_panic_hook();
    info!(target: "runtime", "startup");

    let config = core_config::load_from(args.config.clone())?;

    let mut backend = CrosstermBackend::new();
    backend.set_title("Ember")?;
    let mut ctx = standard_context(Box::new(backend), config)
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .context("building the editor context")?;
    ctx.interactive = true;
    install_notify_binding(&mut ctx);

    let mut watcher = None;
    if let Some(path) = &args.path {
        visit_file(&mut ctx, path)?;
        if path.exists() {
            watcher = start_file_watch(&mut ctx, path);
        }
    }

    ctx.backend.enter().context("entering the terminal")?;
    let frame = ctx.selected_frame();
    let (cols, rows) = ctx.backend.size();
    ctx.frames.change_size(frame, rows as usize, cols as usize, false);
    resize_windows(&mut ctx);
    ctx.frames.make_visible(frame, ctx.backend.as_mut());
    redisplay(&mut ctx).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    // The dedicated producer: its own crossterm reader on its own thread.
    let pump = spawn_input_pump(CrosstermBackend::new(), ctx.kboard.clone());

    let code = command_loop(&mut ctx)
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .context("command loop");

    pump.shutdown();
    drop(watcher);
    if let Err(e) = ctx.backend.leave() {
        warn!(target: "runtime", error = %e, "terminal_restore_failed");
    }
    let code = code?;
    info!(target: "runtime", code, "shutdown");
    Ok(code)
}

// -------------------------------------------------------------------------------------------------
// Startup pieces
// -------------------------------------------------------------------------------------------------

fn configure_logging() -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::EnvFilter;

    let log_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ember");
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("ember: cannot create log dir {}: {e}", log_dir.display());
        return Ok(None);
    }
    let appender = tracing_appender::rolling::never(&log_dir, "ember.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

/// The terminal must come back even if we panic with raw mode on.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        error!(target: "runtime", %panic_info, "panic");
        default_hook(panic_info);
    }));
}

fn restore_terminal() {
    use crossterm::{cursor::Show, execute, terminal};
    let _ = execute!(
        std::io::stdout(),
        terminal::LeaveAlternateScreen,
        crossterm::event::DisableMouseCapture,
        Show
    );
    let _ = terminal::disable_raw_mode();
}

/// Read `path` into a fresh buffer and show it in the root window.
fn visit_file(ctx: &mut EditorContext, path: &Path) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let mut buffer = core_buffer::Buffer::with_text(&name, &text);
    if let Ok(meta) = std::fs::metadata(path) {
        if let Ok(mtime) = meta.modified().and_then(|t| {
            t.duration_since(UNIX_EPOCH)
                .map_err(|e| std::io::Error::other(e))
        }) {
            let secs = mtime.as_secs() as i64;
            buffer.modtime = Some((secs >> 16, secs & 0xffff));
        }
    }
    let id = ctx.buffers.add(buffer);
    let frame = ctx.selected_frame();
    let root = ctx.frames.get(frame).root_window;
    ctx.windows.get_mut(root).buffer = id;
    ctx.current_buffer = id;
    info!(target: "runtime", path = %path.display(), chars = text.chars().count(), "visit_file");
    Ok(())
}

/// Watch the visited file; changes arrive as `file-notify` events bound
/// below.
fn start_file_watch(ctx: &mut EditorContext, path: &Path) -> Option<FileWatcher> {
    match FileWatcher::new(ctx.kboard.clone()) {
        Ok(mut watcher) => match watcher.add_watch(path, WatchFlags::SEND_MOVED) {
            Ok(descriptor) => {
                info!(target: "runtime", descriptor, path = %path.display(), "file_watch_started");
                Some(watcher)
            }
            Err(e) => {
                warn!(target: "runtime", error = %e, "file_watch_failed");
                None
            }
        },
        Err(e) => {
            warn!(target: "runtime", error = %e, "file_watcher_unavailable");
            None
        }
    }
}

fn cmd_handle_file_notification(ctx: &mut EditorContext) -> core_value::Result<Value> {
    let detail = print_value(&ctx.heap, ctx.last_input_event);
    ctx.message(&format!("File changed on disk: {detail}"));
    Ok(Value::Nil)
}

fn install_notify_binding(ctx: &mut EditorContext) {
    let command = ctx.defsubr("handle-file-notification", cmd_handle_file_notification);
    let key = EventKey::Sym(ctx.heap.intern("file-notify"));
    if let Err(e) = ctx
        .keymaps
        .store(ctx.global_map, key, Value::Sym(command))
    {
        warn!(target: "runtime", error = %e, "notify_binding_failed");
    }
}

/// Fit the root and minibuffer windows to the frame after a resize.
fn resize_windows(ctx: &mut EditorContext) {
    let frame_id = ctx.selected_frame();
    let (width, height, root, minibuffer) = {
        let frame = ctx.frames.get(frame_id);
        (frame.width, frame.height, frame.root_window, frame.minibuffer)
    };
    let text_rows = height.saturating_sub(1);
    {
        let root = ctx.windows.get_mut(root);
        root.left = 0;
        root.top = 0;
        root.width = width;
        root.height = text_rows;
    }
    if let Minibuffer::Own(mini) = minibuffer {
        let mini = ctx.windows.get_mut(mini);
        mini.left = 0;
        mini.top = text_rows;
        mini.width = width;
        mini.height = 1;
    }
}
