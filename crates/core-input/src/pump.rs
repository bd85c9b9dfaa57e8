//! The dedicated producer thread feeding the event ring.
//!
//! Replaces an interrupt-driven reader: the pump blocks in the source's
//! own short poll, routes everything through `Kboard::deliver`, and acts
//! on the out-of-band deliveries (suspend) itself.

use crate::{Delivery, Kboard};
use anyhow::Result;
use core_events::Event;
use core_terminal::CrosstermBackend;
use core_terminal::TerminalBackend;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A raw-event source the pump can own on its own thread.
pub trait RawInputSource: Send + 'static {
    /// Wait up to `wait` for device events and return whatever arrived.
    fn read_events(&mut self, wait: Duration) -> Result<Vec<Event>>;

    /// React to the stop character (terminal sources suspend).
    fn suspend(&mut self) {}
}

/// Crossterm event reading is independent of the output side, so the
/// backend's input half doubles as a pump source.
impl RawInputSource for CrosstermBackend {
    fn read_events(&mut self, _wait: Duration) -> Result<Vec<Event>> {
        // The backend's expected-input read already waits a short poll
        // interval of its own, which sets the pump loop cadence.
        self.read_avail_input(true)
    }

    fn suspend(&mut self) {
        TerminalBackend::suspend(self);
    }
}

pub struct InputPump {
    handle: Option<JoinHandle<()>>,
    stop_tx: Sender<()>,
}

impl InputPump {
    /// Ask the thread to exit and wait for it.
    pub fn shutdown(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for InputPump {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the producer thread. It exits when `shutdown` is called (or the
/// pump is dropped) or when the source reports a hard error.
pub fn spawn_input_pump<S: RawInputSource>(mut source: S, kboard: Arc<Kboard>) -> InputPump {
    let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = bounded(1);
    let handle = std::thread::Builder::new()
        .name("input-pump".into())
        .spawn(move || {
            info!(target: "input.pump", "pump_started");
            loop {
                if stop_rx.try_recv().is_ok() {
                    break;
                }
                let events = match source.read_events(Duration::from_millis(50)) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(target: "input.pump", error = %e, "source_error");
                        break;
                    }
                };
                for event in events {
                    match kboard.deliver(event) {
                        Delivery::Stop => source.suspend(),
                        Delivery::Dropped => {
                            debug!(target: "input.pump", "event_dropped_queue_full");
                        }
                        Delivery::Enqueued | Delivery::Quit => {}
                    }
                }
            }
            info!(target: "input.pump", "pump_stopped");
        })
        .expect("spawning the input pump");
    InputPump {
        handle: Some(handle),
        stop_tx,
    }
}
