//! Keyboard state shared between the producer and consumer sides: the
//! ring, the quit flag, and the single-slot mouse-motion cell.

use crate::EventRing;
use core_events::{Event, EventKind, MOUSE_MOVES_COALESCED, QUIT_REQUESTS};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// What the producer did with a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Enqueued,
    Dropped,
    /// The quit character: not enqueued, quit flag raised, consumer woken.
    Quit,
    /// The configured stop character: the caller should suspend.
    Stop,
}

#[derive(Debug, Default)]
struct MouseTrack {
    moved: bool,
    x: i32,
    y: i32,
    timestamp: u64,
}

#[derive(Debug)]
pub struct Kboard {
    pub ring: EventRing,
    pub quit_flag: AtomicBool,
    /// A second quit while the first is still pending: emergency exit.
    pub emergency_exit: AtomicBool,
    pub waiting_for_input: AtomicBool,
    pub do_mouse_tracking: AtomicBool,
    pub last_event_timestamp: AtomicU64,
    pub quit_char: AtomicU32,
    /// 0 disables the debug stop character.
    pub stop_char: AtomicU32,
    /// When unset, the high-bit form of the quit character also quits
    /// (the meta key is not producing real meta characters).
    pub meta_key: AtomicBool,
    mouse: Mutex<MouseTrack>,
    epoch: Instant,
}

impl Kboard {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: EventRing::new(capacity),
            quit_flag: AtomicBool::new(false),
            emergency_exit: AtomicBool::new(false),
            waiting_for_input: AtomicBool::new(false),
            do_mouse_tracking: AtomicBool::new(false),
            last_event_timestamp: AtomicU64::new(0),
            quit_char: AtomicU32::new(0x07), // C-g
            stop_char: AtomicU32::new(0),
            meta_key: AtomicBool::new(true),
            mouse: Mutex::new(MouseTrack::default()),
            epoch: Instant::now(),
        }
    }

    pub fn timestamp_now(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn is_quit_code(&self, code: u32) -> bool {
        let quit = self.quit_char.load(Ordering::Relaxed);
        code == quit || (!self.meta_key.load(Ordering::Relaxed) && code == (quit | 0x80))
    }

    /// Producer entry point; may run on the pump thread. The quit and
    /// stop characters are out-of-band and never reach the queue.
    pub fn deliver(&self, event: Event) -> Delivery {
        self.last_event_timestamp
            .store(event.timestamp, Ordering::Relaxed);
        if event.kind == EventKind::Ascii {
            if self.is_quit_code(event.code) {
                self.request_quit();
                return Delivery::Quit;
            }
            let stop = self.stop_char.load(Ordering::Relaxed);
            if stop != 0 && event.code == stop {
                return Delivery::Stop;
            }
        }
        if event.kind == EventKind::MouseMovement {
            self.note_mouse_movement(event.x, event.y, event.timestamp);
            return Delivery::Enqueued;
        }
        if self.ring.enqueue(event) {
            Delivery::Enqueued
        } else {
            Delivery::Dropped
        }
    }

    /// Raise the quit flag and wake a blocked consumer. A quit arriving
    /// while one is already pending upgrades to the emergency exit.
    pub fn request_quit(&self) {
        QUIT_REQUESTS.fetch_add(1, Ordering::Relaxed);
        if self.quit_flag.swap(true, Ordering::SeqCst) {
            self.emergency_exit.store(true, Ordering::SeqCst);
            debug!(target: "input.queue", "double_quit_emergency");
        }
        self.ring.notify();
    }

    /// Record pointer motion in the single coalescing slot; bursts only
    /// keep the latest position.
    pub fn note_mouse_movement(&self, x: i32, y: i32, timestamp: u64) {
        let mut mouse = self.mouse.lock().unwrap();
        if mouse.moved {
            MOUSE_MOVES_COALESCED.fetch_add(1, Ordering::Relaxed);
        }
        *mouse = MouseTrack {
            moved: true,
            x,
            y,
            timestamp,
        };
        drop(mouse);
        if self.do_mouse_tracking.load(Ordering::Relaxed) {
            self.ring.notify();
        }
    }

    fn take_mouse_movement(&self) -> Option<Event> {
        let mut mouse = self.mouse.lock().unwrap();
        if !mouse.moved {
            return None;
        }
        mouse.moved = false;
        Some(Event {
            kind: EventKind::MouseMovement,
            x: mouse.x,
            y: mouse.y,
            timestamp: mouse.timestamp,
            ..Event::no_event()
        })
    }

    /// True iff `get_event` would return without blocking.
    pub fn readable_events(&self) -> bool {
        if self.quit_flag.load(Ordering::SeqCst) {
            return true;
        }
        let tracking = self.do_mouse_tracking.load(Ordering::Relaxed);
        if self.ring.readable(tracking) {
            return true;
        }
        tracking && self.mouse.lock().unwrap().moved
    }

    /// Pull the next event, blocking up to `timeout` (forever when
    /// `None`). A pending quit is delivered as the quit character itself,
    /// with the flag cleared. `poll` is the back-end's non-blocking read,
    /// used when no pump thread keeps the ring fed.
    pub fn get_event(
        &self,
        timeout: Option<Duration>,
        mut poll: Option<&mut dyn FnMut() -> Vec<Event>>,
    ) -> Option<Event> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let tracking = self.do_mouse_tracking.load(Ordering::Relaxed);
        loop {
            if self.quit_flag.swap(false, Ordering::SeqCst) {
                let quit = self.quit_char.load(Ordering::Relaxed);
                trace!(target: "input.queue", "quit_delivered_as_event");
                return Some(Event::ascii(quit, None, self.timestamp_now()));
            }
            while let Some(event) = self.ring.dequeue() {
                if event.kind == EventKind::NoEvent {
                    continue;
                }
                if !tracking && event.is_button_up() {
                    trace!(target: "input.queue", "button_up_skipped");
                    continue;
                }
                return Some(event);
            }
            if tracking {
                if let Some(event) = self.take_mouse_movement() {
                    return Some(event);
                }
            }
            if let Some(poll) = poll.as_deref_mut() {
                let polled = poll();
                if !polled.is_empty() {
                    for event in polled {
                        self.deliver(event);
                    }
                    continue;
                }
            }
            let remaining = match deadline {
                None => None,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    // Cap each wait slice so a poll-only source still gets
                    // serviced at a reasonable cadence.
                    Some((deadline - now).min(Duration::from_millis(50)))
                }
            };
            let wait_slice = match (remaining, poll.is_some()) {
                (None, true) => Some(Duration::from_millis(50)),
                (None, false) => None,
                (some, _) => some,
            };
            self.waiting_for_input.store(true, Ordering::SeqCst);
            self.ring.wait(wait_slice);
            self.waiting_for_input.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::Mods;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn quit_char_short_circuits_queue() {
        let kb = Kboard::new(16);
        kb.deliver(Event::ascii(b'a' as u32, None, 1));
        let delivery = kb.deliver(Event::ascii(0x07, None, 2));
        assert_eq!(delivery, Delivery::Quit);
        assert!(kb.quit_flag.load(Ordering::SeqCst));
        // The quit event is not in the queue.
        assert_eq!(kb.ring.len(), 1);
    }

    #[test]
    fn quit_while_blocked_is_returned_as_event_and_flag_cleared() {
        let kb = Arc::new(Kboard::new(16));
        let waiter = {
            let kb = Arc::clone(&kb);
            std::thread::spawn(move || kb.get_event(Some(Duration::from_secs(5)), None))
        };
        std::thread::sleep(Duration::from_millis(20));
        kb.request_quit();
        let got = waiter.join().unwrap().expect("quit should arrive");
        assert_eq!(got.code, 0x07);
        assert!(!kb.quit_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn second_quit_upgrades_to_emergency() {
        let kb = Kboard::new(16);
        kb.request_quit();
        assert!(!kb.emergency_exit.load(Ordering::SeqCst));
        kb.request_quit();
        assert!(kb.emergency_exit.load(Ordering::SeqCst));
    }

    #[test]
    fn high_bit_quit_applies_without_meta_key() {
        let kb = Kboard::new(16);
        assert_eq!(kb.deliver(Event::ascii(0x87, None, 1)), Delivery::Enqueued);
        kb.quit_flag.store(false, Ordering::SeqCst);
        kb.meta_key.store(false, Ordering::SeqCst);
        assert_eq!(kb.deliver(Event::ascii(0x87, None, 2)), Delivery::Quit);
    }

    #[test]
    fn stop_char_is_reported_not_enqueued() {
        let kb = Kboard::new(16);
        kb.stop_char.store(0x1a, Ordering::Relaxed); // C-z
        assert_eq!(kb.deliver(Event::ascii(0x1a, None, 1)), Delivery::Stop);
        assert!(kb.ring.is_empty());
    }

    #[test]
    fn button_ups_skipped_unless_tracking() {
        let kb = Kboard::new(16);
        kb.deliver(Event::mouse_click(0, Mods::UP, None, 1, 1, 1));
        kb.deliver(Event::ascii(b'x' as u32, None, 2));
        let got = kb.get_event(Some(Duration::from_millis(10)), None).unwrap();
        assert_eq!(got.code, b'x' as u32);

        kb.do_mouse_tracking.store(true, Ordering::Relaxed);
        kb.deliver(Event::mouse_click(0, Mods::UP, None, 1, 1, 3));
        let got = kb.get_event(Some(Duration::from_millis(10)), None).unwrap();
        assert!(got.is_button_up());
    }

    #[test]
    fn mouse_motion_coalesces_to_latest() {
        let kb = Kboard::new(16);
        kb.do_mouse_tracking.store(true, Ordering::Relaxed);
        kb.note_mouse_movement(1, 1, 10);
        kb.note_mouse_movement(5, 7, 11);
        let got = kb.get_event(Some(Duration::from_millis(10)), None).unwrap();
        assert_eq!(got.kind, EventKind::MouseMovement);
        assert_eq!((got.x, got.y), (5, 7));
        // The slot is one-shot.
        assert!(kb.get_event(Some(Duration::from_millis(10)), None).is_none());
    }

    #[test]
    fn readable_events_matches_get_event() {
        let kb = Kboard::new(16);
        assert!(!kb.readable_events());
        kb.deliver(Event::mouse_click(0, Mods::UP, None, 1, 1, 1));
        assert!(!kb.readable_events()); // skipped while not tracking
        kb.deliver(Event::ascii(b'q' as u32, None, 2));
        assert!(kb.readable_events());
    }

    #[test]
    fn poll_source_feeds_empty_ring() {
        let kb = Kboard::new(16);
        let mut calls = 0;
        let mut poll = || {
            calls += 1;
            if calls == 1 {
                vec![Event::ascii(b'p' as u32, None, 5)]
            } else {
                Vec::new()
            }
        };
        let got = kb
            .get_event(Some(Duration::from_millis(100)), Some(&mut poll))
            .unwrap();
        assert_eq!(got.code, b'p' as u32);
    }
}
