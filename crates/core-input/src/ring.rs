//! Fixed-capacity circular event buffer.
//!
//! `(fetch_ptr == store_ptr) ⇔ empty`; one slot always stays unused so a
//! full buffer is never mistaken for an empty one, which caps occupancy
//! at K−1. The producer silently drops on overflow.

use core_events::{EVENTS_DROPPED, EVENTS_ENQUEUED, Event, EventKind};
use std::sync::atomic::Ordering;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug)]
struct RingInner {
    slots: Vec<Option<Event>>,
    store_ptr: usize,
    fetch_ptr: usize,
}

#[derive(Debug)]
pub struct EventRing {
    inner: Mutex<RingInner>,
    not_empty: Condvar,
    capacity: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "ring needs the always-empty slot");
        Self {
            inner: Mutex::new(RingInner {
                slots: vec![None; capacity],
                store_ptr: 0,
                fetch_ptr: 0,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Producer side. Returns false when the event was dropped because
    /// the next write would collide with the fetch cursor.
    pub fn enqueue(&self, event: Event) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let next = (inner.store_ptr + 1) % self.capacity;
        if next == inner.fetch_ptr {
            EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
            trace!(target: "input.queue", "enqueue_dropped_full");
            return false;
        }
        let at = inner.store_ptr;
        inner.slots[at] = Some(event);
        inner.store_ptr = next;
        EVENTS_ENQUEUED.fetch_add(1, Ordering::Relaxed);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Consumer side; `None` when empty.
    pub fn dequeue(&self) -> Option<Event> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fetch_ptr == inner.store_ptr {
            return None;
        }
        let at = inner.fetch_ptr;
        let event = inner.slots[at].take();
        inner.fetch_ptr = (at + 1) % self.capacity;
        event
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        (inner.store_ptr + self.capacity - inner.fetch_ptr) % self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-destructive readability check: is anything queued that the
    /// consumer would not skip? Button releases are invisible while mouse
    /// tracking is off.
    pub fn readable(&self, mouse_tracking: bool) -> bool {
        let inner = self.inner.lock().unwrap();
        let mut at = inner.fetch_ptr;
        while at != inner.store_ptr {
            match &inner.slots[at] {
                Some(ev) if !mouse_tracking && ev.is_button_up() => {}
                Some(ev) if ev.kind == EventKind::NoEvent => {}
                Some(_) => return true,
                None => {}
            }
            at = (at + 1) % self.capacity;
        }
        false
    }

    /// Block until the ring is (probably) non-empty, an explicit wake
    /// arrives, or `timeout` elapses. Returns whether the ring holds
    /// anything; callers re-check their other wake sources either way.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock().unwrap();
        while inner.fetch_ptr == inner.store_ptr {
            match deadline {
                None => {
                    inner = self.not_empty.wait(inner).unwrap();
                    // Explicit wakes (quit, mouse motion) must get control
                    // back even with an empty ring.
                    break;
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (guard, timed_out) = self
                        .not_empty
                        .wait_timeout(inner, deadline - now)
                        .unwrap();
                    inner = guard;
                    if timed_out.timed_out() {
                        break;
                    }
                    break;
                }
            }
        }
        inner.fetch_ptr != inner.store_ptr
    }

    /// Wake the consumer without enqueuing (quit and mouse-motion path).
    pub fn notify(&self) {
        self.not_empty.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::Mods;
    use pretty_assertions::assert_eq;

    fn ev(code: u32) -> Event {
        Event::ascii(code, None, code as u64)
    }

    #[test]
    fn fifo_order() {
        let ring = EventRing::new(8);
        for c in 0..5 {
            assert!(ring.enqueue(ev(c)));
        }
        for c in 0..5 {
            assert_eq!(ring.dequeue().unwrap().code, c);
        }
        assert!(ring.dequeue().is_none());
    }

    #[test]
    fn capacity_is_k_minus_one() {
        let ring = EventRing::new(4);
        assert!(ring.enqueue(ev(1)));
        assert!(ring.enqueue(ev(2)));
        assert!(ring.enqueue(ev(3)));
        // Fourth write would collide with the fetch cursor: dropped.
        assert!(!ring.enqueue(ev(4)));
        assert_eq!(ring.len(), 3);
        // Draining one frees one slot.
        assert_eq!(ring.dequeue().unwrap().code, 1);
        assert!(ring.enqueue(ev(5)));
        assert!(!ring.enqueue(ev(6)));
    }

    #[test]
    fn readable_skips_button_ups() {
        let ring = EventRing::new(8);
        ring.enqueue(Event::mouse_click(0, Mods::UP, None, 1, 1, 1));
        assert!(!ring.readable(false));
        assert!(ring.readable(true));
        ring.enqueue(ev(7));
        assert!(ring.readable(false));
    }

    #[test]
    fn wait_with_timeout_expires() {
        let ring = EventRing::new(4);
        let started = Instant::now();
        assert!(!ring.wait(Some(Duration::from_millis(20))));
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn wait_returns_on_enqueue_from_other_thread() {
        use std::sync::Arc;
        let ring = Arc::new(EventRing::new(4));
        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                ring.enqueue(ev(9));
            })
        };
        assert!(ring.wait(Some(Duration::from_secs(5))));
        assert_eq!(ring.dequeue().unwrap().code, 9);
        producer.join().unwrap();
    }
}
