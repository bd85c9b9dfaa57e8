//! Printer with bounded cycle detection.
//!
//! Pairs and vectors may form arbitrary graphs. Rather than a full
//! occurs-check, the printer remembers the last `PRINT_RING_CAP` aggregate
//! cells it has descended into; revisiting one of them prints `...`.

use crate::{Heap, Value};

const PRINT_RING_CAP: usize = 200;

/// Fixed-capacity ring of recently visited aggregates.
struct PrintRing {
    slots: Vec<Value>,
    next: usize,
}

impl PrintRing {
    fn new() -> Self {
        Self {
            slots: Vec::with_capacity(PRINT_RING_CAP),
            next: 0,
        }
    }

    fn seen(&self, v: Value) -> bool {
        self.slots.contains(&v)
    }

    fn push(&mut self, v: Value) {
        if self.slots.len() < PRINT_RING_CAP {
            self.slots.push(v);
        } else {
            self.slots[self.next] = v;
            self.next = (self.next + 1) % PRINT_RING_CAP;
        }
    }
}

/// Render `v` in list notation. Strings print quoted; symbols print bare.
pub fn print_value(heap: &Heap, v: Value) -> String {
    let mut out = String::new();
    let mut ring = PrintRing::new();
    print_into(heap, v, &mut out, &mut ring);
    out
}

fn print_into(heap: &Heap, v: Value, out: &mut String, ring: &mut PrintRing) {
    match v {
        Value::Nil => out.push_str("nil"),
        Value::True => out.push('t'),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Sym(id) => out.push_str(heap.symbol_name(id)),
        Value::Str(id) => {
            out.push('"');
            for ch in heap.string(id).chars() {
                if ch == '"' || ch == '\\' {
                    out.push('\\');
                }
                out.push(ch);
            }
            out.push('"');
        }
        Value::Cons(_) => {
            if ring.seen(v) {
                out.push_str("...");
                return;
            }
            ring.push(v);
            out.push('(');
            let mut cur = v;
            loop {
                let car = heap.car(cur).unwrap_or(Value::Nil);
                print_into(heap, car, out, ring);
                let cdr = heap.cdr(cur).unwrap_or(Value::Nil);
                match cdr {
                    Value::Nil => break,
                    Value::Cons(_) => {
                        if ring.seen(cdr) {
                            out.push_str(" ...");
                            break;
                        }
                        ring.push(cdr);
                        out.push(' ');
                        cur = cdr;
                    }
                    other => {
                        out.push_str(" . ");
                        print_into(heap, other, out, ring);
                        break;
                    }
                }
            }
            out.push(')');
        }
        Value::Vector(id) => {
            if ring.seen(v) {
                out.push_str("...");
                return;
            }
            ring.push(v);
            out.push('[');
            for (i, &item) in heap.vector_items(id).iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                print_into(heap, item, out, ring);
            }
            out.push(']');
        }
        Value::Keymap(id) => out.push_str(&format!("#<keymap {}>", id.0)),
        Value::Buffer(id) => out.push_str(&format!("#<buffer {}>", id.0)),
        Value::Frame(id) => out.push_str(&format!("#<frame {}>", id.0)),
        Value::Window(id) => out.push_str(&format!("#<window {}>", id.0)),
        Value::Subr(id) => out.push_str(&format!("#<subr {}>", id.0)),
    }
}
