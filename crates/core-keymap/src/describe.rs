//! Human-readable key descriptions for the echo area and `where-is`
//! output.

use crate::EventKey;
use core_value::Heap;

/// Describe one key: control characters as `C-x`, the meta bit as `M-`,
/// the usual names for ESC/TAB/RET/SPC/DEL, symbols by name.
pub fn single_key_description(heap: &Heap, key: EventKey) -> String {
    match key {
        EventKey::Sym(s) => heap.symbol_name(s).to_string(),
        EventKey::Code(c) => describe_code(c),
    }
}

fn describe_code(c: u32) -> String {
    if c >= 0x80 {
        return format!("M-{}", describe_code(c & 0x7f));
    }
    match c {
        0x1b => "ESC".to_string(),
        0x09 => "TAB".to_string(),
        0x0d => "RET".to_string(),
        0x20 => "SPC".to_string(),
        0x7f => "DEL".to_string(),
        c if c < 0x20 => {
            let shown = char::from_u32(c + 0x60).unwrap_or('?');
            format!("C-{shown}")
        }
        c => char::from_u32(c).map(String::from).unwrap_or_else(|| format!("\\{c:o}")),
    }
}

/// Describe a whole sequence, space separated: `C-x 4 f`.
pub fn key_description(heap: &Heap, keys: &[EventKey]) -> String {
    keys.iter()
        .map(|&k| single_key_description(heap, k))
        .collect::<Vec<_>>()
        .join(" ")
}
