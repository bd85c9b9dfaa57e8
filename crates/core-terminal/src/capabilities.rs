//! Driver capability flags consumed when sizing the input queue and
//! enabling optional event sources.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalCapabilities {
    /// True for a window-system driver (larger event queue, richer events).
    pub window_system: bool,
    pub reports_mouse: bool,
}

impl TerminalCapabilities {
    pub const fn tty() -> Self {
        Self {
            window_system: false,
            reports_mouse: true,
        }
    }

    pub const fn windowed() -> Self {
        Self {
            window_system: true,
            reports_mouse: true,
        }
    }

    /// Input queue capacity for this driver class.
    pub fn queue_capacity(&self) -> usize {
        if self.window_system { 4096 } else { 256 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_capacity_tracks_driver_class() {
        assert_eq!(TerminalCapabilities::tty().queue_capacity(), 256);
        assert_eq!(TerminalCapabilities::windowed().queue_capacity(), 4096);
    }
}
