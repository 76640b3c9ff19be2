//! Self-monitoring IDLE/BUSY state, the minimal stand-in for the
//! out-of-scope process-supervision counters collaborator that the process
//! manager polls for busy/idle accounting.

use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const BUSY: u8 = 1;

/// Toggled around every blocking/await wait point in AHP and DCW.
pub struct SelfMonitor {
    state: AtomicU8,
}

impl Default for SelfMonitor {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Idle,
    Busy,
}

impl SelfMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_idle(&self) {
        self.state.store(IDLE, Ordering::Relaxed);
    }

    pub fn set_busy(&self) {
        self.state.store(BUSY, Ordering::Relaxed);
    }

    pub fn state(&self) -> State {
        match self.state.load(Ordering::Relaxed) {
            BUSY => State::Busy,
            _ => State::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_idle_and_toggles() {
        let m = SelfMonitor::new();
        assert_eq!(m.state(), State::Idle);
        m.set_busy();
        assert_eq!(m.state(), State::Busy);
        m.set_idle();
        assert_eq!(m.state(), State::Idle);
    }
}
