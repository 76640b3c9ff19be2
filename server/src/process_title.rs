//! Process-title heartbeat, throttled to at most once per 5s:
//! `"<role> #<n> [got V values, queued Q in T sec]"`.
//!
//! No `setproctitle`-equivalent dependency is pulled in for this
//! out-of-scope process-surface detail, so this formats the title and
//! emits it at `info` level through `tracing` rather than mutating
//! `argv[0]`; a real deployment would additionally feed the formatted
//! string to a process-title crate at the same call site.

use std::time::{Duration, Instant};

use tracing::info;

const UPDATE_INTERVAL: Duration = Duration::from_secs(5);

pub struct ProcessTitle {
    role: &'static str,
    worker_num: usize,
    last_update: Option<Instant>,
}

impl ProcessTitle {
    pub fn new(role: &'static str, worker_num: usize) -> Self {
        Self {
            role,
            worker_num,
            last_update: None,
        }
    }

    /// Update the heartbeat if at least `UPDATE_INTERVAL` has passed since
    /// the last update; no-ops otherwise.
    pub fn maybe_update(&mut self, got: u64, queued: u64, elapsed: Duration) {
        let now = Instant::now();
        if let Some(last) = self.last_update {
            if now.duration_since(last) < UPDATE_INTERVAL {
                return;
            }
        }
        self.last_update = Some(now);
        info!(
            "{} #{} [got {} values, queued {} in {:.2} sec]",
            self.role,
            self.worker_num,
            got,
            queued,
            elapsed.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_always_fires() {
        let mut title = ProcessTitle::new("poller", 1);
        assert!(title.last_update.is_none());
        title.maybe_update(1, 2, Duration::from_secs(1));
        assert!(title.last_update.is_some());
    }

    #[test]
    fn throttles_subsequent_updates() {
        let mut title = ProcessTitle::new("poller", 1);
        title.maybe_update(1, 2, Duration::from_secs(1));
        let first = title.last_update.unwrap();
        title.maybe_update(3, 4, Duration::from_secs(1));
        assert_eq!(title.last_update.unwrap(), first);
    }
}
