//! Per-worker poller configuration and bookkeeping counters.

use std::time::Duration;

use cache::items::PollerType;

/// Static-for-the-process-lifetime settings a poller worker is constructed
/// with (its CLI-derived configuration snapshot).
#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub poller_type: PollerType,
    /// Ceiling on in-flight + freshly-fetched items this worker will carry
    /// at once, independent of how many other workers exist.
    pub batch_ceiling: usize,
    /// How often to poll the cache for newly-due items when there's spare
    /// capacity.
    pub fetch_interval: Duration,
    /// Seconds added to an item's lastclock to compute its next check, when
    /// the item's own interval isn't modeled (simplified scheduling).
    pub next_check_interval: i64,
    pub source_ip: Option<String>,
    pub default_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poller_type: PollerType::HttpAgent,
            batch_ceiling: 1000,
            fetch_interval: Duration::from_millis(200),
            next_check_interval: 60,
            source_ip: None,
            default_timeout: Duration::from_secs(3),
        }
    }
}

/// Live counters a worker reports to its process title / self-monitor,
/// mirroring the "queued / processing / processed" triad the original
/// exposes through its internal statistics.
#[derive(Default, Debug)]
pub struct PollerState {
    pub processing: usize,
    pub processed: u64,
}

impl PollerState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_batch_ceiling() {
        let cfg = PollerConfig::default();
        assert!(cfg.batch_ceiling > 0);
    }
}
