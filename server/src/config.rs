//! Command-line configuration, modeled on the `clap`-derive CLI args
//! struct pattern used by `proxy/src/bin/local_proxy.rs`.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "monitoring-server", about = "Configuration cache + poller server")]
pub struct ServerArgs {
    /// Number of concurrent HTTP agent poller workers to run.
    #[arg(long, default_value_t = 5)]
    pub http_pollers: usize,

    /// Per-worker ceiling on items held in flight at once.
    #[arg(long, default_value_t = cache::items::DEFAULT_BATCH_CEILING)]
    pub poller_batch_ceiling: usize,

    /// How often each poller worker checks the cache for newly-due items.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "200ms")]
    pub poller_fetch_interval: Duration,

    /// Seconds added to an item's completion clock to compute its next
    /// scheduled check.
    #[arg(long, default_value_t = 60)]
    pub poller_next_check_interval: i64,

    /// Local source IP bound for outgoing HTTP agent requests, if any.
    #[arg(long)]
    pub source_ip: Option<String>,

    /// Default per-request timeout when an item doesn't specify its own.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "3s")]
    pub default_timeout: Duration,

    /// Tracing filter directive, e.g. "info" or "monitoring_server=debug".
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let args = ServerArgs::parse_from(["monitoring-server"]);
        assert_eq!(args.http_pollers, 5);
        assert_eq!(args.poller_batch_ceiling, cache::items::DEFAULT_BATCH_CEILING);
    }

    #[test]
    fn overrides_poller_count() {
        let args = ServerArgs::parse_from(["monitoring-server", "--http-pollers", "3"]);
        assert_eq!(args.http_pollers, 3);
    }
}
