//! Proxy group records and their differential sync, grounded on
//! `zbxcacheconfig/proxy_group.c`'s `dc_sync_proxy_group()`.

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

/// Fallback failover delay used whenever a sync row's `failover_delay`
/// fails to parse as a time-suffixed duration.
const DEFAULT_FAILOVER_DELAY: Duration = Duration::from_secs(60);

/// One row of the proxy-group sync stream.
///
/// Adds and updates carry the same shape (an upsert); removes carry only
/// the id. Callers are responsible for ordering all `Upsert` rows before
/// all `Remove` rows within one sync call — the cache does not re-sort.
pub enum ProxyGroupRow {
    Upsert {
        proxy_group_id: u64,
        failover_delay: String,
        min_online: i32,
    },
    Remove { proxy_group_id: u64 },
}

/// Authoritative proxy group record held by the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct ProxyGroup {
    pub id: u64,
    pub failover_delay: Duration,
    pub min_online: i32,
    /// Revision of the sync call that last touched this record.
    pub revision: u64,
    /// Revision of the last host-proxy mapping recompute for this group.
    pub host_mapping_revision: u64,
}

impl ProxyGroup {
    fn new(id: u64) -> Self {
        Self {
            id,
            failover_delay: DEFAULT_FAILOVER_DELAY,
            min_online: 0,
            revision: 0,
            host_mapping_revision: 0,
        }
    }
}

/// Parse a Zabbix-style time-suffixed duration string ("30s", "5m", "2h",
/// a bare integer meaning seconds). Returns `None` on any malformed input;
/// the caller installs the 60s default and logs a warning, matching
/// `zbx_is_time_suffix()`'s failure path.
pub(crate) fn parse_time_suffix(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (digits, suffix) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    };
    if digits.is_empty() {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    let multiplier = match suffix {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        "w" => 604_800,
        _ => return None,
    };
    Some(Duration::from_secs(value * multiplier))
}

/// Apply one differential sync of proxy groups to `groups`, returning the
/// new aggregate proxy-group revision if anything changed, or `None` if the
/// sync was a no-op (mirrors `dc_sync_proxy_group`'s conditional advance of
/// `config->revision.proxy_group`).
pub fn sync_proxy_groups(
    groups: &mut HashMap<u64, ProxyGroup>,
    rows: impl IntoIterator<Item = ProxyGroupRow>,
    revision: u64,
) -> Option<u64> {
    let mut changed = false;

    for row in rows {
        match row {
            ProxyGroupRow::Upsert {
                proxy_group_id,
                failover_delay,
                min_online,
            } => {
                let group = groups
                    .entry(proxy_group_id)
                    .or_insert_with(|| ProxyGroup::new(proxy_group_id));

                group.failover_delay = match parse_time_suffix(&failover_delay) {
                    Some(d) => d,
                    None => {
                        warn!(
                            proxy_group_id,
                            failover_delay = %failover_delay,
                            "invalid proxy group failover delay, using 60 seconds default value"
                        );
                        DEFAULT_FAILOVER_DELAY
                    }
                };
                group.min_online = min_online;
                group.revision = revision;
                changed = true;
            }
            ProxyGroupRow::Remove { proxy_group_id } => {
                if groups.remove(&proxy_group_id).is_some() {
                    changed = true;
                }
            }
        }
    }

    changed.then_some(revision)
}
