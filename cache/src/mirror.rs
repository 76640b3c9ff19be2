//! Reader-side mirrors of proxy groups and the revision-gated snapshot
//! refresh protocol. Grounded on `zbx_dc_get_proxy_groups()` and
//! `zbx_dc_get_group_proxy_lastaccess()` in `proxy_group.c`.

use std::collections::HashMap;
use std::time::Duration;

use crate::proxy_group::ProxyGroup;

/// Tri-state mirror flag. Explicit tagged value rather than a derived bool:
/// `None` after a refresh is a *result* (the entry is stale and may be
/// dropped by the caller), not a distinct lifecycle state in its own right.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum MirrorFlags {
    #[default]
    None,
    Added,
    Modified,
}

/// A reader's private copy of one proxy group.
#[derive(Clone, Debug)]
pub struct LocalProxyGroup {
    pub id: u64,
    pub sync_revision: u64,
    pub revision: u64,
    pub failover_delay: Duration,
    pub min_online: i32,
    pub proxies: Vec<LocalProxy>,
    pub host_ids: Vec<u64>,
    pub new_host_ids: Vec<u64>,
    pub flags: MirrorFlags,
}

impl LocalProxyGroup {
    fn new_added(id: u64, sync_revision: u64) -> Self {
        Self {
            id,
            sync_revision,
            revision: 0,
            failover_delay: Duration::from_secs(60),
            min_online: 0,
            proxies: Vec::new(),
            host_ids: Vec::new(),
            new_host_ids: Vec::new(),
            flags: MirrorFlags::Added,
        }
    }
}

/// A mirrored proxy's last-access timestamp, the payload consulted by
/// `read_proxy_lastaccess`.
#[derive(Clone, Debug, Default)]
pub struct LocalProxy {
    pub proxy_id: u64,
    pub lastaccess: i64,
}

/// Authoritative proxy record as seen by `read_proxy_lastaccess`. The cache
/// proper only needs `lastaccess`; identity is the map key.
#[derive(Clone, Debug, Default)]
pub struct ProxyLastAccess {
    pub lastaccess: i64,
}

/// Outcome of a `snapshot_proxy_groups` call.
#[derive(Debug, Eq, PartialEq)]
pub enum SnapshotOutcome {
    /// `local_revision >= cache revision`; no lock was taken.
    NoOp,
    Updated,
}

/// A reader's local mirror of all proxy groups, plus the revision at which
/// it was last refreshed.
#[derive(Default)]
pub struct LocalMirror {
    pub groups: HashMap<u64, LocalProxyGroup>,
    pub revision: u64,
}

impl LocalMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries still flagged `None` after the most recent refresh — these
    /// are stale (the cache no longer holds them) and may be dropped.
    pub fn stale_ids(&self) -> Vec<u64> {
        self.groups
            .iter()
            .filter(|(_, g)| g.flags == MirrorFlags::None)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn drop_stale(&mut self) {
        self.groups.retain(|_, g| g.flags != MirrorFlags::None);
    }
}

/// Refresh `mirror` against `groups`/`cache_revision`.
///
/// Fast path: if `mirror.revision >= cache_revision`, returns `NoOp`
/// without sweeping the mirror or taking any lock (the caller is expected
/// to already be holding no lock at this point — this function itself
/// performs no locking; the calling `Cache` wraps the "acquire read lock"
/// half of this contract around the loop below).
pub fn snapshot_proxy_groups(
    mirror: &mut LocalMirror,
    groups: &HashMap<u64, ProxyGroup>,
    cache_revision: u64,
) -> SnapshotOutcome {
    if mirror.revision >= cache_revision {
        return SnapshotOutcome::NoOp;
    }

    // Sweep before taking the cache lock: this is the caller's private
    // mirror, never shared, so no synchronization is needed here.
    for group in mirror.groups.values_mut() {
        group.flags = MirrorFlags::None;
    }

    mirror.revision = cache_revision;

    for dc_group in groups.values() {
        let entry = mirror
            .groups
            .entry(dc_group.id)
            .and_modify(|g| g.flags = MirrorFlags::Modified)
            .or_insert_with(|| LocalProxyGroup::new_added(dc_group.id, cache_revision));

        entry.sync_revision = cache_revision;

        if dc_group.revision > entry.revision {
            entry.revision = dc_group.revision;
            entry.failover_delay = dc_group.failover_delay;
            entry.min_online = dc_group.min_online;
        }
    }

    SnapshotOutcome::Updated
}

/// Copy authoritative `lastaccess` values into the reader's mirrored
/// proxies. Missing proxies are reset to zero, matching
/// `zbx_dc_get_group_proxy_lastaccess`'s `NULL` path.
pub fn read_proxy_lastaccess(
    local_proxies: &mut [LocalProxy],
    authoritative: &HashMap<u64, ProxyLastAccess>,
) {
    for proxy in local_proxies.iter_mut() {
        proxy.lastaccess = authoritative
            .get(&proxy.proxy_id)
            .map(|p| p.lastaccess)
            .unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: u64, revision: u64) -> ProxyGroup {
        ProxyGroup {
            id,
            failover_delay: Duration::from_secs(60),
            min_online: 1,
            revision,
            host_mapping_revision: 0,
        }
    }

    #[test]
    fn no_lock_fast_path_when_caught_up() {
        let mut mirror = LocalMirror::new();
        mirror.revision = 10;
        let groups = HashMap::new();
        assert_eq!(
            snapshot_proxy_groups(&mut mirror, &groups, 10),
            SnapshotOutcome::NoOp
        );
        assert_eq!(
            snapshot_proxy_groups(&mut mirror, &groups, 5),
            SnapshotOutcome::NoOp
        );
    }

    #[test]
    fn sync_then_snapshot_scenario() {
        let mut groups = HashMap::new();
        groups.insert(1, group(1, 5));
        groups.insert(2, group(2, 5));

        let mut mirror = LocalMirror::new();
        assert_eq!(
            snapshot_proxy_groups(&mut mirror, &groups, 5),
            SnapshotOutcome::Updated
        );
        assert_eq!(mirror.groups[&1].flags, MirrorFlags::Added);
        assert_eq!(mirror.groups[&2].flags, MirrorFlags::Added);
        assert!(mirror.stale_ids().is_empty());

        groups.remove(&2);
        assert_eq!(
            snapshot_proxy_groups(&mut mirror, &groups, 6),
            SnapshotOutcome::Updated
        );
        assert_eq!(mirror.groups[&1].flags, MirrorFlags::Modified);
        assert_eq!(mirror.groups[&2].flags, MirrorFlags::None);

        mirror.drop_stale();
        assert!(!mirror.groups.contains_key(&2));
        assert!(mirror.groups.contains_key(&1));
    }

    #[test]
    fn lastaccess_missing_proxy_resets_to_zero() {
        let mut proxies = vec![LocalProxy {
            proxy_id: 1,
            lastaccess: 42,
        }];
        let authoritative = HashMap::new();
        read_proxy_lastaccess(&mut proxies, &authoritative);
        assert_eq!(proxies[0].lastaccess, 0);
    }

    #[test]
    fn lastaccess_copies_present_proxy() {
        let mut proxies = vec![LocalProxy {
            proxy_id: 1,
            lastaccess: 0,
        }];
        let mut authoritative = HashMap::new();
        authoritative.insert(1, ProxyLastAccess { lastaccess: 999 });
        read_proxy_lastaccess(&mut proxies, &authoritative);
        assert_eq!(proxies[0].lastaccess, 999);
    }
}
