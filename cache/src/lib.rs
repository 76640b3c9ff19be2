//! Process-wide configuration cache (CC): proxy groups and host-proxy
//! bindings, behind a single reader-writer lock, with revision-gated
//! snapshots for readers.
//!
//! Grounded on `libs/zbxcacheconfig/proxy_group.c` from the original
//! Zabbix source; the lock discipline (`RDLOCK_CACHE`/`WRLOCK_CACHE`) is
//! carried over as a single `parking_lot::RwLock` around one `Inner`
//! struct guarding every table the cache owns.

pub mod host_proxy;
pub mod items;
pub mod mirror;
pub mod proxy_group;
pub mod strpool;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::instrument;

use host_proxy::{HostProxyRow, HostProxyTable};
use items::{ErrCode, Item, ItemStore, PollerType};
use mirror::{LocalMirror, LocalProxy, ProxyLastAccess, SnapshotOutcome};
use proxy_group::{ProxyGroup, ProxyGroupRow};

struct Inner {
    proxy_groups: HashMap<u64, ProxyGroup>,
    host_proxy: HostProxyTable,
    /// Authoritative proxy last-access table, consulted by
    /// `read_proxy_lastaccess`. Population is out of scope (it belongs to
    /// the proxy-heartbeat collaborator); tests populate it directly.
    proxies: HashMap<u64, ProxyLastAccess>,
    items: ItemStore,
}

impl Inner {
    fn new() -> Self {
        Self {
            proxy_groups: HashMap::new(),
            host_proxy: HostProxyTable::new(),
            proxies: HashMap::new(),
            items: ItemStore::new(),
        }
    }
}

/// The configuration cache. Cheap to clone behind an `Arc` (see
/// `CacheHandle` in the `server` crate); all mutation happens through
/// `&self` methods taking the internal lock.
///
/// `proxy_group_revision` lives outside `inner`'s lock entirely, so a
/// reader whose mirror is already current never blocks behind a writer
/// holding the lock for an unrelated table.
pub struct Cache {
    inner: RwLock<Inner>,
    proxy_group_revision: AtomicU64,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
            proxy_group_revision: AtomicU64::new(0),
        }
    }

    /// Writer side: apply a differential proxy-group sync. Advances the
    /// cache's aggregate `proxy_group_revision` iff at least one row was
    /// added, updated, or removed.
    #[instrument(skip(self, rows))]
    pub fn sync_proxy_groups(&self, rows: Vec<ProxyGroupRow>, revision: u64) {
        let mut inner = self.inner.write();
        if let Some(new_revision) =
            proxy_group::sync_proxy_groups(&mut inner.proxy_groups, rows, revision)
        {
            self.proxy_group_revision.store(new_revision, Ordering::Release);
        }
    }

    /// Writer side: apply a differential host-proxy binding sync.
    #[instrument(skip(self, rows))]
    pub fn sync_host_proxy_bindings(&self, rows: Vec<HostProxyRow>) {
        let mut inner = self.inner.write();
        inner.host_proxy.sync(rows);
    }

    /// Writer side: atomic host-name rename in the secondary index.
    #[instrument(skip(self))]
    pub fn update_host_proxy_rename(&self, old_name: &str, new_name: &str) {
        let mut inner = self.inner.write();
        inner.host_proxy.rename(old_name, new_name);
    }

    /// Writer side: stamp a host-proxy mapping revision onto the named
    /// groups.
    #[instrument(skip(self, group_ids))]
    pub fn update_group_hpmap_revision(&self, group_ids: &[u64], revision: u64) {
        let mut inner = self.inner.write();
        for id in group_ids {
            if let Some(group) = inner.proxy_groups.get_mut(id) {
                group.host_mapping_revision = revision;
            }
        }
    }

    /// Reader side: refresh a caller's private mirror. Takes no lock at all
    /// on the fast path (`local.revision >= current aggregate revision`).
    #[instrument(skip(self, local))]
    pub fn snapshot_proxy_groups(&self, local: &mut LocalMirror) -> SnapshotOutcome {
        let current_revision = self.proxy_group_revision.load(Ordering::Acquire);
        if local.revision >= current_revision {
            return SnapshotOutcome::NoOp;
        }

        let inner = self.inner.read();
        // Re-read after taking the lock: `current_revision` may already be
        // behind a concurrent writer that advanced it between the load
        // above and this point, and `inner.proxy_groups` always matches
        // the latest revision the writer stamped under the same lock.
        let revision = self.proxy_group_revision.load(Ordering::Acquire);
        mirror::snapshot_proxy_groups(local, &inner.proxy_groups, revision)
    }

    /// Reader side: copy authoritative proxy lastaccess into the caller's
    /// mirrored proxies under a single read-lock span.
    #[instrument(skip(self, local_proxies))]
    pub fn read_proxy_lastaccess(&self, local_proxies: &mut [LocalProxy]) {
        let inner = self.inner.read();
        mirror::read_proxy_lastaccess(local_proxies, &inner.proxies);
    }

    /// Reader side: look up a host-proxy binding by its currently indexed
    /// host name.
    #[instrument(skip(self))]
    pub fn get_host_proxy_by_name(&self, host_name: &str) -> Option<host_proxy::HostProxyBinding> {
        let inner = self.inner.read();
        inner.host_proxy.get_by_host_name(host_name).cloned()
    }

    /// Test/seed hook: populate the authoritative proxy lastaccess table.
    pub fn set_proxy_lastaccess(&self, proxy_id: u64, lastaccess: i64) {
        let mut inner = self.inner.write();
        inner.proxies.insert(proxy_id, ProxyLastAccess { lastaccess });
    }

    /// Seed the item store (stand-in for the out-of-scope DB-backed item
    /// sync that normally populates it).
    pub fn insert_item(&self, item: Item) {
        let mut inner = self.inner.write();
        inner.items.insert(item);
    }

    /// Reader side (AHP): acquire a back-pressured batch of due items.
    #[instrument(skip(self))]
    pub fn get_poller_items(
        &self,
        poller_type: PollerType,
        processing: usize,
        batch_ceiling: usize,
    ) -> Vec<Item> {
        let now = items::now_unix();
        let mut inner = self.inner.write();
        inner
            .items
            .get_poller_items(poller_type, processing, batch_ceiling, now)
    }

    /// Reader side (AHP): re-queue a completed batch, returning the
    /// earliest next-check across it.
    #[instrument(skip(self, completions, reinsert))]
    pub fn poller_requeue_items(
        &self,
        completions: &[(u64, ErrCode, i64)],
        next_check_interval: i64,
        reinsert: impl Fn(u64) -> Option<Item>,
    ) -> Option<i64> {
        let mut inner = self.inner.write();
        inner
            .items
            .poller_requeue_items(completions, next_check_interval, reinsert)
    }

    #[cfg(test)]
    fn proxy_group_revision(&self) -> u64 {
        self.proxy_group_revision.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_is_monotonic_and_gated_on_change() {
        let cache = Cache::new();
        cache.sync_proxy_groups(
            vec![ProxyGroupRow::Upsert {
                proxy_group_id: 1,
                failover_delay: "60s".into(),
                min_online: 1,
            }],
            5,
        );
        assert_eq!(cache.proxy_group_revision(), 5);

        // A no-op sync (nothing added/updated/removed) does not advance it.
        cache.sync_proxy_groups(vec![], 6);
        assert_eq!(cache.proxy_group_revision(), 5);
    }

    #[test]
    fn rename_round_trip_through_cache_api() {
        let cache = Cache::new();
        cache.sync_host_proxy_bindings(vec![HostProxyRow::Upsert {
            host_proxy_id: 1,
            host_id: 10,
            host: "h1".into(),
            proxy_id: 100,
            revision: 1,
            host_override: None,
        }]);
        cache.update_host_proxy_rename("h1", "h2");
        assert!(cache.get_host_proxy_by_name("h1").is_none());
        assert_eq!(cache.get_host_proxy_by_name("h2").unwrap().id, 1);

        cache.update_host_proxy_rename("h2", "h1");
        assert!(cache.get_host_proxy_by_name("h2").is_none());
        assert_eq!(cache.get_host_proxy_by_name("h1").unwrap().id, 1);

        let mut mirror = LocalMirror::new();
        // exercise the snapshot path end-to-end too
        assert_eq!(
            cache.snapshot_proxy_groups(&mut mirror),
            SnapshotOutcome::NoOp
        );
    }
}
