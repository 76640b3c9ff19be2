//! Host→proxy binding records, their secondary host-name index, and
//! differential sync. Grounded on `proxy_group.c`'s `dc_sync_host_proxy()`,
//! `dc_register_host_proxy()` / `dc_deregister_host_proxy()` and
//! `dc_update_host_proxy()`.

use std::collections::HashMap;

use crate::strpool::{InternedStr, StringPool};

/// One row of the host-proxy binding sync stream.
///
/// `host` is the binding's own host string (row field 2); `host_override`
/// is the group-member host's name when present (row field 5, `NULL` on
/// proxies). The host name used for indexing prefers `host_override`
/// when it is `Some`.
pub enum HostProxyRow {
    Upsert {
        host_proxy_id: u64,
        host_id: u64,
        host: String,
        proxy_id: u64,
        revision: u64,
        host_override: Option<String>,
    },
    Remove { host_proxy_id: u64 },
}

/// Authoritative host→proxy binding record.
#[derive(Clone, Debug, PartialEq)]
pub struct HostProxyBinding {
    pub id: u64,
    pub host_id: u64,
    pub proxy_id: u64,
    pub revision: u64,
    pub host_name: InternedStr,
}

/// The primary binding map plus its host-name secondary index and the
/// string pool backing interned host names. Bundled together because the
/// three must always be mutated in lock-step.
#[derive(Default)]
pub struct HostProxyTable {
    bindings: HashMap<u64, HostProxyBinding>,
    /// host name -> binding id. Non-owning: the binding itself lives in
    /// `bindings`.
    by_host_name: HashMap<InternedStr, u64>,
    pool: StringPool,
}

impl HostProxyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<&HostProxyBinding> {
        self.bindings.get(&id)
    }

    /// Look up a binding by its currently indexed host name.
    pub fn get_by_host_name(&self, host_name: &str) -> Option<&HostProxyBinding> {
        let id = self.by_host_name.get(host_name)?;
        self.bindings.get(id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Number of distinct host names currently pooled. Test-only hook for
    /// the string-pool-refcount-balance invariant.
    pub fn pooled_string_count(&self) -> usize {
        self.pool.len()
    }

    fn register(&mut self, id: u64, host_name: InternedStr) {
        // Duplicate host names replace the pointer but do not create a
        // second pool reference beyond the one `upsert` already acquired.
        self.by_host_name.insert(host_name, id);
    }

    fn deregister(&mut self, host_name: &InternedStr) {
        if self.by_host_name.remove(host_name.as_str()).is_some() {
            self.pool.release(host_name);
        }
    }

    /// Apply one differential sync of host-proxy bindings.
    pub fn sync(&mut self, rows: impl IntoIterator<Item = HostProxyRow>) {
        for row in rows {
            match row {
                HostProxyRow::Upsert {
                    host_proxy_id,
                    host_id,
                    host,
                    proxy_id,
                    revision,
                    host_override,
                } => {
                    let chosen_name = host_override.as_deref().unwrap_or(&host);

                    if let Some(existing) = self.bindings.get(&host_proxy_id) {
                        let old_name = existing.host_name.clone();
                        if old_name.as_str() != chosen_name {
                            self.deregister(&old_name);
                            let new_name = self.pool.acquire(chosen_name);
                            self.register(host_proxy_id, new_name.clone());
                            if let Some(b) = self.bindings.get_mut(&host_proxy_id) {
                                b.host_name = new_name;
                            }
                        }
                        let b = self.bindings.get_mut(&host_proxy_id).unwrap();
                        b.host_id = host_id;
                        b.proxy_id = proxy_id;
                        b.revision = revision;
                    } else {
                        let name = self.pool.acquire(chosen_name);
                        self.bindings.insert(
                            host_proxy_id,
                            HostProxyBinding {
                                id: host_proxy_id,
                                host_id,
                                proxy_id,
                                revision,
                                host_name: name.clone(),
                            },
                        );
                        self.register(host_proxy_id, name);
                    }
                }
                HostProxyRow::Remove { host_proxy_id } => {
                    // The correct map to search for removals is `host_proxy`
                    // (this table), not `proxy_groups`. The Zabbix C source
                    // (`proxy_group.c` line ~309) searches `proxy_groups`
                    // here, which is a bug; we do not reproduce it.
                    if let Some(binding) = self.bindings.remove(&host_proxy_id) {
                        self.deregister(&binding.host_name);
                    }
                }
            }
        }
    }

    /// Atomically rename a binding's indexed host name. No-op if
    /// `old_name` is not currently indexed.
    pub fn rename(&mut self, old_name: &str, new_name: &str) {
        let Some(&id) = self.by_host_name.get(old_name) else {
            return;
        };
        let old = self.bindings.get(&id).map(|b| b.host_name.clone());
        let Some(old) = old else { return };

        self.deregister(&old);
        let interned_new = self.pool.acquire(new_name);
        self.register(id, interned_new.clone());
        if let Some(b) = self.bindings.get_mut(&id) {
            b.host_name = interned_new;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(id: u64, host: &str) -> HostProxyRow {
        HostProxyRow::Upsert {
            host_proxy_id: id,
            host_id: id,
            host: host.to_string(),
            proxy_id: 100,
            revision: 1,
            host_override: None,
        }
    }

    #[test]
    fn insert_then_lookup_by_host_name() {
        let mut table = HostProxyTable::new();
        table.sync([upsert(1, "h1")]);
        assert_eq!(table.get_by_host_name("h1").unwrap().id, 1);
    }

    #[test]
    fn host_override_wins_over_own_host_field() {
        let mut table = HostProxyTable::new();
        table.sync([HostProxyRow::Upsert {
            host_proxy_id: 1,
            host_id: 1,
            host: "binding-host".into(),
            proxy_id: 100,
            revision: 1,
            host_override: Some("group-member-host".into()),
        }]);
        assert!(table.get_by_host_name("group-member-host").is_some());
        assert!(table.get_by_host_name("binding-host").is_none());
    }

    #[test]
    fn rename_is_atomic_and_reversible() {
        let mut table = HostProxyTable::new();
        table.sync([upsert(1, "h1")]);

        table.rename("h1", "h2");
        assert!(table.get_by_host_name("h1").is_none());
        assert_eq!(table.get_by_host_name("h2").unwrap().id, 1);

        table.rename("h2", "h1");
        assert!(table.get_by_host_name("h2").is_none());
        assert_eq!(table.get_by_host_name("h1").unwrap().id, 1);

        // identity round trip should not leak pooled strings
        assert_eq!(table.pooled_string_count(), 1);
    }

    #[test]
    fn remove_deregisters_host_name_and_drops_pool_reference() {
        let mut table = HostProxyTable::new();
        table.sync([upsert(1, "h1")]);
        assert_eq!(table.pooled_string_count(), 1);

        table.sync([HostProxyRow::Remove { host_proxy_id: 1 }]);
        assert!(table.is_empty());
        assert!(table.get_by_host_name("h1").is_none());
        assert_eq!(table.pooled_string_count(), 0);
    }

    #[test]
    fn renaming_host_in_upsert_releases_old_pool_entry() {
        let mut table = HostProxyTable::new();
        table.sync([upsert(1, "h1")]);
        table.sync([upsert(1, "h2")]);
        assert!(table.get_by_host_name("h1").is_none());
        assert_eq!(table.get_by_host_name("h2").unwrap().id, 1);
        assert_eq!(table.pooled_string_count(), 1);
    }
}
