//! The cache's pollable-item store and its query interface: `get_poller_items`
//! (back-pressure aware batch acquisition) and `poller_requeue_items`
//! (completion feedback that reschedules each item).
//!
//! The item store itself is a simplified stand-in for Zabbix's full
//! configuration cache item hashset — the database access layer that
//! originally populates it is an out-of-scope collaborator. What's
//! modeled here is exactly the surface AHP needs: due-item acquisition
//! under back-pressure, and the re-queue feedback loop.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Numeric value type of an item's result, mirrors `ITEM_VALUE_TYPE_*`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueType {
    Float,
    Str,
    Log,
    UInt,
    Text,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ItemFlags {
    Normal,
    Discovered,
    /// Allowed set used by the DB-config worker's macro resync query.
    Prototype,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ItemState {
    Normal,
    NotSupported,
}

/// Per-item HTTP request parameters, moved out of the item on scheduling.
#[derive(Clone, Debug)]
pub struct ItemRequest {
    pub method: String,
    pub url: String,
    pub query_fields: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub posts: Option<String>,
    pub retrieve_mode: RetrieveMode,
    pub http_proxy: Option<String>,
    pub follow_redirects: bool,
    pub timeout: std::time::Duration,
    pub ssl_cert_file: Option<String>,
    pub ssl_key_file: Option<String>,
    pub verify_peer: bool,
    pub verify_host: bool,
    pub auth: Auth,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetrieveMode {
    Body,
    Headers,
    Both,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Auth {
    None,
    Basic { username: String, password: String },
}

/// Response acceptance policy.
#[derive(Clone, Debug)]
pub struct ResponsePolicy {
    /// Acceptable status-code pattern, e.g. "200" or "200-299,301".
    pub status_codes: String,
    pub output_format: OutputFormat,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    Raw,
    Json,
}

/// A pollable item as handed to AHP. Carries identity, typing, request
/// parameters and response policy.
#[derive(Clone, Debug)]
pub struct Item {
    pub item_id: u64,
    pub host_id: u64,
    pub value_type: ValueType,
    pub flags: ItemFlags,
    pub state: ItemState,
    pub request: ItemRequest,
    pub response_policy: ResponsePolicy,
    pub next_check: i64,
    pub poller_type: PollerType,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PollerType {
    HttpAgent,
}

/// Per-item error code stamped by `poller_requeue_items`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrCode {
    Succeed,
    NotSupported,
    AgentError,
    ConfigError,
}

/// The in-memory item store. Owns every item by id; scheduling state
/// (`next_check`) lives directly on the `Item`.
#[derive(Default)]
pub struct ItemStore {
    items: HashMap<u64, Item>,
}

/// Default ceiling on how many items a single `get_poller_items` call may
/// return, independent of back-pressure. An implementation-defined batch
/// ceiling.
pub const DEFAULT_BATCH_CEILING: usize = 1000;

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: Item) {
        self.items.insert(item.item_id, item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Acquire up to `batch_ceiling.saturating_sub(processing)` due items
    /// of `poller_type`, back-pressured by the caller's in-flight count.
    pub fn get_poller_items(
        &mut self,
        poller_type: PollerType,
        processing: usize,
        batch_ceiling: usize,
        now: i64,
    ) -> Vec<Item> {
        let budget = batch_ceiling.saturating_sub(processing);
        if budget == 0 {
            return Vec::new();
        }

        let mut due_ids: Vec<u64> = self
            .items
            .values()
            .filter(|item| item.poller_type == poller_type && item.next_check <= now)
            .map(|item| item.item_id)
            .collect();
        due_ids.sort_unstable();
        due_ids.truncate(budget);

        due_ids
            .into_iter()
            .filter_map(|id| self.items.remove(&id))
            .collect()
    }

    /// Re-queue a completed batch, stamping each item's `next_check` and
    /// returning the earliest next-check across the batch (or `None` if the
    /// batch was empty). Items not found in the store (already removed) are
    /// silently skipped.
    pub fn poller_requeue_items(
        &mut self,
        completions: &[(u64, ErrCode, i64)],
        next_check_interval: i64,
        reinsert: impl Fn(u64) -> Option<Item>,
    ) -> Option<i64> {
        let mut earliest: Option<i64> = None;

        for &(item_id, _errcode, lastclock) in completions {
            let next_check = lastclock + next_check_interval;
            if let Some(mut item) = reinsert(item_id) {
                item.next_check = next_check;
                self.items.insert(item_id, item);
            }
            earliest = Some(match earliest {
                Some(e) => e.min(next_check),
                None => next_check,
            });
        }

        earliest
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(id: u64, next_check: i64) -> Item {
        Item {
            item_id: id,
            host_id: 1,
            value_type: ValueType::Str,
            flags: ItemFlags::Normal,
            state: ItemState::Normal,
            request: ItemRequest {
                method: "GET".into(),
                url: "http://example.invalid".into(),
                query_fields: vec![],
                headers: vec![],
                posts: None,
                retrieve_mode: RetrieveMode::Body,
                http_proxy: None,
                follow_redirects: true,
                timeout: std::time::Duration::from_secs(3),
                ssl_cert_file: None,
                ssl_key_file: None,
                verify_peer: true,
                verify_host: true,
                auth: Auth::None,
            },
            response_policy: ResponsePolicy {
                status_codes: "200".into(),
                output_format: OutputFormat::Raw,
            },
            next_check,
            poller_type: PollerType::HttpAgent,
        }
    }

    #[test]
    fn back_pressure_caps_batch_by_processing_count() {
        let mut store = ItemStore::new();
        for i in 0..10 {
            store.insert(sample_item(i, 0));
        }
        let batch = store.get_poller_items(PollerType::HttpAgent, 8, 10, 100);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn only_due_items_are_returned() {
        let mut store = ItemStore::new();
        store.insert(sample_item(1, 1000));
        store.insert(sample_item(2, 0));
        let batch = store.get_poller_items(PollerType::HttpAgent, 0, 10, 100);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].item_id, 2);
    }

    #[test]
    fn requeue_returns_earliest_next_check() {
        let mut store = ItemStore::new();
        let item1 = sample_item(1, 0);
        let item2 = sample_item(2, 0);
        let next = store.poller_requeue_items(
            &[(1, ErrCode::Succeed, 100), (2, ErrCode::Succeed, 50)],
            60,
            |id| if id == 1 { Some(item1.clone()) } else { Some(item2.clone()) },
        );
        assert_eq!(next, Some(110));
        assert_eq!(store.items[&1].next_check, 160);
        assert_eq!(store.items[&2].next_check, 110);
    }
}
