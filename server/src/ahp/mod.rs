//! Async HTTP Poller (AHP): a pool of worker tasks, each an event-driven
//! reactor that fetches due items from the cache, drives their HTTP
//! requests concurrently, and feeds completions back through
//! preprocessing and re-queueing.
//!
//! The original drives this with a thread-local `libevent` base plus a
//! `libcurl` multi-handle, with one `SocketContext`/`RequestContext` pair
//! per in-flight transfer and socket/timer callbacks arming libevent
//! events. Each in-flight request here is instead a task owned by a
//! `tokio::task::JoinSet`, and the reactor's "wait for the next readiness
//! event" becomes a `tokio::select!` over that JoinSet, a fetch-tick
//! interval, and the shutdown broadcast. The request/response transfer
//! itself is delegated to `reqwest::Client`, the out-of-scope HTTP client
//! collaborator.

pub mod request;
pub mod state;
pub mod worker;

pub use state::{PollerConfig, PollerState};
pub use worker::Worker;

#[cfg(test)]
pub(crate) mod test_support {
    use cache::items::{
        Auth, Item, ItemFlags, ItemRequest, ItemState, OutputFormat, PollerType, ResponsePolicy,
        RetrieveMode, ValueType,
    };

    pub fn sample_item(id: u64, url: &str) -> Item {
        Item {
            item_id: id,
            host_id: 1,
            value_type: ValueType::Str,
            flags: ItemFlags::Normal,
            state: ItemState::Normal,
            request: ItemRequest {
                method: "GET".into(),
                url: url.into(),
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
            next_check: 0,
            poller_type: PollerType::HttpAgent,
        }
    }
}
