//! The poller worker reactor: fetch due items, drive their requests
//! concurrently through a `JoinSet`, and feed completions back through
//! preprocessing and re-queueing.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cache::items::{now_unix, ErrCode, Item, ItemState};
use cache::Cache;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use super::request::{self, build_request};
use super::state::{PollerConfig, PollerState};
use crate::ipc::ShutdownRx;
use crate::preprocessor::{PreprocessValue, PreprocessorSink};
use crate::process_title::ProcessTitle;
use crate::self_monitor::SelfMonitor;

struct Completion {
    item_id: u64,
    host_id: u64,
    errcode: ErrCode,
    lastclock: i64,
    value: PreprocessValue,
    state: ItemState,
}

/// One worker of the poller pool. Owns its slice of in-flight items: an
/// item removed from the cache by `fetch` stays in `queued` until its
/// completion has been flushed back through `poller_requeue_items`.
pub struct Worker {
    worker_num: usize,
    cache: Arc<Cache>,
    http: reqwest::Client,
    preprocessor: Arc<dyn PreprocessorSink>,
    shutdown: ShutdownRx,
    config: PollerConfig,
    state: PollerState,
    self_monitor: SelfMonitor,
    process_title: ProcessTitle,
    inflight: JoinSet<Completion>,
    queued: RefCell<HashMap<u64, Item>>,
    ready: Vec<Completion>,
}

impl Worker {
    pub fn new(
        worker_num: usize,
        cache: Arc<Cache>,
        http: reqwest::Client,
        preprocessor: Arc<dyn PreprocessorSink>,
        shutdown: ShutdownRx,
        config: PollerConfig,
    ) -> Self {
        Self {
            worker_num,
            cache,
            http,
            preprocessor,
            shutdown,
            config,
            state: PollerState::new(),
            self_monitor: SelfMonitor::new(),
            process_title: ProcessTitle::new("http agent poller", worker_num),
            inflight: JoinSet::new(),
            queued: RefCell::new(HashMap::new()),
            ready: Vec::new(),
        }
    }

    /// Steady-state reactor: alternate between fetching newly-due items and
    /// draining request completions, until shutdown is signaled and every
    /// in-flight request has finished.
    pub async fn run(mut self) {
        info!(worker = self.worker_num, "poller worker started");
        let start = Instant::now();
        let mut fetch_ticker = tokio::time::interval(self.config.fetch_interval);
        let mut shutting_down = false;

        loop {
            if shutting_down && self.inflight.is_empty() {
                break;
            }

            self.self_monitor.set_idle();
            tokio::select! {
                biased;
                stopped = self.shutdown.recv(), if !shutting_down => {
                    if stopped {
                        shutting_down = true;
                    }
                }
                _ = fetch_ticker.tick(), if !shutting_down => {
                    self.self_monitor.set_busy();
                    self.fetch();
                    let nextcheck = self.flush_requeue();
                    Self::rearm_if_due(&mut fetch_ticker, nextcheck);
                }
                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    self.self_monitor.set_busy();
                    match joined {
                        Ok(completion) => self.ready.push(completion),
                        Err(join_err) => warn!(error = %join_err, "poller task panicked"),
                    }
                    let nextcheck = self.flush_requeue();
                    Self::rearm_if_due(&mut fetch_ticker, nextcheck);
                }
            }

            self.state.processing = self.queued.borrow().len();
            self.process_title.maybe_update(
                self.state.processed,
                self.state.processing as u64,
                start.elapsed(),
            );
        }

        info!(worker = self.worker_num, "poller worker stopped");
    }

    /// Acquire a back-pressured batch of due items and either spawn a
    /// request task for each, or, for items that fail to prepare, stage an
    /// immediate completion without ever touching the network.
    #[instrument(skip(self))]
    fn fetch(&mut self) {
        let processing = self.queued.borrow().len();
        let items = self
            .cache
            .get_poller_items(self.config.poller_type, processing, self.config.batch_ceiling);

        for item in items {
            let item_id = item.item_id;
            let host_id = item.host_id;

            match build_request(&self.http, &item, self.config.source_ip.as_deref()) {
                Ok((client, req)) => {
                    let response_policy = item.response_policy.clone();
                    let retrieve_mode = item.request.retrieve_mode;
                    self.inflight.spawn(async move {
                        drive_request(client, req, item_id, host_id, retrieve_mode, response_policy).await
                    });
                    self.queued.borrow_mut().insert(item_id, item);
                }
                Err(e) => {
                    let errcode = e.errcode();
                    self.ready.push(Completion {
                        item_id,
                        host_id,
                        errcode,
                        lastclock: now_unix(),
                        value: PreprocessValue::NotSupported(e.to_string()),
                        state: ItemState::NotSupported,
                    });
                    self.queued.borrow_mut().insert(item_id, item);
                }
            }
        }
    }

    /// Submit every staged completion to preprocessing and re-queue the
    /// underlying items in one batch, clearing `ready` and dropping each
    /// item's entry from `queued`. Returns the earliest `next_check` across
    /// the batch, so the caller can re-arm the fetch timer immediately when
    /// that item is already due.
    fn flush_requeue(&mut self) -> Option<i64> {
        if self.ready.is_empty() {
            return None;
        }

        let completions: Vec<(u64, ErrCode, i64)> = self
            .ready
            .iter()
            .map(|c| (c.item_id, c.errcode, c.lastclock))
            .collect();

        let queued = &self.queued;
        let nextcheck = self.cache.poller_requeue_items(
            &completions,
            self.config.next_check_interval,
            |id| queued.borrow_mut().remove(&id),
        );

        for completion in self.ready.drain(..) {
            self.preprocessor.submit(
                completion.item_id,
                completion.host_id,
                completion.value,
                completion.lastclock,
                completion.state,
            );
            self.state.processed += 1;
        }
        self.preprocessor.flush();
        nextcheck
    }

    /// Re-arms the fetch timer for an immediate tick when `nextcheck` is
    /// already due, so a requeued backlog doesn't wait out a full
    /// `fetch_interval` before being picked back up.
    fn rearm_if_due(fetch_ticker: &mut tokio::time::Interval, nextcheck: Option<i64>) {
        if let Some(nextcheck) = nextcheck {
            if nextcheck <= now_unix() {
                fetch_ticker.reset_immediately();
            }
        }
    }
}

async fn drive_request(
    client: reqwest::Client,
    req: reqwest::Request,
    item_id: u64,
    host_id: u64,
    retrieve_mode: cache::items::RetrieveMode,
    response_policy: cache::items::ResponsePolicy,
) -> Completion {
    let lastclock = now_unix();

    let response = match client.execute(req).await {
        Ok(resp) => resp,
        Err(e) => {
            return Completion {
                item_id,
                host_id,
                errcode: ErrCode::AgentError,
                lastclock,
                value: PreprocessValue::NotSupported(e.to_string()),
                state: ItemState::NotSupported,
            }
        }
    };

    let status = response.status().as_u16();
    let headers_text: String = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| format!("{k}: {v}")))
        .collect::<Vec<_>>()
        .join("\n");

    let body_result = if matches!(retrieve_mode, cache::items::RetrieveMode::Headers) {
        Ok(String::new())
    } else {
        response.text().await
    };

    let content = match body_result {
        Ok(body) => match retrieve_mode {
            cache::items::RetrieveMode::Headers => headers_text,
            cache::items::RetrieveMode::Body => body,
            cache::items::RetrieveMode::Both => format!("{headers_text}\n\n{body}"),
        },
        Err(e) => {
            return Completion {
                item_id,
                host_id,
                errcode: ErrCode::AgentError,
                lastclock,
                value: PreprocessValue::NotSupported(e.to_string()),
                state: ItemState::NotSupported,
            }
        }
    };

    if request::status_code_matches(&response_policy.status_codes, status) {
        Completion {
            item_id,
            host_id,
            errcode: ErrCode::Succeed,
            lastclock,
            value: PreprocessValue::Normal(content),
            state: ItemState::Normal,
        }
    } else {
        Completion {
            item_id,
            host_id,
            errcode: ErrCode::NotSupported,
            lastclock,
            value: PreprocessValue::NotSupported(format!(
                "response code {status} did not match pattern '{}'",
                response_policy.status_codes
            )),
            state: ItemState::NotSupported,
        }
    }
}
