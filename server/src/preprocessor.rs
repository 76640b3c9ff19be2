//! The preprocessing pipeline sink: the out-of-scope collaborator that
//! acquired values are handed off to. Modeled here purely as the
//! interface AHP submits to, following the `Api`-trait pattern the
//! control-plane provider uses for its own out-of-scope collaborators
//! (`proxy/src/control_plane/provider/mod.rs`).

use cache::items::ItemState;

#[derive(Debug)]
pub enum PreprocessValue {
    Normal(String),
    NotSupported(String),
}

pub trait PreprocessorSink: Send + Sync {
    fn submit(
        &self,
        item_id: u64,
        host_id: u64,
        value: PreprocessValue,
        timestamp: i64,
        state: ItemState,
    );

    fn flush(&self);
}

/// Default sink: logs at `debug` level and otherwise discards. Stands in
/// for the real preprocessing manager IPC client, which lives outside this
/// crate's scope.
#[derive(Default)]
pub struct LoggingSink;

impl PreprocessorSink for LoggingSink {
    fn submit(
        &self,
        item_id: u64,
        host_id: u64,
        value: PreprocessValue,
        timestamp: i64,
        state: ItemState,
    ) {
        tracing::debug!(
            item_id,
            host_id,
            timestamp,
            ?state,
            ?value,
            "submitting preprocessing value"
        );
    }

    fn flush(&self) {
        tracing::trace!("flushing preprocessor batch");
    }
}

/// Recording sink used by AHP's own tests to assert on submitted values
/// without depending on `tracing` capture.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        pub submitted: Mutex<Vec<(u64, ItemState, PreprocessValue)>>,
        pub flushes: Mutex<usize>,
    }

    impl PreprocessorSink for RecordingSink {
        fn submit(
            &self,
            item_id: u64,
            _host_id: u64,
            value: PreprocessValue,
            _timestamp: i64,
            state: ItemState,
        ) {
            self.submitted.lock().unwrap().push((item_id, state, value));
        }

        fn flush(&self) {
            *self.flushes.lock().unwrap() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;

    #[test]
    fn recording_sink_captures_submissions() {
        let sink = RecordingSink::default();
        sink.submit(1, 10, PreprocessValue::Normal("ok".into()), 100, ItemState::Normal);
        sink.flush();
        assert_eq!(sink.submitted.lock().unwrap().len(), 1);
        assert_eq!(*sink.flushes.lock().unwrap(), 1);
    }
}
