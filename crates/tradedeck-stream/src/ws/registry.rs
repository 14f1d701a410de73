/*
[INPUT]:  (StreamId, callback) registrations and routed StreamMessages
[OUTPUT]: Callback invocations, isolated per consumer
[POS]:    WebSocket layer - subscription bookkeeping and fan-out
[UPDATE]: When changing dispatch order, wildcard rules or failure isolation
*/

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use super::message::StreamMessage;
use crate::stream_id::StreamId;

/// Consumer of decoded frames for one stream.
pub type Callback = Arc<dyn Fn(&StreamMessage) + Send + Sync>;

/// Result of fanning one message out to its callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

/// StreamId → callback map, plus the `*` wildcard.
///
/// Survives reconnects; only `unsubscribe` and `clear` remove entries.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<StreamId, Callback>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `stream`, replacing any previous one.
    pub fn subscribe<F>(&self, stream: StreamId, callback: F)
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(stream, Arc::new(callback));
    }

    /// Remove the callback for `stream`. Returns whether one was registered.
    pub fn unsubscribe(&self, stream: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(stream).is_some()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn contains(&self, stream: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(stream)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn streams(&self) -> Vec<StreamId> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut streams: Vec<StreamId> = entries.keys().cloned().collect();
        streams.sort();
        streams
    }

    /// Deliver `message` to the callback of its stream and to the wildcard.
    ///
    /// Callbacks run outside the lock, so they may subscribe or unsubscribe.
    /// A panicking callback is logged and counted; the other one still runs.
    pub fn dispatch(&self, message: &StreamMessage) -> DispatchReport {
        let (specific, wildcard) = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let specific = if message.stream.is_wildcard() {
                None
            } else {
                entries.get(message.stream.as_str()).cloned()
            };
            (specific, entries.get(StreamId::WILDCARD).cloned())
        };

        let mut report = DispatchReport::default();
        for (callback, registered_as) in [
            (specific, message.stream.as_str()),
            (wildcard, StreamId::WILDCARD),
        ] {
            let Some(callback) = callback else {
                continue;
            };

            report.invoked += 1;
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(message))) {
                report.failed += 1;
                warn!(
                    stream = %message.stream,
                    registered_as,
                    reason = panic_reason(panic.as_ref()),
                    "stream callback panicked; continuing dispatch"
                );
            }
        }

        report
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("streams", &self.streams())
            .finish()
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.as_str()
    } else {
        "non-string panic payload"
    }
}
