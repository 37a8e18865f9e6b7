use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, info};

use super::payload::SharePayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingShare {
    pub payload: SharePayload,
    pub received_at: DateTime<Utc>,
}

/// Holds shares until the page can receive them.
///
/// Shares received while the page is loading are released in arrival order
/// on the next ready transition, each exactly once.
#[derive(Debug, Default)]
pub struct IngestionBridge {
    deferred: VecDeque<PendingShare>,
}

impl IngestionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload when it can be dispatched right away.
    pub fn ingest(&mut self, payload: SharePayload, page_ready: bool) -> Option<SharePayload> {
        if page_ready && self.deferred.is_empty() {
            return Some(payload);
        }

        debug!(
            "Page not ready, deferring {} share ({} already queued)",
            payload.kind(),
            self.deferred.len()
        );
        self.deferred.push_back(PendingShare {
            payload,
            received_at: Utc::now(),
        });
        None
    }

    /// Drains everything deferred, oldest first.
    pub fn flush(&mut self) -> Vec<SharePayload> {
        let now = Utc::now();
        self.deferred
            .drain(..)
            .map(|pending| {
                info!(
                    "Releasing deferred {} share after {}ms",
                    pending.payload.kind(),
                    (now - pending.received_at).num_milliseconds()
                );
                pending.payload
            })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> SharePayload {
        SharePayload::Text {
            content: content.into(),
        }
    }

    #[test]
    fn test_ready_page_dispatches_immediately() {
        let mut bridge = IngestionBridge::new();
        assert_eq!(bridge.ingest(text("a"), true), Some(text("a")));
        assert_eq!(bridge.pending(), 0);
    }

    #[test]
    fn test_deferred_shares_flush_in_order_once() {
        let mut bridge = IngestionBridge::new();
        assert_eq!(bridge.ingest(text("first"), false), None);
        assert_eq!(bridge.ingest(text("second"), false), None);

        assert_eq!(bridge.flush(), vec![text("first"), text("second")]);
        assert!(bridge.flush().is_empty(), "Flushed shares must not repeat");
    }

    #[test]
    fn test_ready_share_queues_behind_earlier_deferred() {
        let mut bridge = IngestionBridge::new();
        bridge.ingest(text("early"), false);
        assert_eq!(bridge.ingest(text("late"), true), None);
        assert_eq!(bridge.flush(), vec![text("early"), text("late")]);
    }
}
