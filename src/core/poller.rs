//! Watermark bookkeeping for the fallback poller
//!
//! The timer itself lives in the platform drivers; this is the part of a poll
//! tick that decides what to ask for and what to deliver.

use std::collections::HashSet;

use super::api::MessagesQuery;
use super::events::{ChatMessage, MessageId, TableId};
use tracing::trace;

/// Per-run poller state, created fresh every time polling starts
#[derive(Clone, Debug)]
pub struct PollCursor {
    table_id: Option<TableId>,
    limit: u32,
    watermark: MessageId,
}

impl PollCursor {
    pub fn new(table_id: Option<TableId>, limit: u32) -> Self {
        Self { table_id, limit, watermark: 0 }
    }

    /// Highest message id already delivered
    pub fn watermark(&self) -> MessageId {
        self.watermark
    }

    pub fn query(&self) -> MessagesQuery {
        MessagesQuery {
            limit: self.limit,
            table_id: self.table_id,
            after_id: (self.watermark > 0).then_some(self.watermark),
        }
    }

    /// Keep messages newer than the watermark, ascending by id, and advance it
    pub fn accept(&mut self, mut batch: Vec<ChatMessage>) -> Vec<ChatMessage> {
        batch.retain(|m| m.id > self.watermark);
        batch.sort_by_key(|m| m.id);
        batch.dedup_by_key(|m| m.id);

        if let Some(last) = batch.last() {
            trace!(from = self.watermark, to = last.id, count = batch.len(), "Watermark advanced");
            self.watermark = last.id;
        }
        batch
    }
}

/// Chat message ids already shown, across history, live and polled delivery
///
/// A fresh poller starts from watermark 0 and re-fetches the latest page; this
/// keeps those repeats off the screen. Messages without an id always pass.
#[derive(Clone, Debug, Default)]
pub struct SeenMessages {
    ids: HashSet<MessageId>,
}

impl SeenMessages {
    /// True the first time an id is offered
    pub fn first_sighting(&mut self, msg: &ChatMessage) -> bool {
        msg.id == 0 || self.ids.insert(msg.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sink::testing::chat;

    fn ids(msgs: &[ChatMessage]) -> Vec<MessageId> {
        msgs.iter().map(|m| m.id).collect()
    }

    #[test]
    fn test_first_query_has_no_after_id() {
        let cursor = PollCursor::new(Some(3), 10);
        assert_eq!(
            cursor.query(),
            MessagesQuery { limit: 10, table_id: Some(3), after_id: None }
        );
    }

    #[test]
    fn test_accept_delivers_in_order_and_advances() {
        let mut cursor = PollCursor::new(Some(1), 10);
        cursor.accept(vec![chat(4, 1, "old")]);
        assert_eq!(cursor.watermark(), 4);

        let delivered = cursor.accept(vec![chat(5, 1, "a"), chat(6, 2, "b"), chat(9, 3, "c")]);
        assert_eq!(ids(&delivered), vec![5, 6, 9]);
        assert_eq!(cursor.watermark(), 9);
        assert_eq!(cursor.query().after_id, Some(9));
    }

    #[test]
    fn test_accept_never_redelivers() {
        let mut cursor = PollCursor::new(None, 10);
        cursor.accept(vec![chat(7, 1, "x")]);

        let delivered = cursor.accept(vec![chat(9, 1, "z"), chat(3, 1, "stale"), chat(7, 1, "x"), chat(8, 1, "y")]);
        assert_eq!(ids(&delivered), vec![8, 9]);

        let delivered = cursor.accept(vec![chat(9, 1, "z"), chat(2, 1, "older")]);
        assert!(delivered.is_empty());
        assert_eq!(cursor.watermark(), 9);
    }

    #[test]
    fn test_empty_batch_keeps_watermark() {
        let mut cursor = PollCursor::new(Some(1), 10);
        cursor.accept(vec![chat(12, 1, "x")]);
        assert!(cursor.accept(Vec::new()).is_empty());
        assert_eq!(cursor.watermark(), 12);
    }

    #[test]
    fn test_seen_messages() {
        let mut seen = SeenMessages::default();
        assert!(seen.first_sighting(&chat(3, 1, "a")));
        assert!(!seen.first_sighting(&chat(3, 1, "a")));
        assert!(seen.first_sighting(&chat(0, 1, "no id")));
        assert!(seen.first_sighting(&chat(0, 1, "no id")));
    }
}
