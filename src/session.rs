//! User actions of one table: chat sends, private mode, gift orders

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::core::{GiftBasket, GiftOrderReceipt, OutgoingMessage, TableId};
use crate::error::{ChatError, Result};
use crate::http::ChatApi;

/// Recipient of private messages
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateTarget {
    pub table_id: TableId,
    pub nickname: String,
}

pub struct ChatSession<A> {
    api: Arc<A>,
    table_id: Option<TableId>,
    nickname: Option<String>,
    private_target: Option<PrivateTarget>,
    basket: GiftBasket,
    gift_recipient: Option<TableId>,
    followup_delay: Duration,
}

impl<A: ChatApi> ChatSession<A> {
    pub fn new(config: &ClientConfig, api: Arc<A>) -> Self {
        Self {
            api,
            table_id: config.table_id,
            nickname: config.nickname.clone(),
            private_target: None,
            basket: GiftBasket::new(),
            gift_recipient: None,
            followup_delay: config.gift_followup_delay,
        }
    }

    pub fn set_nickname(&mut self, nickname: Option<String>) {
        self.nickname = nickname;
    }

    pub fn start_private(&mut self, table_id: TableId, nickname: impl Into<String>) {
        let target = PrivateTarget { table_id, nickname: nickname.into() };
        info!(table_id, nickname = %target.nickname, "Private chat started");
        self.private_target = Some(target);
    }

    pub fn stop_private(&mut self) {
        if self.private_target.take().is_some() {
            info!("Switched back to public chat");
        }
    }

    pub fn private_target(&self) -> Option<&PrivateTarget> {
        self.private_target.as_ref()
    }

    /// Send a chat message; returns false when the body is blank and nothing was sent
    pub async fn send(&self, body: &str) -> Result<bool> {
        let table_id = self.table_id.ok_or(ChatError::NoTable)?;
        let target = self.private_target.as_ref().map(|t| t.table_id);
        let Some(msg) = OutgoingMessage::compose(table_id, body, self.nickname.as_deref(), target) else {
            return Ok(false);
        };
        self.api.send_message(&msg).await?;
        Ok(true)
    }

    pub fn basket(&self) -> &GiftBasket {
        &self.basket
    }

    pub fn basket_mut(&mut self) -> &mut GiftBasket {
        &mut self.basket
    }

    pub fn choose_recipient(&mut self, table_id: TableId) -> Result<()> {
        if Some(table_id) == self.table_id {
            return Err(ChatError::IncompleteOrder("cannot gift your own table"));
        }
        self.gift_recipient = Some(table_id);
        Ok(())
    }

    pub fn gift_recipient(&self) -> Option<TableId> {
        self.gift_recipient
    }

    /// Submit the basket as a gift order
    ///
    /// On success the basket is cleared and, when a note was given, the note
    /// is posted to the chat after the follow-up delay.
    pub async fn submit_gift(&mut self, note: Option<&str>) -> Result<GiftOrderReceipt> {
        let table_id = self.table_id.ok_or(ChatError::NoTable)?;
        let request = self.basket.to_request(table_id, self.gift_recipient, note)?;
        let receipt = self.api.submit_gift_order(&request).await?;
        info!(order_id = receipt.order_id, to = request.to_table_id, "Gift order placed");

        self.basket.clear();
        self.gift_recipient = None;

        let target = self.private_target.as_ref().map(|t| t.table_id);
        let followup = request
            .message
            .as_deref()
            .and_then(|m| OutgoingMessage::compose(table_id, m, self.nickname.as_deref(), target));
        if let Some(msg) = followup {
            let api = self.api.clone();
            let delay = self.followup_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = api.send_message(&msg).await {
                    warn!(error = %e, "Failed to post gift note");
                }
            });
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChatMessage, GiftOrderRequest, MessagesQuery, OnlineTable};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        sent: Mutex<Vec<OutgoingMessage>>,
        orders: Mutex<Vec<GiftOrderRequest>>,
        reject_orders: bool,
    }

    #[async_trait::async_trait]
    impl ChatApi for RecordingApi {
        async fn fetch_messages(&self, _query: MessagesQuery) -> Result<Vec<ChatMessage>> {
            Ok(Vec::new())
        }
        async fn online_tables(&self) -> Result<Vec<OnlineTable>> {
            Ok(Vec::new())
        }
        async fn send_message(&self, msg: &OutgoingMessage) -> Result<()> {
            self.sent.lock().push(msg.clone());
            Ok(())
        }
        async fn submit_gift_order(&self, order: &GiftOrderRequest) -> Result<GiftOrderReceipt> {
            if self.reject_orders {
                return Err(ChatError::Status { status: 500, body: "kitchen closed".into() });
            }
            self.orders.lock().push(order.clone());
            Ok(GiftOrderReceipt { order_id: 77 })
        }
    }

    fn session(api: Arc<RecordingApi>) -> ChatSession<RecordingApi> {
        let mut config = ClientConfig::new("http://localhost:8000", 2);
        config.nickname = Some("window".into());
        ChatSession::new(&config, api)
    }

    #[tokio::test]
    async fn test_blank_message_issues_no_request() {
        let api = Arc::new(RecordingApi::default());
        let session = session(api.clone());
        assert!(!session.send("   ").await.unwrap());
        assert!(!session.send("").await.unwrap());
        assert!(api.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_needs_table() {
        let api = Arc::new(RecordingApi::default());
        let session = ChatSession::new(&ClientConfig::default(), api.clone());
        assert!(matches!(session.send("hi").await, Err(ChatError::NoTable)));
        assert!(api.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_private_mode_sets_target() {
        let api = Arc::new(RecordingApi::default());
        let mut session = session(api.clone());
        session.start_private(5, "corner");
        assert!(session.send("psst").await.unwrap());
        session.stop_private();
        assert!(session.send("hello all").await.unwrap());

        let sent = api.sent.lock();
        assert_eq!(sent[0].target_table_id, Some(5));
        assert_eq!(sent[0].nickname.as_deref(), Some("window"));
        assert_eq!(sent[1].target_table_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gift_order_posts_note_after_delay() {
        let api = Arc::new(RecordingApi::default());
        let mut session = session(api.clone());
        session.choose_recipient(4).unwrap();
        session.basket_mut().change("beer", 2);

        let receipt = session.submit_gift(Some("cheers!")).await.unwrap();
        assert_eq!(receipt.order_id, 77);
        assert!(session.basket().is_empty());
        assert_eq!(session.gift_recipient(), None);
        assert_eq!(api.orders.lock()[0].to_table_id, 4);
        assert!(api.sent.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(api.sent.lock()[0].message, "cheers!");
    }

    #[tokio::test]
    async fn test_rejected_gift_keeps_basket() {
        let api = Arc::new(RecordingApi { reject_orders: true, ..Default::default() });
        let mut session = session(api.clone());
        assert!(session.choose_recipient(2).is_err());
        session.choose_recipient(4).unwrap();
        session.basket_mut().change("soju", 1);

        let err = session.submit_gift(None).await.unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 500, .. }));
        assert_eq!(session.basket().quantity("soju"), 1);
        assert_eq!(session.gift_recipient(), Some(4));
    }
}
