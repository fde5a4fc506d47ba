//! HTTP side of the chat server: history/poll fetches, presence, send, gift orders
//!
//! reqwest runs on both targets (fetch API on WASM), so the browser page and
//! the CLI share this client.

use crate::core::api::{MessagesResponse, OnlineTablesResponse};
use crate::core::{
    ChatMessage, Endpoints, GiftOrderReceipt, GiftOrderRequest, MessagesQuery, OnlineTable,
    OutgoingMessage,
};
use crate::error::{ChatError, Result};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct HttpApi {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpApi {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub async fn fetch_messages(&self, query: MessagesQuery) -> Result<Vec<ChatMessage>> {
        let url = self.endpoints.messages_url(&query)?;
        let response = check(self.client.get(url).send().await?).await?;
        let body: MessagesResponse = response.json().await?;
        debug!(count = body.messages.len(), after_id = ?query.after_id, "Fetched messages");
        Ok(body.messages)
    }

    pub async fn online_tables(&self) -> Result<Vec<OnlineTable>> {
        let url = self.endpoints.online_tables_url()?;
        let response = check(self.client.get(url).send().await?).await?;
        let body: OnlineTablesResponse = response.json().await?;
        Ok(body.online_tables)
    }

    pub async fn send_message(&self, msg: &OutgoingMessage) -> Result<()> {
        let url = self.endpoints.send_url()?;
        let form = msg.form_fields();
        check(self.client.post(url).form(&form).send().await?).await?;
        debug!(table_id = msg.table_id, private = msg.target_table_id.is_some(), "Message sent");
        Ok(())
    }

    pub async fn submit_gift_order(&self, order: &GiftOrderRequest) -> Result<GiftOrderReceipt> {
        let url = self.endpoints.gift_order_url()?;
        let response = check(self.client.post(url).json(order).send().await?).await?;
        let receipt: GiftOrderReceipt = response.json().await?;
        debug!(order_id = receipt.order_id, to = order.to_table_id, "Gift order accepted");
        Ok(receipt)
    }
}

/// Turn a non-2xx response into `ChatError::Status` carrying the body text
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "Request rejected");
    Err(ChatError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Seam between the native driver and the HTTP server, faked in tests
#[cfg(feature = "cli")]
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync + 'static {
    async fn fetch_messages(&self, query: MessagesQuery) -> Result<Vec<ChatMessage>>;
    async fn online_tables(&self) -> Result<Vec<OnlineTable>>;
    async fn send_message(&self, msg: &OutgoingMessage) -> Result<()>;
    async fn submit_gift_order(&self, order: &GiftOrderRequest) -> Result<GiftOrderReceipt>;
}

#[cfg(feature = "cli")]
#[async_trait::async_trait]
impl ChatApi for HttpApi {
    async fn fetch_messages(&self, query: MessagesQuery) -> Result<Vec<ChatMessage>> {
        HttpApi::fetch_messages(self, query).await
    }

    async fn online_tables(&self) -> Result<Vec<OnlineTable>> {
        HttpApi::online_tables(self).await
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<()> {
        HttpApi::send_message(self, msg).await
    }

    async fn submit_gift_order(&self, order: &GiftOrderRequest) -> Result<GiftOrderReceipt> {
        HttpApi::submit_gift_order(self, order).await
    }
}
