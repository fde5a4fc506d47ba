//! Endpoint layout and request/response bodies of the chat server

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use super::events::{ChatMessage, MessageId, OnlineTable, OrderId, TableId};
use crate::error::{ChatError, Result};

/// URLs of the chat server, derived from one base (page origin or configured URL)
#[derive(Clone, Debug)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base: Url::parse(base_url)?,
        })
    }

    /// `ws(s)://host/ws/{table}`, secure when the base is https
    pub fn live_url(&self, table_id: TableId) -> Result<Url> {
        let mut url = self.base.join(&format!("/ws/{}", table_id))?;
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ChatError::WebSocket(format!("cannot use {} for {}", scheme, self.base)))?;
        Ok(url)
    }

    pub fn messages_url(&self, query: &MessagesQuery) -> Result<Url> {
        let mut url = self.base.join("/chat/messages")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &query.limit.to_string());
            if let Some(table_id) = query.table_id {
                pairs.append_pair("table_id", &table_id.to_string());
            }
            if let Some(after_id) = query.after_id {
                pairs.append_pair("after_id", &after_id.to_string());
            }
        }
        Ok(url)
    }

    pub fn online_tables_url(&self) -> Result<Url> {
        Ok(self.base.join("/chat/online-tables")?)
    }

    pub fn send_url(&self) -> Result<Url> {
        Ok(self.base.join("/chat/send")?)
    }

    pub fn gift_order_url(&self) -> Result<Url> {
        Ok(self.base.join("/chat/gift-order")?)
    }
}

/// Query of `GET /chat/messages`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessagesQuery {
    pub limit: u32,
    pub table_id: Option<TableId>,
    pub after_id: Option<MessageId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OnlineTablesResponse {
    #[serde(default)]
    pub online_tables: Vec<OnlineTable>,
}

/// Form body of `POST /chat/send`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub table_id: TableId,
    pub message: String,
    pub nickname: Option<String>,
    /// Set for a private message
    pub target_table_id: Option<TableId>,
}

impl OutgoingMessage {
    /// Build a message from raw input; `None` when the trimmed body is empty
    pub fn compose(
        table_id: TableId,
        body: &str,
        nickname: Option<&str>,
        target_table_id: Option<TableId>,
    ) -> Option<Self> {
        let message = body.trim();
        if message.is_empty() {
            return None;
        }
        let nickname = nickname
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        Some(Self {
            table_id,
            message: message.to_string(),
            nickname,
            target_table_id,
        })
    }

    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("table_id", self.table_id.to_string()),
            ("message", self.message.clone()),
        ];
        if let Some(nickname) = &self.nickname {
            fields.push(("nickname", nickname.clone()));
        }
        if let Some(target) = self.target_table_id {
            fields.push(("target_table_id", target.to_string()));
        }
        fields
    }
}

/// JSON body of `POST /chat/gift-order`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GiftOrderRequest {
    pub from_table_id: TableId,
    pub to_table_id: TableId,
    /// item id -> quantity
    pub menu: BTreeMap<String, u32>,
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct GiftOrderReceipt {
    pub order_id: OrderId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_url_follows_base_scheme() {
        let plain = Endpoints::new("http://localhost:8000").unwrap();
        assert_eq!(plain.live_url(7).unwrap().as_str(), "ws://localhost:8000/ws/7");

        let secure = Endpoints::new("https://pub.example.com/chat/7").unwrap();
        assert_eq!(secure.live_url(7).unwrap().as_str(), "wss://pub.example.com/ws/7");
    }

    #[test]
    fn test_messages_url_omits_unknown_parts() {
        let endpoints = Endpoints::new("http://localhost:8000").unwrap();
        let first = MessagesQuery { limit: 10, table_id: None, after_id: None };
        assert_eq!(
            endpoints.messages_url(&first).unwrap().as_str(),
            "http://localhost:8000/chat/messages?limit=10"
        );

        let next = MessagesQuery { limit: 10, table_id: Some(3), after_id: Some(41) };
        assert_eq!(
            endpoints.messages_url(&next).unwrap().as_str(),
            "http://localhost:8000/chat/messages?limit=10&table_id=3&after_id=41"
        );
    }

    #[test]
    fn test_compose_rejects_blank_body() {
        assert!(OutgoingMessage::compose(1, "   ", Some("me"), None).is_none());
        assert!(OutgoingMessage::compose(1, "", None, None).is_none());
    }

    #[test]
    fn test_form_fields_private_message() {
        let msg = OutgoingMessage::compose(2, " hi there ", Some("  "), Some(9)).unwrap();
        assert_eq!(
            msg.form_fields(),
            vec![
                ("table_id", "2".to_string()),
                ("message", "hi there".to_string()),
                ("target_table_id", "9".to_string()),
            ]
        );
    }

    #[test]
    fn test_gift_order_body() {
        let mut menu = BTreeMap::new();
        menu.insert("beer".to_string(), 2);
        let req = GiftOrderRequest { from_table_id: 1, to_table_id: 4, menu, message: None };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"from_table_id":1,"to_table_id":4,"menu":{"beer":2},"message":null})
        );
    }
}
