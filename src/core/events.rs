//! Event types for the table chat live-update channel
//!
//! This module contains:
//! - Inbound event union pushed by the server (and replayed by the poller)
//! - Presence and order payloads shared with the HTTP API

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

// ============================================================================
// Basic Types
// ============================================================================

pub type TableId = u32;
pub type MessageId = u64;
pub type OrderId = u64;
/// Amount in won
pub type Amount = u64;

/// Table numbers a guest may enter by hand
pub const TABLE_RANGE: std::ops::RangeInclusive<TableId> = 1..=50;

/// Parse a table number typed by a guest
pub fn parse_table_id(input: &str) -> Result<TableId> {
    let trimmed = input.trim();
    match trimmed.parse::<TableId>() {
        Ok(id) if TABLE_RANGE.contains(&id) => Ok(id),
        _ => Err(ChatError::InvalidTable(trimmed.to_string())),
    }
}

// ============================================================================
// Inbound events
// ============================================================================

/// Event delivered to the page, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    ChatMessage(ChatMessage),
    GiftOrder(GiftOrder),
    GiftAnnouncement(GiftAnnouncement),
    SystemMessage(SystemMessage),
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::ChatMessage(_) => "chat_message",
            InboundEvent::GiftOrder(_) => "gift_order",
            InboundEvent::GiftAnnouncement(_) => "gift_announcement",
            InboundEvent::SystemMessage(_) => "system_message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: MessageId,
    pub table_id: TableId,
    #[serde(default)]
    pub nickname: String,
    pub message: String,
    #[serde(default)]
    pub formatted_time: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub target_table_id: Option<TableId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftOrder {
    pub order_id: OrderId,
    pub from_table_id: TableId,
    pub to_table_id: TableId,
    #[serde(default)]
    pub from_nickname: String,
    #[serde(default)]
    pub to_nickname: String,
    /// Pre-rendered lines, one per ordered item
    #[serde(default)]
    pub menu_items: Vec<String>,
    pub amount: Amount,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftAnnouncement {
    pub from_nickname: String,
    pub to_nickname: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub message: String,
    #[serde(default)]
    pub formatted_time: String,
    #[serde(default = "system_nickname")]
    pub nickname: String,
}

fn system_nickname() -> String {
    "System".to_string()
}

// ============================================================================
// Presence
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineTable {
    pub table_id: TableId,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl OnlineTable {
    /// Nickname, or "Table N" when the guest never set one
    pub fn display_name(&self) -> String {
        match self.nickname.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => format!("Table {}", self.table_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_tag() {
        let msg = r#"{
            "type": "chat_message",
            "id": 7,
            "table_id": 3,
            "nickname": "window seat",
            "message": "hello",
            "formatted_time": "2024-05-01 19:02",
            "is_private": false,
            "target_table_id": null
        }"#;
        let event: InboundEvent = serde_json::from_str(msg).unwrap();
        match event {
            InboundEvent::ChatMessage(m) => {
                assert_eq!(m.id, 7);
                assert_eq!(m.table_id, 3);
                assert!(!m.is_private);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_gift_order_defaults() {
        let msg = r#"{"type":"gift_order","order_id":12,"from_table_id":1,"to_table_id":4,"amount":23000}"#;
        let event: InboundEvent = serde_json::from_str(msg).unwrap();
        assert_eq!(event.kind(), "gift_order");
        if let InboundEvent::GiftOrder(order) = event {
            assert!(order.menu_items.is_empty());
            assert_eq!(order.message, None);
        }
    }

    #[test]
    fn test_system_message_default_nickname() {
        let msg = r#"{"type":"system_message","message":"closing soon"}"#;
        let event: InboundEvent = serde_json::from_str(msg).unwrap();
        assert_eq!(
            event,
            InboundEvent::SystemMessage(SystemMessage {
                message: "closing soon".into(),
                formatted_time: String::new(),
                nickname: "System".into(),
            })
        );
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let msg = r#"{"type":"typing","table_id":1}"#;
        assert!(serde_json::from_str::<InboundEvent>(msg).is_err());
    }

    #[test]
    fn test_parse_table_id_range() {
        assert_eq!(parse_table_id(" 12 ").unwrap(), 12);
        assert!(parse_table_id("0").is_err());
        assert!(parse_table_id("51").is_err());
        assert!(parse_table_id("twelve").is_err());
    }

    #[test]
    fn test_online_table_display_name() {
        let named = OnlineTable { table_id: 2, nickname: Some("bar".into()) };
        let blank = OnlineTable { table_id: 5, nickname: Some("  ".into()) };
        assert_eq!(named.display_name(), "bar");
        assert_eq!(blank.display_name(), "Table 5");
    }
}
