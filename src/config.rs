//! Client timing and endpoint configuration
//!
//! Defaults match what the server-side pages expect; the native binary can
//! override the endpoint and identity through environment variables.

use std::time::Duration;

use crate::core::TableId;

/// Default server for the native client (override with TABLE_CHAT_URL)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base HTTP URL of the chat server, e.g. `https://host:port`
    pub base_url: String,
    /// Own table, `None` until the guest has joined one
    pub table_id: Option<TableId>,
    pub nickname: Option<String>,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub poll_interval: Duration,
    /// Page size of each fallback poll
    pub poll_limit: u32,
    /// Page size of the initial history load
    pub history_limit: u32,
    pub presence_interval: Duration,
    /// Delay before a gift order's note is posted to the chat
    pub gift_followup_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            table_id: None,
            nickname: None,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 3,
            poll_interval: Duration::from_secs(3),
            poll_limit: 10,
            history_limit: 30,
            presence_interval: Duration::from_secs(5),
            gift_followup_delay: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, table_id: TableId) -> Self {
        Self {
            base_url: base_url.into(),
            table_id: Some(table_id),
            ..Default::default()
        }
    }

    /// Read TABLE_CHAT_URL, TABLE_CHAT_ROOM and TABLE_CHAT_NICKNAME
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> crate::error::Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("TABLE_CHAT_URL") {
            config.base_url = url;
        }
        if let Ok(room) = std::env::var("TABLE_CHAT_ROOM") {
            config.table_id = Some(crate::core::parse_table_id(&room)?);
        }
        config.nickname = std::env::var("TABLE_CHAT_NICKNAME")
            .ok()
            .filter(|n| !n.trim().is_empty());
        Ok(config)
    }
}
