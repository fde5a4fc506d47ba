//! Presentation sinks and inbound event routing
//!
//! The live channel and the fallback poller both end here: `dispatch` decides
//! which sink call an event becomes, the sink renders it.

use super::events::{
    Amount, ChatMessage, GiftAnnouncement, GiftOrder, InboundEvent, OnlineTable, SystemMessage,
    TableId,
};
use super::status::ChannelStatus;
use crate::time::formatted_now;
use tracing::debug;

/// Receives everything the page displays
pub trait EventSink {
    fn chat_message(&mut self, msg: &ChatMessage);
    fn gift_alert(&mut self, order: &GiftOrder);
    fn system_message(&mut self, msg: &SystemMessage);

    fn status_changed(&mut self, _status: ChannelStatus) {}
    fn presence_changed(&mut self, _presence: &Presence) {}
    /// Called once the initial history page has been delivered
    fn history_loaded(&mut self, _count: usize) {}
}

/// Route one inbound event to the sink
///
/// Gift orders only reach the addressed table; announcements become system
/// messages for everyone.
pub fn dispatch<S: EventSink + ?Sized>(event: &InboundEvent, own_table: Option<TableId>, sink: &mut S) {
    match event {
        InboundEvent::ChatMessage(msg) => sink.chat_message(msg),
        InboundEvent::GiftOrder(order) => {
            if own_table == Some(order.to_table_id) {
                sink.gift_alert(order);
            } else {
                debug!(order_id = order.order_id, to = order.to_table_id, "Gift order for another table");
            }
        }
        InboundEvent::GiftAnnouncement(announcement) => {
            sink.system_message(&announcement_message(announcement, formatted_now()));
        }
        InboundEvent::SystemMessage(msg) => sink.system_message(msg),
    }
}

pub fn announcement_message(a: &GiftAnnouncement, formatted_time: String) -> SystemMessage {
    SystemMessage {
        message: format!(
            "🎁 {} sent {} a gift order of {} won!",
            a.from_nickname,
            a.to_nickname,
            format_amount(a.amount)
        ),
        formatted_time,
        nickname: "System".to_string(),
    }
}

/// Digit grouping, `23000` -> `23,000`
pub fn format_amount(amount: Amount) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ============================================================================
// Presence
// ============================================================================

/// Latest `/chat/online-tables` answer, seen from one table
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Presence {
    pub own_table: Option<TableId>,
    pub tables: Vec<OnlineTable>,
}

impl Presence {
    pub fn new(own_table: Option<TableId>, tables: Vec<OnlineTable>) -> Self {
        Self { own_table, tables }
    }

    /// Everyone online except this table
    pub fn others(&self) -> impl Iterator<Item = &OnlineTable> {
        let own = self.own_table;
        self.tables.iter().filter(move |t| Some(t.table_id) != own)
    }

    pub fn total(&self) -> usize {
        self.tables.len()
    }

    pub fn nickname_of(&self, table_id: TableId) -> String {
        self.tables
            .iter()
            .find(|t| t.table_id == table_id)
            .map(OnlineTable::display_name)
            .unwrap_or_else(|| format!("Table {}", table_id))
    }
}

// ============================================================================
// Chat bubble rendering
// ============================================================================

/// Display form of one chat message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub header: String,
    pub body: String,
    pub mine: bool,
    pub private: bool,
}

impl MessageView {
    pub fn render(msg: &ChatMessage, own_table: Option<TableId>, presence: &Presence) -> Self {
        let mine = own_table == Some(msg.table_id);
        let header = match (msg.is_private, mine) {
            (true, true) => {
                let target = msg
                    .target_table_id
                    .map(|t| presence.nickname_of(t))
                    .unwrap_or_else(|| "?".to_string());
                format!("me → {} • {}", target, msg.formatted_time)
            }
            (true, false) => format!("{} → me • {}", msg.nickname, msg.formatted_time),
            (false, true) => format!("me • {}", msg.formatted_time),
            (false, false) => format!("{} • {}", msg.nickname, msg.formatted_time),
        };
        let body = if msg.is_private {
            format!("🔒 {}", msg.message)
        } else {
            msg.message.clone()
        };
        Self { header, body, mine, private: msg.is_private }
    }
}

/// Escape text for insertion into HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every sink call in arrival order
    #[derive(Default)]
    pub struct RecordingSink {
        pub chats: Vec<ChatMessage>,
        pub gifts: Vec<GiftOrder>,
        pub system: Vec<SystemMessage>,
        pub statuses: Vec<ChannelStatus>,
        pub presence: Vec<Presence>,
        pub history: Vec<usize>,
    }

    impl RecordingSink {
        pub fn chat_ids(&self) -> Vec<u64> {
            self.chats.iter().map(|m| m.id).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn chat_message(&mut self, msg: &ChatMessage) {
            self.chats.push(msg.clone());
        }
        fn gift_alert(&mut self, order: &GiftOrder) {
            self.gifts.push(order.clone());
        }
        fn system_message(&mut self, msg: &SystemMessage) {
            self.system.push(msg.clone());
        }
        fn status_changed(&mut self, status: ChannelStatus) {
            self.statuses.push(status);
        }
        fn presence_changed(&mut self, presence: &Presence) {
            self.presence.push(presence.clone());
        }
        fn history_loaded(&mut self, count: usize) {
            self.history.push(count);
        }
    }

    pub fn chat(id: u64, table_id: TableId, text: &str) -> ChatMessage {
        ChatMessage {
            id,
            table_id,
            nickname: format!("guest{}", table_id),
            message: text.to_string(),
            formatted_time: "19:00".to_string(),
            is_private: false,
            target_table_id: None,
        }
    }
}
