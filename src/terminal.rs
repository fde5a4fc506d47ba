//! Line-oriented sink for the native client

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::core::sink::format_amount;
use crate::core::{
    ChannelStatus, ChatMessage, EventSink, GiftOrder, MessageView, Presence, SystemMessage, TableId,
};

/// Writes chat traffic as plain text lines
///
/// The presence snapshot is shared so the input loop can resolve table
/// nicknames while the sink lives on the driver task.
pub struct TerminalSink<W> {
    out: W,
    own_table: Option<TableId>,
    presence: Arc<Mutex<Presence>>,
    last_status: Option<ChannelStatus>,
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout(own_table: Option<TableId>) -> Self {
        Self::new(std::io::stdout(), own_table)
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, own_table: Option<TableId>) -> Self {
        Self {
            out,
            own_table,
            presence: Arc::new(Mutex::new(Presence::new(own_table, Vec::new()))),
            last_status: None,
        }
    }

    pub fn presence(&self) -> Arc<Mutex<Presence>> {
        self.presence.clone()
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            warn!(error = %e, "Terminal write failed");
        }
    }
}

impl<W: Write> EventSink for TerminalSink<W> {
    fn chat_message(&mut self, msg: &ChatMessage) {
        let view = MessageView::render(msg, self.own_table, &self.presence.lock());
        let marker = if view.mine { ">" } else { "<" };
        self.line(&format!("{} [{}] {}", marker, view.header, view.body));
    }

    fn gift_alert(&mut self, order: &GiftOrder) {
        self.line(&format!(
            "🎁 Gift from {} (table {}): {} - {} won",
            order.from_nickname,
            order.from_table_id,
            order.menu_items.join(", "),
            format_amount(order.amount)
        ));
        if let Some(note) = order.message.as_deref().filter(|m| !m.is_empty()) {
            self.line(&format!("   \"{}\"", note));
        }
    }

    fn system_message(&mut self, msg: &SystemMessage) {
        self.line(&format!("* {} ({})", msg.message, msg.formatted_time));
    }

    fn status_changed(&mut self, status: ChannelStatus) {
        if self.last_status == Some(status) {
            return;
        }
        self.last_status = Some(status);
        self.line(&format!("-- {}", status.label()));
    }

    fn presence_changed(&mut self, presence: &Presence) {
        let changed = {
            let mut shared = self.presence.lock();
            let changed = shared.tables != presence.tables;
            *shared = presence.clone();
            changed
        };
        if changed {
            let names: Vec<String> = presence
                .others()
                .map(|t| format!("{} (#{})", t.display_name(), t.table_id))
                .collect();
            let list = if names.is_empty() { "nobody else".to_string() } else { names.join(", ") };
            self.line(&format!("-- {} online: {}", presence.total(), list));
        }
    }

    fn history_loaded(&mut self, count: usize) {
        if count == 0 {
            self.line("-- No messages yet. Say hello!");
        }
    }
}
