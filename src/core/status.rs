//! Shared channel status
//!
//! Used by the supervisor and by both the WASM and native status indicators.

use std::fmt;

/// Delivery status of the live-update channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Polling,
    Error,
}

impl ChannelStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelStatus::Connected)
    }

    /// Indicator text shown to the user
    pub fn label(&self) -> &'static str {
        match self {
            ChannelStatus::Connecting => "Connecting...",
            ChannelStatus::Connected => "Connected",
            ChannelStatus::Disconnected => "Disconnected - reconnecting...",
            ChannelStatus::Polling => "Disconnected - polling mode",
            ChannelStatus::Error => "Connection error",
        }
    }

    /// Indicator background as RGB
    pub fn color_rgb(&self) -> (u8, u8, u8) {
        match self {
            ChannelStatus::Connected => (100, 200, 100),
            ChannelStatus::Connecting => (200, 200, 100),
            ChannelStatus::Disconnected => (200, 100, 100),
            ChannelStatus::Polling | ChannelStatus::Error => (230, 170, 60),
        }
    }

    /// The indicator is hidden once the live channel is up
    pub fn indicator_visible(&self) -> bool {
        !self.is_connected()
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Disconnected => "disconnected",
            ChannelStatus::Polling => "polling",
            ChannelStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_hidden_only_when_connected() {
        assert!(!ChannelStatus::Connected.indicator_visible());
        assert!(ChannelStatus::Disconnected.indicator_visible());
        assert!(ChannelStatus::Polling.indicator_visible());
        assert!(ChannelStatus::Error.indicator_visible());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ChannelStatus::Polling.to_string(), "polling");
        assert_eq!(ChannelStatus::default().to_string(), "connecting");
    }
}
