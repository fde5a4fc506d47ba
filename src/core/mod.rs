//! Platform-agnostic core module - shared between the WASM page and the CLI

pub mod api;
pub mod basket;
pub mod events;
pub mod parser;
pub mod poller;
pub mod sink;
pub mod status;
pub mod supervisor;

pub use api::{Endpoints, GiftOrderReceipt, GiftOrderRequest, MessagesQuery, OutgoingMessage};
pub use basket::GiftBasket;
pub use events::{
    parse_table_id, ChatMessage, GiftAnnouncement, GiftOrder, InboundEvent, MessageId,
    OnlineTable, SystemMessage, TableId,
};
pub use parser::parse_frame;
pub use poller::{PollCursor, SeenMessages};
pub use sink::{dispatch, escape_html, EventSink, MessageView, Presence};
pub use status::ChannelStatus;
pub use supervisor::{Command, Generation, RetryPolicy, Supervisor, SupervisorEvent};
