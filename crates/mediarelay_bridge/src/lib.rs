pub mod bridge;
pub mod memory;
pub mod telegram;

pub use bridge::{BridgeError, InboundEvent, MediaSource, MessagingTransport, StatusSink};
pub use memory::InMemoryTransport;
pub use telegram::{TelegramBotTransport, TelegramConfig};
