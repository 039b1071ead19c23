/// Admin commands over the content cache
pub mod admin;
/// Rendering of conversation replies
pub mod delivery;
/// Command, message and callback handlers
pub mod handlers;
/// Telegram sends with retry
pub mod resilient;
/// Chat transport seam and its Telegram implementation
pub mod transport;

pub use transport::{ChatTransport, TelegramTransport, TransportError};
