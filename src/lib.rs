//! SFB community bot: browses VK masters and partner shops from Telegram.

pub mod bot;
pub mod config;
pub mod content;
pub mod conversation;
pub mod utils;
pub mod vk;
