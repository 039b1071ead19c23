//! Telegram sends with automatic retry on transient failures.
//!
//! Both helpers go through [`crate::utils::retry_telegram_operation`]
//! (exponential backoff with jitter) and always use HTML parse mode.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, InputFile, Message, ParseMode, ReplyMarkup};

/// Send an HTML message with automatic retry on network failures.
///
/// # Errors
///
/// Returns the last Telegram error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    markup: Option<ReplyMarkup>,
) -> Result<Message> {
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot
            .send_message(chat_id, text.to_string())
            .parse_mode(ParseMode::Html);
        if let Some(markup) = markup.clone() {
            req = req.reply_markup(markup);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Send a photo with an HTML caption and inline buttons, retrying on
/// network failures.
///
/// An empty caption sends the photo alone, without parse mode.
///
/// # Errors
///
/// Returns the last Telegram error after all retries are exhausted.
pub async fn send_photo_resilient(
    bot: &Bot,
    chat_id: ChatId,
    photo: InputFile,
    caption: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.send_photo(chat_id, photo.clone());
        if let Some(markup) = markup.clone() {
            req = req.reply_markup(markup);
        }
        if !caption.is_empty() {
            req = req.caption(caption.to_string()).parse_mode(ParseMode::Html);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram photo error: {e}"))
    })
    .await
}
