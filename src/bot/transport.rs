//! Chat transport: the Telegram calls a turn's replies are rendered with.

use crate::bot::resilient::{send_message_resilient, send_photo_resilient};
use crate::conversation::{InlineButton, Keyboard};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto,
    KeyboardButton, KeyboardMarkup, MessageId, ParseMode, ReplyMarkup,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Telegram delivery failed: {0}")]
    Delivery(String),
}

/// Outbound message operations used by [`crate::bot::delivery`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends an HTML text message.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageId, TransportError>;

    /// Sends a photo by URL with an HTML caption and inline buttons. Empty
    /// `caption` and `buttons` are left out.
    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo_url: &str,
        caption: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> Result<MessageId, TransportError>;

    /// Replaces photo, caption and buttons of a sent photo message.
    async fn edit_photo(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        photo_url: &str,
        caption: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> Result<(), TransportError>;

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError>;
}

fn delivery(e: impl std::fmt::Display) -> TransportError {
    TransportError::Delivery(e.to_string())
}

/// Renders a keyboard as Telegram markup.
#[must_use]
pub fn reply_markup(keyboard: &Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Reply(rows) => KeyboardMarkup::new(
            rows.iter()
                .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>()),
        )
        .resize_keyboard()
        .into(),
        Keyboard::Inline(rows) => inline_markup(rows).into(),
    }
}

#[must_use]
pub fn inline_markup(rows: &[Vec<InlineButton>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
            .collect::<Vec<_>>()
    }))
}

fn photo_file(photo_url: &str) -> Result<InputFile, TransportError> {
    reqwest::Url::parse(photo_url)
        .map(InputFile::url)
        .map_err(|e| delivery(format!("bad photo url {photo_url:?}: {e}")))
}

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let markup = keyboard.as_ref().map(reply_markup);
        send_message_resilient(&self.bot, chat_id, text, markup)
            .await
            .map(|msg| msg.id)
            .map_err(delivery)
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo_url: &str,
        caption: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> Result<MessageId, TransportError> {
        let photo = photo_file(photo_url)?;
        let markup = (!buttons.is_empty()).then(|| inline_markup(&buttons));
        send_photo_resilient(&self.bot, chat_id, photo, caption, markup)
            .await
            .map(|msg| msg.id)
            .map_err(delivery)
    }

    async fn edit_photo(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        photo_url: &str,
        caption: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> Result<(), TransportError> {
        let mut media = InputMediaPhoto::new(photo_file(photo_url)?);
        media.caption = Some(caption.to_string());
        media.parse_mode = Some(ParseMode::Html);

        self.bot
            .edit_message_media(chat_id, message_id, InputMedia::Photo(media))
            .reply_markup(inline_markup(&buttons))
            .await
            .map(|_| ())
            .map_err(delivery)
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        self.bot
            .delete_message(chat_id, message_id)
            .await
            .map(|_| ())
            .map_err(delivery)
    }
}
