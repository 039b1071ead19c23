//! Renders the replies of a turn through a [`ChatTransport`].
//!
//! Delivery never fails the turn: every transport error is logged and, where
//! possible, degraded to a simpler message.

use crate::bot::transport::ChatTransport;
use crate::config::{TELEGRAM_CAPTION_LIMIT, TELEGRAM_MESSAGE_LIMIT};
use crate::conversation::views::PHOTO_UNAVAILABLE;
use crate::conversation::{Card, InlineButton, Keyboard, Placement, Reply};
use crate::utils::{char_len, split_by_lines};
use teloxide::types::{ChatId, MessageId};
use tracing::{debug, warn};

/// Separates a button's callback data from the id of the bare photo sent
/// in front of a long-caption card.
const COMPANION_SEPARATOR: char = '|';

/// Where the replies of a turn go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub chat_id: ChatId,
    /// The message whose inline button started the turn.
    pub origin: Option<MessageId>,
    /// Photo shown above `origin` when the card was split in two.
    pub companion: Option<MessageId>,
}

impl Target {
    #[must_use]
    pub const fn chat(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            origin: None,
            companion: None,
        }
    }

    #[must_use]
    pub const fn button(chat_id: ChatId, origin: MessageId) -> Self {
        Self {
            chat_id,
            origin: Some(origin),
            companion: None,
        }
    }

    #[must_use]
    pub const fn with_companion(mut self, companion: Option<MessageId>) -> Self {
        self.companion = companion;
        self
    }
}

/// Splits pressed callback data into the action part and the companion
/// photo id appended by [`deliver`].
#[must_use]
pub fn split_companion(data: &str) -> (&str, Option<MessageId>) {
    match data.rsplit_once(COMPANION_SEPARATOR) {
        Some((action, id)) => match id.parse() {
            Ok(id) => (action, Some(MessageId(id))),
            Err(_) => (data, None),
        },
        None => (data, None),
    }
}

fn with_companion(buttons: Vec<Vec<InlineButton>>, photo: MessageId) -> Vec<Vec<InlineButton>> {
    buttons
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|button| InlineButton {
                    data: format!("{}{COMPANION_SEPARATOR}{}", button.data, photo.0),
                    ..button
                })
                .collect()
        })
        .collect()
}

/// Delivers `replies` in order.
///
/// Returns the notice to answer the button press with. Without an origin
/// message notices are sent as plain text instead.
pub async fn deliver(
    transport: &dyn ChatTransport,
    target: Target,
    replies: Vec<Reply>,
) -> Option<String> {
    let mut notice = None;
    for reply in replies {
        match reply {
            Reply::Text { text, keyboard } => {
                send_text(transport, target.chat_id, &text, keyboard).await;
            }
            Reply::Card { card, placement } => match (placement, target.origin) {
                (Placement::ReplaceOrigin, Some(origin)) => {
                    replace_card(transport, target, origin, card).await;
                }
                _ => send_card(transport, target.chat_id, card).await,
            },
            Reply::Notice(text) => {
                if target.origin.is_some() {
                    notice.get_or_insert(text);
                } else {
                    send_text(transport, target.chat_id, &text, None).await;
                }
            }
        }
    }
    notice
}

/// Sends text, split at line breaks if it exceeds the message limit. The
/// keyboard goes with the last part.
async fn send_text(
    transport: &dyn ChatTransport,
    chat_id: ChatId,
    text: &str,
    keyboard: Option<Keyboard>,
) {
    let parts = split_by_lines(text, TELEGRAM_MESSAGE_LIMIT);
    let last = parts.len().saturating_sub(1);
    let mut keyboard = keyboard;
    for (i, part) in parts.iter().enumerate() {
        let markup = if i == last { keyboard.take() } else { None };
        if let Err(e) = transport.send_text(chat_id, part, markup).await {
            warn!(chat_id = chat_id.0, error = %e, "Failed to send message");
        }
    }
}

fn inline(buttons: Vec<Vec<InlineButton>>) -> Option<Keyboard> {
    (!buttons.is_empty()).then_some(Keyboard::Inline(buttons))
}

/// Sends a card as a new message.
///
/// A caption over the Telegram limit goes in a separate text message after
/// the photo, together with the buttons, which then carry the photo's id so
/// the next card can remove both. If the photo cannot be sent the card
/// degrades to text.
async fn send_card(transport: &dyn ChatTransport, chat_id: ChatId, card: Card) {
    let Card {
        photo_url,
        caption,
        buttons,
    } = card;
    let Some(photo_url) = photo_url else {
        send_text(transport, chat_id, &caption, inline(buttons)).await;
        return;
    };

    let long = char_len(&caption) > TELEGRAM_CAPTION_LIMIT;
    let sent = if long {
        transport.send_photo(chat_id, &photo_url, "", Vec::new()).await
    } else {
        transport
            .send_photo(chat_id, &photo_url, &caption, buttons.clone())
            .await
    };

    match sent {
        Ok(_) if !long => {}
        Ok(photo) => {
            let buttons = with_companion(buttons, photo);
            send_text(transport, chat_id, &caption, inline(buttons)).await;
        }
        Err(e) => {
            warn!(chat_id = chat_id.0, %photo_url, error = %e, "Photo send failed, sending text instead");
            let text = format!("{PHOTO_UNAVAILABLE}\n\n{caption}");
            send_text(transport, chat_id, &text, inline(buttons)).await;
        }
    }
}

/// Shows a card in place of `origin`: edited in place when possible,
/// otherwise `origin` and its companion photo are deleted and the card sent
/// anew.
async fn replace_card(
    transport: &dyn ChatTransport,
    target: Target,
    origin: MessageId,
    card: Card,
) {
    let chat_id = target.chat_id;
    let editable = card
        .photo_url
        .as_deref()
        .filter(|_| target.companion.is_none())
        .filter(|_| char_len(&card.caption) <= TELEGRAM_CAPTION_LIMIT);
    if let Some(photo_url) = editable {
        match transport
            .edit_photo(chat_id, origin, photo_url, &card.caption, card.buttons.clone())
            .await
        {
            Ok(()) => return,
            Err(e) => {
                warn!(chat_id = chat_id.0, message_id = origin.0, error = %e, "Card edit failed, sending a new card");
            }
        }
    }

    for message_id in target.companion.into_iter().chain([origin]) {
        if let Err(e) = transport.delete_message(chat_id, message_id).await {
            debug!(chat_id = chat_id.0, message_id = message_id.0, error = %e, "Old card not deleted");
        }
    }
    send_card(transport, chat_id, card).await;
}
