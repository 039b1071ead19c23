//! Conversation engine: per-user state machine over the cached content.
//!
//! The engine is transport-agnostic. It takes the current [`State`] and one
//! normalized [`Input`] and returns a [`Turn`]: the next state plus the
//! replies to deliver. Rendering them is the job of [`crate::bot`].

pub mod carousel;
pub mod engine;
pub mod resolver;
pub mod state;
pub mod views;

pub use engine::{ConversationEngine, EngineOptions};
pub use state::{CategoryMenu, ItemCarousel, State, SubItemCarousel};

use crate::content::ContentError;
use thiserror::Error;

/// Errors that abort a turn. Always caught by [`ConversationEngine::handle`].
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("Session state corrupted: {0}")]
    StateCorruption(String),
}

/// One normalized user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `/start` or `/help`.
    Start,
    /// Free text or a reply-keyboard button.
    Text(String),
    /// An inline button under a card.
    Callback(CallbackAction),
}

/// Which carousel a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Items,
    SubItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Next,
    Prev,
    /// The position indicator; does nothing.
    Position,
    /// Open the sub-items of the displayed item.
    Drill,
    /// Leave the carousel: to the category menu from items, to the parent
    /// item from sub-items.
    Back,
}

/// Payload of an inline button: `"<scope>:<action>:<item id>"`.
///
/// The item id is the card the button was attached to; a mismatch with the
/// session's current card marks the button as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackAction {
    pub scope: Scope,
    pub action: NavAction,
    pub item_id: i64,
}

impl CallbackAction {
    #[must_use]
    pub fn encode(&self) -> String {
        let scope = match self.scope {
            Scope::Items => "item",
            Scope::SubItems => "sub",
        };
        let action = match self.action {
            NavAction::Next => "next",
            NavAction::Prev => "prev",
            NavAction::Position => "pos",
            NavAction::Drill => "drill",
            NavAction::Back => "back",
        };
        format!("{scope}:{action}:{}", self.item_id)
    }

    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        let scope = match parts.next()? {
            "item" => Scope::Items,
            "sub" => Scope::SubItems,
            _ => return None,
        };
        let action = match parts.next()? {
            "next" => NavAction::Next,
            "prev" => NavAction::Prev,
            "pos" => NavAction::Position,
            "drill" => NavAction::Drill,
            "back" => NavAction::Back,
            _ => return None,
        };
        let item_id = parts.next()?.parse().ok()?;
        Some(Self {
            scope,
            action,
            item_id,
        })
    }
}

/// An inline button carrying an encoded [`CallbackAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub data: String,
}

impl InlineButton {
    #[must_use]
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            data: action.encode(),
        }
    }
}

/// Keyboard attached to a text reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Persistent reply keyboard, rows of button labels.
    Reply(Vec<Vec<String>>),
    Inline(Vec<Vec<InlineButton>>),
}

/// A carousel card: photo with HTML caption and inline controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub photo_url: Option<String>,
    pub caption: String,
    pub buttons: Vec<Vec<InlineButton>>,
}

/// Where a card goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// As a new message.
    New,
    /// In place of the message whose button was pressed.
    ReplaceOrigin,
}

/// One outbound effect of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// HTML text message.
    Text {
        text: String,
        keyboard: Option<Keyboard>,
    },
    Card { card: Card, placement: Placement },
    /// Short notice answering a button press.
    Notice(String),
}

impl Reply {
    pub fn text(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: None,
        }
    }
}

/// Result of processing one input.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub next: State,
    pub replies: Vec<Reply>,
}

impl Turn {
    #[must_use]
    pub const fn new(next: State, replies: Vec<Reply>) -> Self {
        Self { next, replies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_encoding() {
        let action = CallbackAction {
            scope: Scope::SubItems,
            action: NavAction::Back,
            item_id: -17,
        };
        assert_eq!(action.encode(), "sub:back:-17");
        assert_eq!(CallbackAction::parse("sub:back:-17"), Some(action));
    }

    #[test]
    fn test_callback_rejects_garbage() {
        assert_eq!(CallbackAction::parse("item:fly:1"), None);
        assert_eq!(CallbackAction::parse("menu:next:1"), None);
        assert_eq!(CallbackAction::parse("item:next"), None);
        assert_eq!(CallbackAction::parse("item:next:abc"), None);
    }
}
