//! Carousel navigation: cursor arithmetic and the controls under a card.
//!
//! Nothing here holds state. Movement past either end is a no-op so repeated
//! taps on a boundary control are harmless.

use super::{CallbackAction, Card, InlineButton, NavAction, Scope};
use crate::vk::CarouselItem;

pub const PREV_LABEL: &str = "◀️";
pub const NEXT_LABEL: &str = "▶️";

/// Cursor after a "next" tap.
#[must_use]
pub const fn next(cursor: usize, len: usize) -> usize {
    if len > 0 && cursor < len - 1 {
        cursor + 1
    } else {
        cursor
    }
}

/// Cursor after a "previous" tap.
#[must_use]
pub const fn prev(cursor: usize, _len: usize) -> usize {
    if cursor > 0 {
        cursor - 1
    } else {
        cursor
    }
}

/// Which navigation controls a card shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub prev: bool,
    pub next: bool,
    /// `(cursor + 1, len)`, absent for an empty list.
    pub position: Option<(usize, usize)>,
}

#[must_use]
pub const fn controls(cursor: usize, len: usize) -> Controls {
    if len == 0 {
        return Controls {
            prev: false,
            next: false,
            position: None,
        };
    }
    Controls {
        prev: cursor > 0,
        next: cursor < len - 1,
        position: Some((cursor + 1, len)),
    }
}

impl Controls {
    /// The navigation row: `◀️  i/N  ▶️`, arrows only where movement is possible.
    #[must_use]
    pub fn row(&self, scope: Scope, item_id: i64) -> Vec<InlineButton> {
        let button = |label: String, action: NavAction| {
            InlineButton::new(
                label,
                CallbackAction {
                    scope,
                    action,
                    item_id,
                },
            )
        };

        let mut row = Vec::with_capacity(3);
        if self.prev {
            row.push(button(PREV_LABEL.to_string(), NavAction::Prev));
        }
        if let Some((position, len)) = self.position {
            row.push(button(format!("{position}/{len}"), NavAction::Position));
        }
        if self.next {
            row.push(button(NEXT_LABEL.to_string(), NavAction::Next));
        }
        row
    }
}

/// Assembles the card for `items[cursor]`: photo, caption, navigation row
/// followed by `extra_rows`. `None` if the cursor does not point at an item.
#[must_use]
pub fn card(
    scope: Scope,
    items: &[CarouselItem],
    cursor: usize,
    caption: String,
    extra_rows: Vec<Vec<InlineButton>>,
) -> Option<Card> {
    let item = items.get(cursor)?;
    let nav = controls(cursor, items.len()).row(scope, item.id);

    let mut buttons = Vec::with_capacity(extra_rows.len() + 1);
    if !nav.is_empty() {
        buttons.push(nav);
    }
    buttons.extend(extra_rows.into_iter().filter(|row| !row.is_empty()));

    Some(Card {
        photo_url: item.photo_url.clone(),
        caption,
        buttons,
    })
}
