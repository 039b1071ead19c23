//! Per-user conversation state.
//!
//! Every variant carries exactly the data its screen needs. Nested screens
//! keep a snapshot of the screen they were opened from, so "back" can restore
//! it exactly.

use super::ConversationError;
use crate::content::IndexedCategory;
use crate::vk::{CarouselItem, Catalog};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    /// Main menu.
    #[default]
    Idle,
    CategoryMenu(CategoryMenu),
    ItemCarousel(ItemCarousel),
    SubItemCarousel(SubItemCarousel),
}

impl State {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CategoryMenu(_) => "category_menu",
            Self::ItemCarousel(_) => "item_carousel",
            Self::SubItemCarousel(_) => "sub_item_carousel",
        }
    }

    /// The category menu this state was reached from, if any.
    #[must_use]
    pub fn into_menu(self) -> Option<CategoryMenu> {
        match self {
            Self::Idle => None,
            Self::CategoryMenu(menu) => Some(menu),
            Self::ItemCarousel(carousel) => Some(carousel.menu),
            Self::SubItemCarousel(sub) => Some(sub.parent.menu),
        }
    }
}

/// The category selection screen of one catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMenu {
    pub catalog: Catalog,
    pub categories: Vec<IndexedCategory>,
    /// Cache generation of the category index the menu was built from.
    pub generation: Option<u64>,
}

impl CategoryMenu {
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&IndexedCategory> {
        self.categories.iter().find(|c| c.name == name)
    }
}

/// Browsing the items of one category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCarousel {
    pub menu: CategoryMenu,
    pub category: IndexedCategory,
    /// Items shown, at most the page limit.
    pub items: Vec<CarouselItem>,
    /// Items in the category before the page limit was applied.
    pub total: usize,
    pub cursor: usize,
    /// Cache generation of the item list the carousel was built from.
    pub generation: Option<u64>,
}

impl ItemCarousel {
    #[must_use]
    pub const fn catalog(&self) -> Catalog {
        self.menu.catalog
    }

    /// The item under the cursor.
    ///
    /// # Errors
    ///
    /// `ConversationError::StateCorruption` if the cursor is outside the list.
    pub fn current(&self) -> Result<&CarouselItem, ConversationError> {
        self.items.get(self.cursor).ok_or_else(|| {
            ConversationError::StateCorruption(format!(
                "item cursor {} outside {} items of category {:?}",
                self.cursor,
                self.items.len(),
                self.category.name
            ))
        })
    }
}

/// Browsing the sub-items of one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubItemCarousel {
    /// The item carousel to return to.
    pub parent: ItemCarousel,
    /// Identity of the item whose sub-items are shown.
    pub parent_item_id: i64,
    pub items: Vec<CarouselItem>,
    pub cursor: usize,
}

impl SubItemCarousel {
    #[must_use]
    pub const fn catalog(&self) -> Catalog {
        self.parent.catalog()
    }

    #[must_use]
    pub fn parent_item(&self) -> Option<&CarouselItem> {
        self.parent
            .items
            .iter()
            .find(|item| item.id == self.parent_item_id)
    }

    /// The sub-item under the cursor.
    ///
    /// # Errors
    ///
    /// `ConversationError::StateCorruption` if the cursor is outside the list.
    pub fn current(&self) -> Result<&CarouselItem, ConversationError> {
        self.items.get(self.cursor).ok_or_else(|| {
            ConversationError::StateCorruption(format!(
                "sub-item cursor {} outside {} sub-items of item {}",
                self.cursor,
                self.items.len(),
                self.parent_item_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> CategoryMenu {
        CategoryMenu {
            catalog: Catalog::Masters,
            categories: vec![IndexedCategory {
                id: 1,
                name: "Plumbing".into(),
                item_count: 0,
            }],
            generation: Some(1),
        }
    }

    fn empty_carousel() -> ItemCarousel {
        let menu = menu();
        ItemCarousel {
            category: menu.categories[0].clone(),
            menu,
            items: Vec::new(),
            total: 0,
            cursor: 0,
            generation: None,
        }
    }

    #[test]
    fn test_default_is_idle() {
        assert_eq!(State::default(), State::Idle);
        assert_eq!(State::default().into_menu(), None);
    }

    #[test]
    fn test_nested_states_keep_menu() {
        let sub = SubItemCarousel {
            parent: empty_carousel(),
            parent_item_id: 5,
            items: Vec::new(),
            cursor: 0,
        };
        assert_eq!(State::SubItemCarousel(sub).into_menu(), Some(menu()));
    }

    #[test]
    fn test_cursor_outside_list_is_corruption() {
        let carousel = empty_carousel();
        assert!(matches!(
            carousel.current(),
            Err(ConversationError::StateCorruption(_))
        ));
    }
}
