use super::carousel;
use super::resolver;
use super::state::{CategoryMenu, ItemCarousel, State, SubItemCarousel};
use super::views::{self, Links, MenuAction};
use super::{
    CallbackAction, Card, ConversationError, Input, NavAction, Placement, Reply, Scope, Turn,
};
use crate::content::{ContentFetcher, IndexedCategory};
use crate::vk::{CarouselItem, Catalog};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type TurnResult = Result<Turn, ConversationError>;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Page limit of a carousel.
    pub max_items: usize,
    pub links: Links,
}

/// Routes `(state, input)` pairs to screens.
pub struct ConversationEngine {
    fetcher: Arc<ContentFetcher>,
    options: EngineOptions,
}

impl ConversationEngine {
    #[must_use]
    pub const fn new(fetcher: Arc<ContentFetcher>, options: EngineOptions) -> Self {
        Self { fetcher, options }
    }

    #[must_use]
    pub const fn fetcher(&self) -> &Arc<ContentFetcher> {
        &self.fetcher
    }

    /// Processes one input. Never fails: content errors keep the current
    /// state and answer with a retry-later message, a corrupted session is
    /// reset to the main menu.
    pub async fn handle(&self, state: State, input: Input) -> Turn {
        let from_button = matches!(input, Input::Callback(_));
        let previous = state.clone();

        match self.dispatch(state, input).await {
            Ok(turn) => {
                debug!(from = previous.name(), to = turn.next.name(), "Turn handled");
                turn
            }
            Err(ConversationError::Content(e)) => {
                warn!(state = previous.name(), error = %e, "Content unavailable for this turn");
                let reply = if from_button {
                    Reply::Notice(views::UPSTREAM_UNAVAILABLE.to_string())
                } else {
                    Reply::plain(views::UPSTREAM_UNAVAILABLE)
                };
                Turn::new(previous, vec![reply])
            }
            Err(ConversationError::StateCorruption(reason)) => {
                error!(state = previous.name(), %reason, "Session reset to main menu");
                Turn::new(
                    State::Idle,
                    vec![Reply::text(views::SESSION_RESET, views::main_keyboard())],
                )
            }
        }
    }

    async fn dispatch(&self, state: State, input: Input) -> TurnResult {
        match input {
            Input::Start => Ok(self.start().await),
            Input::Text(text) => self.on_text(state, &text).await,
            Input::Callback(action) => self.on_callback(state, action).await,
        }
    }

    async fn start(&self) -> Turn {
        let description = self.fetcher.top_level_description(false).await;
        Turn::new(
            State::Idle,
            vec![Reply::text(
                views::welcome(&description),
                views::main_keyboard(),
            )],
        )
    }

    // --- Text input ---

    async fn on_text(&self, state: State, text: &str) -> TurnResult {
        if let Some(action) = MenuAction::parse(text) {
            return self.on_menu(state, action).await;
        }

        match state.into_menu() {
            Some(menu) => self.pick_category(menu, text).await,
            None => Ok(Turn::new(
                State::Idle,
                vec![Reply::text(views::UNKNOWN_INPUT, views::main_keyboard())],
            )),
        }
    }

    async fn on_menu(&self, state: State, action: MenuAction) -> TurnResult {
        let links = &self.options.links;
        match action {
            MenuAction::Open(catalog) => self.open_menu(catalog).await,
            MenuAction::BackToCategories(catalog) => self.back_to_categories(state, catalog).await,
            MenuAction::MainMenu => Ok(idle(views::MAIN_MENU)),
            MenuAction::Wall => Ok(idle(&views::wall(links))),
            MenuAction::Suggest => Ok(idle(&views::suggest(links))),
            MenuAction::BecomePartner => Ok(idle(&views::become_partner(links))),
            MenuAction::JoinMasters => Ok(self.join_masters().await),
        }
    }

    async fn join_masters(&self) -> Turn {
        let index = match self.fetcher.category_index(Catalog::Masters, false).await {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(error = %e, "Master categories unavailable, showing instructions only");
                None
            }
        };
        idle(&views::join_masters(&self.options.links, index.as_ref()))
    }

    /// Category selection screen built from the cached index.
    async fn open_menu(&self, catalog: Catalog) -> TurnResult {
        let index = self.fetcher.category_index(catalog, false).await?;
        if index.is_empty() {
            info!(%catalog, "No categories to show");
            return Ok(Turn::new(
                State::Idle,
                vec![Reply::text(
                    views::no_categories(catalog),
                    views::main_keyboard(),
                )],
            ));
        }

        let menu = CategoryMenu {
            catalog,
            categories: index.all().to_vec(),
            generation: self.fetcher.index_generation(catalog).await,
        };
        Ok(menu_turn(menu))
    }

    /// Returns to the menu the session came from if the index behind it is
    /// unchanged, otherwise rebuilds it.
    async fn back_to_categories(&self, state: State, catalog: Catalog) -> TurnResult {
        if let Some(menu) = state.into_menu().filter(|m| m.catalog == catalog) {
            let current = self.fetcher.index_generation(catalog).await;
            if current.is_some() && current == menu.generation {
                return Ok(menu_turn(menu));
            }
            debug!(%catalog, "Category index changed since the menu was shown");
        }
        self.open_menu(catalog).await
    }

    async fn pick_category(&self, menu: CategoryMenu, text: &str) -> TurnResult {
        let picked = {
            let names = menu.names();
            resolver::resolve(text, &names)
                .and_then(|name| menu.find(name))
                .cloned()
        };

        match picked {
            Some(category) => self.open_category(menu, category).await,
            None => {
                debug!(catalog = %menu.catalog, text, "Text does not name a category");
                let keyboard = views::category_keyboard(&menu);
                Ok(Turn::new(
                    State::CategoryMenu(menu),
                    vec![Reply::text(views::CATEGORY_NOT_FOUND, keyboard)],
                ))
            }
        }
    }

    // --- Carousels ---

    /// Item list of a category, cut to the page limit, with the generation
    /// of the cached list and its full length.
    async fn load_items(
        &self,
        catalog: Catalog,
        category: &IndexedCategory,
    ) -> Result<(Vec<CarouselItem>, usize, Option<u64>), ConversationError> {
        let mut items = self.fetcher.list_items(catalog, category.id, false).await?;
        let generation = self.fetcher.items_generation(catalog, category.id).await;
        let total = items.len();
        if total > self.options.max_items {
            info!(
                %catalog,
                category = %category.name,
                total,
                shown = self.options.max_items,
                "Item list truncated to one page"
            );
            items.truncate(self.options.max_items);
        }
        Ok((items, total, generation))
    }

    async fn open_category(&self, menu: CategoryMenu, category: IndexedCategory) -> TurnResult {
        let catalog = menu.catalog;
        let (items, total, generation) = self.load_items(catalog, &category).await?;
        let carousel = ItemCarousel {
            menu,
            category,
            items,
            total,
            cursor: 0,
            generation,
        };

        if carousel.items.is_empty() {
            return Ok(empty_carousel(carousel));
        }

        let header = views::category_header(
            catalog,
            &carousel.category.name,
            carousel.items.len(),
            total,
        );
        let card = self.item_card(&carousel).await?;
        Ok(Turn::new(
            State::ItemCarousel(carousel),
            vec![
                Reply::text(header, views::carousel_keyboard(catalog)),
                Reply::Card {
                    card,
                    placement: Placement::New,
                },
            ],
        ))
    }

    async fn item_card(&self, carousel: &ItemCarousel) -> Result<Card, ConversationError> {
        let catalog = carousel.catalog();
        let item = carousel.current()?;
        let caption = views::item_caption(
            catalog,
            &carousel.category.name,
            item,
            (carousel.cursor + 1, carousel.items.len()),
            &self.options.links,
        );

        let mut extra = Vec::with_capacity(2);
        if let Some(count) = self.sub_item_count(catalog, item.id).await {
            extra.push(vec![views::drill_button(catalog, item.id, count)]);
        }
        extra.push(vec![views::back_to_categories_button(item.id)]);

        carousel::card(
            Scope::Items,
            &carousel.items,
            carousel.cursor,
            caption,
            extra,
        )
        .ok_or_else(|| corrupted("item card without an item"))
    }

    /// Number of sub-items, `None` when there are none or they cannot be
    /// fetched right now.
    async fn sub_item_count(&self, catalog: Catalog, item_id: i64) -> Option<usize> {
        match self.fetcher.list_sub_items(catalog, item_id, false).await {
            Ok(items) if !items.is_empty() => Some(items.len()),
            Ok(_) => None,
            Err(e) => {
                debug!(%catalog, item_id, error = %e, "Drill-down button hidden");
                None
            }
        }
    }

    fn sub_item_card(&self, sub: &SubItemCarousel) -> Result<Card, ConversationError> {
        let catalog = sub.catalog();
        let item = sub.current()?;
        let caption = views::sub_item_caption(
            catalog,
            &sub.parent.category.name,
            sub.parent_item(),
            item,
            (sub.cursor + 1, sub.items.len()),
        );
        carousel::card(
            Scope::SubItems,
            &sub.items,
            sub.cursor,
            caption,
            vec![vec![views::back_to_item_button(catalog, item.id)]],
        )
        .ok_or_else(|| corrupted("sub-item card without a sub-item"))
    }

    // --- Inline buttons ---

    async fn on_callback(&self, state: State, action: CallbackAction) -> TurnResult {
        match (state, action.scope) {
            (State::ItemCarousel(carousel), Scope::Items) => {
                self.on_item_button(carousel, action).await
            }
            (State::SubItemCarousel(sub), Scope::SubItems) => {
                self.on_sub_item_button(sub, action).await
            }
            (state, _) => Ok(stale(state, action)),
        }
    }

    async fn on_item_button(
        &self,
        mut carousel: ItemCarousel,
        action: CallbackAction,
    ) -> TurnResult {
        if carousel.items.is_empty() || carousel.current()?.id != action.item_id {
            return Ok(stale(State::ItemCarousel(carousel), action));
        }

        match action.action {
            NavAction::Next | NavAction::Prev => {
                let cursor = step(action.action, carousel.cursor, carousel.items.len());
                if cursor == carousel.cursor {
                    return Ok(Turn::new(State::ItemCarousel(carousel), Vec::new()));
                }
                carousel.cursor = cursor;
                let card = self.item_card(&carousel).await?;
                Ok(replace(State::ItemCarousel(carousel), card))
            }
            NavAction::Position => Ok(Turn::new(State::ItemCarousel(carousel), Vec::new())),
            NavAction::Drill => self.drill(carousel).await,
            NavAction::Back => {
                let catalog = carousel.catalog();
                self.back_to_categories(State::ItemCarousel(carousel), catalog)
                    .await
            }
        }
    }

    async fn drill(&self, carousel: ItemCarousel) -> TurnResult {
        let catalog = carousel.catalog();
        let parent_item_id = carousel.current()?.id;
        let mut items = self
            .fetcher
            .list_sub_items(catalog, parent_item_id, false)
            .await?;

        if items.is_empty() {
            return Ok(Turn::new(
                State::ItemCarousel(carousel),
                vec![Reply::Notice(views::no_sub_items(catalog).to_string())],
            ));
        }
        items.truncate(self.options.max_items);

        let sub = SubItemCarousel {
            parent: carousel,
            parent_item_id,
            items,
            cursor: 0,
        };
        let card = self.sub_item_card(&sub)?;
        Ok(replace(State::SubItemCarousel(sub), card))
    }

    async fn on_sub_item_button(
        &self,
        mut sub: SubItemCarousel,
        action: CallbackAction,
    ) -> TurnResult {
        if sub.current()?.id != action.item_id {
            return Ok(stale(State::SubItemCarousel(sub), action));
        }

        match action.action {
            NavAction::Next | NavAction::Prev => {
                let cursor = step(action.action, sub.cursor, sub.items.len());
                if cursor == sub.cursor {
                    return Ok(Turn::new(State::SubItemCarousel(sub), Vec::new()));
                }
                sub.cursor = cursor;
                let card = self.sub_item_card(&sub)?;
                Ok(replace(State::SubItemCarousel(sub), card))
            }
            NavAction::Position | NavAction::Drill => {
                Ok(Turn::new(State::SubItemCarousel(sub), Vec::new()))
            }
            NavAction::Back => self.restore_parent(sub).await,
        }
    }

    /// Back from sub-items to the item they belong to.
    ///
    /// The stored carousel comes back as it was while its item list is still
    /// the cached one. Otherwise the list is fetched again and the cursor put
    /// on the same item if it is still there, on the first item if not.
    async fn restore_parent(&self, sub: SubItemCarousel) -> TurnResult {
        let SubItemCarousel {
            parent,
            parent_item_id,
            ..
        } = sub;
        let catalog = parent.catalog();

        let current = self
            .fetcher
            .items_generation(catalog, parent.category.id)
            .await;
        let parent = if current.is_some() && current == parent.generation {
            parent
        } else {
            let (items, total, generation) = self.load_items(catalog, &parent.category).await?;
            let position = items.iter().position(|item| item.id == parent_item_id);
            info!(
                %catalog,
                category = %parent.category.name,
                item_id = parent_item_id,
                found = position.is_some(),
                "Item list changed, restoring cursor by item identity"
            );
            ItemCarousel {
                items,
                total,
                cursor: position.unwrap_or(0),
                generation,
                ..parent
            }
        };

        if parent.items.is_empty() {
            return Ok(empty_carousel(parent));
        }
        let card = self.item_card(&parent).await?;
        Ok(replace(State::ItemCarousel(parent), card))
    }
}

fn idle(text: &str) -> Turn {
    Turn::new(
        State::Idle,
        vec![Reply::text(text, views::main_keyboard())],
    )
}

fn menu_turn(menu: CategoryMenu) -> Turn {
    let text = views::menu_intro(menu.catalog);
    let keyboard = views::category_keyboard(&menu);
    Turn::new(State::CategoryMenu(menu), vec![Reply::text(text, keyboard)])
}

fn empty_carousel(carousel: ItemCarousel) -> Turn {
    let catalog = carousel.catalog();
    let text = views::empty_category(catalog, &carousel.category.name);
    Turn::new(
        State::ItemCarousel(carousel),
        vec![Reply::text(text, views::carousel_keyboard(catalog))],
    )
}

fn replace(next: State, card: Card) -> Turn {
    Turn::new(
        next,
        vec![Reply::Card {
            card,
            placement: Placement::ReplaceOrigin,
        }],
    )
}

fn stale(state: State, action: CallbackAction) -> Turn {
    debug!(state = state.name(), data = %action.encode(), "Stale button ignored");
    Turn::new(state, vec![Reply::Notice(views::STALE_BUTTON.to_string())])
}

const fn step(action: NavAction, cursor: usize, len: usize) -> usize {
    match action {
        NavAction::Next => carousel::next(cursor, len),
        NavAction::Prev => carousel::prev(cursor, len),
        NavAction::Position | NavAction::Drill | NavAction::Back => cursor,
    }
}

fn corrupted(reason: &str) -> ConversationError {
    ConversationError::StateCorruption(reason.to_string())
}
