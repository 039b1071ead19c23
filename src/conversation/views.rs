//! User-facing texts, button labels and keyboards.

use super::resolver::{self, decorate};
use super::state::CategoryMenu;
use super::{CallbackAction, InlineButton, Keyboard, NavAction, Scope};
use crate::content::{CategoryIndex, IndexedCategory};
use crate::utils::{escape_attr, escape_html};
use crate::vk::{CarouselItem, Catalog};

pub const SHOPS: &str = "Магазины-партнеры СФБ";
pub const MASTERS: &str = "База мастеров СФБ";
pub const WALL: &str = "Стена сообщества";
pub const SUGGEST: &str = "Предложить запись";
pub const BECOME_PARTNER: &str = "Стать магазином-партнером";
pub const JOIN_MASTERS: &str = "Попасть в базу мастеров";

pub const BACK_TO_MAIN: &str = "◀️ Назад в главное меню";
pub const BACK_TO_MASTER_CATEGORIES: &str = "◀️ НАЗАД К КАТЕГОРИЯМ МАСТЕРОВ ◀️";
pub const BACK_TO_SHOP_CATEGORIES: &str = "◀️ НАЗАД К КАТЕГОРИЯМ МАГАЗИНОВ ◀️";

/// Short forms of the way back to the main menu.
const BACK: &str = "◀️ Назад";
const BACK_PLAIN: &str = "Назад";

/// Older labels still sent by clients with a cached keyboard.
const LEGACY_BACK_TO_MASTER_CATEGORIES: &str = "◀️ Вернуться к категориям мастеров";
const LEGACY_BACK_TO_SHOP_CATEGORIES: &str = "◀️ Вернуться к категориям магазинов";

pub const CATEGORY_NOT_FOUND: &str =
    "⚠️ Извините, такой категории не найдено. Выберите категорию из списка ниже.";
pub const UPSTREAM_UNAVAILABLE: &str =
    "⚠️ Не удалось загрузить данные из ВКонтакте. Пожалуйста, попробуйте позже.";
pub const SESSION_RESET: &str = "⚠️ Что-то пошло не так. Возвращаемся в главное меню.";
pub const STALE_BUTTON: &str = "Эта карточка устарела. Откройте категорию заново.";
pub const UNKNOWN_INPUT: &str = "Пожалуйста, выберите раздел с помощью кнопок меню 👇";
pub const MAIN_MENU: &str = "🏠 Главное меню. Выберите раздел 👇";
pub const PHOTO_UNAVAILABLE: &str = "⚠️ Не удалось загрузить фото.";

const GROUP_LINK_TEXT: &str = "Перейти в основной паблик СФБ ВКонтакте";

/// Links to the community's outside pages.
#[derive(Debug, Clone)]
pub struct Links {
    pub vk_group_url: String,
    pub tg_channel_url: Option<String>,
    pub partner_topic_url: String,
    pub master_topic_url: String,
}

/// A reply-keyboard button recognized in any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Open(Catalog),
    Wall,
    Suggest,
    BecomePartner,
    JoinMasters,
    MainMenu,
    BackToCategories(Catalog),
}

const MENU_LABELS: &[(&str, MenuAction)] = &[
    (SHOPS, MenuAction::Open(Catalog::Shops)),
    (MASTERS, MenuAction::Open(Catalog::Masters)),
    (WALL, MenuAction::Wall),
    (SUGGEST, MenuAction::Suggest),
    (BECOME_PARTNER, MenuAction::BecomePartner),
    (JOIN_MASTERS, MenuAction::JoinMasters),
    (BACK_TO_MAIN, MenuAction::MainMenu),
    (BACK, MenuAction::MainMenu),
    (BACK_PLAIN, MenuAction::MainMenu),
    (
        BACK_TO_MASTER_CATEGORIES,
        MenuAction::BackToCategories(Catalog::Masters),
    ),
    (
        LEGACY_BACK_TO_MASTER_CATEGORIES,
        MenuAction::BackToCategories(Catalog::Masters),
    ),
    (
        BACK_TO_SHOP_CATEGORIES,
        MenuAction::BackToCategories(Catalog::Shops),
    ),
    (
        LEGACY_BACK_TO_SHOP_CATEGORIES,
        MenuAction::BackToCategories(Catalog::Shops),
    ),
];

impl MenuAction {
    /// Recognizes a menu button, with or without its decorations.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let labels: Vec<&str> = MENU_LABELS.iter().map(|(label, _)| *label).collect();
        let label = resolver::resolve(text, &labels)?;
        MENU_LABELS
            .iter()
            .find(|(known, _)| *known == label)
            .map(|(_, action)| *action)
    }
}

// --- Keyboards ---

#[must_use]
pub fn main_keyboard() -> Keyboard {
    Keyboard::Reply(vec![
        vec![SHOPS.to_string(), MASTERS.to_string()],
        vec![WALL.to_string()],
        vec![SUGGEST.to_string()],
        vec![BECOME_PARTNER.to_string(), JOIN_MASTERS.to_string()],
    ])
}

/// Marker glyph shown in front of a category button.
#[must_use]
pub fn category_marker(catalog: Catalog, name: &str) -> Option<&'static str> {
    const SHOP_MARKERS: &[(&[&str], &str)] = &[
        (&["строй", "материал"], "🧱"),
        (&["инстр"], "🔨"),
        (&["мебел"], "🪑"),
        (&["сад", "огород"], "🌱"),
        (&["сантех", "водосн"], "🚿"),
        (&["электр", "освещ"], "🔌"),
        (&["хозтовар", "для дома"], "🏡"),
    ];

    match catalog {
        Catalog::Masters => None,
        Catalog::Shops => {
            let lower = name.to_lowercase();
            let marker = SHOP_MARKERS
                .iter()
                .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
                .map_or("🏪", |(_, marker)| *marker);
            Some(marker)
        }
    }
}

/// Button label of a category: master crafts show their size, shop
/// categories their marker.
#[must_use]
pub fn category_label(catalog: Catalog, category: &IndexedCategory) -> String {
    match catalog {
        Catalog::Masters => decorate(&category.name, None, Some(category.item_count)),
        Catalog::Shops => decorate(
            &category.name,
            category_marker(catalog, &category.name),
            None,
        ),
    }
}

/// One category per row, then the way back to the main menu.
#[must_use]
pub fn category_keyboard(menu: &CategoryMenu) -> Keyboard {
    let mut rows: Vec<Vec<String>> = menu
        .categories
        .iter()
        .map(|c| vec![category_label(menu.catalog, c)])
        .collect();
    rows.push(vec![BACK_TO_MAIN.to_string()]);
    Keyboard::Reply(rows)
}

#[must_use]
pub const fn back_to_categories_label(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Masters => BACK_TO_MASTER_CATEGORIES,
        Catalog::Shops => BACK_TO_SHOP_CATEGORIES,
    }
}

/// Reply keyboard shown while a carousel is open.
#[must_use]
pub fn carousel_keyboard(catalog: Catalog) -> Keyboard {
    Keyboard::Reply(vec![
        vec![back_to_categories_label(catalog).to_string()],
        vec![BACK_TO_MAIN.to_string()],
    ])
}

fn callback(label: String, scope: Scope, action: NavAction, item_id: i64) -> InlineButton {
    InlineButton::new(
        label,
        CallbackAction {
            scope,
            action,
            item_id,
        },
    )
}

/// Button opening the sub-items of an item, with their count.
#[must_use]
pub fn drill_button(catalog: Catalog, item_id: i64, count: usize) -> InlineButton {
    let label = match catalog {
        Catalog::Masters => format!("📸 Посмотреть работы мастера [{count}]"),
        Catalog::Shops => format!("🖼 Все фото магазина [{count}]"),
    };
    callback(label, Scope::Items, NavAction::Drill, item_id)
}

#[must_use]
pub fn back_to_categories_button(item_id: i64) -> InlineButton {
    callback(
        "📂 К категориям".to_string(),
        Scope::Items,
        NavAction::Back,
        item_id,
    )
}

#[must_use]
pub fn back_to_item_button(catalog: Catalog, sub_item_id: i64) -> InlineButton {
    let label = match catalog {
        Catalog::Masters => "◀️ Назад к мастеру",
        Catalog::Shops => "◀️ Назад к магазину",
    };
    callback(label.to_string(), Scope::SubItems, NavAction::Back, sub_item_id)
}

// --- Texts ---

fn link(url: &str, text: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape_attr(url), escape_html(text))
}

#[must_use]
pub fn welcome(description: &str) -> String {
    format!(
        "{}\n\nВыберите раздел в меню ниже 👇",
        escape_html(description)
    )
}

#[must_use]
pub const fn menu_intro(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Masters => {
            "👷‍♂️ <b>Открытая база мастеров и спецтехники</b>\n\nВыберите категорию из списка:"
        }
        Catalog::Shops => "🏪 <b>Магазины-партнеры СФБ</b>\n\nВыберите категорию магазинов:",
    }
}

#[must_use]
pub const fn no_categories(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Masters => "⚠️ К сожалению, категории мастеров не найдены.",
        Catalog::Shops => {
            "⚠️ Категории магазинов пока не добавлены.\n\nВы можете стать первым партнером, \
             нажав на кнопку «Стать магазином-партнером»."
        }
    }
}

#[must_use]
pub fn empty_category(catalog: Catalog, name: &str) -> String {
    let name = escape_html(name);
    match catalog {
        Catalog::Masters => format!(
            "📸 <b>Категория {name}</b>\n\n⚠️ В этой категории пока нет мастеров.\n\n\
             Вы можете стать первым мастером в этой категории, нажав на кнопку \
             «{JOIN_MASTERS}» в главном меню."
        ),
        Catalog::Shops => format!(
            "🏪 <b>Категория {name}</b>\n\n⚠️ В этой категории пока нет магазинов.\n\n\
             Вы можете стать первым партнером в этой категории, нажав на кнопку \
             «{BECOME_PARTNER}» в главном меню."
        ),
    }
}

/// Text sent before the first card of a category.
#[must_use]
pub fn category_header(catalog: Catalog, name: &str, shown: usize, total: usize) -> String {
    let (emoji, noun) = match catalog {
        Catalog::Masters => ("📸", "Найдено мастеров"),
        Catalog::Shops => ("🏪", "Найдено магазинов"),
    };
    let mut text = format!(
        "{emoji} <b>Категория {}</b>\n\n{noun}: {total}.",
        escape_html(name)
    );
    if shown < total {
        text.push_str(&format!(
            "\n⚠️ Показаны первые {shown} из {total}. Остальные смотрите в группе ВКонтакте."
        ));
    }
    text
}

#[must_use]
pub const fn no_sub_items(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Masters => "У этого мастера пока нет работ",
        Catalog::Shops => "У этого магазина нет дополнительных фото",
    }
}

fn body_or_placeholder(item: &CarouselItem, placeholder: String) -> String {
    if item.caption.trim().is_empty() {
        placeholder
    } else {
        escape_html(item.caption.trim())
    }
}

/// HTML caption of an item card.
#[must_use]
pub fn item_caption(
    catalog: Catalog,
    category: &str,
    item: &CarouselItem,
    position: (usize, usize),
    links: &Links,
) -> String {
    let (index, len) = position;
    let header = match &item.title {
        Some(title) => format!(
            "<b>{} {}</b>\n<i>{}</i>",
            category_marker(catalog, category).unwrap_or("📸"),
            escape_html(title),
            escape_html(category)
        ),
        None => format!("<b>📸 {}</b>", escape_html(category)),
    };
    let body = body_or_placeholder(item, format!("Фото {index} из {len}"));

    let mut caption = format!("{header}\n\n{body}\n");
    if let Some(url) = &item.link {
        caption.push_str(&format!("\n🔗 {}", link(url, "Открыть во ВКонтакте")));
    }
    caption.push_str(&format!("\n🌐 {}", link(&links.vk_group_url, GROUP_LINK_TEXT)));
    caption
}

/// HTML caption of a sub-item card.
#[must_use]
pub fn sub_item_caption(
    catalog: Catalog,
    category: &str,
    parent: Option<&CarouselItem>,
    item: &CarouselItem,
    position: (usize, usize),
) -> String {
    let (index, len) = position;
    let header = match catalog {
        Catalog::Masters => format!("<b>🖼 Работы мастера</b>\n<i>{}</i>", escape_html(category)),
        Catalog::Shops => {
            let title = parent
                .and_then(|p| p.title.as_deref())
                .unwrap_or(category);
            format!("<b>🖼 {}</b>", escape_html(title))
        }
    };
    let placeholder = match catalog {
        Catalog::Masters => format!("Работа {index} из {len}"),
        Catalog::Shops => format!("Фото {index} из {len}"),
    };
    format!("{header}\n\n{}", body_or_placeholder(item, placeholder))
}

#[must_use]
pub fn wall(links: &Links) -> String {
    let target = links.tg_channel_url.as_ref().map_or_else(
        || link(&links.vk_group_url, "Стена сообщества ВКонтакте"),
        |url| link(url, "Стена сообщества в Telegram"),
    );
    format!(
        "📰 <b>Стена сообщества</b>\n\n\
         Посетите нашу стену сообщества, чтобы быть в курсе всех новостей:\n{target}"
    )
}

#[must_use]
pub fn suggest(links: &Links) -> String {
    format!(
        "📝 <b>Предложить запись в сообществе</b>\n\n\
         Эта функция находится в разработке. Пока вы можете предложить запись \
         напрямую в сообществе ВКонтакте:\n{}",
        link(&links.vk_group_url, GROUP_LINK_TEXT)
    )
}

#[must_use]
pub fn become_partner(links: &Links) -> String {
    format!(
        "🤝 <b>Стать магазином-партнером</b>\n\n\
         Чтобы стать магазином-партнером, перейдите по ссылке ниже и оставьте заявку:\n{}",
        link(&links.partner_topic_url, "Оставить заявку в ВКонтакте")
    )
}

/// Application instructions, followed by every master category when known.
#[must_use]
pub fn join_masters(links: &Links, index: Option<&CategoryIndex>) -> String {
    let mut text = format!(
        "📋 <b>Попасть в базу мастеров</b>\n\n\
         Чтобы попасть в базу мастеров, перейдите по ссылке ниже и оставьте заявку:\n{}",
        link(&links.master_topic_url, "Оставить заявку в ВКонтакте")
    );
    if let Some(index) = index.filter(|i| !i.is_empty()) {
        text.push_str("\n\n<b>Доступные категории мастеров:</b>");
        for category in index.all() {
            text.push_str(&format!("\n• {}", escape_html(&category.name)));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> Links {
        Links {
            vk_group_url: "https://vk.com/sfb".into(),
            tg_channel_url: None,
            partner_topic_url: "https://vk.com/topic-1_2".into(),
            master_topic_url: "https://vk.com/topic-1_3".into(),
        }
    }

    #[test]
    fn test_menu_labels_with_and_without_emoji() {
        assert_eq!(
            MenuAction::parse("База мастеров СФБ"),
            Some(MenuAction::Open(Catalog::Masters))
        );
        assert_eq!(
            MenuAction::parse("👷‍♂️ База мастеров СФБ"),
            Some(MenuAction::Open(Catalog::Masters))
        );
        assert_eq!(
            MenuAction::parse("🤝 Стать магазином-партнером"),
            Some(MenuAction::BecomePartner)
        );
        assert_eq!(MenuAction::parse("📰 Стена сообщества"), Some(MenuAction::Wall));
        assert_eq!(
            MenuAction::parse("◀️ Вернуться к категориям мастеров"),
            Some(MenuAction::BackToCategories(Catalog::Masters))
        );
        assert_eq!(MenuAction::parse(BACK_TO_MAIN), Some(MenuAction::MainMenu));
        assert_eq!(MenuAction::parse("◀️ Назад"), Some(MenuAction::MainMenu));
        assert_eq!(MenuAction::parse("Назад"), Some(MenuAction::MainMenu));
        assert_eq!(MenuAction::parse("назад"), Some(MenuAction::MainMenu));
        assert_eq!(MenuAction::parse("Сантехники [3]"), None);
    }

    #[test]
    fn test_shop_markers() {
        assert_eq!(category_marker(Catalog::Shops, "Стройматериалы"), Some("🧱"));
        assert_eq!(category_marker(Catalog::Shops, "Электрика и освещение"), Some("🔌"));
        assert_eq!(category_marker(Catalog::Shops, "Товары для дома"), Some("🏡"));
        assert_eq!(category_marker(Catalog::Shops, "Разное"), Some("🏪"));
        assert_eq!(category_marker(Catalog::Masters, "Стройматериалы"), None);
    }

    #[test]
    fn test_category_labels_resolve_back() {
        let shop = IndexedCategory {
            id: 1,
            name: "Инструменты".into(),
            item_count: 4,
        };
        let craft = IndexedCategory {
            id: 2,
            name: "Плиточники".into(),
            item_count: 0,
        };
        let shop_label = category_label(Catalog::Shops, &shop);
        let craft_label = category_label(Catalog::Masters, &craft);
        assert_eq!(shop_label, "🔨 Инструменты");
        assert_eq!(craft_label, "Плиточники [0]");

        let keys = ["Инструменты", "Плиточники"];
        assert_eq!(resolver::resolve(&shop_label, &keys), Some("Инструменты"));
        assert_eq!(resolver::resolve(&craft_label, &keys), Some("Плиточники"));
    }

    #[test]
    fn test_item_caption_escapes_upstream_text() {
        let item = CarouselItem {
            id: 1,
            photo_url: None,
            title: None,
            caption: "Плитка <дёшево> & быстро".into(),
            link: None,
        };
        let caption = item_caption(Catalog::Masters, "Плиточники", &item, (1, 3), &links());
        assert!(caption.starts_with("<b>📸 Плиточники</b>"));
        assert!(caption.contains("Плитка &lt;дёшево&gt; &amp; быстро"));
        assert!(caption.contains("<a href=\"https://vk.com/sfb\">"));
    }

    #[test]
    fn test_empty_caption_placeholder() {
        let item = CarouselItem {
            id: 1,
            photo_url: None,
            title: Some("СтройДвор".into()),
            caption: " ".into(),
            link: Some("https://vk.com/market-1?w=product-1_5".into()),
        };
        let caption = item_caption(Catalog::Shops, "Стройматериалы", &item, (2, 3), &links());
        assert!(caption.starts_with("<b>🧱 СтройДвор</b>\n<i>Стройматериалы</i>"));
        assert!(caption.contains("Фото 2 из 3"));
        assert!(caption.contains("Открыть во ВКонтакте"));
    }

    #[test]
    fn test_header_mentions_truncation() {
        assert!(!category_header(Catalog::Masters, "X", 3, 3).contains("Показаны первые"));
        assert!(category_header(Catalog::Masters, "X", 50, 120).contains("Показаны первые 50 из 120"));
    }

    #[test]
    fn test_join_masters_lists_empty_categories() {
        let index = CategoryIndex::new(vec![
            IndexedCategory {
                id: 1,
                name: "Plumbing".into(),
                item_count: 3,
            },
            IndexedCategory {
                id: 2,
                name: "Carpentry".into(),
                item_count: 0,
            },
        ]);
        let text = join_masters(&links(), Some(&index));
        assert!(text.contains("• Plumbing"));
        assert!(text.contains("• Carpentry"));
        assert!(!join_masters(&links(), None).contains("Доступные категории"));
    }
}
