//! Admin commands: cache inspection and forced refresh.

use crate::content::{CategoryIndex, ContentFetcher, EntryStatus, RefreshReport};
use crate::utils::escape_html;
use crate::vk::Catalog;
use std::fmt::Write;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Entries listed one by one in the status message.
const MAX_LISTED_ENTRIES: usize = 30;

const fn catalog_title(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Masters => "👷 Мастера",
        Catalog::Shops => "🏪 Магазины",
    }
}

/// `1ч 5м`, `3м 20с`, `45с`.
fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        format!("{hours}ч {minutes}м")
    } else if minutes > 0 {
        format!("{minutes}м {seconds}с")
    } else {
        format!("{seconds}с")
    }
}

fn index_line(catalog: Catalog, index: Option<&CategoryIndex>) -> String {
    match index {
        Some(index) => format!(
            "{}: {} категорий, {} записей",
            catalog_title(catalog),
            index.len(),
            index.total_items()
        ),
        None => format!("{}: ⚠️ индекс не загружен", catalog_title(catalog)),
    }
}

/// Text of `/cache_status`.
#[must_use]
pub fn format_cache_status(
    entries: &[EntryStatus],
    indexes: &[(Catalog, Option<CategoryIndex>)],
) -> String {
    let mut text = String::from("📊 <b>Состояние кэша</b>\n\n");
    let fresh = entries.iter().filter(|e| e.fresh).count();
    let _ = writeln!(
        text,
        "Записей: {} (актуальных: {fresh})",
        entries.len()
    );
    for (catalog, index) in indexes {
        let _ = writeln!(text, "{}", index_line(*catalog, index.as_ref()));
    }

    if entries.is_empty() {
        text.push_str("\nКэш пуст.");
        return text;
    }

    text.push_str("\n<b>Записи:</b>");
    for entry in entries.iter().take(MAX_LISTED_ENTRIES) {
        let expiry = if entry.fresh {
            format!(
                "истекает через {}",
                human_duration(entry.ttl.saturating_sub(entry.age))
            )
        } else {
            "устарела".to_string()
        };
        let _ = write!(
            text,
            "\n• <code>{}</code>: {} назад ({}), {expiry}",
            escape_html(&entry.key),
            human_duration(entry.age),
            entry.stored_at.format("%H:%M:%S UTC"),
        );
    }
    if entries.len() > MAX_LISTED_ENTRIES {
        let _ = write!(text, "\n… и ещё {}", entries.len() - MAX_LISTED_ENTRIES);
    }
    text
}

/// Text of `/update_cache`.
#[must_use]
pub fn format_refresh(report: &RefreshReport, swept: usize, elapsed: Duration) -> String {
    let mut text = format!(
        "🔄 <b>Кэш обновлён</b> за {}\n",
        human_duration(elapsed)
    );
    for (catalog, result) in &report.catalogs {
        let line = match result {
            Ok(index) => format!("✅ {}", index_line(*catalog, Some(index))),
            Err(e) => format!(
                "❌ {}: {}",
                catalog_title(*catalog),
                escape_html(&e.to_string())
            ),
        };
        let _ = writeln!(text, "{line}");
    }
    let description = if report.description_from_upstream {
        "из ВКонтакте"
    } else {
        "резервный текст"
    };
    let _ = writeln!(text, "📝 Описание: {description}");
    let _ = write!(text, "🧹 Удалено устаревших записей: {swept}");
    text
}

/// Current cache contents and index statistics.
pub async fn cache_status(fetcher: &ContentFetcher) -> String {
    let entries = fetcher.cache().snapshot();
    let mut indexes = Vec::with_capacity(Catalog::ALL.len());
    for catalog in Catalog::ALL {
        indexes.push((catalog, fetcher.cached_index(catalog).await));
    }
    format_cache_status(&entries, &indexes)
}

/// Forced refresh of both catalogs and the description, then a sweep.
pub async fn update_cache(fetcher: &ContentFetcher) -> String {
    let started = Instant::now();
    let report = fetcher.refresh_all(true).await;
    let swept = fetcher.cache().sweep().await;
    info!(ok = report.is_ok(), swept, "Manual cache refresh finished");
    format_refresh(&report, swept, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentError, IndexedCategory};
    use chrono::DateTime;

    fn index() -> CategoryIndex {
        CategoryIndex::new(vec![
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
        ])
    }

    fn entry(key: &str, age_secs: u64, fresh: bool) -> EntryStatus {
        EntryStatus {
            key: key.into(),
            stored_at: DateTime::from_timestamp(1_772_366_400, 0).unwrap_or_default(),
            age: Duration::from_secs(age_secs),
            ttl: Duration::from_secs(3600),
            fresh,
        }
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(Duration::from_secs(45)), "45с");
        assert_eq!(human_duration(Duration::from_secs(200)), "3м 20с");
        assert_eq!(human_duration(Duration::from_secs(3900)), "1ч 5м");
    }

    #[test]
    fn test_status_lists_entries_and_indexes() {
        let entries = vec![
            entry("categories(Masters,)", 600, true),
            entry("items(Masters, 1)", 4000, false),
        ];
        let indexes = vec![(Catalog::Masters, Some(index())), (Catalog::Shops, None)];
        let text = format_cache_status(&entries, &indexes);

        assert!(text.contains("Записей: 2 (актуальных: 1)"));
        assert!(text.contains("👷 Мастера: 2 категорий, 3 записей"));
        assert!(text.contains("🏪 Магазины: ⚠️ индекс не загружен"));
        assert!(text.contains("<code>categories(Masters,)</code>: 10м 0с назад (12:00:00 UTC), истекает через 50м 0с"));
        assert!(text.contains("<code>items(Masters, 1)</code>: 1ч 6м назад (12:00:00 UTC), устарела"));
    }

    #[test]
    fn test_status_caps_listing() {
        let entries: Vec<EntryStatus> = (0..MAX_LISTED_ENTRIES + 5)
            .map(|i| entry(&format!("items(Shops, {i})"), 1, true))
            .collect();
        let text = format_cache_status(&entries, &[]);
        assert!(text.ends_with("… и ещё 5"));
    }

    #[test]
    fn test_refresh_report() {
        let report = RefreshReport {
            catalogs: vec![
                (Catalog::Masters, Ok(index())),
                (
                    Catalog::Shops,
                    Err(ContentError::UpstreamUnavailable("categories: <timeout>".into())),
                ),
            ],
            description_from_upstream: false,
        };
        let text = format_refresh(&report, 4, Duration::from_secs(12));
        assert!(text.starts_with("🔄 <b>Кэш обновлён</b> за 12с"));
        assert!(text.contains("✅ 👷 Мастера: 2 категорий, 3 записей"));
        assert!(text.contains("❌ 🏪 Магазины: Content source unavailable: categories: &lt;timeout&gt;"));
        assert!(text.contains("резервный текст"));
        assert!(text.ends_with("Удалено устаревших записей: 4"));
    }
}
