//! Cached, rate-limited read access to the community content.
//!
//! [`ContentFetcher`] is the only caller of [`ContentSource`]: every call
//! goes through the shared [`RateLimiter`] and is memoized in the shared
//! [`TtlCache`].

pub mod cache;
pub mod rate_limiter;

pub use cache::{cache_key, EntryStatus, TtlCache};
pub use rate_limiter::RateLimiter;

use crate::config::{
    CategorySort, VK_API_INITIAL_BACKOFF_MS, VK_API_MAX_BACKOFF_MS, VK_API_MAX_RETRIES,
};
use crate::vk::{CarouselItem, Catalog, Category, ContentSource, VkError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Failure to obtain content. Never cached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("Content source unavailable: {0}")]
    UpstreamUnavailable(String),
}

fn upstream(operation: &str, err: &VkError) -> ContentError {
    warn!(operation, error = %err, "VK call failed");
    ContentError::UpstreamUnavailable(format!("{operation}: {err}"))
}

/// A category together with the number of items it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedCategory {
    pub id: i64,
    pub name: String,
    pub item_count: usize,
}

/// Every category of one catalog with its item count, empty ones included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryIndex {
    categories: Vec<IndexedCategory>,
}

impl CategoryIndex {
    #[must_use]
    pub const fn new(categories: Vec<IndexedCategory>) -> Self {
        Self { categories }
    }

    /// All categories in display order.
    #[must_use]
    pub fn all(&self) -> &[IndexedCategory] {
        &self.categories
    }

    #[must_use]
    pub fn total_items(&self) -> usize {
        self.categories.iter().map(|c| c.item_count).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Outcome of a full refresh, one line per catalog.
#[derive(Debug)]
pub struct RefreshReport {
    pub catalogs: Vec<(Catalog, Result<CategoryIndex, ContentError>)>,
    pub description_from_upstream: bool,
}

impl RefreshReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.catalogs.iter().all(|(_, result)| result.is_ok())
    }
}

/// Tunables of the fetcher.
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub ttl: Duration,
    pub category_sort: CategorySort,
    /// Shown when the community description is empty or unavailable.
    pub fallback_description: String,
}

pub struct ContentFetcher {
    source: Arc<dyn ContentSource>,
    cache: Arc<TtlCache>,
    limiter: Arc<RateLimiter>,
    options: FetcherOptions,
}

impl ContentFetcher {
    #[must_use]
    pub fn new(
        source: Arc<dyn ContentSource>,
        cache: Arc<TtlCache>,
        limiter: Arc<RateLimiter>,
        options: FetcherOptions,
    ) -> Self {
        Self {
            source,
            cache,
            limiter,
            options,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    /// Runs one upstream call, retrying flood-control and network failures
    /// with jittered exponential backoff. Every attempt takes its own
    /// limiter slot, so retries keep the global call spacing.
    async fn upstream_call<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, ContentError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, VkError>>,
    {
        let min_interval = self.limiter.min_interval();
        let strategy = ExponentialBackoff::from_millis(VK_API_INITIAL_BACKOFF_MS)
            .max_delay(Duration::from_millis(VK_API_MAX_BACKOFF_MS))
            .map(jitter)
            .map(move |delay| delay.max(min_interval))
            .take(VK_API_MAX_RETRIES);

        let call = &call;
        let limiter = &self.limiter;
        RetryIf::spawn(
            strategy,
            move || async move {
                let _permit = limiter.acquire().await;
                call().await
            },
            |e: &VkError| {
                let retry = e.is_retryable();
                if retry {
                    warn!(operation, error = %e, "VK call failed, retrying");
                }
                retry
            },
        )
        .await
        .map_err(|e| upstream(operation, &e))
    }

    /// Categories of a catalog, in the configured order, names unique.
    ///
    /// # Errors
    ///
    /// `ContentError::UpstreamUnavailable` if VK cannot be reached and nothing
    /// fresh is cached.
    pub async fn list_categories(
        &self,
        catalog: Catalog,
        force_refresh: bool,
    ) -> Result<Vec<Category>, ContentError> {
        let key = cache_key("categories", (catalog,));
        self.cache
            .get_or_compute(&key, self.options.ttl, force_refresh, || async {
                let categories = self
                    .upstream_call("categories", || self.source.categories(catalog))
                    .await?;
                info!(%catalog, count = categories.len(), "Fetched categories");
                Ok(arrange(categories, self.options.category_sort))
            })
            .await
    }

    /// Cards of one category. An empty list is a valid result.
    ///
    /// # Errors
    ///
    /// `ContentError::UpstreamUnavailable` if VK cannot be reached and nothing
    /// fresh is cached.
    pub async fn list_items(
        &self,
        catalog: Catalog,
        category_id: i64,
        force_refresh: bool,
    ) -> Result<Vec<CarouselItem>, ContentError> {
        let key = items_key(catalog, category_id);
        self.cache
            .get_or_compute(&key, self.options.ttl, force_refresh, || async {
                let items = self
                    .upstream_call("items", || self.source.items(catalog, category_id))
                    .await?;
                info!(%catalog, category_id, count = items.len(), "Fetched items");
                Ok(items)
            })
            .await
    }

    /// Nested cards of one item. An empty list is a valid result.
    ///
    /// # Errors
    ///
    /// `ContentError::UpstreamUnavailable` if VK cannot be reached and nothing
    /// fresh is cached.
    pub async fn list_sub_items(
        &self,
        catalog: Catalog,
        item_id: i64,
        force_refresh: bool,
    ) -> Result<Vec<CarouselItem>, ContentError> {
        let key = cache_key("sub_items", (catalog, item_id));
        self.cache
            .get_or_compute(&key, self.options.ttl, force_refresh, || async {
                let items = self
                    .upstream_call("sub_items", || self.source.sub_items(catalog, item_id))
                    .await?;
                info!(%catalog, item_id, count = items.len(), "Fetched sub-items");
                Ok(items)
            })
            .await
    }

    /// Community description, or the configured fallback text.
    pub async fn top_level_description(&self, force_refresh: bool) -> String {
        let key = cache_key("description", ());
        let fetched: Result<Option<String>, ContentError> = self
            .cache
            .get_or_compute(&key, self.options.ttl, force_refresh, || async {
                self.upstream_call("description", || self.source.description())
                    .await
            })
            .await;

        match fetched {
            Ok(Some(description)) => description,
            Ok(None) | Err(_) => self.options.fallback_description.clone(),
        }
    }

    /// Every category of a catalog with its item count.
    ///
    /// Lists the categories, then the items of each category one after the
    /// other, and stores the whole index in one write. Any failure leaves the
    /// previous index in place.
    ///
    /// # Errors
    ///
    /// `ContentError::UpstreamUnavailable` if any of the underlying calls fails.
    pub async fn category_index(
        &self,
        catalog: Catalog,
        force_refresh: bool,
    ) -> Result<CategoryIndex, ContentError> {
        self.cache
            .get_or_compute(&index_key(catalog), self.options.ttl, force_refresh, || async {
                let categories = self.list_categories(catalog, force_refresh).await?;
                let mut indexed = Vec::with_capacity(categories.len());
                for category in categories {
                    let items = self
                        .list_items(catalog, category.id, force_refresh)
                        .await?;
                    indexed.push(IndexedCategory {
                        id: category.id,
                        name: category.name,
                        item_count: items.len(),
                    });
                }
                let index = CategoryIndex::new(indexed);
                info!(
                    %catalog,
                    categories = index.len(),
                    items = index.total_items(),
                    "Category index rebuilt"
                );
                Ok(index)
            })
            .await
    }

    /// Write generation of a category's cached item list.
    pub async fn items_generation(&self, catalog: Catalog, category_id: i64) -> Option<u64> {
        self.cache
            .generation(&items_key(catalog, category_id))
            .await
    }

    /// Write generation of a catalog's cached category index.
    pub async fn index_generation(&self, catalog: Catalog) -> Option<u64> {
        self.cache.generation(&index_key(catalog)).await
    }

    /// The cached category index, if fresh. Never calls upstream.
    pub async fn cached_index(&self, catalog: Catalog) -> Option<CategoryIndex> {
        self.cache.get_fresh(&index_key(catalog)).await
    }

    /// Rebuilds both category indexes and the description.
    pub async fn refresh_all(&self, force_refresh: bool) -> RefreshReport {
        let mut catalogs = Vec::with_capacity(Catalog::ALL.len());
        for catalog in Catalog::ALL {
            let result = self.category_index(catalog, force_refresh).await;
            if let Err(e) = &result {
                warn!(%catalog, error = %e, "Category index refresh failed");
            }
            catalogs.push((catalog, result));
        }

        let key = cache_key("description", ());
        self.top_level_description(force_refresh).await;
        let description_from_upstream = self
            .cache
            .get_fresh::<Option<String>>(&key)
            .await
            .flatten()
            .is_some();

        RefreshReport {
            catalogs,
            description_from_upstream,
        }
    }

    /// Pre-warms the cache now and refreshes it every `interval` until
    /// `shutdown` is cancelled.
    pub fn spawn_refresher(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut first = true;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.refresh_all(!first).await;
                        if report.is_ok() {
                            info!(preload = first, "Content cache refreshed");
                        }
                        first = false;
                    }
                }
            }
        })
    }
}

fn items_key(catalog: Catalog, category_id: i64) -> String {
    cache_key("items", (catalog, category_id))
}

fn index_key(catalog: Catalog) -> String {
    cache_key("category_index", (catalog,))
}

/// Drops repeated names (first wins) and applies the configured order.
fn arrange(categories: Vec<Category>, sort: CategorySort) -> Vec<Category> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Category> = categories
        .into_iter()
        .filter(|c| seen.insert(c.name.clone()))
        .collect();
    if sort == CategorySort::Alphabetical {
        unique.sort_by_key(|c| c.name.to_lowercase());
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk::MockContentSource;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn category(id: i64, name: &str) -> Category {
        Category {
            id,
            name: name.to_string(),
        }
    }

    fn card(id: i64) -> CarouselItem {
        CarouselItem {
            id,
            photo_url: Some(format!("https://img/{id}")),
            title: None,
            caption: format!("card {id}"),
            link: None,
        }
    }

    fn fetcher_with(source: MockContentSource, sort: CategorySort) -> ContentFetcher {
        spaced_fetcher(source, sort, Duration::ZERO)
    }

    fn spaced_fetcher(
        source: MockContentSource,
        sort: CategorySort,
        min_interval: Duration,
    ) -> ContentFetcher {
        ContentFetcher::new(
            Arc::new(source),
            Arc::new(TtlCache::new()),
            Arc::new(RateLimiter::new(3, min_interval)),
            FetcherOptions {
                ttl: Duration::from_secs(3600),
                category_sort: sort,
                fallback_description: "Добро пожаловать".to_string(),
            },
        )
    }

    fn record(starts: &Mutex<Vec<Instant>>) {
        if let Ok(mut starts) = starts.lock() {
            starts.push(Instant::now());
        }
    }

    #[tokio::test]
    async fn test_items_are_cached() {
        let mut source = MockContentSource::new();
        source
            .expect_items()
            .times(1)
            .returning(|_, _| Ok(vec![card(1), card(2)]));
        let fetcher = fetcher_with(source, CategorySort::Original);

        let first = fetcher.list_items(Catalog::Masters, 7, false).await;
        let second = fetcher.list_items(Catalog::Masters, 7, false).await;
        assert_eq!(first, second);
        assert_eq!(second.map(|items| items.len()), Ok(2));
    }

    #[tokio::test]
    async fn test_arguments_are_part_of_the_key() {
        let mut source = MockContentSource::new();
        source
            .expect_items()
            .times(3)
            .returning(|_, category_id| Ok(vec![card(category_id)]));
        let fetcher = fetcher_with(source, CategorySort::Original);

        assert_eq!(
            fetcher.list_items(Catalog::Masters, 1, false).await,
            Ok(vec![card(1)])
        );
        assert_eq!(
            fetcher.list_items(Catalog::Masters, 2, false).await,
            Ok(vec![card(2)])
        );
        assert_eq!(
            fetcher.list_items(Catalog::Shops, 1, false).await,
            Ok(vec![card(1)])
        );
    }

    #[tokio::test]
    async fn test_empty_category_is_success() {
        let mut source = MockContentSource::new();
        source
            .expect_sub_items()
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        let fetcher = fetcher_with(source, CategorySort::Original);

        assert_eq!(fetcher.list_sub_items(Catalog::Shops, 3, false).await, Ok(vec![]));
        assert_eq!(fetcher.list_sub_items(Catalog::Shops, 3, false).await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let mut source = MockContentSource::new();
        source
            .expect_categories()
            .times(2)
            .returning(|_| Err(VkError::Captcha("need captcha".into())));
        let fetcher = fetcher_with(source, CategorySort::Original);

        for _ in 0..2 {
            let result = fetcher.list_categories(Catalog::Masters, false).await;
            assert!(matches!(result, Err(ContentError::UpstreamUnavailable(_))));
        }
    }

    #[tokio::test]
    async fn test_categories_sorted_and_deduplicated() {
        let mut source = MockContentSource::new();
        source.expect_categories().returning(|_| {
            Ok(vec![
                category(1, "Сантехники"),
                category(2, "электрики"),
                category(3, "Плотники"),
                category(4, "Сантехники"),
            ])
        });

        let fetcher = fetcher_with(source, CategorySort::Alphabetical);
        let names: Vec<String> = fetcher
            .list_categories(Catalog::Masters, false)
            .await
            .map(|c| c.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["Плотники", "Сантехники", "электрики"]);
    }

    #[tokio::test]
    async fn test_original_order_is_kept() {
        let mut source = MockContentSource::new();
        source
            .expect_categories()
            .returning(|_| Ok(vec![category(2, "Б"), category(1, "А")]));

        let fetcher = fetcher_with(source, CategorySort::Original);
        let ids: Vec<i64> = fetcher
            .list_categories(Catalog::Shops, false)
            .await
            .map(|c| c.into_iter().map(|c| c.id).collect())
            .unwrap_or_default();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_description_falls_back() {
        let mut source = MockContentSource::new();
        source.expect_description().times(1).returning(|| Ok(None));
        let fetcher = fetcher_with(source, CategorySort::Original);
        assert_eq!(fetcher.top_level_description(false).await, "Добро пожаловать");
        // Empty answer is cached like any other
        assert_eq!(fetcher.top_level_description(false).await, "Добро пожаловать");

        let mut failing = MockContentSource::new();
        failing
            .expect_description()
            .returning(|| Err(VkError::Captcha("need captcha".into())));
        let fetcher = fetcher_with(failing, CategorySort::Original);
        assert_eq!(fetcher.top_level_description(false).await, "Добро пожаловать");
    }

    #[tokio::test]
    async fn test_description_from_upstream() {
        let mut source = MockContentSource::new();
        source
            .expect_description()
            .returning(|| Ok(Some("Строй Форум".to_string())));
        let fetcher = fetcher_with(source, CategorySort::Original);
        assert_eq!(fetcher.top_level_description(false).await, "Строй Форум");
    }

    #[tokio::test]
    async fn test_index_keeps_empty_categories() {
        let mut source = MockContentSource::new();
        source
            .expect_categories()
            .times(1)
            .returning(|_| Ok(vec![category(1, "Plumbing"), category(2, "Carpentry")]));
        source.expect_items().times(2).returning(|_, id| {
            Ok(if id == 1 {
                vec![card(10), card(11), card(12)]
            } else {
                Vec::new()
            })
        });
        let fetcher = fetcher_with(source, CategorySort::Original);

        let index = fetcher.category_index(Catalog::Masters, false).await;
        let index = index.unwrap_or_default();
        let counts: Vec<(&str, usize)> = index
            .all()
            .iter()
            .map(|c| (c.name.as_str(), c.item_count))
            .collect();
        assert_eq!(counts, vec![("Plumbing", 3), ("Carpentry", 0)]);
        assert_eq!(index.total_items(), 3);

        // Served from the cache, and the per-category lists were warmed too
        assert_eq!(fetcher.cached_index(Catalog::Masters).await.as_ref(), Some(&index));
        assert_eq!(fetcher.cached_index(Catalog::Shops).await, None);
        assert_eq!(fetcher.category_index(Catalog::Masters, false).await, Ok(index));
        assert_eq!(fetcher.list_items(Catalog::Masters, 2, false).await, Ok(vec![]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_failure_keeps_previous_index() {
        let mut source = MockContentSource::new();
        source
            .expect_categories()
            .returning(|_| Ok(vec![category(1, "Plumbing")]));
        let mut calls = 0;
        source.expect_items().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(vec![card(1)])
            } else {
                Err(VkError::Network("reset".into()))
            }
        });
        let fetcher = fetcher_with(source, CategorySort::Original);

        let first = fetcher.category_index(Catalog::Masters, false).await;
        assert!(first.is_ok());
        let forced = fetcher.category_index(Catalog::Masters, true).await;
        assert!(forced.is_err());
        assert_eq!(fetcher.category_index(Catalog::Masters, false).await, first);
    }

    #[tokio::test]
    async fn test_generation_tracks_forced_refresh() {
        let mut source = MockContentSource::new();
        source.expect_items().returning(|_, _| Ok(vec![card(1)]));
        let fetcher = fetcher_with(source, CategorySort::Original);

        assert_eq!(fetcher.items_generation(Catalog::Masters, 5).await, None);
        fetcher.list_items(Catalog::Masters, 5, false).await.ok();
        let before = fetcher.items_generation(Catalog::Masters, 5).await;
        fetcher.list_items(Catalog::Masters, 5, false).await.ok();
        assert_eq!(fetcher.items_generation(Catalog::Masters, 5).await, before);
        fetcher.list_items(Catalog::Masters, 5, true).await.ok();
        assert!(fetcher.items_generation(Catalog::Masters, 5).await > before);
    }

    #[tokio::test]
    async fn test_refresh_all_reports_each_catalog() {
        let mut source = MockContentSource::new();
        source.expect_categories().returning(|catalog| match catalog {
            Catalog::Masters => Ok(vec![category(1, "Плотники")]),
            Catalog::Shops => Err(VkError::Api {
                code: 15,
                message: "market disabled".into(),
            }),
        });
        source.expect_items().returning(|_, _| Ok(vec![card(1)]));
        source
            .expect_description()
            .returning(|| Ok(Some("СФБ".to_string())));
        let fetcher = fetcher_with(source, CategorySort::Original);

        let report = fetcher.refresh_all(true).await;
        assert!(!report.is_ok());
        assert!(report.description_from_upstream);
        assert!(matches!(report.catalogs[0], (Catalog::Masters, Ok(_))));
        assert!(matches!(report.catalogs[1], (Catalog::Shops, Err(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_keep_call_spacing() {
        let interval = Duration::from_millis(350);
        let starts = Arc::new(Mutex::new(Vec::new()));
        let mut source = MockContentSource::new();
        let recorded = Arc::clone(&starts);
        source
            .expect_categories()
            .times(VK_API_MAX_RETRIES + 1)
            .returning(move |_| {
                record(&recorded);
                Err(VkError::TooManyRequests("Too many requests per second".into()))
            });
        let recorded = Arc::clone(&starts);
        source.expect_items().times(1).returning(move |_, _| {
            record(&recorded);
            Ok(Vec::new())
        });
        let fetcher = spaced_fetcher(source, CategorySort::Original, interval);

        let failed = fetcher.list_categories(Catalog::Masters, true).await;
        assert!(matches!(failed, Err(ContentError::UpstreamUnavailable(_))));
        // The next caller is spaced from the last retry, not the first attempt
        assert_eq!(fetcher.list_items(Catalog::Masters, 1, true).await, Ok(vec![]));

        let times = starts.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(times.len(), VK_API_MAX_RETRIES + 2);
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= interval, "gap was {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let mut source = MockContentSource::new();
        let mut calls = 0;
        source.expect_items().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(VkError::Network("connection reset".into()))
            } else {
                Ok(vec![card(1)])
            }
        });
        let fetcher = fetcher_with(source, CategorySort::Original);

        assert_eq!(
            fetcher.list_items(Catalog::Shops, 4, false).await,
            Ok(vec![card(1)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let mut source = MockContentSource::new();
        source
            .expect_sub_items()
            .times(1)
            .returning(|_, _| Err(VkError::Api {
                code: 15,
                message: "Access denied".into(),
            }));
        let fetcher = fetcher_with(source, CategorySort::Original);

        let started = Instant::now();
        let result = fetcher.list_sub_items(Catalog::Shops, 9, false).await;
        assert!(matches!(result, Err(ContentError::UpstreamUnavailable(_))));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
