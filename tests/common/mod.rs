//! In-memory community used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sfb_bot::config::CategorySort;
use sfb_bot::content::{ContentFetcher, FetcherOptions, RateLimiter, TtlCache};
use sfb_bot::conversation::views::Links;
use sfb_bot::conversation::{ConversationEngine, EngineOptions};
use sfb_bot::vk::{CarouselItem, Catalog, Category, ContentSource, VkError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub fn photo(id: i64) -> CarouselItem {
    CarouselItem {
        id,
        photo_url: Some(format!("https://img/{id}")),
        title: Some(format!("Карточка {id}")),
        caption: format!("Описание {id}"),
        link: None,
    }
}

/// Serves the same albums for both catalogs.
#[derive(Default)]
pub struct FakeCommunity {
    pub categories: Mutex<Vec<Category>>,
    pub items: Mutex<HashMap<i64, Vec<CarouselItem>>>,
    pub sub_items: Mutex<HashMap<i64, Vec<CarouselItem>>>,
    pub down: AtomicBool,
    pub item_calls: AtomicUsize,
}

impl FakeCommunity {
    /// Building materials (id 1): shops 101..=103, 101 with two photos and
    /// 102 with one. Tools (id 2): empty.
    pub async fn shops() -> Arc<Self> {
        let community = Arc::new(Self::default());
        *community.categories.lock().await = vec![
            Category {
                id: 1,
                name: "Стройматериалы".into(),
            },
            Category {
                id: 2,
                name: "Инструменты".into(),
            },
        ];
        community
            .items
            .lock()
            .await
            .insert(1, vec![photo(101), photo(102), photo(103)]);
        let mut sub_items = community.sub_items.lock().await;
        sub_items.insert(101, vec![photo(10100), photo(10101)]);
        sub_items.insert(102, vec![photo(10200)]);
        drop(sub_items);
        community
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), VkError> {
        if self.down.load(Ordering::SeqCst) {
            Err(VkError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentSource for FakeCommunity {
    async fn categories(&self, _catalog: Catalog) -> Result<Vec<Category>, VkError> {
        self.check()?;
        Ok(self.categories.lock().await.clone())
    }

    async fn items(
        &self,
        _catalog: Catalog,
        category_id: i64,
    ) -> Result<Vec<CarouselItem>, VkError> {
        self.check()?;
        self.item_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .items
            .lock()
            .await
            .get(&category_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn sub_items(
        &self,
        _catalog: Catalog,
        item_id: i64,
    ) -> Result<Vec<CarouselItem>, VkError> {
        self.check()?;
        Ok(self
            .sub_items
            .lock()
            .await
            .get(&item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn description(&self) -> Result<Option<String>, VkError> {
        self.check()?;
        Ok(Some("Строительный форум Беларуси".into()))
    }
}

pub fn engine(community: Arc<FakeCommunity>, max_items: usize) -> ConversationEngine {
    let fetcher = ContentFetcher::new(
        community,
        Arc::new(TtlCache::new()),
        Arc::new(RateLimiter::new(3, Duration::ZERO)),
        FetcherOptions {
            ttl: Duration::from_secs(3600),
            category_sort: CategorySort::Original,
            fallback_description: "Добро пожаловать".into(),
        },
    );
    ConversationEngine::new(
        Arc::new(fetcher),
        EngineOptions {
            max_items,
            links: Links {
                vk_group_url: "https://vk.com/sfb".into(),
                tg_channel_url: Some("https://t.me/sfb".into()),
                partner_topic_url: "https://vk.com/topic-1_2".into(),
                master_topic_url: "https://vk.com/topic-1_3".into(),
            },
        },
    )
}
