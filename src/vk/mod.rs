//! VK community content: data types and the upstream seam.
//!
//! Everything the bot shows comes from one VK community. [`ContentSource`]
//! is the only way to reach it; [`VkClient`] is the HTTP implementation.

pub mod client;
pub mod shop_info;

pub use client::VkClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned by the VK API or while talking to it.
#[derive(Debug, Error)]
pub enum VkError {
    #[error("VK API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("VK rate limit exceeded: {0}")]
    TooManyRequests(String),
    #[error("VK requested a captcha: {0}")]
    Captcha(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected VK response: {0}")]
    Decode(String),
}

impl VkError {
    /// Whether repeating the same call later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TooManyRequests(_) | Self::Network(_))
    }
}

/// The two browsable catalogs of the community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Catalog {
    /// Photo albums, one album per craft.
    Masters,
    /// Market albums of partner shops.
    Shops,
}

impl Catalog {
    pub const ALL: [Self; 2] = [Self::Masters, Self::Shops];

    /// Stable identifier used in cache keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Masters => "masters",
            Self::Shops => "shops",
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named album in one of the catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// One displayable card: a photo (if any) with its caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselItem {
    /// VK object id, used as the item identity and sort key.
    pub id: i64,
    pub photo_url: Option<String>,
    pub title: Option<String>,
    pub caption: String,
    pub link: Option<String>,
}

/// Read-only access to the community content.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Lists the albums of a catalog in upstream order.
    async fn categories(&self, catalog: Catalog) -> Result<Vec<Category>, VkError>;

    /// Lists the cards of one album.
    async fn items(&self, catalog: Catalog, category_id: i64)
        -> Result<Vec<CarouselItem>, VkError>;

    /// Lists the nested cards of one item (a master's works, a good's photos).
    async fn sub_items(&self, catalog: Catalog, item_id: i64)
        -> Result<Vec<CarouselItem>, VkError>;

    /// Returns the community description, `None` when it is empty.
    async fn description(&self) -> Result<Option<String>, VkError>;
}
