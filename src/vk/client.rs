//! HTTP client for the VK API.
//!
//! Masters live in photo albums: every album is a craft, every photo is a
//! master card, photos attached to the card's comments are the master's works.
//! Partner shops live in market albums: every good is a shop card, extra
//! photos of the good are its sub-items.

use super::shop_info::ShopInfo;
use super::{CarouselItem, Catalog, Category, ContentSource, VkError};
use crate::config::{VK_API_BASE_URL, VK_HTTP_TIMEOUT_SECS};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const ERROR_TOO_MANY_REQUESTS: i64 = 6;
const ERROR_CAPTCHA: i64 = 14;

const PHOTOS_PAGE_SIZE: u32 = 1000;
const MARKET_PAGE_SIZE: u32 = 200;
const COMMENTS_PAGE_SIZE: u32 = 100;

/// VK API client bound to one community.
pub struct VkClient {
    http: reqwest::Client,
    token: String,
    group_id: i64,
    api_version: String,
    base_url: String,
}

impl VkClient {
    /// Creates a client for the community `group_id` (positive id).
    ///
    /// # Errors
    ///
    /// Returns `VkError::Network` if the HTTP client cannot be built.
    pub fn new(
        token: impl Into<String>,
        group_id: i64,
        api_version: impl Into<String>,
    ) -> Result<Self, VkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(VK_HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| VkError::Network(e.to_string()))?;
        Ok(Self {
            http,
            token: token.into(),
            group_id: group_id.abs(),
            api_version: api_version.into(),
            base_url: VK_API_BASE_URL.to_string(),
        })
    }

    /// Points the client at another API host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    const fn owner_id(&self) -> i64 {
        -self.group_id
    }

    /// Calls a VK method once. Every `ContentSource` method is exactly one
    /// call, so retries and throttling stay with the caller.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, VkError> {
        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("access_token", self.token.clone()));
        form.push(("v", self.api_version.clone()));

        debug!(method, "Calling VK API");
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| VkError::Network(e.without_url().to_string()))?;

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| VkError::Decode(e.without_url().to_string()))?;
        envelope.into_result()
    }

    async fn photo_albums(&self) -> Result<Vec<Category>, VkError> {
        let page: ItemsPage<Album> = self
            .call("photos.getAlbums", &[("owner_id", self.owner_id().to_string())])
            .await?;
        Ok(page.items.into_iter().map(Album::into_category).collect())
    }

    async fn market_albums(&self) -> Result<Vec<Category>, VkError> {
        let page: ItemsPage<Album> = self
            .call(
                "market.getAlbums",
                &[
                    ("owner_id", self.owner_id().to_string()),
                    ("count", "100".to_string()),
                ],
            )
            .await?;
        Ok(page.items.into_iter().map(Album::into_category).collect())
    }

    async fn album_photos(&self, album_id: i64) -> Result<Vec<CarouselItem>, VkError> {
        let page: ItemsPage<Photo> = self
            .call(
                "photos.get",
                &[
                    ("owner_id", self.owner_id().to_string()),
                    ("album_id", album_id.to_string()),
                    ("extended", "1".to_string()),
                    ("count", PHOTOS_PAGE_SIZE.to_string()),
                ],
            )
            .await?;
        Ok(page
            .items
            .into_iter()
            .map(|photo| master_card(photo, self.group_id))
            .collect())
    }

    async fn master_works(&self, photo_id: i64) -> Result<Vec<CarouselItem>, VkError> {
        let page: ItemsPage<Comment> = self
            .call(
                "photos.getComments",
                &[
                    ("owner_id", self.owner_id().to_string()),
                    ("photo_id", photo_id.to_string()),
                    ("count", COMMENTS_PAGE_SIZE.to_string()),
                ],
            )
            .await?;
        Ok(works_from_comments(page.items))
    }

    async fn market_goods(&self, album_id: i64) -> Result<Vec<CarouselItem>, VkError> {
        let page: ItemsPage<MarketItem> = self
            .call(
                "market.get",
                &[
                    ("owner_id", self.owner_id().to_string()),
                    ("album_id", album_id.to_string()),
                    ("extended", "1".to_string()),
                    ("count", MARKET_PAGE_SIZE.to_string()),
                ],
            )
            .await?;
        Ok(page
            .items
            .into_iter()
            .map(|item| shop_card(item, self.group_id))
            .collect())
    }

    async fn good_photos(&self, item_id: i64) -> Result<Vec<CarouselItem>, VkError> {
        let page: ItemsPage<MarketItem> = self
            .call(
                "market.getById",
                &[
                    ("item_ids", format!("{}_{item_id}", self.owner_id())),
                    ("extended", "1".to_string()),
                ],
            )
            .await?;
        Ok(page
            .items
            .into_iter()
            .next()
            .map(gallery_from_good)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ContentSource for VkClient {
    async fn categories(&self, catalog: Catalog) -> Result<Vec<Category>, VkError> {
        match catalog {
            Catalog::Masters => self.photo_albums().await,
            Catalog::Shops => self.market_albums().await,
        }
    }

    async fn items(
        &self,
        catalog: Catalog,
        category_id: i64,
    ) -> Result<Vec<CarouselItem>, VkError> {
        match catalog {
            Catalog::Masters => self.album_photos(category_id).await,
            Catalog::Shops => self.market_goods(category_id).await,
        }
    }

    async fn sub_items(
        &self,
        catalog: Catalog,
        item_id: i64,
    ) -> Result<Vec<CarouselItem>, VkError> {
        match catalog {
            Catalog::Masters => self.master_works(item_id).await,
            Catalog::Shops => self.good_photos(item_id).await,
        }
    }

    async fn description(&self) -> Result<Option<String>, VkError> {
        let groups: GroupsResponse = self
            .call(
                "groups.getById",
                &[
                    ("group_id", self.group_id.to_string()),
                    ("fields", "description".to_string()),
                ],
            )
            .await?;
        Ok(groups
            .into_groups()
            .into_iter()
            .next()
            .and_then(|g| g.description)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()))
    }
}

// --- Wire format ---

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ApiErrorBody>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, VkError> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        self.response
            .ok_or_else(|| VkError::Decode("neither response nor error present".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

impl From<ApiErrorBody> for VkError {
    fn from(body: ApiErrorBody) -> Self {
        match body.error_code {
            ERROR_TOO_MANY_REQUESTS => Self::TooManyRequests(body.error_msg),
            ERROR_CAPTCHA => Self::Captcha(body.error_msg),
            code => Self::Api {
                code,
                message: body.error_msg,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemsPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Album {
    id: i64,
    #[serde(default)]
    title: String,
}

impl Album {
    fn into_category(self) -> Category {
        let name = if self.title.trim().is_empty() {
            format!("Альбом {}", self.id)
        } else {
            self.title.trim().to_string()
        };
        Category { id: self.id, name }
    }
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    url: String,
    #[serde(default)]
    width: u64,
    #[serde(default)]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    sizes: Vec<PhotoSize>,
}

impl Photo {
    /// URL of the largest size by area; the last listed size wins ties.
    fn best_url(&self) -> Option<String> {
        self.sizes
            .iter()
            .max_by_key(|s| s.width * s.height)
            .map(|s| s.url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Comment {
    #[serde(default)]
    text: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(rename = "type")]
    kind: String,
    photo: Option<Photo>,
}

#[derive(Debug, Deserialize)]
struct Price {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MarketItem {
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    price: Option<Price>,
    thumb_photo: Option<String>,
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Group {
    description: Option<String>,
}

/// `groups.getById` returns a bare list before API 5.139 and an object after.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupsResponse {
    List(Vec<Group>),
    Wrapped { groups: Vec<Group> },
}

impl GroupsResponse {
    fn into_groups(self) -> Vec<Group> {
        match self {
            Self::List(groups) | Self::Wrapped { groups } => groups,
        }
    }
}

// --- Mapping ---

fn master_card(photo: Photo, group_id: i64) -> CarouselItem {
    CarouselItem {
        id: photo.id,
        photo_url: photo.best_url(),
        title: None,
        caption: photo.text.trim().to_string(),
        link: Some(format!("https://vk.com/photo-{group_id}_{}", photo.id)),
    }
}

fn works_from_comments(comments: Vec<Comment>) -> Vec<CarouselItem> {
    comments
        .into_iter()
        .flat_map(|comment| {
            let text = comment.text.trim().to_string();
            comment
                .attachments
                .into_iter()
                .filter(|a| a.kind == "photo")
                .filter_map(|a| a.photo)
                .map(move |photo| CarouselItem {
                    id: photo.id,
                    photo_url: photo.best_url(),
                    title: None,
                    caption: if photo.text.trim().is_empty() {
                        text.clone()
                    } else {
                        photo.text.trim().to_string()
                    },
                    link: None,
                })
        })
        .filter(|item| item.photo_url.is_some())
        .collect()
}

fn shop_card(item: MarketItem, group_id: i64) -> CarouselItem {
    let photo_url = item
        .photos
        .first()
        .and_then(Photo::best_url)
        .or_else(|| item.thumb_photo.clone());

    let mut lines = Vec::new();
    if let Some(price) = item.price.as_ref().filter(|p| !p.text.trim().is_empty()) {
        lines.push(format!("💰 {}", price.text.trim()));
    }
    let description = item.description.trim();
    if !description.is_empty() {
        lines.push(description.to_string());
    }
    let info = ShopInfo::parse(description);
    if !info.is_empty() {
        lines.push(info.to_lines().join("\n"));
    }

    let title = item.title.trim();
    CarouselItem {
        id: item.id,
        photo_url,
        title: Some(if title.is_empty() {
            "Магазин без названия".to_string()
        } else {
            title.to_string()
        }),
        caption: lines.join("\n\n"),
        link: Some(format!(
            "https://vk.com/market-{group_id}?w=product-{group_id}_{}",
            item.id
        )),
    }
}

fn gallery_from_good(item: MarketItem) -> Vec<CarouselItem> {
    let title = item.title.trim().to_string();
    item.photos
        .into_iter()
        .filter_map(|photo| {
            photo.best_url().map(|url| CarouselItem {
                id: photo.id,
                photo_url: Some(url),
                title: Some(title.clone()),
                caption: photo.text.trim().to_string(),
                link: None,
            })
        })
        .collect()
}
