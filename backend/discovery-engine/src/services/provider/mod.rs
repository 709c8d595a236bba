use crate::error::ProviderError;
use crate::models::Item;
use async_trait::async_trait;

/// Source of feed content (e.g. an encyclopedia API).
///
/// Timeouts and retries are the implementation's concern.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn fetch_random_item(&self) -> Result<Item, ProviderError>;

    /// Ids of items related to `item_id`, at most `limit` of them.
    async fn fetch_related_ids(&self, item_id: &str, limit: usize) -> Result<Vec<String>, ProviderError>;

    /// Partial success is normal: ids that fail to load are simply absent
    /// from the result.
    async fn fetch_items_by_ids(&self, ids: &[String]) -> Result<Vec<Item>, ProviderError>;
}
