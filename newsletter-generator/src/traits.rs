use crate::types::{ArticleReference, Result};
use async_trait::async_trait;

/// Trait for pulling article references from a content source (RSS feeds, APIs, etc.)
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Location the source is pulled from
    fn source_url(&self) -> &str;

    /// Fetch the references the source currently announces, in source order.
    /// Positions are assigned by the caller.
    async fn pull(&self) -> Result<Vec<ArticleReference>>;
}
