//! External catalog source trait

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::ModelCatalogEntry;

/// A non-provider supplier of catalog entries (a pricing feed, a static
/// manifest, a remote model index).
///
/// Sources are fetched alongside providers on every refresh. A failing source
/// is logged and skipped; it never fails the refresh.
#[async_trait]
pub trait ModelSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_models(&self) -> Result<Vec<ModelCatalogEntry>, LlmError>;
}
