//! StaticContext - 設定から作る固定のページコンテキスト

use url::Url;

use crate::domain::context::PageContext;
use crate::ports::context::ContextProvider;

/// Always returns the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    context: PageContext,
}

impl StaticContext {
    pub fn new(context: PageContext) -> Self {
        Self { context }
    }

    /// Context for a page URL: path and UTM campaign are derived from it.
    pub fn from_url(url: &Url) -> Self {
        Self::new(PageContext::from_url(url))
    }
}

impl ContextProvider for StaticContext {
    fn snapshot(&self) -> PageContext {
        self.context.clone()
    }
}
