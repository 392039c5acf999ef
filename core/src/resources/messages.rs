//! Contact messages, read only.

use crate::api::AdminApi;
use crate::error::ApiError;
use crate::query::{QueryClient, QueryKey, QueryOptions};
use crate::types::ContactMessage;

pub fn key() -> QueryKey {
    QueryKey::new("messages")
}

pub struct Messages<'a> {
    api: &'a AdminApi,
    cache: &'a QueryClient,
}

impl<'a> Messages<'a> {
    pub fn new(api: &'a AdminApi, cache: &'a QueryClient) -> Self {
        Self { api, cache }
    }

    pub async fn list(&self) -> Result<Vec<ContactMessage>, ApiError> {
        let api = self.api.clone();
        self.cache
            .query(key(), QueryOptions::default(), move || {
                let api = api.clone();
                async move { api.fetch_messages().await }
            })
            .await
    }
}
