//! Blog posts.

use crate::api::AdminApi;
use crate::config::DETAIL_SCAN_LIMIT;
use crate::error::ApiError;
use crate::query::{Invalidate, OptimisticRemove, QueryClient, QueryKey, QueryOptions};
use crate::resources::find_by_id;
use crate::types::{Paginated, Post, PostInput};

/// Root key; invalidating it covers every list page and detail entry.
pub fn key() -> QueryKey {
    QueryKey::new("posts")
}

pub fn list_key(page: u32, limit: u32) -> QueryKey {
    key().page(page, limit)
}

pub fn detail_key(id: &str) -> QueryKey {
    key().with("detail").with(id)
}

pub struct Posts<'a> {
    api: &'a AdminApi,
    cache: &'a QueryClient,
}

impl<'a> Posts<'a> {
    pub fn new(api: &'a AdminApi, cache: &'a QueryClient) -> Self {
        Self { api, cache }
    }

    pub async fn list(&self, page: u32, limit: u32) -> Result<Paginated<Post>, ApiError> {
        let api = self.api.clone();
        self.cache
            .query(list_key(page, limit), QueryOptions::default(), move || {
                let api = api.clone();
                async move { api.fetch_posts(page, limit).await }
            })
            .await
    }

    /// Find a post among the first `DETAIL_SCAN_LIMIT` posts.
    pub async fn by_id(&self, id: &str) -> Result<Option<Post>, ApiError> {
        if id.is_empty() {
            return Ok(None);
        }
        let api = self.api.clone();
        let wanted = id.to_string();
        self.cache
            .query(detail_key(id), QueryOptions::default(), move || {
                let api = api.clone();
                let wanted = wanted.clone();
                async move {
                    let page = api.fetch_posts(1, DETAIL_SCAN_LIMIT).await?;
                    Ok(find_by_id(page.data, &wanted))
                }
            })
            .await
    }

    pub async fn create(&self, input: &PostInput) -> Result<Post, ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.create_post(input))
            .await
    }

    pub async fn update(&self, id: &str, input: &PostInput) -> Result<Post, ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.update_post(id, input))
            .await
    }

    /// Remove the post from cached pages before the request; roll back if it
    /// fails.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.cache
            .mutate(&OptimisticRemove::new(key(), id), self.api.delete_post(id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::api::testing::{api, ok, page, post, ScriptedTransport};
    use crate::http::HttpMethod;

    #[tokio::test]
    async fn list_is_cached_per_page() {
        let transport = Arc::new(ScriptedTransport::default());
        let (api, _) = api(transport.clone());
        let cache = QueryClient::default();
        transport.push(200, ok(page(vec![post("1")], 1)));
        transport.push(200, ok(page(vec![], 1)));
        let posts = Posts::new(&api, &cache);

        let first = posts.list(1, 10).await.unwrap();
        let again = posts.list(1, 10).await.unwrap();
        posts.list(2, 10).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(transport.calls(), 2);
        assert_eq!(
            transport.requests.lock()[1].path,
            "http://cms.test/api/admin/posts?page=2&limit=10"
        );
    }

    #[tokio::test]
    async fn detail_scans_the_first_hundred() {
        let transport = Arc::new(ScriptedTransport::default());
        let (api, _) = api(transport.clone());
        let cache = QueryClient::default();
        transport.push(200, ok(page(vec![post("1"), post("2")], 2)));
        transport.push(200, ok(page(vec![post("1"), post("2")], 2)));
        let posts = Posts::new(&api, &cache);

        let found = posts.by_id("2").await.unwrap();
        let missing = posts.by_id("x").await.unwrap();

        assert_eq!(found.map(|p| p.id), Some("2".to_string()));
        assert_eq!(missing, None);
        assert!(transport.requests.lock()[0].path.ends_with("page=1&limit=100"));
        assert_eq!(cache.get_query_data::<Option<Post>>(&detail_key("x")), Some(None));
    }

    #[tokio::test]
    async fn empty_id_skips_network_and_cache() {
        let transport = Arc::new(ScriptedTransport::default());
        let (api, _) = api(transport.clone());
        let cache = QueryClient::default();

        assert_eq!(Posts::new(&api, &cache).by_id("").await.unwrap(), None);
        assert_eq!(transport.calls(), 0);
        assert!(cache.keys().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_restores_cached_page() {
        let transport = Arc::new(ScriptedTransport::default());
        let (api, _) = api(transport.clone());
        let cache = QueryClient::default();
        transport.push(200, ok(page(vec![post("1"), post("2"), post("3")], 3)));
        transport.push(500, json!({"message": "db down"}).to_string());
        let posts = Posts::new(&api, &cache);
        let before = posts.list(1, 10).await.unwrap();

        let err = posts.delete("2").await.unwrap_err();

        assert!(matches!(err, ApiError::HttpError { status: 500, ref body } if body == "db down"));
        assert_eq!(cache.get_query_data::<Paginated<Post>>(&list_key(1, 10)), Some(before));
        assert_eq!(transport.requests.lock()[1].method, HttpMethod::Delete);
    }

    #[tokio::test]
    async fn create_invalidates_posts_only() {
        let transport = Arc::new(ScriptedTransport::default());
        let (api, _) = api(transport.clone());
        let cache = QueryClient::default();
        cache.set_query_data(list_key(1, 10), &1).unwrap();
        cache.set_query_data(QueryKey::new("projects").page(1, 10), &1).unwrap();
        transport.push(200, ok(post("9")));

        let input = PostInput {
            title: "New".into(),
            content_markdown: "body".into(),
            ..PostInput::default()
        };
        let created = Posts::new(&api, &cache).create(&input).await.unwrap();

        assert_eq!(created.id, "9");
        assert_eq!(cache.is_stale(&list_key(1, 10)), Some(true));
        assert_eq!(cache.is_stale(&QueryKey::new("projects").page(1, 10)), Some(false));
    }
}
