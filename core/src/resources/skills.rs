//! Skill catalog. Listed through the public endpoint; written through admin.

use crate::api::AdminApi;
use crate::config::{CATALOG_STALE_TIME, DETAIL_SCAN_LIMIT};
use crate::error::ApiError;
use crate::query::{Invalidate, QueryClient, QueryKey, QueryOptions};
use crate::types::{Paginated, Skill, SkillInput};

pub fn key() -> QueryKey {
    QueryKey::new("skills")
}

pub fn list_key(page: u32, limit: u32) -> QueryKey {
    key().page(page, limit)
}

/// The full catalog used to populate selection lists.
pub fn all_key() -> QueryKey {
    key().with("all")
}

pub struct Skills<'a> {
    api: &'a AdminApi,
    cache: &'a QueryClient,
}

impl<'a> Skills<'a> {
    pub fn new(api: &'a AdminApi, cache: &'a QueryClient) -> Self {
        Self { api, cache }
    }

    pub async fn list(&self, page: u32, limit: u32) -> Result<Paginated<Skill>, ApiError> {
        let api = self.api.clone();
        self.cache
            .query(list_key(page, limit), QueryOptions::default(), move || {
                let api = api.clone();
                async move { api.fetch_skills(page, limit).await }
            })
            .await
    }

    /// Every skill on the first page of `DETAIL_SCAN_LIMIT`, kept for
    /// `CATALOG_STALE_TIME`.
    pub async fn all(&self) -> Result<Vec<Skill>, ApiError> {
        let api = self.api.clone();
        self.cache
            .query(
                all_key(),
                QueryOptions::with_stale_time(CATALOG_STALE_TIME),
                move || {
                    let api = api.clone();
                    async move { Ok(api.fetch_skills(1, DETAIL_SCAN_LIMIT).await?.data) }
                },
            )
            .await
    }

    pub async fn create(&self, input: &SkillInput) -> Result<Skill, ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.create_skill(input))
            .await
    }

    pub async fn update(&self, id: &str, input: &SkillInput) -> Result<Skill, ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.update_skill(id, input))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.delete_skill(id))
            .await
    }
}
