//! Portfolio projects.

use crate::api::AdminApi;
use crate::config::DETAIL_SCAN_LIMIT;
use crate::error::ApiError;
use crate::query::{Invalidate, OptimisticRemove, QueryClient, QueryKey, QueryOptions};
use crate::resources::{find_by_id, Skills};
use crate::types::{Paginated, Project, ProjectInput, Skill};

pub fn key() -> QueryKey {
    QueryKey::new("projects")
}

pub fn list_key(page: u32, limit: u32) -> QueryKey {
    key().page(page, limit)
}

pub fn detail_key(id: &str) -> QueryKey {
    key().with("detail").with(id)
}

pub struct Projects<'a> {
    api: &'a AdminApi,
    cache: &'a QueryClient,
}

impl<'a> Projects<'a> {
    pub fn new(api: &'a AdminApi, cache: &'a QueryClient) -> Self {
        Self { api, cache }
    }

    pub async fn list(&self, page: u32, limit: u32) -> Result<Paginated<Project>, ApiError> {
        let api = self.api.clone();
        self.cache
            .query(list_key(page, limit), QueryOptions::default(), move || {
                let api = api.clone();
                async move { api.fetch_projects(page, limit).await }
            })
            .await
    }

    /// Same page-1 scan as posts; projects past the first
    /// `DETAIL_SCAN_LIMIT` are reported missing.
    pub async fn by_id(&self, id: &str) -> Result<Option<Project>, ApiError> {
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
                    let page = api.fetch_projects(1, DETAIL_SCAN_LIMIT).await?;
                    Ok(find_by_id(page.data, &wanted))
                }
            })
            .await
    }

    /// Choices for the project form's skill picker.
    pub async fn skill_options(&self) -> Result<Vec<Skill>, ApiError> {
        Skills::new(self.api, self.cache).all().await
    }

    pub async fn create(&self, input: &ProjectInput) -> Result<Project, ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.create_project(input))
            .await
    }

    pub async fn update(&self, id: &str, input: &ProjectInput) -> Result<Project, ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.update_project(id, input))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.cache
            .mutate(&OptimisticRemove::new(key(), id), self.api.delete_project(id))
            .await
    }
}
