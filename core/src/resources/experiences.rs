//! Work experiences. The admin and public lists are cached separately.

use crate::api::AdminApi;
use crate::error::ApiError;
use crate::query::{Invalidate, QueryClient, QueryKey, QueryOptions};
use crate::types::{Experience, ExperienceInput};

pub fn key() -> QueryKey {
    QueryKey::new("experiences")
}

pub fn admin_key() -> QueryKey {
    key().with("admin")
}

pub fn public_key() -> QueryKey {
    key().with("public")
}

pub struct Experiences<'a> {
    api: &'a AdminApi,
    cache: &'a QueryClient,
}

impl<'a> Experiences<'a> {
    pub fn new(api: &'a AdminApi, cache: &'a QueryClient) -> Self {
        Self { api, cache }
    }

    pub async fn admin_list(&self) -> Result<Vec<Experience>, ApiError> {
        let api = self.api.clone();
        self.cache
            .query(admin_key(), QueryOptions::default(), move || {
                let api = api.clone();
                async move { api.fetch_admin_experiences().await }
            })
            .await
    }

    pub async fn public_list(&self) -> Result<Vec<Experience>, ApiError> {
        let api = self.api.clone();
        self.cache
            .query(public_key(), QueryOptions::default(), move || {
                let api = api.clone();
                async move { api.fetch_public_experiences().await }
            })
            .await
    }

    pub async fn create(&self, input: &ExperienceInput) -> Result<Experience, ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.create_experience(input))
            .await
    }

    pub async fn update(&self, id: &str, input: &ExperienceInput) -> Result<Experience, ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.update_experience(id, input))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.cache
            .mutate(&Invalidate::new(key()), self.api.delete_experience(id))
            .await
    }
}
