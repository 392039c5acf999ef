//! Image uploads. Posts and projects embed images, so both are invalidated
//! after any change.

use crate::api::AdminApi;
use crate::error::ApiError;
use crate::query::{Invalidate, QueryClient};
use crate::resources::{posts, projects};
use crate::types::{ImageFile, ImageUploadResult};

pub struct Images<'a> {
    api: &'a AdminApi,
    cache: &'a QueryClient,
}

impl<'a> Images<'a> {
    pub fn new(api: &'a AdminApi, cache: &'a QueryClient) -> Self {
        Self { api, cache }
    }

    fn hooks() -> Invalidate {
        Invalidate::new(posts::key()).and(projects::key())
    }

    pub async fn upload(&self, file: &ImageFile) -> Result<ImageUploadResult, ApiError> {
        self.cache
            .mutate(&Self::hooks(), self.api.upload_image(file))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.cache
            .mutate(&Self::hooks(), self.api.delete_image(id))
            .await
    }
}
