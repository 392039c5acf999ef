//! Resource modules: one HTTP call per verb paired with one cache binding.
//!
//! # Overview
//! `Admin` owns the API handle and the query cache. Each accessor
//! (`admin.posts()`, `admin.skills()`, ...) returns a short-lived view that
//! borrows both, so every resource shares the same cache.
//!
//! # Design
//! - Reads go through `QueryClient::query` under the resource's key.
//! - Writes go through `QueryClient::mutate` with `Invalidate` or
//!   `OptimisticRemove` hooks on the resource's root key.
//! - Detail lookups scan the first `DETAIL_SCAN_LIMIT` items of page 1; ids
//!   past that ceiling resolve to `None`.

use std::sync::Arc;

use crate::api::AdminApi;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::query::{QueryClient, QueryConfig};
use crate::session::SessionStore;
use crate::types::Identified;

pub mod auth;
pub mod experiences;
pub mod images;
pub mod messages;
pub mod posts;
pub mod projects;
pub mod skills;

pub use auth::{guard, Auth, Navigation, Route};
pub use experiences::Experiences;
pub use images::Images;
pub use messages::Messages;
pub use posts::Posts;
pub use projects::Projects;
pub use skills::Skills;

/// Entry point for an operator session: API handle plus query cache.
#[derive(Clone)]
pub struct Admin {
    api: AdminApi,
    cache: QueryClient,
}

impl Admin {
    pub fn new(api: AdminApi, cache: QueryClient) -> Self {
        Self { api, cache }
    }

    /// Wire up a `reqwest` transport and an empty cache from `config`.
    pub fn from_config(
        config: &ClientConfig,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self, ApiError> {
        let api = AdminApi::from_config(config, session)?;
        Ok(Self::new(api, QueryClient::new(QueryConfig::from(config))))
    }

    pub fn api(&self) -> &AdminApi {
        &self.api
    }

    pub fn cache(&self) -> &QueryClient {
        &self.cache
    }

    pub fn auth(&self) -> Auth<'_> {
        Auth::new(&self.api, &self.cache)
    }

    pub fn posts(&self) -> Posts<'_> {
        Posts::new(&self.api, &self.cache)
    }

    pub fn projects(&self) -> Projects<'_> {
        Projects::new(&self.api, &self.cache)
    }

    pub fn skills(&self) -> Skills<'_> {
        Skills::new(&self.api, &self.cache)
    }

    pub fn experiences(&self) -> Experiences<'_> {
        Experiences::new(&self.api, &self.cache)
    }

    pub fn images(&self) -> Images<'_> {
        Images::new(&self.api, &self.cache)
    }

    pub fn messages(&self) -> Messages<'_> {
        Messages::new(&self.api, &self.cache)
    }
}

/// Linear scan used by the detail lookups.
pub(crate) fn find_by_id<T: Identified>(items: Vec<T>, id: &str) -> Option<T> {
    items.into_iter().find(|item| item.id() == id)
}
