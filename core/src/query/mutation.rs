//! Mutation lifecycle hooks.
//!
//! `on_mutate` runs before the request future is first polled and returns a
//! context, typically a snapshot. Exactly one of `on_success` / `on_error`
//! follows, then `on_settled`.

use std::future::Future;

use serde_json::Value;

use crate::error::ApiError;
use crate::query::cache::{CacheSnapshot, QueryClient};
use crate::query::key::QueryKey;
use crate::types::Paginated;

pub trait MutationHooks<T> {
    type Context;

    fn on_mutate(&self, cache: &QueryClient) -> Self::Context;

    fn on_success(&self, _cache: &QueryClient, _output: &T, _context: &Self::Context) {}

    fn on_error(&self, _cache: &QueryClient, _error: &ApiError, _context: &Self::Context) {}

    fn on_settled(&self, _cache: &QueryClient, _context: &Self::Context) {}
}

impl QueryClient {
    /// Run `request` between the lifecycle hooks and return its result.
    pub async fn mutate<T, H, Fut>(&self, hooks: &H, request: Fut) -> Result<T, ApiError>
    where
        H: MutationHooks<T> + ?Sized,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let context = hooks.on_mutate(self);
        let result = request.await;
        match &result {
            Ok(output) => hooks.on_success(self, output, &context),
            Err(error) => {
                tracing::warn!(%error, "mutation failed");
                hooks.on_error(self, error, &context);
            }
        }
        hooks.on_settled(self, &context);
        result
    }
}

/// Invalidate one or more prefixes once the request succeeds.
#[derive(Debug, Clone)]
pub struct Invalidate {
    prefixes: Vec<QueryKey>,
}

impl Invalidate {
    pub fn new(prefix: QueryKey) -> Self {
        Self {
            prefixes: vec![prefix],
        }
    }

    pub fn and(mut self, prefix: QueryKey) -> Self {
        self.prefixes.push(prefix);
        self
    }
}

impl<T> MutationHooks<T> for Invalidate {
    type Context = ();

    fn on_mutate(&self, _cache: &QueryClient) {}

    fn on_success(&self, cache: &QueryClient, _output: &T, _context: &()) {
        for prefix in &self.prefixes {
            cache.invalidate_queries(prefix);
        }
    }
}

/// Optimistically drop one item from every cached page under a prefix.
///
/// Before the request: cancel in-flight fetches under the prefix, snapshot
/// it, remove the item from each cached `Paginated` page and decrement
/// `total_data`. On failure the snapshot is restored. Either way the prefix
/// is invalidated afterwards so the cache reconciles with the server.
#[derive(Debug, Clone)]
pub struct OptimisticRemove {
    prefix: QueryKey,
    id: String,
}

impl OptimisticRemove {
    /// Items are matched on their `ID` field.
    pub fn new(prefix: QueryKey, id: impl Into<String>) -> Self {
        Self {
            prefix,
            id: id.into(),
        }
    }
}

impl<T> MutationHooks<T> for OptimisticRemove {
    type Context = CacheSnapshot;

    fn on_mutate(&self, cache: &QueryClient) -> CacheSnapshot {
        cache.cancel_queries(&self.prefix);
        let snapshot = cache.snapshot(&self.prefix);
        let id = Some(self.id.as_str());
        let pages = cache.set_queries_data::<Paginated<Value>, _>(&self.prefix, |mut page| {
            page.data
                .retain(|item| item.get("ID").and_then(Value::as_str) != id);
            page.meta.total_data = page.meta.total_data.saturating_sub(1);
            page
        });
        tracing::debug!(
            prefix = %self.prefix,
            id = %self.id,
            pages,
            captured = snapshot.len(),
            "applied optimistic removal"
        );
        snapshot
    }

    fn on_error(&self, cache: &QueryClient, _error: &ApiError, snapshot: &CacheSnapshot) {
        if snapshot.is_empty() {
            return;
        }
        tracing::warn!(prefix = %self.prefix, id = %self.id, "rolling back optimistic removal");
        cache.restore(snapshot);
    }

    fn on_settled(&self, cache: &QueryClient, _snapshot: &CacheSnapshot) {
        cache.invalidate_queries(&self.prefix);
    }
}
