//! Client-side request cache with invalidation and optimistic mutations.
//!
//! # Overview
//! - `QueryClient` memoizes reads by `QueryKey`, shares in-flight fetches,
//!   serves stale values while revalidating, and notifies observers.
//! - `QueryClient::mutate` runs a request future between `MutationHooks`
//!   callbacks; `Invalidate` and `OptimisticRemove` cover the common cases.

pub mod cache;
pub mod key;
pub mod mutation;

pub use cache::{CacheSnapshot, QueryClient, QueryConfig, QueryObserver, QueryOptions, QueryState};
pub use key::{KeySegment, QueryKey};
pub use mutation::{Invalidate, MutationHooks, OptimisticRemove};
