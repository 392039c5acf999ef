//! Client library for the portfolio CMS admin API.
//!
//! # Overview
//! An operator session manages posts, projects, skills, experiences, images
//! and contact messages over REST, and reads the public profile. The server
//! owns all data; this crate fetches, caches and mutates it.
//!
//! # Design
//! - `PortfolioClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network. A `Transport` does the round-trip.
//! - `AdminApi` joins client, transport and `SessionStore`: token lookup,
//!   validation, execution and envelope parsing per call.
//! - `QueryClient` is an explicit keyed cache with shared in-flight fetches,
//!   stale-while-revalidate, prefix invalidation and optimistic mutations.
//!   It starts empty and is cleared on logout.
//! - `resources::Admin` pairs every call with its cache binding.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod query;
pub mod resources;
pub mod session;
pub mod transport;
pub mod types;
pub mod validate;

pub use api::AdminApi;
pub use client::PortfolioClient;
pub use config::ClientConfig;
pub use error::{ApiError, FieldError};
pub use http::{HttpBody, HttpMethod, HttpRequest, HttpResponse};
pub use query::{QueryClient, QueryConfig, QueryKey, QueryOptions};
pub use resources::{guard, Admin, Navigation, Route};
pub use session::{FileStore, MemoryStore, SessionStore, Theme};
pub use transport::{ReqwestTransport, Transport};
pub use types::{
    AuthUser, ContactMessage, Experience, ExperienceInput, ImageFile, ImageUploadResult,
    LoginRequest, Paginated, PaginationMeta, Post, PostInput, Profile, Project, ProjectInput,
    Skill, SkillInput, UpdateEmailRequest, UpdatePasswordRequest, UpdateProfileRequest,
};
pub use validate::Validate;
