//! Login, logout, profile updates and the navigation guard.
//!
//! # Design
//! Authentication is the presence of a stored token and nothing else: no
//! expiry check, no refresh. A rejected token surfaces as
//! `ApiError::Unauthorized` from whichever call used it.

use crate::api::AdminApi;
use crate::error::ApiError;
use crate::query::{QueryClient, QueryKey, QueryOptions};
use crate::session::{self, SessionStore};
use crate::types::{
    AuthUser, LoginRequest, Profile, UpdateEmailRequest, UpdatePasswordRequest,
    UpdateProfileRequest,
};

pub fn profile_key() -> QueryKey {
    QueryKey::new("profile")
}

pub struct Auth<'a> {
    api: &'a AdminApi,
    cache: &'a QueryClient,
}

impl<'a> Auth<'a> {
    pub fn new(api: &'a AdminApi, cache: &'a QueryClient) -> Self {
        Self { api, cache }
    }

    /// Exchange credentials for a token and persist the session.
    pub async fn login(&self, input: &LoginRequest) -> Result<AuthUser, ApiError> {
        let data = self.api.login(input).await?;
        session::save_login(self.api.session(), &data.token, &data.user)?;
        tracing::info!(user = %data.user.email, "logged in");
        Ok(data.user)
    }

    /// Drop the session and every cached query.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.cache.clear();
        session::clear(self.api.session())?;
        tracing::info!("logged out");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        session::is_authenticated(self.api.session())
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        session::user(self.api.session())
    }

    /// The public profile.
    pub async fn profile(&self) -> Result<Profile, ApiError> {
        let api = self.api.clone();
        self.cache
            .query(profile_key(), QueryOptions::default(), move || {
                let api = api.clone();
                async move { api.fetch_profile().await }
            })
            .await
    }

    pub async fn update_profile(&self, input: &UpdateProfileRequest) -> Result<(), ApiError> {
        self.api.update_profile(input).await
    }

    pub async fn update_email(&self, input: &UpdateEmailRequest) -> Result<(), ApiError> {
        self.api.update_email(input).await
    }

    pub async fn update_password(&self, input: &UpdatePasswordRequest) -> Result<(), ApiError> {
        self.api.update_password(input).await
    }
}

// ---------------------------------------------------------------------------
// Navigation guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Dashboard,
    Posts,
    Projects,
    Skills,
    Messages,
    Experiences,
}

impl Route {
    pub fn requires_auth(self) -> bool {
        !matches!(self, Route::Login)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(Route),
}

/// Decide whether navigating to `to` may proceed for the current session.
pub fn guard(to: Route, store: &dyn SessionStore) -> Navigation {
    let authenticated = session::is_authenticated(store);
    match to {
        _ if to.requires_auth() && !authenticated => Navigation::Redirect(Route::Login),
        Route::Login if authenticated => Navigation::Redirect(Route::Dashboard),
        _ => Navigation::Proceed,
    }
}
