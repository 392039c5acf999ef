//! Async API surface: request building, session token, transport and
//! envelope parsing in one call.
//!
//! # Design
//! `AdminApi` is cheap to clone (every field is shared) so cache fetchers can
//! own a copy. The bearer token is read from the session store when each
//! request is built, never cached here. Payloads are validated before the
//! request is built.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::client::PortfolioClient;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::session::{self, SessionStore};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{
    ContactMessage, Experience, ExperienceInput, ImageFile, ImageUploadResult, LoginData,
    LoginRequest, Paginated, Post, PostInput, Profile, Project, ProjectInput, Skill, SkillInput,
    UpdateEmailRequest, UpdatePasswordRequest, UpdateProfileRequest,
};
use crate::validate::Validate;

#[derive(Clone)]
pub struct AdminApi {
    client: PortfolioClient,
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionStore>,
}

impl AdminApi {
    pub fn new(
        client: PortfolioClient,
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            client,
            transport,
            session,
        }
    }

    /// Build an API backed by `reqwest` from `config`.
    pub fn from_config(
        config: &ClientConfig,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::new(
            PortfolioClient::new(&config.base_url),
            Arc::new(transport),
            session,
        ))
    }

    pub fn client(&self) -> &PortfolioClient {
        &self.client
    }

    pub fn session(&self) -> &dyn SessionStore {
        self.session.as_ref()
    }

    fn token(&self) -> Option<String> {
        session::token(self.session.as_ref())
    }

    async fn send(&self, request: HttpRequest) -> Result<crate::http::HttpResponse, ApiError> {
        self.transport.execute(request).await
    }

    async fn send_data<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        self.client.parse_data(response)
    }

    async fn send_empty(&self, request: HttpRequest) -> Result<(), ApiError> {
        let response = self.send(request).await?;
        self.client.parse_empty(response)
    }

    // -----------------------------------------------------------------------
    // Auth & profile
    // -----------------------------------------------------------------------

    /// Exchange credentials for a token. Does not touch the session store.
    pub async fn login(&self, input: &LoginRequest) -> Result<LoginData, ApiError> {
        input.validate()?;
        self.send_data(self.client.build_login(input)?).await
    }

    pub async fn fetch_profile(&self) -> Result<Profile, ApiError> {
        self.send_data(self.client.build_get_profile()).await
    }

    pub async fn update_profile(&self, input: &UpdateProfileRequest) -> Result<(), ApiError> {
        let req = self
            .client
            .build_update_profile(self.token().as_deref(), input)?;
        self.send_empty(req).await
    }

    pub async fn update_email(&self, input: &UpdateEmailRequest) -> Result<(), ApiError> {
        input.validate()?;
        let req = self.client.build_update_email(self.token().as_deref(), input)?;
        self.send_empty(req).await
    }

    pub async fn update_password(&self, input: &UpdatePasswordRequest) -> Result<(), ApiError> {
        input.validate()?;
        let req = self
            .client
            .build_update_password(self.token().as_deref(), input)?;
        self.send_empty(req).await
    }

    // -----------------------------------------------------------------------
    // Posts
    // -----------------------------------------------------------------------

    pub async fn fetch_posts(&self, page: u32, limit: u32) -> Result<Paginated<Post>, ApiError> {
        let req = self
            .client
            .build_list_posts(self.token().as_deref(), page, limit);
        self.send_data(req).await
    }

    pub async fn create_post(&self, input: &PostInput) -> Result<Post, ApiError> {
        input.validate()?;
        let req = self.client.build_create_post(self.token().as_deref(), input)?;
        self.send_data(req).await
    }

    pub async fn update_post(&self, id: &str, input: &PostInput) -> Result<Post, ApiError> {
        input.validate()?;
        let req = self
            .client
            .build_update_post(self.token().as_deref(), id, input)?;
        self.send_data(req).await
    }

    pub async fn delete_post(&self, id: &str) -> Result<(), ApiError> {
        let req = self.client.build_delete_post(self.token().as_deref(), id);
        self.send_empty(req).await
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub async fn fetch_projects(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Paginated<Project>, ApiError> {
        let req = self
            .client
            .build_list_projects(self.token().as_deref(), page, limit);
        self.send_data(req).await
    }

    pub async fn create_project(&self, input: &ProjectInput) -> Result<Project, ApiError> {
        input.validate()?;
        let req = self
            .client
            .build_create_project(self.token().as_deref(), input)?;
        self.send_data(req).await
    }

    pub async fn update_project(&self, id: &str, input: &ProjectInput) -> Result<Project, ApiError> {
        input.validate()?;
        let req = self
            .client
            .build_update_project(self.token().as_deref(), id, input)?;
        self.send_data(req).await
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), ApiError> {
        let req = self.client.build_delete_project(self.token().as_deref(), id);
        self.send_empty(req).await
    }

    // -----------------------------------------------------------------------
    // Skills
    // -----------------------------------------------------------------------

    pub async fn fetch_skills(&self, page: u32, limit: u32) -> Result<Paginated<Skill>, ApiError> {
        self.send_data(self.client.build_list_skills(page, limit))
            .await
    }

    pub async fn create_skill(&self, input: &SkillInput) -> Result<Skill, ApiError> {
        input.validate()?;
        let req = self.client.build_create_skill(self.token().as_deref(), input)?;
        self.send_data(req).await
    }

    pub async fn update_skill(&self, id: &str, input: &SkillInput) -> Result<Skill, ApiError> {
        input.validate()?;
        let req = self
            .client
            .build_update_skill(self.token().as_deref(), id, input)?;
        self.send_data(req).await
    }

    pub async fn delete_skill(&self, id: &str) -> Result<(), ApiError> {
        let req = self.client.build_delete_skill(self.token().as_deref(), id);
        self.send_empty(req).await
    }

    // -----------------------------------------------------------------------
    // Experiences
    // -----------------------------------------------------------------------

    pub async fn fetch_public_experiences(&self) -> Result<Vec<Experience>, ApiError> {
        self.send_data(self.client.build_list_public_experiences())
            .await
    }

    pub async fn fetch_admin_experiences(&self) -> Result<Vec<Experience>, ApiError> {
        let req = self
            .client
            .build_list_admin_experiences(self.token().as_deref());
        self.send_data(req).await
    }

    pub async fn create_experience(&self, input: &ExperienceInput) -> Result<Experience, ApiError> {
        input.validate()?;
        let req = self
            .client
            .build_create_experience(self.token().as_deref(), input)?;
        self.send_data(req).await
    }

    pub async fn update_experience(
        &self,
        id: &str,
        input: &ExperienceInput,
    ) -> Result<Experience, ApiError> {
        input.validate()?;
        let req = self
            .client
            .build_update_experience(self.token().as_deref(), id, input)?;
        self.send_data(req).await
    }

    pub async fn delete_experience(&self, id: &str) -> Result<(), ApiError> {
        let req = self
            .client
            .build_delete_experience(self.token().as_deref(), id);
        self.send_empty(req).await
    }

    // -----------------------------------------------------------------------
    // Images & messages
    // -----------------------------------------------------------------------

    pub async fn upload_image(&self, file: &ImageFile) -> Result<ImageUploadResult, ApiError> {
        let req = self.client.build_upload_image(self.token().as_deref(), file);
        let response = self.send(req).await?;
        self.client.parse_upload(response)
    }

    pub async fn delete_image(&self, id: &str) -> Result<(), ApiError> {
        let req = self.client.build_delete_image(self.token().as_deref(), id);
        self.send_empty(req).await
    }

    pub async fn fetch_messages(&self) -> Result<Vec<ContactMessage>, ApiError> {
        let req = self.client.build_list_messages(self.token().as_deref());
        self.send_data(req).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport shared by the unit tests of the resource modules.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::http::HttpResponse;
    use crate::session::MemoryStore;

    /// Replays queued responses and records every request it sees.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
        pub requests: Mutex<Vec<HttpRequest>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn push(&self, status: u16, body: impl Into<String>) {
            self.responses
                .lock()
                .push_back(Ok(HttpResponse::new(status, body)));
        }

        pub fn push_err(&self, error: ApiError) {
            self.responses.lock().push_back(Err(error));
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Transport("no scripted response".into())))
        }
    }

    pub fn api(transport: Arc<ScriptedTransport>) -> (AdminApi, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let api = AdminApi::new(
            PortfolioClient::new("http://cms.test/api"),
            transport,
            store.clone(),
        );
        (api, store)
    }

    pub fn ok(data: serde_json::Value) -> String {
        serde_json::json!({"success": true, "message": "ok", "data": data}).to_string()
    }

    pub fn post(id: &str) -> serde_json::Value {
        serde_json::json!({
            "ID": id,
            "Title": format!("Post {id}"),
            "Slug": format!("post-{id}"),
            "Summary": "",
            "ContentMarkdown": "body",
            "IsPublished": true,
            "PublishedAt": null,
            "Tags": [],
            "Images": [],
            "CreatedAt": "2024-01-01T00:00:00Z",
            "UpdatedAt": "2024-01-01T00:00:00Z"
        })
    }

    pub fn page(items: Vec<serde_json::Value>, total: u64) -> serde_json::Value {
        serde_json::json!({
            "data": items,
            "meta": {"current_page": 1, "limit": 10, "total_data": total, "total_page": 1}
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::session::save_login;
    use crate::types::AuthUser;

    #[tokio::test]
    async fn stored_token_is_attached_at_send_time() {
        let transport = Arc::new(ScriptedTransport::default());
        let (api, store) = api(transport.clone());
        transport.push(200, ok(page(vec![], 0)));
        transport.push(200, ok(page(vec![], 0)));

        api.fetch_posts(1, 10).await.unwrap();
        save_login(
            store.as_ref(),
            "tok",
            &AuthUser {
                id: "u1".into(),
                email: "a@b.c".into(),
                fullname: "A".into(),
            },
        )
        .unwrap();
        api.fetch_posts(1, 10).await.unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests[0].header("authorization"), None);
        assert_eq!(requests[1].header("authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_transport() {
        let transport = Arc::new(ScriptedTransport::default());
        let (api, _) = api(transport.clone());

        let err = api.create_post(&PostInput::default()).await.unwrap_err();

        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(transport.calls(), 0);
    }
}
