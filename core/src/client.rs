//! Stateless HTTP request builder and response parser for the portfolio API.
//!
//! # Design
//! `PortfolioClient` holds only a `base_url` and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a shared `parse_*` method that unwraps the
//! `{success, message, data}` envelope from an `HttpResponse`. Admin requests
//! take the bearer token as an argument; the caller decides where it is
//! stored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::http::{FilePart, HttpBody, HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    Envelope, ExperienceInput, ImageFile, ImageUploadResult, LoginRequest, Paginated, PostInput,
    ProjectInput, SkillInput, UpdateEmailRequest, UpdatePasswordRequest, UpdateProfileRequest,
};

/// Synchronous, stateless client for the portfolio API.
#[derive(Debug, Clone)]
pub struct PortfolioClient {
    base_url: String,
}

impl PortfolioClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: HttpMethod, path: &str, token: Option<&str>) -> HttpRequest {
        let mut headers = Vec::new();
        if let Some(token) = token {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers,
            body: None,
        }
    }

    fn json_request<B: Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        token: Option<&str>,
        input: &B,
    ) -> Result<HttpRequest, ApiError> {
        let body =
            serde_json::to_string(input).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let mut req = self.request(method, path, token);
        req.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        req.body = Some(HttpBody::Json(body));
        Ok(req)
    }

    fn page_request(&self, path: &str, token: Option<&str>, page: u32, limit: u32) -> HttpRequest {
        self.request(
            HttpMethod::Get,
            &format!("{path}?page={page}&limit={limit}"),
            token,
        )
    }

    // -----------------------------------------------------------------------
    // Auth & profile
    // -----------------------------------------------------------------------

    pub fn build_login(&self, input: &LoginRequest) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/admin/login", None, input)
    }

    pub fn build_get_profile(&self) -> HttpRequest {
        self.request(HttpMethod::Get, "/public/profile", None)
    }

    pub fn build_update_profile(
        &self,
        token: Option<&str>,
        input: &UpdateProfileRequest,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, "/admin/profile", token, input)
    }

    pub fn build_update_email(
        &self,
        token: Option<&str>,
        input: &UpdateEmailRequest,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, "/admin/update-email", token, input)
    }

    pub fn build_update_password(
        &self,
        token: Option<&str>,
        input: &UpdatePasswordRequest,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, "/admin/update-password", token, input)
    }

    // -----------------------------------------------------------------------
    // Posts
    // -----------------------------------------------------------------------

    pub fn build_list_posts(&self, token: Option<&str>, page: u32, limit: u32) -> HttpRequest {
        self.page_request("/admin/posts", token, page, limit)
    }

    pub fn build_create_post(
        &self,
        token: Option<&str>,
        input: &PostInput,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/admin/posts", token, input)
    }

    pub fn build_update_post(
        &self,
        token: Option<&str>,
        id: &str,
        input: &PostInput,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &format!("/admin/posts/{id}"), token, input)
    }

    pub fn build_delete_post(&self, token: Option<&str>, id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/admin/posts/{id}"), token)
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub fn build_list_projects(&self, token: Option<&str>, page: u32, limit: u32) -> HttpRequest {
        self.page_request("/admin/projects", token, page, limit)
    }

    pub fn build_create_project(
        &self,
        token: Option<&str>,
        input: &ProjectInput,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/admin/projects", token, input)
    }

    pub fn build_update_project(
        &self,
        token: Option<&str>,
        id: &str,
        input: &ProjectInput,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &format!("/admin/projects/{id}"), token, input)
    }

    pub fn build_delete_project(&self, token: Option<&str>, id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/admin/projects/{id}"), token)
    }

    // -----------------------------------------------------------------------
    // Skills
    // -----------------------------------------------------------------------

    /// Skills are listed through the public endpoint; no token is sent.
    pub fn build_list_skills(&self, page: u32, limit: u32) -> HttpRequest {
        self.page_request("/public/skills", None, page, limit)
    }

    pub fn build_create_skill(
        &self,
        token: Option<&str>,
        input: &SkillInput,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/admin/skills", token, input)
    }

    pub fn build_update_skill(
        &self,
        token: Option<&str>,
        id: &str,
        input: &SkillInput,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &format!("/admin/skills/{id}"), token, input)
    }

    pub fn build_delete_skill(&self, token: Option<&str>, id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/admin/skills/{id}"), token)
    }

    // -----------------------------------------------------------------------
    // Experiences
    // -----------------------------------------------------------------------

    pub fn build_list_public_experiences(&self) -> HttpRequest {
        self.request(HttpMethod::Get, "/public/experiences", None)
    }

    pub fn build_list_admin_experiences(&self, token: Option<&str>) -> HttpRequest {
        self.request(HttpMethod::Get, "/admin/experiences", token)
    }

    pub fn build_create_experience(
        &self,
        token: Option<&str>,
        input: &ExperienceInput,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/admin/experiences", token, input)
    }

    pub fn build_update_experience(
        &self,
        token: Option<&str>,
        id: &str,
        input: &ExperienceInput,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(
            HttpMethod::Put,
            &format!("/admin/experiences/{id}"),
            token,
            input,
        )
    }

    pub fn build_delete_experience(&self, token: Option<&str>, id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/admin/experiences/{id}"), token)
    }

    // -----------------------------------------------------------------------
    // Images & messages
    // -----------------------------------------------------------------------

    pub fn build_upload_image(&self, token: Option<&str>, file: &ImageFile) -> HttpRequest {
        let mut req = self.request(HttpMethod::Post, "/admin/images/upload", token);
        req.body = Some(HttpBody::Multipart(FilePart {
            field: "file".to_string(),
            file_name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            bytes: file.bytes.clone(),
        }));
        req
    }

    pub fn build_delete_image(&self, token: Option<&str>, id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/admin/images/{id}"), token)
    }

    pub fn build_list_messages(&self, token: Option<&str>) -> HttpRequest {
        self.request(HttpMethod::Get, "/admin/messages", token)
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    /// Unwrap the envelope and decode `data` as `T`.
    pub fn parse_data<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T, ApiError> {
        check_status(&response)?;
        let envelope: Envelope<T> = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        if !envelope.success {
            return Err(ApiError::Rejected(envelope.message));
        }
        Ok(envelope.data)
    }

    /// Unwrap a paginated list response.
    pub fn parse_page<T: DeserializeOwned>(
        &self,
        response: HttpResponse,
    ) -> Result<Paginated<T>, ApiError> {
        self.parse_data(response)
    }

    /// Accept any successful response whose payload the caller does not need.
    /// An empty body counts as success.
    pub fn parse_empty(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)?;
        if response.body.trim().is_empty() {
            return Ok(());
        }
        let envelope: Envelope<Option<serde_json::Value>> = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        if !envelope.success {
            return Err(ApiError::Rejected(envelope.message));
        }
        Ok(())
    }

    /// The upload endpoint may answer with the upload result bare or inside
    /// the usual envelope.
    pub fn parse_upload(&self, response: HttpResponse) -> Result<ImageUploadResult, ApiError> {
        check_status(&response)?;
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum UploadBody {
            Wrapped(Envelope<Option<ImageUploadResult>>),
            Bare(ImageUploadResult),
        }
        match serde_json::from_str(&response.body)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))?
        {
            UploadBody::Wrapped(envelope) if !envelope.success => {
                Err(ApiError::Rejected(envelope.message))
            }
            UploadBody::Wrapped(envelope) => envelope.data.ok_or_else(|| {
                ApiError::DeserializationError("upload response carried no data".to_string())
            }),
            UploadBody::Bare(result) => Ok(result),
        }
    }
}

/// Server error bodies carry either `message` or `error`.
#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    match response.status {
        401 => Err(ApiError::Unauthorized),
        404 => Err(ApiError::NotFound),
        status => {
            let body = serde_json::from_str::<ErrorBody>(&response.body)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or_else(|| response.body.clone());
            Err(ApiError::HttpError { status, body })
        }
    }
}
