//! Domain DTOs for the portfolio API.
//!
//! # Design
//! Entities mirror the server's JSON, which names entity fields in
//! PascalCase with upper-case acronyms (`ID`, `IconURL`). Request payloads use
//! snake_case. The mock-server crate defines its own copies; integration tests
//! catch schema drift between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// The `{success, message, data}` wrapper around every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: T,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationMeta {
    pub current_page: u32,
    pub limit: u32,
    pub total_data: u64,
    pub total_page: u32,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

/// Entities with a server-assigned id.
pub trait Identified {
    fn id(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The user snapshot stored alongside the token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub fullname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginData {
    pub token: String,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    #[serde(rename = "ID")]
    pub id: String,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub alt_text: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(rename = "EntityID")]
    pub entity_id: String,
    pub entity_type: String,
    pub is_primary: bool,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

/// Metadata of an uploaded file, as returned by the upload endpoint and
/// attached to post and project payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageUploadResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub size: u64,
}

/// A local file to upload.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Post {
    #[serde(rename = "ID")]
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub summary: String,
    pub content_markdown: String,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Payload for both creating and updating a post; the server replaces every
/// field on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub summary: String,
    pub content_markdown: String,
    pub tags: Vec<String>,
    pub is_published: bool,
    pub images: Vec<ImageUploadResult>,
}

// ---------------------------------------------------------------------------
// Skills & projects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Skill {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(rename = "IconURL", default)]
    pub icon_url: String,
}

impl Identified for Skill {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillInput {
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    #[serde(rename = "ID")]
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content_markdown: String,
    #[serde(rename = "DemoURL", default)]
    pub demo_url: String,
    #[serde(rename = "RepoURL", default)]
    pub repo_url: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    pub is_featured: bool,
    #[serde(rename = "ExperienceID", default, skip_serializing_if = "Option::is_none")]
    pub experience_id: Option<String>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for Project {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInput {
    pub title: String,
    pub description: String,
    pub content_markdown: String,
    pub demo_url: String,
    pub repo_url: String,
    pub start_date: String,
    pub end_date: String,
    pub is_featured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_id: Option<String>,
    pub skill_ids: Vec<String>,
    pub images: Vec<ImageUploadResult>,
}

// ---------------------------------------------------------------------------
// Experiences & profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Experience {
    #[serde(rename = "ID")]
    pub id: String,
    pub company: String,
    pub position: String,
    #[serde(default)]
    pub description: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub is_current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for Experience {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperienceInput {
    pub company: String,
    pub position: String,
    pub description: String,
    pub start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub is_current: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SocialLink {
    #[serde(rename = "ID")]
    pub id: String,
    pub platform: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub order_index: i32,
    #[serde(rename = "ProfileID")]
    pub profile_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Profile {
    #[serde(rename = "ID")]
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(rename = "AvatarURL", default)]
    pub avatar_url: String,
    #[serde(rename = "ResumeURL", default)]
    pub resume_url: String,
    #[serde(rename = "UserID")]
    pub user_id: String,
    #[serde(default)]
    pub social_links: Vec<SocialLink>,
    #[serde(default)]
    pub experiences: Vec<Experience>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Contact messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContactMessage {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
