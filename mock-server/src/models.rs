//! Wire types of the mock API. Entities serialize in PascalCase; request
//! payloads are snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub current_page: u32,
    pub limit: u32,
    pub total_data: u64,
    pub total_page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: Meta,
}

impl<T: Clone> Page<T> {
    /// Slice `items` into page `page` of size `limit` (both at least 1).
    pub fn slice(items: &[T], page: u32, limit: u32) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let total = items.len() as u64;
        let start = ((page - 1) as usize).saturating_mul(limit as usize);
        let data = items
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Self {
            data,
            meta: Meta {
                current_page: page,
                limit,
                total_data: total,
                total_page: total.div_ceil(u64::from(limit)) as u32,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    #[serde(rename = "ID")]
    pub id: String,
    pub file_name: String,
    pub file_path: String,
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

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Post {
    #[serde(rename = "ID")]
    pub id: String,
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content_markdown: String,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub tags: Vec<Tag>,
    pub images: Vec<Image>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Skill {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(rename = "IconURL")]
    pub icon_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    #[serde(rename = "ID")]
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub content_markdown: String,
    #[serde(rename = "DemoURL")]
    pub demo_url: String,
    #[serde(rename = "RepoURL")]
    pub repo_url: String,
    pub start_date: String,
    pub end_date: String,
    pub is_featured: bool,
    #[serde(rename = "ExperienceID")]
    pub experience_id: Option<String>,
    pub skills: Vec<Skill>,
    pub images: Vec<Image>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Experience {
    #[serde(rename = "ID")]
    pub id: String,
    pub company: String,
    pub position: String,
    pub description: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub is_current: bool,
    pub projects: Vec<Project>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
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

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Profile {
    #[serde(rename = "ID")]
    pub id: String,
    pub full_name: String,
    pub bio: String,
    #[serde(rename = "AvatarURL")]
    pub avatar_url: String,
    #[serde(rename = "ResumeURL")]
    pub resume_url: String,
    #[serde(rename = "UserID")]
    pub user_id: String,
    pub social_links: Vec<SocialLink>,
    pub experiences: Vec<Experience>,
    pub skills: Vec<Skill>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactMessage {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Stored upload metadata, echoed back by the upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    #[serde(default)]
    pub id: Option<String>,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub fullname: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginData {
    pub token: String,
    pub user: User,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PostInput {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub content_markdown: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub images: Vec<Upload>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content_markdown: String,
    #[serde(default)]
    pub demo_url: String,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub is_featured: bool,
    pub experience_id: Option<String>,
    #[serde(default)]
    pub skill_ids: Vec<String>,
    #[serde(default)]
    pub images: Vec<Upload>,
}

#[derive(Debug, Deserialize)]
pub struct SkillInput {
    pub name: String,
    pub category: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExperienceInput {
    pub company: String,
    pub position: String,
    #[serde(default)]
    pub description: String,
    pub start_date: String,
    pub end_date: Option<String>,
    #[serde(default)]
    pub is_current: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfile {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub resume_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmail {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePassword {
    pub password: String,
}

/// Lowercase, alphanumerics kept, everything else collapsed into `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
