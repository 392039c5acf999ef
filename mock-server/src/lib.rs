//! In-memory implementation of the portfolio CMS REST API.
//!
//! Routes live under `/api/admin` (bearer token required, except login) and
//! `/api/public`. Every response is wrapped in `{success, message, data}`.
//! `MockState::fail_next_mutation` makes the next admin write fail with a
//! chosen status so clients can exercise rollback paths.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub mod models;

use models::*;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin123";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct Store {
    user: User,
    password: String,
    tokens: HashSet<String>,
    profile: Profile,
    posts: Vec<Post>,
    projects: Vec<Project>,
    skills: Vec<Skill>,
    experiences: Vec<Experience>,
    uploads: Vec<Upload>,
    messages: Vec<ContactMessage>,
    fail_next: Option<StatusCode>,
}

impl Store {
    fn new() -> Self {
        let now = Utc::now();
        let user_id = Uuid::new_v4().to_string();
        Self {
            user: User {
                id: user_id.clone(),
                email: ADMIN_EMAIL.to_string(),
                fullname: "Site Admin".to_string(),
            },
            password: ADMIN_PASSWORD.to_string(),
            tokens: HashSet::new(),
            profile: Profile {
                id: Uuid::new_v4().to_string(),
                full_name: "Site Admin".to_string(),
                bio: String::new(),
                avatar_url: String::new(),
                resume_url: String::new(),
                user_id,
                social_links: Vec::new(),
                experiences: Vec::new(),
                skills: Vec::new(),
                created_at: now,
                updated_at: now,
            },
            posts: Vec::new(),
            projects: Vec::new(),
            skills: Vec::new(),
            experiences: Vec::new(),
            uploads: Vec::new(),
            messages: Vec::new(),
            fail_next: None,
        }
    }

    fn attach_images(&self, uploads: Vec<Upload>, entity_id: &str, entity_type: &str) -> Vec<Image> {
        let now = Utc::now();
        uploads
            .into_iter()
            .enumerate()
            .map(|(index, upload)| Image {
                id: upload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                file_name: upload.file_name,
                file_path: upload.file_path,
                alt_text: String::new(),
                mime_type: upload.mime_type,
                size: upload.size,
                entity_id: entity_id.to_string(),
                entity_type: entity_type.to_string(),
                is_primary: index == 0,
                order_index: index as i32,
                created_at: now,
            })
            .collect()
    }

    fn projects_of(&self, experience_id: &str) -> Vec<Project> {
        self.projects
            .iter()
            .filter(|p| p.experience_id.as_deref() == Some(experience_id))
            .cloned()
            .collect()
    }
}

/// Shared handle to the in-memory data set.
#[derive(Clone)]
pub struct MockState {
    db: Arc<RwLock<Store>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    pub fn new() -> Self {
        Self {
            db: Arc::new(RwLock::new(Store::new())),
        }
    }

    /// Append `count` published posts titled `Post 1..=count`; returns their
    /// ids in list order.
    pub async fn seed_posts(&self, count: usize) -> Vec<String> {
        let mut db = self.db.write().await;
        let start = db.posts.len();
        let now = Utc::now();
        (1..=count)
            .map(|n| {
                let title = format!("Post {}", start + n);
                let post = Post {
                    id: Uuid::new_v4().to_string(),
                    slug: slugify(&title),
                    title,
                    summary: String::new(),
                    content_markdown: "Seeded content".to_string(),
                    is_published: true,
                    published_at: Some(now),
                    tags: Vec::new(),
                    images: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                let id = post.id.clone();
                db.posts.push(post);
                id
            })
            .collect()
    }

    pub async fn add_message(&self, name: &str, email: &str, subject: &str, body: &str) -> String {
        let message = ContactMessage {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            subject: subject.to_string(),
            message: body.to_string(),
            status: "unread".to_string(),
            created_at: Utc::now(),
        };
        let id = message.id.clone();
        self.db.write().await.messages.push(message);
        id
    }

    /// The next authenticated non-GET admin request fails with `status`.
    pub async fn fail_next_mutation(&self, status: u16) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.db.write().await.fail_next = Some(status);
    }

    pub async fn post_count(&self) -> usize {
        self.db.read().await.posts.len()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Injected(StatusCode),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Injected(status) => (status, "injected failure".to_string()),
        };
        let body = serde_json::json!({
            "success": false,
            "message": message,
            "data": null,
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

fn ok<T>(message: &str, data: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(message, data)))
}

fn required(value: &str, message: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(message.to_string()));
    }
    Ok(())
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{what} not found"))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn app() -> Router {
    app_with_state(MockState::new())
}

pub fn app_with_state(state: MockState) -> Router {
    let admin = Router::new()
        .route("/profile", put(update_profile))
        .route("/update-email", put(update_email))
        .route("/update-password", put(update_password))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", put(update_post).delete(delete_post))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}", put(update_project).delete(delete_project))
        .route("/skills", post(create_skill))
        .route("/skills/{id}", put(update_skill).delete(delete_skill))
        .route("/experiences", get(list_experiences).post(create_experience))
        .route("/experiences/{id}", put(update_experience).delete(delete_experience))
        .route("/images/upload", post(upload_image))
        .route("/images/{id}", delete(delete_image))
        .route("/messages", get(list_messages))
        .route_layer(middleware::from_fn_with_state(state.clone(), inject_faults))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .route("/login", post(login));

    let public = Router::new()
        .route("/profile", get(get_profile))
        .route("/skills", get(list_skills))
        .route("/experiences", get(list_experiences));

    Router::new()
        .nest("/api/admin", admin)
        .nest("/api/public", public)
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, MockState::new()).await
}

pub async fn run_with_state(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock portfolio API listening");
    }
    axum::serve(listener, app_with_state(state)).await
}

async fn require_token(
    State(state): State<MockState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    let valid = match token {
        Some(token) => state.db.read().await.tokens.contains(&token),
        None => false,
    };
    if !valid {
        return Err(AppError::Unauthorized("missing or invalid token".to_string()));
    }
    Ok(next.run(request).await)
}

async fn inject_faults(
    State(state): State<MockState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() != Method::GET {
        if let Some(status) = state.db.write().await.fail_next.take() {
            tracing::warn!(method = %request.method(), uri = %request.uri(), %status, "injecting failure");
            return Err(AppError::Injected(status));
        }
    }
    Ok(next.run(request).await)
}

// ---------------------------------------------------------------------------
// Auth & profile
// ---------------------------------------------------------------------------

async fn login(
    State(state): State<MockState>,
    Json(input): Json<LoginRequest>,
) -> ApiResult<LoginData> {
    let mut db = state.db.write().await;
    if input.email != db.user.email || input.password != db.password {
        return Err(AppError::Unauthorized("invalid credentials".to_string()));
    }
    let token = Uuid::new_v4().to_string();
    db.tokens.insert(token.clone());
    tracing::info!(email = %input.email, "admin logged in");
    ok(
        "Login successful",
        LoginData {
            token,
            user: db.user.clone(),
        },
    )
}

async fn get_profile(State(state): State<MockState>) -> ApiResult<Profile> {
    let db = state.db.read().await;
    let mut profile = db.profile.clone();
    profile.experiences = db
        .experiences
        .iter()
        .map(|e| Experience {
            projects: db.projects_of(&e.id),
            ..e.clone()
        })
        .collect();
    profile.skills = db.skills.clone();
    ok("Profile retrieved", profile)
}

async fn update_profile(
    State(state): State<MockState>,
    Json(input): Json<UpdateProfile>,
) -> ApiResult<Profile> {
    let mut db = state.db.write().await;
    let profile = &mut db.profile;
    if let Some(full_name) = input.full_name {
        profile.full_name = full_name;
    }
    if let Some(bio) = input.bio {
        profile.bio = bio;
    }
    if let Some(avatar_url) = input.avatar_url {
        profile.avatar_url = avatar_url;
    }
    if let Some(resume_url) = input.resume_url {
        profile.resume_url = resume_url;
    }
    profile.updated_at = Utc::now();
    ok("Profile updated", profile.clone())
}

async fn update_email(
    State(state): State<MockState>,
    Json(input): Json<UpdateEmail>,
) -> ApiResult<()> {
    if !input.email.contains('@') {
        return Err(AppError::BadRequest("invalid email".to_string()));
    }
    state.db.write().await.user.email = input.email;
    ok("Email updated", ())
}

async fn update_password(
    State(state): State<MockState>,
    Json(input): Json<UpdatePassword>,
) -> ApiResult<()> {
    required(&input.password, "password is required")?;
    state.db.write().await.password = input.password;
    ok("Password updated", ())
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

async fn list_posts(
    State(state): State<MockState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<Post>> {
    let db = state.db.read().await;
    ok(
        "Posts retrieved",
        Page::slice(&db.posts, query.page.unwrap_or(1), query.limit.unwrap_or(10)),
    )
}

fn tags_from(names: Vec<String>) -> Vec<Tag> {
    names
        .into_iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| Tag {
            id: Uuid::new_v4().to_string(),
            slug: slugify(&name),
            name,
        })
        .collect()
}

async fn create_post(
    State(state): State<MockState>,
    Json(input): Json<PostInput>,
) -> ApiResult<Post> {
    required(&input.title, "title is required")?;
    required(&input.content_markdown, "content is required")?;
    let mut db = state.db.write().await;
    let now = Utc::now();
    let id = Uuid::new_v4().to_string();
    let post = Post {
        images: db.attach_images(input.images, &id, "post"),
        id,
        slug: slugify(&input.title),
        title: input.title,
        summary: input.summary,
        content_markdown: input.content_markdown,
        is_published: input.is_published,
        published_at: input.is_published.then_some(now),
        tags: tags_from(input.tags),
        created_at: now,
        updated_at: now,
    };
    tracing::debug!(id = %post.id, "post created");
    db.posts.push(post.clone());
    ok("Post created", post)
}

async fn update_post(
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(input): Json<PostInput>,
) -> ApiResult<Post> {
    required(&input.title, "title is required")?;
    required(&input.content_markdown, "content is required")?;
    let mut db = state.db.write().await;
    let index = db
        .posts
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| not_found("post"))?;
    let images = db.attach_images(input.images, &id, "post");
    let post = &mut db.posts[index];
    let now = Utc::now();
    post.slug = slugify(&input.title);
    post.title = input.title;
    post.summary = input.summary;
    post.content_markdown = input.content_markdown;
    post.published_at = match (input.is_published, post.published_at) {
        (true, Some(at)) => Some(at),
        (true, None) => Some(now),
        (false, _) => None,
    };
    post.is_published = input.is_published;
    post.tags = tags_from(input.tags);
    post.images = images;
    post.updated_at = now;
    ok("Post updated", post.clone())
}

async fn delete_post(State(state): State<MockState>, Path(id): Path<String>) -> ApiResult<()> {
    let mut db = state.db.write().await;
    let index = db
        .posts
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| not_found("post"))?;
    db.posts.remove(index);
    tracing::debug!(%id, "post deleted");
    ok("Post deleted", ())
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

async fn list_projects(
    State(state): State<MockState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<Project>> {
    let db = state.db.read().await;
    ok(
        "Projects retrieved",
        Page::slice(&db.projects, query.page.unwrap_or(1), query.limit.unwrap_or(10)),
    )
}

fn skills_for(db: &Store, ids: &[String]) -> Vec<Skill> {
    db.skills
        .iter()
        .filter(|s| ids.contains(&s.id))
        .cloned()
        .collect()
}

async fn create_project(
    State(state): State<MockState>,
    Json(input): Json<ProjectInput>,
) -> ApiResult<Project> {
    required(&input.title, "title is required")?;
    let mut db = state.db.write().await;
    let now = Utc::now();
    let id = Uuid::new_v4().to_string();
    let project = Project {
        images: db.attach_images(input.images, &id, "project"),
        skills: skills_for(&db, &input.skill_ids),
        id,
        slug: slugify(&input.title),
        title: input.title,
        description: input.description,
        content_markdown: input.content_markdown,
        demo_url: input.demo_url,
        repo_url: input.repo_url,
        start_date: input.start_date,
        end_date: input.end_date,
        is_featured: input.is_featured,
        experience_id: input.experience_id.filter(|e| !e.is_empty()),
        created_at: now,
        updated_at: now,
    };
    db.projects.push(project.clone());
    ok("Project created", project)
}

async fn update_project(
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(input): Json<ProjectInput>,
) -> ApiResult<Project> {
    required(&input.title, "title is required")?;
    let mut db = state.db.write().await;
    let index = db
        .projects
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| not_found("project"))?;
    let images = db.attach_images(input.images, &id, "project");
    let skills = skills_for(&db, &input.skill_ids);
    let project = &mut db.projects[index];
    project.slug = slugify(&input.title);
    project.title = input.title;
    project.description = input.description;
    project.content_markdown = input.content_markdown;
    project.demo_url = input.demo_url;
    project.repo_url = input.repo_url;
    project.start_date = input.start_date;
    project.end_date = input.end_date;
    project.is_featured = input.is_featured;
    project.experience_id = input.experience_id.filter(|e| !e.is_empty());
    project.skills = skills;
    project.images = images;
    project.updated_at = Utc::now();
    ok("Project updated", project.clone())
}

async fn delete_project(State(state): State<MockState>, Path(id): Path<String>) -> ApiResult<()> {
    let mut db = state.db.write().await;
    let index = db
        .projects
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| not_found("project"))?;
    db.projects.remove(index);
    ok("Project deleted", ())
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

async fn list_skills(
    State(state): State<MockState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<Skill>> {
    let db = state.db.read().await;
    ok(
        "Skills retrieved",
        Page::slice(&db.skills, query.page.unwrap_or(1), query.limit.unwrap_or(10)),
    )
}

async fn create_skill(
    State(state): State<MockState>,
    Json(input): Json<SkillInput>,
) -> ApiResult<Skill> {
    required(&input.name, "name is required")?;
    required(&input.category, "category is required")?;
    let skill = Skill {
        id: Uuid::new_v4().to_string(),
        name: input.name,
        category: input.category,
        icon_url: input.icon_url.unwrap_or_default(),
    };
    state.db.write().await.skills.push(skill.clone());
    ok("Skill created", skill)
}

async fn update_skill(
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(input): Json<SkillInput>,
) -> ApiResult<Skill> {
    required(&input.name, "name is required")?;
    required(&input.category, "category is required")?;
    let mut db = state.db.write().await;
    let skill = db
        .skills
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| not_found("skill"))?;
    skill.name = input.name;
    skill.category = input.category;
    skill.icon_url = input.icon_url.unwrap_or_default();
    ok("Skill updated", skill.clone())
}

async fn delete_skill(State(state): State<MockState>, Path(id): Path<String>) -> ApiResult<()> {
    let mut db = state.db.write().await;
    let before = db.skills.len();
    db.skills.retain(|s| s.id != id);
    if db.skills.len() == before {
        return Err(not_found("skill"));
    }
    for project in &mut db.projects {
        project.skills.retain(|s| s.id != id);
    }
    ok("Skill deleted", ())
}

// ---------------------------------------------------------------------------
// Experiences
// ---------------------------------------------------------------------------

async fn list_experiences(State(state): State<MockState>) -> ApiResult<Vec<Experience>> {
    let db = state.db.read().await;
    let experiences = db
        .experiences
        .iter()
        .map(|e| Experience {
            projects: db.projects_of(&e.id),
            ..e.clone()
        })
        .collect();
    ok("Experiences retrieved", experiences)
}

fn check_experience(input: &ExperienceInput) -> Result<(), AppError> {
    required(&input.company, "company is required")?;
    required(&input.position, "position is required")?;
    required(&input.start_date, "start date is required")
}

async fn create_experience(
    State(state): State<MockState>,
    Json(input): Json<ExperienceInput>,
) -> ApiResult<Experience> {
    check_experience(&input)?;
    let now = Utc::now();
    let experience = Experience {
        id: Uuid::new_v4().to_string(),
        company: input.company,
        position: input.position,
        description: input.description,
        start_date: input.start_date,
        end_date: input.end_date.filter(|d| !d.is_empty()),
        is_current: input.is_current,
        projects: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.db.write().await.experiences.push(experience.clone());
    ok("Experience created", experience)
}

async fn update_experience(
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(input): Json<ExperienceInput>,
) -> ApiResult<Experience> {
    check_experience(&input)?;
    let mut db = state.db.write().await;
    let experience = db
        .experiences
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or_else(|| not_found("experience"))?;
    experience.company = input.company;
    experience.position = input.position;
    experience.description = input.description;
    experience.start_date = input.start_date;
    experience.end_date = input.end_date.filter(|d| !d.is_empty());
    experience.is_current = input.is_current;
    experience.updated_at = Utc::now();
    ok("Experience updated", experience.clone())
}

async fn delete_experience(
    State(state): State<MockState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let mut db = state.db.write().await;
    let before = db.experiences.len();
    db.experiences.retain(|e| e.id != id);
    if db.experiences.len() == before {
        return Err(not_found("experience"));
    }
    for project in &mut db.projects {
        if project.experience_id.as_deref() == Some(id.as_str()) {
            project.experience_id = None;
        }
    }
    ok("Experience deleted", ())
}

// ---------------------------------------------------------------------------
// Images & messages
// ---------------------------------------------------------------------------

async fn upload_image(
    State(state): State<MockState>,
    mut multipart: Multipart,
) -> ApiResult<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.bin").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !mime_type.starts_with("image/") {
            return Err(AppError::BadRequest("only image files are allowed".to_string()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read file: {e}")))?;

        let id = Uuid::new_v4().to_string();
        let upload = Upload {
            file_path: format!("/uploads/{id}-{}", slugify(&file_name)),
            id: Some(id),
            file_name,
            mime_type,
            size: bytes.len() as u64,
        };
        state.db.write().await.uploads.push(upload.clone());
        return ok("Image uploaded", upload);
    }
    Err(AppError::BadRequest("no file field in request".to_string()))
}

async fn delete_image(State(state): State<MockState>, Path(id): Path<String>) -> ApiResult<()> {
    let mut db = state.db.write().await;
    let before = db.uploads.len();
    db.uploads.retain(|u| u.id.as_deref() != Some(id.as_str()));
    if db.uploads.len() == before {
        return Err(not_found("image"));
    }
    for post in &mut db.posts {
        post.images.retain(|i| i.id != id);
    }
    for project in &mut db.projects {
        project.images.retain(|i| i.id != id);
    }
    ok("Image deleted", ())
}

async fn list_messages(State(state): State<MockState>) -> ApiResult<Vec<ContactMessage>> {
    let db = state.db.read().await;
    ok("Messages retrieved", db.messages.clone())
}
