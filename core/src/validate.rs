//! Client-side payload checks.
//!
//! Every mutating call in `AdminApi` validates its payload before building the
//! request, so a rejected payload never reaches the network.

use url::Url;

use crate::error::{ApiError, FieldError};
use crate::types::{
    ExperienceInput, LoginRequest, PostInput, ProjectInput, SkillInput, UpdateEmailRequest,
    UpdatePasswordRequest,
};

pub trait Validate {
    fn field_errors(&self) -> Vec<FieldError>;

    fn validate(&self) -> Result<(), ApiError> {
        let errors = self.field_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

/// Text fields: blank or whitespace-only values are rejected.
fn required(errors: &mut Vec<FieldError>, field: &'static str, value: &str, message: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, message));
    }
}

/// Secrets are taken verbatim; only the empty string is rejected.
fn non_empty(errors: &mut Vec<FieldError>, field: &'static str, value: &str, message: &str) {
    if value.is_empty() {
        errors.push(FieldError::new(field, message));
    }
}

impl Validate for PostInput {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        required(&mut errors, "title", &self.title, "Title is required");
        required(
            &mut errors,
            "content_markdown",
            &self.content_markdown,
            "Content is required",
        );
        errors
    }
}

impl Validate for ProjectInput {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        required(&mut errors, "title", &self.title, "Title is required");
        errors
    }
}

impl Validate for SkillInput {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        required(&mut errors, "name", &self.name, "Name is required");
        required(&mut errors, "category", &self.category, "Category is required");
        // Empty means "no icon".
        if let Some(icon) = self.icon_url.as_deref().filter(|s| !s.is_empty()) {
            if Url::parse(icon).is_err() {
                errors.push(FieldError::new("icon_url", "Must be a valid URL"));
            }
        }
        errors
    }
}

impl Validate for ExperienceInput {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        required(&mut errors, "company", &self.company, "Company is required");
        required(&mut errors, "position", &self.position, "Position is required");
        required(
            &mut errors,
            "start_date",
            &self.start_date,
            "Start date is required",
        );
        errors
    }
}

impl Validate for LoginRequest {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        required(&mut errors, "email", &self.email, "Email is required");
        non_empty(&mut errors, "password", &self.password, "Password is required");
        errors
    }
}

impl Validate for UpdateEmailRequest {
    fn field_errors(&self) -> Vec<FieldError> {
        let valid = match self.email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.'),
            None => false,
        };
        if valid {
            Vec::new()
        } else {
            vec![FieldError::new("email", "Must be a valid email")]
        }
    }
}

impl Validate for UpdatePasswordRequest {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        non_empty(&mut errors, "password", &self.password, "Password is required");
        errors
    }
}
