//! Input validation for directory requests: pagination bounds, review
//! submissions and doctor name searches.

use serde::{Deserialize, Serialize};

pub const REVIEW_MIN_LENGTH: usize = 10;
pub const REVIEW_MAX_LENGTH: usize = 2000;
pub const ANONYMOUS_USER: &str = "Аноним";
pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// A single rejected field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validated offset/limit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub skip: i64,
    pub limit: i64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Apply defaults and bounds to raw `skip`/`limit` query values
pub fn validate_page(skip: Option<i64>, limit: Option<i64>) -> Result<PageParams, Vec<FieldError>> {
    let skip = skip.unwrap_or(0);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);

    let mut errors = Vec::new();
    if skip < 0 {
        errors.push(FieldError::new("skip", "must be greater than or equal to 0"));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        errors.push(FieldError::new(
            "limit",
            format!("must be between 1 and {MAX_PAGE_LIMIT}"),
        ));
    }

    if errors.is_empty() {
        Ok(PageParams { skip, limit })
    } else {
        Err(errors)
    }
}

/// Review body as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSubmission {
    pub doctor_id: i64,
    pub hospital_id: i64,
    #[serde(default)]
    pub user_name: String,
    pub review_text: String,
}

/// Review ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub doctor_id: i64,
    pub hospital_id: i64,
    pub user_name: String,
    pub review_text: String,
}

/// Validates a review submission.
///
/// Text is trimmed and must be at least [`REVIEW_MIN_LENGTH`] characters;
/// anything past [`REVIEW_MAX_LENGTH`] is cut off. A blank user name is
/// stored as [`ANONYMOUS_USER`].
pub fn validate_review(submission: ReviewSubmission) -> Result<NewReview, Vec<FieldError>> {
    let mut errors = Vec::new();

    if submission.doctor_id <= 0 {
        errors.push(FieldError::new("doctor_id", "must be a positive id"));
    }
    if submission.hospital_id <= 0 {
        errors.push(FieldError::new("hospital_id", "must be a positive id"));
    }

    let text = submission.review_text.trim();
    let length = text.chars().count();
    if length < REVIEW_MIN_LENGTH {
        errors.push(FieldError::new(
            "review_text",
            format!("must be at least {REVIEW_MIN_LENGTH} characters, got {length}"),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let review_text: String = text.chars().take(REVIEW_MAX_LENGTH).collect();
    let user_name = match submission.user_name.trim() {
        "" => ANONYMOUS_USER.to_string(),
        name => name.to_string(),
    };

    Ok(NewReview {
        doctor_id: submission.doctor_id,
        hospital_id: submission.hospital_id,
        user_name,
        review_text,
    })
}

/// Validates a doctor name search term
pub fn validate_search_name(name: &str) -> Result<String, Vec<FieldError>> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(vec![FieldError::new("name", "must not be empty")]);
    }

    Ok(trimmed.to_string())
}
