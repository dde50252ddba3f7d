use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::gate::is_four_digit_pin;

pub type Id = Uuid;

/// A file uploaded alongside a post; `url` points into the blob namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttachedFile {
    pub url: String,
    pub name: String,
    pub size: i64,
    pub mime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub nickname: String,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub password_hash: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    #[schema(value_type = Option<Vec<AttachedFile>>)]
    pub attached_files: Option<Json<Vec<AttachedFile>>>,
    pub has_attachments: bool,
    pub attachment_count: i32,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>, // soft delete marker
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn attachments(&self) -> &[AttachedFile] {
        self.attached_files.as_ref().map(|j| j.0.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub depth: i32,
    pub content: String,
    pub nickname: String,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub password_hash: String,
    pub like_count: i64,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row-level input for inserting a post; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub nickname: String,
    pub password_hash: String,
    pub attached_files: Vec<AttachedFile>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub depth: i32,
    pub content: String,
    pub nickname: String,
    pub password_hash: String,
}

/// Joined view used by the "recent comments" widget.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct RecentComment {
    pub id: Id,
    pub post_id: Id,
    pub post_title: String,
    pub content: String,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct BoardStats {
    pub total_posts: i64,
    pub today_posts: i64,
    pub total_comments: i64,
    pub today_comments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostPage {
    pub items: Vec<Post>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

// ---------------- request bodies ----------------

fn validate_pin(value: &str) -> Result<(), ValidationError> {
    if is_four_digit_pin(value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("pin");
        err.message = Some("Password must be exactly 4 digits".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 50000, message = "Content must be between 1 and 50000 characters"))]
    pub content: String,
    #[validate(length(min = 1, max = 30, message = "Nickname must be between 1 and 30 characters"))]
    pub nickname: String,
    #[validate(custom(function = "validate_pin"))]
    pub password: String,
    #[serde(default)]
    pub attached_files: Vec<AttachedFile>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 2000, message = "Content must be between 1 and 2000 characters"))]
    pub content: String,
    #[validate(length(min = 1, max = 30, message = "Nickname must be between 1 and 30 characters"))]
    pub nickname: String,
    #[validate(length(min = 4, max = 100, message = "Password must be between 4 and 100 characters"))]
    pub password: String,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DeleteRequest {
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyPostRequest {
    #[validate(length(equal = 4, message = "Password must be 4 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyCommentRequest {
    #[validate(length(min = 4, max = 100, message = "Password must be between 4 and 100 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SitePasswordRequest {
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PostLikeRequest {
    pub action: LikeAction,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CommentLikeRequest {
    pub liked: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ---------------- response envelope ----------------

/// Uniform success envelope: `{success, data?, message?, timestamp}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), message: None, timestamp: Utc::now() }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self { success: true, data: None, message: Some(message.into()), timestamp: Utc::now() }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostDeleteData {
    pub deleted: bool,
    pub deleted_images: usize,
    pub deleted_attachments: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PostLikeData {
    pub like_count: i64,
    pub action: LikeAction,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PostViewData {
    pub view_count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommentDeleteData {
    pub deleted: bool,
    pub soft_deleted: bool,
    pub comment_id: Id,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommentLikeData {
    pub id: Id,
    pub like_count: i64,
    pub liked: bool,
}
