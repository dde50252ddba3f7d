use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::{Duration, NaiveTime, Utc};
use futures_util::TryStreamExt as _;
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::config::AppConfig;
use crate::counters::{Counter, Direction};
use crate::credential;
use crate::error::{not_found_as, ApiError};
use crate::gate::{method_not_allowed, ApiKeyGate, EntityId};
use crate::models::*;
use crate::moderation;
use crate::repo::{CommentRepo, PostRepo, Repo, StatsRepo};
use crate::storage::{self, BlobStore, BlobStoreError};

const JSON_BODY_LIMIT: usize = 512 * 1024;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            // 50k-char post bodies exceed the 32 KiB default
            .limit(JSON_BODY_LIMIT)
            .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid request body: {err}")).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid query: {err}")).into()),
    )
    .service(
        web::scope("/api")
            .wrap(ApiKeyGate)
            .service(
                resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            // registered before /posts/{id} so "trending" is not taken for an id
            .service(resource("/posts/trending").route(web::get().to(trending_posts)))
            .service(resource("/posts/{id}").route(web::get().to(get_post)))
            .service(resource("/posts/{id}/delete").route(web::post().to(delete_post)))
            .service(resource("/posts/{id}/verify").route(web::post().to(verify_post)))
            .service(resource("/posts/{id}/like").route(web::post().to(like_post)))
            .service(resource("/posts/{id}/view").route(web::post().to(view_post)))
            .service(
                resource("/posts/{id}/comments")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(create_comment)),
            )
            .service(resource("/comments/recent").route(web::get().to(recent_comments)))
            .service(resource("/comments/{id}/delete").route(web::post().to(delete_comment)))
            .service(resource("/comments/{id}/like").route(web::post().to(like_comment)))
            .service(resource("/comments/{id}/verify").route(web::post().to(verify_comment)))
            .service(resource("/stats/board").route(web::get().to(board_stats)))
            .service(resource("/uploads").route(web::post().to(upload_blob)))
            .service(resource("/site/verify").route(web::post().to(verify_site_password))),
    );
    // public: <img src="/blobs/..."> must load without the api key
    cfg.route("/blobs/{key:.*}", web::get().to(get_blob));
    cfg.route("/health", web::get().to(health));
}

fn resource(path: &str) -> actix_web::Resource {
    web::resource(path).default_service(web::to(method_not_allowed))
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub blob_store: Arc<dyn BlobStore>,
    pub config: Arc<AppConfig>,
}

fn clamp_limit(raw: Option<i64>, default: i64, max: i64) -> i64 {
    raw.unwrap_or(default).clamp(1, max)
}

// ---------------- posts ----------------

#[utoipa::path(
    get,
    path = "/api/posts",
    params(
        ("page" = Option<i64>, Query, description = "1-based page"),
        ("limit" = Option<i64>, Query, description = "Page size (1..50, default 20)")
    ),
    responses((status = 200, description = "Live posts, newest first", body = PostPage))
)]
pub async fn list_posts(data: web::Data<AppState>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = clamp_limit(query.limit, 20, 50);
    // far-out pages saturate to an offset past the end: an empty page, not an overflow
    let offset = (page - 1).saturating_mul(limit);
    let (items, total) = data.repo.list_posts(offset, limit).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(PostPage { items, page, limit, total })))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn create_post(data: web::Data<AppState>, payload: web::Json<CreatePostRequest>) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    let req = payload.into_inner();
    let password_hash = credential::hash_secret(&req.password)?;
    let post = data
        .repo
        .create_post(NewPost {
            title: req.title,
            content: req.content,
            nickname: req.nickname,
            password_hash,
            attached_files: req.attached_files,
        })
        .await?;
    tracing::info!(post_id = %post.id, "post created");
    Ok(HttpResponse::Created().json(ApiResponse::ok(post)))
}

#[utoipa::path(
    get,
    path = "/api/posts/trending",
    params(("limit" = Option<i64>, Query, description = "1..50, default 10")),
    responses((status = 200, description = "Posts from the last 24h by views then likes", body = [Post]))
)]
pub async fn trending_posts(data: web::Data<AppState>, query: web::Query<LimitQuery>) -> Result<HttpResponse, ApiError> {
    let limit = clamp_limit(query.limit, 10, 50);
    let since = Utc::now() - Duration::hours(24);
    let posts = data.repo.trending_posts(since, limit).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(posts)))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = String, Path, description = "Post id (UUID v4)")),
    responses(
        (status = 200, description = "Post (scrubbed when deleted)", body = Post),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(data: web::Data<AppState>, id: EntityId) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(id.0).await.map_err(not_found_as("Post"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(post)))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/delete",
    params(("id" = String, Path, description = "Post id (UUID v4)")),
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Post soft-deleted", body = PostDeleteData),
        (status = 400, description = "Malformed id or body"),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Post not found or already deleted")
    )
)]
pub async fn delete_post(
    data: web::Data<AppState>,
    id: EntityId,
    payload: web::Json<DeleteRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    let outcome = moderation::soft_delete_post(
        data.repo.as_ref(),
        data.blob_store.as_ref(),
        &data.config.blob_public_url,
        id.0,
        &payload.password,
    )
    .await?;
    let body = PostDeleteData {
        deleted: true,
        deleted_images: outcome.deleted_images,
        deleted_attachments: outcome.deleted_attachments,
    };
    Ok(HttpResponse::Ok().json(ApiResponse::ok(body).with_message("Post deleted")))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/verify",
    params(("id" = String, Path, description = "Post id (UUID v4)")),
    request_body = VerifyPostRequest,
    responses(
        (status = 200, description = "Password matches"),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn verify_post(
    data: web::Data<AppState>,
    id: EntityId,
    payload: web::Json<VerifyPostRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    moderation::authorize_post(data.repo.as_ref(), id.0, &payload.password).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Password verified")))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/like",
    params(("id" = String, Path, description = "Post id (UUID v4)")),
    request_body = PostLikeRequest,
    responses(
        (status = 200, description = "New like count", body = PostLikeData),
        (status = 404, description = "Post not found")
    )
)]
pub async fn like_post(
    data: web::Data<AppState>,
    id: EntityId,
    payload: web::Json<PostLikeRequest>,
) -> Result<HttpResponse, ApiError> {
    let action = payload.action;
    let like_count = data
        .repo
        .adjust_post_counter(id.0, Counter::Likes, action.into())
        .await
        .map_err(not_found_as("Post"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(PostLikeData { like_count, action })))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/view",
    params(("id" = String, Path, description = "Post id (UUID v4)")),
    responses(
        (status = 200, description = "New view count", body = PostViewData),
        (status = 404, description = "Post not found")
    )
)]
pub async fn view_post(data: web::Data<AppState>, id: EntityId) -> Result<HttpResponse, ApiError> {
    let view_count = data
        .repo
        .adjust_post_counter(id.0, Counter::Views, Direction::Increase)
        .await
        .map_err(not_found_as("Post"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(PostViewData { view_count })))
}

// ---------------- comments ----------------

#[utoipa::path(
    get,
    path = "/api/posts/{id}/comments",
    params(("id" = String, Path, description = "Post id (UUID v4)")),
    responses(
        (status = 200, description = "Comments, oldest first", body = [Comment]),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_comments(data: web::Data<AppState>, id: EntityId) -> Result<HttpResponse, ApiError> {
    data.repo.get_post(id.0).await.map_err(not_found_as("Post"))?;
    let comments = data.repo.list_comments(id.0).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(comments)))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/comments",
    params(("id" = String, Path, description = "Post id (UUID v4)")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Validation failed or parent on another post"),
        (status = 404, description = "Post or parent comment not found")
    )
)]
pub async fn create_comment(
    data: web::Data<AppState>,
    id: EntityId,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    let post = data.repo.get_post(id.0).await.map_err(not_found_as("Post"))?;
    if post.is_deleted {
        return Err(ApiError::not_found("Post"));
    }
    let req = payload.into_inner();
    let depth = match req.parent_id {
        None => 0,
        Some(parent_id) => {
            let parent = data.repo.get_comment(parent_id).await.map_err(not_found_as("Parent comment"))?;
            if parent.is_deleted {
                return Err(ApiError::not_found("Parent comment"));
            }
            if parent.post_id != post.id {
                return Err(ApiError::BadRequest("Parent comment belongs to another post".into()));
            }
            parent.depth + 1
        }
    };
    let password_hash = credential::hash_secret(&req.password)?;
    let comment = data
        .repo
        .create_comment(NewComment {
            post_id: post.id,
            parent_id: req.parent_id,
            depth,
            content: req.content,
            nickname: req.nickname,
            password_hash,
        })
        .await
        .map_err(not_found_as("Post"))?;
    tracing::info!(comment_id = %comment.id, post_id = %post.id, depth, "comment created");
    Ok(HttpResponse::Created().json(ApiResponse::ok(comment)))
}

#[utoipa::path(
    get,
    path = "/api/comments/recent",
    params(("limit" = Option<i64>, Query, description = "1..20, default 10")),
    responses((status = 200, description = "Recent live comments with post titles", body = [RecentComment]))
)]
pub async fn recent_comments(data: web::Data<AppState>, query: web::Query<LimitQuery>) -> Result<HttpResponse, ApiError> {
    let limit = clamp_limit(query.limit, 10, 20);
    let comments = data.repo.recent_comments(limit).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(comments)))
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}/delete",
    params(("id" = String, Path, description = "Comment id (UUID v4)")),
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Comment soft-deleted", body = CommentDeleteData),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Comment not found or already deleted")
    )
)]
pub async fn delete_comment(
    data: web::Data<AppState>,
    id: EntityId,
    payload: web::Json<DeleteRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    let outcome = moderation::soft_delete_comment(
        data.repo.as_ref(),
        data.blob_store.as_ref(),
        &data.config.blob_public_url,
        id.0,
        &payload.password,
    )
    .await?;
    let body = CommentDeleteData { deleted: true, soft_deleted: true, comment_id: outcome.comment.id };
    Ok(HttpResponse::Ok().json(ApiResponse::ok(body)))
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}/like",
    params(("id" = String, Path, description = "Comment id (UUID v4)")),
    request_body = CommentLikeRequest,
    responses(
        (status = 200, description = "New like count", body = CommentLikeData),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn like_comment(
    data: web::Data<AppState>,
    id: EntityId,
    payload: web::Json<CommentLikeRequest>,
) -> Result<HttpResponse, ApiError> {
    let liked = payload.liked;
    let like_count = data
        .repo
        .adjust_comment_likes(id.0, Direction::from_liked(liked))
        .await
        .map_err(not_found_as("Comment"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(CommentLikeData { id: id.0, like_count, liked })))
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}/verify",
    params(("id" = String, Path, description = "Comment id (UUID v4)")),
    request_body = VerifyCommentRequest,
    responses(
        (status = 200, description = "Password matches"),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn verify_comment(
    data: web::Data<AppState>,
    id: EntityId,
    payload: web::Json<VerifyCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    moderation::authorize_comment(data.repo.as_ref(), id.0, &payload.password).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Password verified")))
}

// ---------------- board-wide ----------------

#[utoipa::path(
    get,
    path = "/api/stats/board",
    responses((status = 200, description = "Live post/comment totals, overall and since 00:00 UTC", body = BoardStats))
)]
pub async fn board_stats(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let day_start = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
    let stats = data.repo.board_stats(day_start).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(stats)))
}

#[utoipa::path(
    post,
    path = "/api/site/verify",
    request_body = SitePasswordRequest,
    responses(
        (status = 200, description = "Site password accepted"),
        (status = 401, description = "Wrong site password")
    )
)]
pub async fn verify_site_password(
    data: web::Data<AppState>,
    payload: web::Json<SitePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;
    if !data.config.site_password_matches(&payload.password) {
        return Err(ApiError::Unauthorized("Site password does not match".into()));
    }
    Ok(HttpResponse::Ok().json(ApiResponse::message("Site password verified")))
}

// ---------------- blobs ----------------

#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
    pub mime: String,
    pub size: usize,
    pub duplicate: bool, // true when the same bytes were already stored
}

const UPLOAD_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_MIME: &[&str] = &[
    "image/png", "image/jpeg", "image/gif", "image/webp",
    "application/pdf", "application/zip",
];

#[utoipa::path(
    post,
    path = "/api/uploads",
    responses(
        (status = 201, description = "Blob stored (new)", body = UploadResponse),
        (status = 200, description = "Blob already existed", body = UploadResponse),
        (status = 400, description = "No file field / unsupported type / too large")
    )
)]
pub async fn upload_blob(data: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        tracing::warn!("multipart error: {e}");
        ApiError::BadRequest("Malformed multipart body".into())
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let mut bytes: Vec<u8> = Vec::new();
        let mut hasher = Sha256::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            tracing::warn!("upload stream error: {e}");
            ApiError::BadRequest("Malformed multipart body".into())
        })? {
            if bytes.len() + chunk.len() > UPLOAD_SIZE_LIMIT {
                return Err(ApiError::BadRequest("File too large (max 10 MB)".into()));
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let hash = hex::encode(hasher.finalize());
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Err(ApiError::BadRequest(format!("Unsupported file type: {mime}")));
        }
        let key = storage::key_for(&hash, &mime);
        let (status, duplicate) = match data.blob_store.save(&key, &mime, &bytes).await {
            Ok(()) => (actix_web::http::StatusCode::CREATED, false),
            Err(BlobStoreError::Duplicate) => (actix_web::http::StatusCode::OK, true),
            Err(e) => {
                tracing::error!("blob store save error: {e}");
                return Err(ApiError::Internal);
            }
        };
        let url = storage::public_url(&data.config.blob_public_url, &key);
        let resp = UploadResponse { key, url, mime, size: bytes.len(), duplicate };
        return Ok(HttpResponse::build(status).json(ApiResponse::ok(resp)));
    }
    Err(ApiError::BadRequest("Missing 'file' field".into()))
}

pub async fn get_blob(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    if !storage::is_valid_key(&key) {
        return Err(ApiError::not_found("Blob"));
    }
    match data.blob_store.load(&key).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes)),
        Err(BlobStoreError::NotFound) => Err(ApiError::not_found("Blob")),
        Err(e) => {
            tracing::error!("blob store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
