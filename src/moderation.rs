//! Password-gated soft delete for posts and comments.
//!
//! Order of operations: fetch live row, verify password, release referenced blobs (best effort),
//! then flag + scrub the row. Only the final row update can fail the operation.
//! A blob another live post or comment still references is kept.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::credential;
use crate::error::{not_found_as, ApiError};
use crate::models::{AttachedFile, Comment, Id, Post};
use crate::repo::{BlobRefRepo, CommentRepo, PostRepo, Repo};
use crate::storage::{key_from_url, BlobStore};

pub const DELETED_POST_TITLE: &str = "Deleted post";
pub const DELETED_POST_CONTENT: &str = "<p>This post has been deleted.</p>";
pub const DELETED_COMMENT_CONTENT: &str = "This comment has been deleted.";

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("img src regex")
});

/// Blob keys of images embedded in `html` that live under `blob_base`, deduplicated.
pub fn embedded_image_keys(html: &str, blob_base: &str) -> Vec<String> {
    IMG_SRC
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .filter_map(|m| key_from_url(blob_base, m.as_str()))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn attachment_keys(files: &[AttachedFile], blob_base: &str) -> Vec<String> {
    files
        .iter()
        .filter_map(|f| key_from_url(blob_base, &f.url))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Drops keys that a live post or comment other than `owner` still references.
/// A failed lookup keeps the blob.
pub async fn unshared_keys(repo: &dyn Repo, owner: Id, keys: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        match repo.blob_referenced_elsewhere(&key, owner).await {
            Ok(false) => out.push(key),
            Ok(true) => info!(%key, %owner, "blob still referenced elsewhere, kept"),
            Err(e) => warn!(%key, %owner, "blob reference check failed, kept: {e}"),
        }
    }
    out
}

/// Deletes every key, logging failures. Returns how many were attempted.
pub async fn release_blobs(store: &dyn BlobStore, keys: &[String]) -> usize {
    for key in keys {
        if let Err(e) = store.delete(key).await {
            warn!(%key, "blob cleanup failed: {e}");
        }
    }
    keys.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostDeletion {
    pub deleted_images: usize,
    pub deleted_attachments: usize,
}

#[derive(Debug, Clone)]
pub struct CommentDeletion {
    pub comment: Comment,
    pub deleted_images: usize,
}

/// Fetches a live post and checks its password; the row is untouched on any failure.
pub async fn authorize_post(repo: &dyn Repo, id: Id, secret: &str) -> Result<Post, ApiError> {
    let post = repo.get_post(id).await.map_err(not_found_as("Post"))?;
    if post.is_deleted {
        return Err(ApiError::not_found("Post"));
    }
    if !credential::verify(secret, &post.password_hash)? {
        return Err(ApiError::Unauthorized("Password does not match".into()));
    }
    Ok(post)
}

pub async fn authorize_comment(repo: &dyn Repo, id: Id, secret: &str) -> Result<Comment, ApiError> {
    let comment = repo.get_comment(id).await.map_err(not_found_as("Comment"))?;
    if comment.is_deleted {
        return Err(ApiError::not_found("Comment"));
    }
    if !credential::verify(secret, &comment.password_hash)? {
        return Err(ApiError::Unauthorized("Password does not match".into()));
    }
    Ok(comment)
}

pub async fn soft_delete_post(
    repo: &dyn Repo,
    store: &dyn BlobStore,
    blob_base: &str,
    id: Id,
    secret: &str,
) -> Result<PostDeletion, ApiError> {
    let post = authorize_post(repo, id, secret).await?;

    let images = unshared_keys(repo, id, embedded_image_keys(&post.content, blob_base)).await;
    let attachments = unshared_keys(repo, id, attachment_keys(post.attachments(), blob_base)).await;
    let deleted_images = release_blobs(store, &images).await;
    let deleted_attachments = release_blobs(store, &attachments).await;

    repo.mark_post_deleted(id, DELETED_POST_TITLE, DELETED_POST_CONTENT)
        .await
        .map_err(not_found_as("Post"))?;
    info!(post_id = %id, deleted_images, deleted_attachments, "post soft-deleted");
    Ok(PostDeletion { deleted_images, deleted_attachments })
}

/// Child comments are left alone; each is deleted on its own.
pub async fn soft_delete_comment(
    repo: &dyn Repo,
    store: &dyn BlobStore,
    blob_base: &str,
    id: Id,
    secret: &str,
) -> Result<CommentDeletion, ApiError> {
    let comment = authorize_comment(repo, id, secret).await?;

    let images = unshared_keys(repo, id, embedded_image_keys(&comment.content, blob_base)).await;
    let deleted_images = release_blobs(store, &images).await;

    let comment = repo
        .mark_comment_deleted(id, DELETED_COMMENT_CONTENT)
        .await
        .map_err(not_found_as("Comment"))?;
    info!(comment_id = %id, post_id = %comment.post_id, "comment soft-deleted");
    Ok(CommentDeletion { comment, deleted_images })
}
