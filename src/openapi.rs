use crate::models::{
    AttachedFile, BoardStats, Comment, CommentDeleteData, CommentLikeData, CommentLikeRequest,
    CreateCommentRequest, CreatePostRequest, DeleteRequest, LikeAction, Post, PostDeleteData,
    PostLikeData, PostLikeRequest, PostPage, PostViewData, RecentComment, SitePasswordRequest,
    VerifyCommentRequest, VerifyPostRequest,
};
use crate::error::ApiErrorBody;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::trending_posts,
        crate::routes::get_post,
        crate::routes::delete_post,
        crate::routes::verify_post,
        crate::routes::like_post,
        crate::routes::view_post,
        crate::routes::list_comments,
        crate::routes::create_comment,
        crate::routes::recent_comments,
        crate::routes::delete_comment,
        crate::routes::like_comment,
        crate::routes::verify_comment,
        crate::routes::board_stats,
        crate::routes::verify_site_password,
        crate::routes::upload_blob,
    ),
    components(schemas(
        Post, Comment, AttachedFile, PostPage, RecentComment, BoardStats,
        CreatePostRequest, CreateCommentRequest, DeleteRequest, VerifyPostRequest,
        VerifyCommentRequest, SitePasswordRequest, LikeAction, PostLikeRequest, CommentLikeRequest,
        PostDeleteData, PostLikeData, PostViewData, CommentDeleteData, CommentLikeData,
        ApiErrorBody, crate::routes::UploadResponse
    )),
    modifiers(&ApiKeyAddon),
    security(("api_key" = [])),
    tags(
        (name = "posts", description = "Post operations"),
        (name = "comments", description = "Comment operations"),
        (name = "board", description = "Board-wide stats, uploads and site password"),
    )
)]
pub struct ApiDoc;

struct ApiKeyAddon;

impl Modify for ApiKeyAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(crate::gate::API_KEY_HEADER))),
            );
        }
    }
}
