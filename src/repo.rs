use chrono::{DateTime, Utc};

use crate::counters::{Counter, Direction};
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    /// Returns the row whether or not it is soft-deleted.
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// Live posts, newest first, plus the total live count.
    async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<(Vec<Post>, i64)>;
    async fn trending_posts(&self, since: DateTime<Utc>, limit: i64) -> RepoResult<Vec<Post>>;
    /// Scrubs and flags a live post. `NotFound` when it is absent or already deleted.
    async fn mark_post_deleted(&self, id: Id, title: &str, content: &str) -> RepoResult<Post>;
    /// Atomically applies `direction` to a live post's counter (floored at 0) and returns the new value.
    async fn adjust_post_counter(&self, id: Id, counter: Counter, direction: Direction) -> RepoResult<i64>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Inserts the comment and bumps the owning post's comment_count.
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    /// Scrubs and flags a live comment, then decrements the live owning post's comment_count.
    async fn mark_comment_deleted(&self, id: Id, content: &str) -> RepoResult<Comment>;
    async fn adjust_comment_likes(&self, id: Id, direction: Direction) -> RepoResult<i64>;
    async fn recent_comments(&self, limit: i64) -> RepoResult<Vec<RecentComment>>;
}

#[async_trait]
pub trait StatsRepo: Send + Sync {
    async fn board_stats(&self, day_start: DateTime<Utc>) -> RepoResult<BoardStats>;
}

/// Blobs are content addressed, so one key can back several posts and comments.
#[async_trait]
pub trait BlobRefRepo: Send + Sync {
    /// True while a live post or comment other than `except` mentions `key` in its content or
    /// attachment URLs. Matching is by substring, so a false hit only keeps a blob alive.
    async fn blob_referenced_elsewhere(&self, key: &str, except: Id) -> RepoResult<bool>;
}

pub trait Repo: PostRepo + CommentRepo + StatsRepo + BlobRefRepo {}

impl<T> Repo for T where T: PostRepo + CommentRepo + StatsRepo + BlobRefRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use sqlx::types::Json;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use uuid::Uuid;

    #[derive(Default)]
    struct State {
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
    }

    /// Process-local store for tests and database-less local runs.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let now = Utc::now();
            let attachment_count = new.attached_files.len() as i32;
            let post = Post {
                id: Uuid::new_v4(),
                title: new.title,
                content: new.content,
                nickname: new.nickname,
                password_hash: new.password_hash,
                view_count: 0,
                like_count: 0,
                comment_count: 0,
                has_attachments: attachment_count > 0,
                attachment_count,
                attached_files: (attachment_count > 0).then(|| Json(new.attached_files)),
                is_deleted: false,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            };
            s.posts.insert(post.id, post.clone());
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            self.read()?.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<(Vec<Post>, i64)> {
            let s = self.read()?;
            let mut live: Vec<_> = s.posts.values().filter(|p| !p.is_deleted).cloned().collect();
            live.sort_by(|a, b| b.created_at.cmp(&a.created_at)); // latest first
            let total = live.len() as i64;
            let page = live
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect();
            Ok((page, total))
        }

        async fn trending_posts(&self, since: DateTime<Utc>, limit: i64) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.posts.values()
                .filter(|p| !p.is_deleted && p.created_at >= since)
                .cloned()
                .collect();
            v.sort_by(|a, b| {
                b.view_count.cmp(&a.view_count)
                    .then(b.like_count.cmp(&a.like_count))
                    .then(b.created_at.cmp(&a.created_at))
            });
            v.truncate(limit.max(0) as usize);
            Ok(v)
        }

        async fn mark_post_deleted(&self, id: Id, title: &str, content: &str) -> RepoResult<Post> {
            let mut s = self.write()?;
            let post = s.posts.get_mut(&id).filter(|p| !p.is_deleted).ok_or(RepoError::NotFound)?;
            let now = Utc::now();
            post.title = title.to_string();
            post.content = content.to_string();
            post.attached_files = None;
            post.has_attachments = false;
            post.attachment_count = 0;
            post.is_deleted = true;
            post.deleted_at = Some(now);
            post.updated_at = now;
            Ok(post.clone())
        }

        async fn adjust_post_counter(&self, id: Id, counter: Counter, direction: Direction) -> RepoResult<i64> {
            let mut s = self.write()?;
            let post = s.posts.get_mut(&id).filter(|p| !p.is_deleted).ok_or(RepoError::NotFound)?;
            let slot = match counter {
                Counter::Views => &mut post.view_count,
                Counter::Likes => &mut post.like_count,
            };
            *slot = direction.apply(Some(*slot));
            Ok(*slot)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.write()?;
            let post = s.posts.get_mut(&new.post_id).ok_or(RepoError::NotFound)?;
            post.comment_count = Direction::Increase.apply(Some(post.comment_count));
            let now = Utc::now();
            let comment = Comment {
                id: Uuid::new_v4(),
                post_id: new.post_id,
                parent_id: new.parent_id,
                depth: new.depth,
                content: new.content,
                nickname: new.nickname,
                password_hash: new.password_hash,
                like_count: 0,
                is_deleted: false,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            };
            s.comments.insert(comment.id, comment.clone());
            Ok(comment)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            self.read()?.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.comments.values()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at)); // ascending
            Ok(v)
        }

        async fn mark_comment_deleted(&self, id: Id, content: &str) -> RepoResult<Comment> {
            let mut s = self.write()?;
            let comment = s.comments.get_mut(&id).filter(|c| !c.is_deleted).ok_or(RepoError::NotFound)?;
            let now = Utc::now();
            comment.content = content.to_string();
            comment.is_deleted = true;
            comment.deleted_at = Some(now);
            comment.updated_at = now;
            let deleted = comment.clone();
            if let Some(post) = s.posts.get_mut(&deleted.post_id).filter(|p| !p.is_deleted) {
                post.comment_count = Direction::Decrease.apply(Some(post.comment_count));
            }
            Ok(deleted)
        }

        async fn adjust_comment_likes(&self, id: Id, direction: Direction) -> RepoResult<i64> {
            let mut s = self.write()?;
            let comment = s.comments.get_mut(&id).filter(|c| !c.is_deleted).ok_or(RepoError::NotFound)?;
            comment.like_count = direction.apply(Some(comment.like_count));
            Ok(comment.like_count)
        }

        async fn recent_comments(&self, limit: i64) -> RepoResult<Vec<RecentComment>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.comments.values()
                .filter(|c| !c.is_deleted)
                .filter_map(|c| {
                    let post = s.posts.get(&c.post_id).filter(|p| !p.is_deleted)?;
                    Some(RecentComment {
                        id: c.id,
                        post_id: c.post_id,
                        post_title: post.title.clone(),
                        content: c.content.clone(),
                        nickname: c.nickname.clone(),
                        created_at: c.created_at,
                    })
                })
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            v.truncate(limit.max(0) as usize);
            Ok(v)
        }
    }

    #[async_trait]
    impl StatsRepo for InMemRepo {
        async fn board_stats(&self, day_start: DateTime<Utc>) -> RepoResult<BoardStats> {
            let s = self.read()?;
            let live_posts = s.posts.values().filter(|p| !p.is_deleted);
            let live_comments = s.comments.values().filter(|c| !c.is_deleted);
            Ok(BoardStats {
                total_posts: live_posts.clone().count() as i64,
                today_posts: live_posts.filter(|p| p.created_at >= day_start).count() as i64,
                total_comments: live_comments.clone().count() as i64,
                today_comments: live_comments.filter(|c| c.created_at >= day_start).count() as i64,
            })
        }
    }

    #[async_trait]
    impl BlobRefRepo for InMemRepo {
        async fn blob_referenced_elsewhere(&self, key: &str, except: Id) -> RepoResult<bool> {
            let s = self.read()?;
            let in_posts = s.posts.values()
                .filter(|p| !p.is_deleted && p.id != except)
                .any(|p| p.content.contains(key) || p.attachments().iter().any(|f| f.url.contains(key)));
            let in_comments = s.comments.values()
                .filter(|c| !c.is_deleted && c.id != except)
                .any(|c| c.content.contains(key));
            Ok(in_posts || in_comments)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres};
    use uuid::Uuid;

    const POST_COLUMNS: &str = "id, title, content, nickname, password_hash, view_count, like_count, comment_count, \
        attached_files, has_attachments, attachment_count, is_deleted, deleted_at, created_at, updated_at";

    const COMMENT_COLUMNS: &str = "id, post_id, parent_id, depth, content, nickname, password_hash, like_count, \
        is_deleted, deleted_at, created_at, updated_at";

    fn db_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref d) if d.is_unique_violation() => RepoError::Conflict,
            // comment pointing at a post that does not exist
            sqlx::Error::Database(ref d) if d.is_foreign_key_violation() => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let attachment_count = new.attached_files.len() as i32;
            let files = (attachment_count > 0).then(|| Json(new.attached_files));
            sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (id, title, content, nickname, password_hash, attached_files, has_attachments, attachment_count) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {POST_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.content)
            .bind(&new.nickname)
            .bind(&new.password_hash)
            .bind(files)
            .bind(attachment_count > 0)
            .bind(attachment_count)
            .fetch_one(&self.pool).await.map_err(db_err)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<(Vec<Post>, i64)> {
            let posts = sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE is_deleted = false ORDER BY created_at DESC LIMIT $1 OFFSET $2"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool).await.map_err(db_err)?;
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE is_deleted = false")
                .fetch_one(&self.pool).await.map_err(db_err)?;
            Ok((posts, total))
        }

        async fn trending_posts(&self, since: DateTime<Utc>, limit: i64) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts \
                 WHERE is_deleted = false AND created_at >= $1 \
                 ORDER BY view_count DESC, like_count DESC, created_at DESC LIMIT $2"
            ))
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool).await.map_err(db_err)
        }

        async fn mark_post_deleted(&self, id: Id, title: &str, content: &str) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET title = $2, content = $3, attached_files = NULL, has_attachments = false, \
                 attachment_count = 0, is_deleted = true, deleted_at = now(), updated_at = now() \
                 WHERE id = $1 AND is_deleted = false RETURNING {POST_COLUMNS}"
            ))
            .bind(id)
            .bind(title)
            .bind(content)
            .fetch_optional(&self.pool).await.map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn adjust_post_counter(&self, id: Id, counter: Counter, direction: Direction) -> RepoResult<i64> {
            // single statement: no read-then-write race between concurrent callers
            let col = counter.column();
            sqlx::query_scalar::<_, i64>(&format!(
                "UPDATE posts SET {col} = GREATEST(COALESCE({col}, 0) + $2, 0) \
                 WHERE id = $1 AND is_deleted = false RETURNING {col}"
            ))
            .bind(id)
            .bind(direction.delta())
            .fetch_optional(&self.pool).await.map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let comment = sqlx::query_as::<_, Comment>(&format!(
                "INSERT INTO comments (id, post_id, parent_id, depth, content, nickname, password_hash) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING {COMMENT_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(new.post_id)
            .bind(new.parent_id)
            .bind(new.depth)
            .bind(&new.content)
            .bind(&new.nickname)
            .bind(&new.password_hash)
            .fetch_one(&mut *tx).await.map_err(db_err)?;
            sqlx::query("UPDATE posts SET comment_count = COALESCE(comment_count, 0) + 1 WHERE id = $1")
                .bind(new.post_id)
                .execute(&mut *tx).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(comment)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1 ORDER BY created_at ASC"
            ))
            .bind(post_id)
            .fetch_all(&self.pool).await.map_err(db_err)
        }

        async fn mark_comment_deleted(&self, id: Id, content: &str) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let comment = sqlx::query_as::<_, Comment>(&format!(
                "UPDATE comments SET content = $2, is_deleted = true, deleted_at = now(), updated_at = now() \
                 WHERE id = $1 AND is_deleted = false RETURNING {COMMENT_COLUMNS}"
            ))
            .bind(id)
            .bind(content)
            .fetch_optional(&mut *tx).await.map_err(db_err)?
            .ok_or(RepoError::NotFound)?;
            sqlx::query(
                "UPDATE posts SET comment_count = GREATEST(COALESCE(comment_count, 0) - 1, 0) \
                 WHERE id = $1 AND is_deleted = false"
            )
            .bind(comment.post_id)
            .execute(&mut *tx).await.map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(comment)
        }

        async fn adjust_comment_likes(&self, id: Id, direction: Direction) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>(
                "UPDATE comments SET like_count = GREATEST(COALESCE(like_count, 0) + $2, 0) \
                 WHERE id = $1 AND is_deleted = false RETURNING like_count"
            )
            .bind(id)
            .bind(direction.delta())
            .fetch_optional(&self.pool).await.map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn recent_comments(&self, limit: i64) -> RepoResult<Vec<RecentComment>> {
            sqlx::query_as::<_, RecentComment>(r#"
                SELECT c.id, c.post_id, p.title AS post_title, c.content, c.nickname, c.created_at
                FROM comments c
                JOIN posts p ON p.id = c.post_id
                WHERE c.is_deleted = false AND p.is_deleted = false
                ORDER BY c.created_at DESC
                LIMIT $1
            "#)
            .bind(limit)
            .fetch_all(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl StatsRepo for PgRepo {
        async fn board_stats(&self, day_start: DateTime<Utc>) -> RepoResult<BoardStats> {
            sqlx::query_as::<_, BoardStats>(r#"
                SELECT
                    (SELECT COUNT(*) FROM posts WHERE is_deleted = false) AS total_posts,
                    (SELECT COUNT(*) FROM posts WHERE is_deleted = false AND created_at >= $1) AS today_posts,
                    (SELECT COUNT(*) FROM comments WHERE is_deleted = false) AS total_comments,
                    (SELECT COUNT(*) FROM comments WHERE is_deleted = false AND created_at >= $1) AS today_comments
            "#)
            .bind(day_start)
            .fetch_one(&self.pool).await.map_err(db_err)
        }
    }

    #[async_trait]
    impl BlobRefRepo for PgRepo {
        async fn blob_referenced_elsewhere(&self, key: &str, except: Id) -> RepoResult<bool> {
            // strpos matches $1 literally
            sqlx::query_scalar::<_, bool>(r#"
                SELECT EXISTS (
                    SELECT 1 FROM posts
                    WHERE is_deleted = false AND id <> $2
                      AND (strpos(content, $1) > 0 OR strpos(COALESCE(attached_files::text, ''), $1) > 0)
                ) OR EXISTS (
                    SELECT 1 FROM comments
                    WHERE is_deleted = false AND id <> $2 AND strpos(content, $1) > 0
                )
            "#)
            .bind(key)
            .bind(except)
            .fetch_one(&self.pool).await.map_err(db_err)
        }
    }
}
