#![cfg(feature = "postgres-store")]

//! Runs against a real Postgres when `DATABASE_URL` is set; otherwise each test returns early.

use anonboard::counters::{Counter, Direction};
use anonboard::models::{AttachedFile, NewComment, NewPost};
use anonboard::repo::{pg::PgRepo, BlobRefRepo, CommentRepo, PostRepo, RepoError};
use sqlx::postgres::PgPoolOptions;

async fn repo() -> Option<PgRepo> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(u) => u,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping postgres test");
            return None;
        }
    };
    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    Some(PgRepo::new(pool))
}

fn new_post() -> NewPost {
    NewPost {
        title: "pg post".into(),
        content: "<p>c</p>".into(),
        nickname: "anon".into(),
        password_hash: "$argon2id$placeholder".into(),
        attached_files: vec![AttachedFile {
            url: "http://localhost:8080/blobs/files/ab/ab01".into(),
            name: "a.pdf".into(),
            size: 3,
            mime: "application/pdf".into(),
        }],
    }
}

#[tokio::test]
async fn pg_counters_and_soft_delete() {
    let Some(r) = repo().await else { return };
    let p = r.create_post(new_post()).await.unwrap();
    assert!(p.has_attachments);
    assert_eq!(p.attachment_count, 1);
    assert_eq!(p.attachments().len(), 1);

    assert_eq!(r.adjust_post_counter(p.id, Counter::Likes, Direction::Decrease).await.unwrap(), 0);
    assert_eq!(r.adjust_post_counter(p.id, Counter::Views, Direction::Increase).await.unwrap(), 1);
    assert_eq!(r.adjust_post_counter(p.id, Counter::Views, Direction::Increase).await.unwrap(), 2);

    let c = r
        .create_comment(NewComment {
            post_id: p.id,
            parent_id: None,
            depth: 0,
            content: "hi".into(),
            nickname: "anon".into(),
            password_hash: "$argon2id$placeholder".into(),
        })
        .await
        .unwrap();
    assert_eq!(r.get_post(p.id).await.unwrap().comment_count, 1);
    r.mark_comment_deleted(c.id, "deleted").await.unwrap();
    assert_eq!(r.get_post(p.id).await.unwrap().comment_count, 0);

    let d = r.mark_post_deleted(p.id, "Deleted post", "<p>gone</p>").await.unwrap();
    assert!(d.is_deleted);
    assert!(d.attached_files.is_none());
    assert!(matches!(r.mark_post_deleted(p.id, "x", "y").await, Err(RepoError::NotFound)));
    assert!(matches!(
        r.adjust_post_counter(p.id, Counter::Views, Direction::Increase).await,
        Err(RepoError::NotFound)
    ));
}

#[tokio::test]
async fn pg_blob_references() {
    let Some(r) = repo().await else { return };
    // fresh key so rows left by earlier runs cannot match
    let key = format!("images/ff/{}", uuid::Uuid::new_v4().simple());
    let mut embedding = new_post();
    embedding.content = format!(r#"<img src="http://localhost:8080/blobs/{key}">"#);
    embedding.attached_files.clear();
    let a = r.create_post(embedding).await.unwrap();
    assert!(!r.blob_referenced_elsewhere(&key, a.id).await.unwrap());

    let mut attaching = new_post();
    attaching.attached_files[0].url = format!("http://localhost:8080/blobs/{key}");
    let b = r.create_post(attaching).await.unwrap();
    assert!(r.blob_referenced_elsewhere(&key, a.id).await.unwrap());

    r.mark_post_deleted(b.id, "gone", "gone").await.unwrap();
    assert!(!r.blob_referenced_elsewhere(&key, a.id).await.unwrap());
}
