#![cfg(feature = "inmem-store")]

use anonboard::counters::{Counter, Direction};
use anonboard::models::{AttachedFile, NewComment, NewPost};
use anonboard::repo::{inmem::InMemRepo, RepoError};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use anonboard::repo::{BlobRefRepo, CommentRepo, PostRepo, StatsRepo};
use chrono::{Duration, Utc};

fn new_post(title: &str) -> NewPost {
    NewPost {
        title: title.into(),
        content: "<p>c</p>".into(),
        nickname: "anon".into(),
        password_hash: "$argon2id$placeholder".into(),
        attached_files: Vec::new(),
    }
}

fn new_comment(post_id: uuid::Uuid, parent_id: Option<uuid::Uuid>, depth: i32) -> NewComment {
    NewComment {
        post_id,
        parent_id,
        depth,
        content: "hello".into(),
        nickname: "anon".into(),
        password_hash: "$argon2id$placeholder".into(),
    }
}

#[tokio::test]
async fn counters_floor_at_zero() {
    let r = InMemRepo::new();
    let p = r.create_post(new_post("p")).await.unwrap();

    for _ in 0..3 {
        assert_eq!(r.adjust_post_counter(p.id, Counter::Likes, Direction::Decrease).await.unwrap(), 0);
    }
    for n in 1..=5 {
        assert_eq!(r.adjust_post_counter(p.id, Counter::Views, Direction::Increase).await.unwrap(), n);
    }
    assert_eq!(r.get_post(p.id).await.unwrap().view_count, 5);
}

#[tokio::test]
async fn concurrent_increments_are_not_lost() {
    let r = InMemRepo::new();
    let p = r.create_post(new_post("p")).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let r = r.clone();
            tokio::spawn(async move { r.adjust_post_counter(p.id, Counter::Views, Direction::Increase).await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(r.get_post(p.id).await.unwrap().view_count, 20);
}

#[tokio::test]
async fn mark_deleted_is_guarded() {
    let r = InMemRepo::new();
    let p = r.create_post(new_post("p")).await.unwrap();

    let deleted = r.mark_post_deleted(p.id, "gone", "<p>gone</p>").await.unwrap();
    assert!(deleted.is_deleted);
    assert!(deleted.deleted_at.is_some());
    assert_eq!(deleted.title, "gone");

    let err = r.mark_post_deleted(p.id, "again", "again").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
    // first placeholder wins
    assert_eq!(r.get_post(p.id).await.unwrap().title, "gone");

    let err = r.adjust_post_counter(p.id, Counter::Likes, Direction::Increase).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn blob_references_ignore_owner_and_deleted_rows() {
    let r = InMemRepo::new();
    let key = "images/ab/ab01";
    let mut with_image = new_post("a");
    with_image.content = format!(r#"<img src="http://localhost:8080/blobs/{key}">"#);
    let a = r.create_post(with_image).await.unwrap();
    assert!(!r.blob_referenced_elsewhere(key, a.id).await.unwrap());

    let mut with_file = new_post("b");
    with_file.attached_files = vec![AttachedFile {
        url: format!("http://localhost:8080/blobs/{key}"),
        name: "x.png".into(),
        size: 3,
        mime: "image/png".into(),
    }];
    let b = r.create_post(with_file).await.unwrap();
    assert!(r.blob_referenced_elsewhere(key, a.id).await.unwrap());
    assert!(r.blob_referenced_elsewhere(key, b.id).await.unwrap());

    r.mark_post_deleted(b.id, "gone", "gone").await.unwrap();
    assert!(!r.blob_referenced_elsewhere(key, a.id).await.unwrap());

    let mut reply = new_comment(a.id, None, 0);
    reply.content = format!("mirror of {key}");
    let c = r.create_comment(reply).await.unwrap();
    assert!(r.blob_referenced_elsewhere(key, a.id).await.unwrap());
    assert!(r.blob_referenced_elsewhere(key, c.id).await.unwrap());
    assert!(!r.blob_referenced_elsewhere("images/cd/cd02", a.id).await.unwrap());
}

#[tokio::test]
async fn comment_count_follows_comment_lifecycle() {
    let r = InMemRepo::new();
    let p = r.create_post(new_post("p")).await.unwrap();
    let c1 = r.create_comment(new_comment(p.id, None, 0)).await.unwrap();
    let c2 = r.create_comment(new_comment(p.id, Some(c1.id), 1)).await.unwrap();
    assert_eq!(r.get_post(p.id).await.unwrap().comment_count, 2);

    r.mark_comment_deleted(c1.id, "removed").await.unwrap();
    assert_eq!(r.get_post(p.id).await.unwrap().comment_count, 1);
    // child untouched
    assert!(!r.get_comment(c2.id).await.unwrap().is_deleted);

    let err = r.mark_comment_deleted(c1.id, "removed").await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
    assert_eq!(r.get_post(p.id).await.unwrap().comment_count, 1);

    let missing = r.create_comment(new_comment(uuid::Uuid::new_v4(), None, 0)).await.unwrap_err();
    assert!(matches!(missing, RepoError::NotFound));
}

#[tokio::test]
async fn stats_respect_day_boundary() {
    let r = InMemRepo::new();
    let p = r.create_post(new_post("p")).await.unwrap();
    r.create_comment(new_comment(p.id, None, 0)).await.unwrap();

    let stats = r.board_stats(Utc::now() + Duration::hours(1)).await.unwrap();
    assert_eq!(stats.total_posts, 1);
    assert_eq!(stats.today_posts, 0);
    assert_eq!(stats.total_comments, 1);
    assert_eq!(stats.today_comments, 0);

    let stats = r.board_stats(Utc::now() - Duration::hours(1)).await.unwrap();
    assert_eq!(stats.today_posts, 1);
    assert_eq!(stats.today_comments, 1);
}
