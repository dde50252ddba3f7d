#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use common::*;
use std::sync::Arc;

const SOME_ID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

#[actix_web::test]
async fn missing_or_wrong_api_key_is_rejected() {
    let state = app_state(Arc::new(MockBlobStore::default()));
    let app = test_app!(state);

    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["statusCode"], 401);

    let req = test::TestRequest::get()
        .uri("/api/posts")
        .insert_header(("x-api-key", "not-the-configured-key"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // key is checked before the id shape
    let req = test::TestRequest::get().uri("/api/posts/not-a-uuid").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn health_is_public() {
    let state = app_state(Arc::new(MockBlobStore::default()));
    let app = test_app!(state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn malformed_ids_are_bad_requests() {
    let state = app_state(Arc::new(MockBlobStore::default()));
    let app = test_app!(state);

    for uri in [
        "/api/posts/not-a-uuid",
        "/api/posts/3fa85f64-5717-1562-b3fc-2c963f66afa6", // v1, not v4
        "/api/posts/not-a-uuid/comments",
    ] {
        let resp = test::call_service(&app, api_get(uri).to_request()).await;
        assert_eq!(resp.status(), 400, "{uri}");
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["statusMessage"], "Invalid ID format");
    }

    let req = api_post("/api/comments/not-a-uuid/delete", serde_json::json!({"password": "1234"})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn wrong_method_is_bad_request() {
    let state = app_state(Arc::new(MockBlobStore::default()));
    let app = test_app!(state);

    let resp = test::call_service(&app, api_get(&format!("/api/posts/{SOME_ID}/delete")).to_request()).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["statusMessage"], "Method not allowed");

    let req = test::TestRequest::delete()
        .uri("/api/posts")
        .insert_header(("x-api-key", API_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn unknown_entities_are_not_found() {
    let state = app_state(Arc::new(MockBlobStore::default()));
    let app = test_app!(state);

    let resp = test::call_service(&app, api_get(&format!("/api/posts/{SOME_ID}")).to_request()).await;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["statusMessage"], "Post not found");

    let req = api_post(&format!("/api/comments/{SOME_ID}/like"), serde_json::json!({"liked": true})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn malformed_json_is_bad_request() {
    let state = app_state(Arc::new(MockBlobStore::default()));
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("x-api-key", API_KEY))
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["statusCode"], 400);
}

#[actix_web::test]
async fn site_password_check() {
    let state = app_state(Arc::new(MockBlobStore::default()));
    let app = test_app!(state);

    let req = api_post("/api/site/verify", serde_json::json!({"password": SITE_PASSWORD})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);

    let req = api_post("/api/site/verify", serde_json::json!({"password": "guess"})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}
