use anyhow::Result;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use murmur_server::api;
use murmur_server::db::repositories::AccountRepository;
use murmur_server::db::{Database, Schema};
use murmur_server::state::AppState;

fn app() -> Result<(Router, Database)> {
    let db = Database::in_memory(Schema::social())?;
    db.initialize()?;
    Ok((api::router(AppState::new(db.clone())), db))
}

async fn post_seed(app: &Router) -> Result<(StatusCode, serde_json::Value)> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/seed")
                .body(Body::empty())?,
        )
        .await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let (app, _) = app()?;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&bytes[..], b"OK");
    Ok(())
}

#[tokio::test]
async fn test_seed_returns_created_accounts() -> Result<()> {
    let (app, db) = app()?;
    let (status, body) = post_seed(&app).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Successfully seeded 3 users");

    let users = body["users"].as_array().expect("users array");
    assert_eq!(users.len(), 3);
    for user in users {
        assert!(user["id"].is_string());
        assert!(user["created_at"].is_string());
        assert!(user.get("password").is_none());
    }
    assert_eq!(users[1]["username"], "sarahsmith");
    assert_eq!(users[1]["is_private"], true);

    assert_eq!(AccountRepository::new(db).count()?, 3);
    Ok(())
}

#[tokio::test]
async fn test_reseed_fails_with_generic_body() -> Result<()> {
    let (app, db) = app()?;
    post_seed(&app).await?;

    let (status, body) = post_seed(&app).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Failed to seed data");
    assert!(body.get("users").is_none());
    assert!(!body.to_string().contains("unique_email"));

    assert_eq!(AccountRepository::new(db).count()?, 3);
    Ok(())
}

#[tokio::test]
async fn test_seed_route_rejects_get() -> Result<()> {
    let (app, _) = app()?;
    let response = app
        .oneshot(Request::builder().uri("/api/seed").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}
