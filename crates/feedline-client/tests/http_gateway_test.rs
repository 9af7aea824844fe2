//! HTTP gateway tests against a local mock server

use std::sync::Arc;

use feedline_client::{
    with_credential, AccessToken, ApiError, ErrorKind, FeedGateway, GatewayConfig, HttpGateway,
    NewPost, RegisterRequest, SortMode,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer) -> HttpGateway {
    HttpGateway::new(GatewayConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap()
}

fn post_json(id: i64, body: &str, likes: u64) -> serde_json::Value {
    json!({
        "id": id,
        "body": body,
        "user_id": 1,
        "image_url": null,
        "created_at": "2025-03-01T10:20:30.123456",
        "likes": likes,
        "username": "alice"
    })
}

#[tokio::test]
async fn test_login_posts_form_with_email_as_username() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("username=a%40x.com"))
        .and(body_string_contains("password=pw1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = gateway_for(&server).login("a@x.com", "pw1").await.unwrap();
    assert_eq!(token.secret(), "tok-123");
}

#[tokio::test]
async fn test_bad_credentials_are_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Incorrect email or password"})),
        )
        .mount(&server)
        .await;

    let err = gateway_for(&server).login("a@x.com", "nope").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(err.to_string().contains("Incorrect email or password"));
}

#[tokio::test]
async fn test_register_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .and(body_json(json!({
            "email": "a@x.com",
            "username": "alice",
            "password": "pw1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "user created"})))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = gateway_for(&server)
        .register(&RegisterRequest {
            email: "a@x.com".to_string(),
            username: "alice".to_string(),
            password: "pw1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(receipt.detail, "user created");
}

#[tokio::test]
async fn test_duplicate_email_is_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"detail": "A user with that email already exists"})),
        )
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .register(&RegisterRequest {
            email: "a@x.com".to_string(),
            username: "alice".to_string(),
            password: "pw1".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_authenticated_client_attaches_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .and(query_param("sorting", "most_likes"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([post_json(2, "popular", 5), post_json(1, "quiet", 0)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway: Arc<dyn FeedGateway> = Arc::new(gateway_for(&server));
    let client = with_credential(gateway, AccessToken::new("tok-123"));

    let posts = client.list_posts(SortMode::MostLiked).await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].like_count, 5);
    assert_eq!(posts[0].author_username, "alice");
}

#[tokio::test]
async fn test_anonymous_read_has_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .and(query_param("sorting", "new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let posts = gateway_for(&server)
        .list_posts(None, SortMode::Newest)
        .await
        .unwrap();
    assert!(posts.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_get_post_returns_post_with_comments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "post": post_json(7, "hello", 1),
            "comments": [{
                "id": 1,
                "post_id": 7,
                "user_id": 2,
                "username": "bob",
                "body": "nice",
                "created_at": "2025-03-01T11:00:00"
            }]
        })))
        .mount(&server)
        .await;

    let detail = gateway_for(&server).get_post(None, 7).await.unwrap();
    assert_eq!(detail.post.id, 7);
    assert_eq!(detail.comments.len(), 1);
    assert_eq!(detail.comments[0].author_username, "bob");
}

#[tokio::test]
async fn test_status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    let token = AccessToken::new("tok-123");

    Mock::given(method("DELETE"))
        .and(path("/post/1"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"detail": "Not authorized to delete this post"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/like"))
        .and(body_json(json!({"post_id": 99})))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Post not found"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [{"loc": ["body", "body"], "msg": "field required", "type": "missing"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/post/1/comment"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);

    let err = gateway.delete_post(&token, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(!err.is_unauthorized());

    let err = gateway.like_post(&token, 99).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = gateway
        .create_post(&token, &NewPost::text(""))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("field required"));

    let err = gateway.list_comments(None, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 502, .. }));
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_create_comment_and_update_post_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/comment"))
        .and(body_json(json!({"body": "nice", "post_id": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 10,
            "post_id": 3,
            "user_id": 1,
            "body": "nice",
            "created_at": "2025-03-01T11:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/post/3"))
        .and(body_json(json!({"body": "edited"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 3,
            "body": "edited",
            "user_id": 1,
            "created_at": "2025-03-01T10:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = AccessToken::new("tok-123");
    let gateway = gateway_for(&server);

    let comment = gateway.create_comment(&token, 3, "nice").await.unwrap();
    assert_eq!(comment.id, 10);

    let post = gateway.update_post(&token, 3, "edited").await.unwrap();
    assert_eq!(post.body, "edited");
    assert_eq!(post.like_count, 0);
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let gateway = HttpGateway::new(GatewayConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout_secs: 2,
        ..Default::default()
    })
    .unwrap();

    let err = gateway.list_posts(None, SortMode::Newest).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}
