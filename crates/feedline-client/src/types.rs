//! Types for the feed API

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type PostId = i64;
pub type CommentId = i64;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the feed service
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// User-Agent sent with every request
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            user_agent: concat!("feedline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Bearer token issued by `POST /token`.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Server-defined ordering of the post listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortMode {
    #[default]
    #[serde(rename = "new")]
    Newest,
    #[serde(rename = "old")]
    Oldest,
    #[serde(rename = "most_likes")]
    MostLiked,
}

impl SortMode {
    /// Value of the `sorting` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            SortMode::Newest => "new",
            SortMode::Oldest => "old",
            SortMode::MostLiked => "most_likes",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" | "newest" => Ok(SortMode::Newest),
            "old" | "oldest" => Ok(SortMode::Oldest),
            "most_likes" | "most-liked" | "liked" => Ok(SortMode::MostLiked),
            other => Err(format!("unknown sort mode: {}", other)),
        }
    }
}

/// Identity returned by `GET /me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

/// A post as listed by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(rename = "user_id")]
    pub author_id: UserId,
    /// Absent on create/update responses
    #[serde(rename = "username", default)]
    pub author_username: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Computed by the service; absent on create/update responses
    #[serde(rename = "likes", default)]
    pub like_count: u64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Payload of `GET /post/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: Post,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// A comment on a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(rename = "user_id", default)]
    pub author_id: UserId,
    #[serde(rename = "username", default)]
    pub author_username: String,
    pub body: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Response from `POST /register`; the service only confirms creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterReceipt {
    #[serde(default)]
    pub detail: String,
}

/// Response from `POST /token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: AccessToken,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Request body for `POST /post`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NewPost {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            image_url: None,
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Request body for `PUT /post/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct UpdatePostRequest {
    pub body: String,
}

/// Request body for `POST /like`
#[derive(Debug, Clone, Serialize)]
pub struct LikeRequest {
    pub post_id: PostId,
}

/// Request body for `POST /comment`
#[derive(Debug, Clone, Serialize)]
pub struct NewCommentRequest {
    pub body: String,
    pub post_id: PostId,
}

/// Error body returned by the service: `{"detail": "..."}` or a list of
/// field errors for request validation failures.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub detail: serde_json::Value,
}

impl ErrorResponse {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }
}

/// The service emits naive timestamps (no offset); treat those as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {:?}: {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listed_post_deserialization() {
        let json = r#"{
            "id": 7,
            "body": "hello",
            "user_id": 3,
            "image_url": null,
            "created_at": "2025-03-01T10:20:30.123456",
            "likes": 4,
            "username": "alice"
        }"#;

        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.id, 7);
        assert_eq!(post.author_id, 3);
        assert_eq!(post.author_username, "alice");
        assert_eq!(post.like_count, 4);
        assert!(post.image_url.is_none());
    }

    #[test]
    fn test_created_post_has_defaults() {
        let json = r#"{
            "id": 1,
            "body": "fresh",
            "user_id": 1,
            "created_at": "2025-03-01T10:20:30Z"
        }"#;

        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.like_count, 0);
        assert_eq!(post.author_username, "");
    }

    #[test]
    fn test_sort_mode_round_trip_with_query() {
        for mode in [SortMode::Newest, SortMode::Oldest, SortMode::MostLiked] {
            assert_eq!(mode.as_query().parse::<SortMode>().unwrap(), mode);
        }
        assert!("sideways".parse::<SortMode>().is_err());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("super-secret");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.bearer(), "Bearer super-secret");
    }

    #[test]
    fn test_error_response_messages() {
        let plain: ErrorResponse =
            serde_json::from_str(r#"{"detail": "post not found"}"#).unwrap();
        assert_eq!(plain.message(), "post not found");

        let listed: ErrorResponse = serde_json::from_str(
            r#"{"detail": [{"loc": ["body", "body"], "msg": "field required"}]}"#,
        )
        .unwrap();
        assert_eq!(listed.message(), "field required");
    }

    #[test]
    fn test_new_post_omits_missing_image() {
        let body = serde_json::to_value(NewPost::text("hi")).unwrap();
        assert_eq!(body, serde_json::json!({"body": "hi"}));

        let body = serde_json::to_value(NewPost::text("hi").with_image("http://img")).unwrap();
        assert_eq!(body["image_url"], "http://img");
    }
}
