//! HTTP client for the feed service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::gateway::FeedGateway;
use crate::types::*;

/// HTTP implementation of [`FeedGateway`].
///
/// # Example
///
/// ```rust,no_run
/// use feedline_client::{FeedGateway, GatewayConfig, HttpGateway, SortMode};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = HttpGateway::new(GatewayConfig {
///     base_url: "http://localhost:8000".into(),
///     ..Default::default()
/// })?;
///
/// let token = gateway.login("a@x.com", "pw1").await?;
/// let posts = gateway.list_posts(Some(&token), SortMode::MostLiked).await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpGateway {
    config: GatewayConfig,
    client: Client,
}

impl HttpGateway {
    /// Create a new gateway
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    // ==================== Helper Methods ====================

    fn authorize(request: RequestBuilder, auth: Option<&AccessToken>) -> RequestBuilder {
        match auth {
            Some(token) => request.header(header::AUTHORIZATION, token.bearer()),
            None => request,
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|err| err.message())
            .unwrap_or(body);

        debug!(status = status.as_u16(), %message, "Feed service returned an error");
        Err(ApiError::from_status(status.as_u16(), message))
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl FeedGateway for HttpGateway {
    // ==================== Auth ====================

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterReceipt> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(request)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AccessToken> {
        // OAuth2 password form: the email travels in the `username` field
        let response = self
            .client
            .post(self.url("/token"))
            .form(&[("username", email), ("password", password)])
            .send()
            .await?;

        let token: TokenResponse = Self::handle_response(response).await?;
        Ok(token.access_token)
    }

    async fn fetch_current_user(&self, token: &AccessToken) -> Result<CurrentUser> {
        let request = self.client.get(self.url("/me"));
        let response = Self::authorize(request, Some(token)).send().await?;
        Self::handle_response(response).await
    }

    // ==================== Posts ====================

    async fn list_posts(&self, auth: Option<&AccessToken>, sort: SortMode) -> Result<Vec<Post>> {
        let url = format!("{}?sorting={}", self.url("/post"), sort.as_query());
        let response = Self::authorize(self.client.get(&url), auth).send().await?;
        Self::handle_response(response).await
    }

    async fn get_post(&self, auth: Option<&AccessToken>, post_id: PostId) -> Result<PostDetail> {
        let url = self.url(&format!("/post/{}", post_id));
        let response = Self::authorize(self.client.get(&url), auth).send().await?;
        Self::handle_response(response).await
    }

    async fn list_user_posts(
        &self,
        auth: Option<&AccessToken>,
        user_id: UserId,
    ) -> Result<Vec<Post>> {
        let url = self.url(&format!("/user/{}/posts", user_id));
        let response = Self::authorize(self.client.get(&url), auth).send().await?;
        Self::handle_response(response).await
    }

    async fn create_post(&self, token: &AccessToken, post: &NewPost) -> Result<Post> {
        let request = self.client.post(self.url("/post")).json(post);
        let response = Self::authorize(request, Some(token)).send().await?;
        Self::handle_response(response).await
    }

    async fn update_post(&self, token: &AccessToken, post_id: PostId, body: &str) -> Result<Post> {
        let url = self.url(&format!("/post/{}", post_id));
        let request = self.client.put(&url).json(&UpdatePostRequest {
            body: body.to_string(),
        });
        let response = Self::authorize(request, Some(token)).send().await?;
        Self::handle_response(response).await
    }

    async fn delete_post(&self, token: &AccessToken, post_id: PostId) -> Result<()> {
        let url = self.url(&format!("/post/{}", post_id));
        let response = Self::authorize(self.client.delete(&url), Some(token))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn like_post(&self, token: &AccessToken, post_id: PostId) -> Result<()> {
        let request = self.client.post(self.url("/like")).json(&LikeRequest { post_id });
        let response = Self::authorize(request, Some(token)).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    // ==================== Comments ====================

    async fn list_comments(
        &self,
        auth: Option<&AccessToken>,
        post_id: PostId,
    ) -> Result<Vec<Comment>> {
        let url = self.url(&format!("/post/{}/comment", post_id));
        let response = Self::authorize(self.client.get(&url), auth).send().await?;
        Self::handle_response(response).await
    }

    async fn create_comment(
        &self,
        token: &AccessToken,
        post_id: PostId,
        body: &str,
    ) -> Result<Comment> {
        let request = self.client.post(self.url("/comment")).json(&NewCommentRequest {
            body: body.to_string(),
            post_id,
        });
        let response = Self::authorize(request, Some(token)).send().await?;
        Self::handle_response(response).await
    }
}
