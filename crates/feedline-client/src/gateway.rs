//! Gateway abstraction over the feed service.
//!
//! `FeedGateway` is the seam between the session/reconciliation layer and
//! the wire. `HttpGateway` talks to the real service, `MockGateway` keeps
//! everything in memory for tests.
//!
//! There is no hidden request interceptor: operations that need a token take
//! it explicitly, and [`with_credential`] binds a token to a gateway so call
//! sites that act on behalf of a signed-in user say so.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

/// Logical operations of the feed service.
///
/// Reads accept an optional token; when present it is attached as a bearer
/// credential, otherwise the request goes out anonymously.
#[async_trait]
pub trait FeedGateway: Send + Sync {
    /// Create an account. Does not sign in.
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterReceipt>;

    /// Exchange email + password for a bearer token.
    async fn login(&self, email: &str, password: &str) -> Result<AccessToken>;

    /// Resolve the identity behind a token.
    async fn fetch_current_user(&self, token: &AccessToken) -> Result<CurrentUser>;

    /// List all posts in the given order.
    async fn list_posts(&self, auth: Option<&AccessToken>, sort: SortMode) -> Result<Vec<Post>>;

    /// Fetch one post together with its comments.
    async fn get_post(&self, auth: Option<&AccessToken>, post_id: PostId) -> Result<PostDetail>;

    /// List posts written by one user, newest first.
    async fn list_user_posts(
        &self,
        auth: Option<&AccessToken>,
        user_id: UserId,
    ) -> Result<Vec<Post>>;

    async fn create_post(&self, token: &AccessToken, post: &NewPost) -> Result<Post>;

    async fn update_post(&self, token: &AccessToken, post_id: PostId, body: &str) -> Result<Post>;

    async fn delete_post(&self, token: &AccessToken, post_id: PostId) -> Result<()>;

    /// Record a like. The new count is only visible through a refetch.
    async fn like_post(&self, token: &AccessToken, post_id: PostId) -> Result<()>;

    async fn list_comments(
        &self,
        auth: Option<&AccessToken>,
        post_id: PostId,
    ) -> Result<Vec<Comment>>;

    async fn create_comment(
        &self,
        token: &AccessToken,
        post_id: PostId,
        body: &str,
    ) -> Result<Comment>;
}

/// Bind a token to a gateway.
pub fn with_credential(gateway: Arc<dyn FeedGateway>, token: AccessToken) -> AuthenticatedClient {
    AuthenticatedClient { gateway, token }
}

/// A gateway plus the credential of the signed-in user.
///
/// Every call made through this client carries the bearer token, reads
/// included.
#[derive(Clone)]
pub struct AuthenticatedClient {
    gateway: Arc<dyn FeedGateway>,
    token: AccessToken,
}

impl AuthenticatedClient {
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub async fn fetch_current_user(&self) -> Result<CurrentUser> {
        self.gateway.fetch_current_user(&self.token).await
    }

    pub async fn list_posts(&self, sort: SortMode) -> Result<Vec<Post>> {
        self.gateway.list_posts(Some(&self.token), sort).await
    }

    pub async fn get_post(&self, post_id: PostId) -> Result<PostDetail> {
        self.gateway.get_post(Some(&self.token), post_id).await
    }

    pub async fn list_user_posts(&self, user_id: UserId) -> Result<Vec<Post>> {
        self.gateway.list_user_posts(Some(&self.token), user_id).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        self.gateway.create_post(&self.token, post).await
    }

    pub async fn update_post(&self, post_id: PostId, body: &str) -> Result<Post> {
        self.gateway.update_post(&self.token, post_id, body).await
    }

    pub async fn delete_post(&self, post_id: PostId) -> Result<()> {
        self.gateway.delete_post(&self.token, post_id).await
    }

    pub async fn like_post(&self, post_id: PostId) -> Result<()> {
        self.gateway.like_post(&self.token, post_id).await
    }

    pub async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>> {
        self.gateway.list_comments(Some(&self.token), post_id).await
    }

    pub async fn create_comment(&self, post_id: PostId, body: &str) -> Result<Comment> {
        self.gateway.create_comment(&self.token, post_id, body).await
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
