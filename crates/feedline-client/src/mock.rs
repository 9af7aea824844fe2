//! In-memory feed service for testing.
//!
//! Mirrors the service's observable rules: unique emails and usernames,
//! owner-only edits and deletes, server-computed like counts and ordering,
//! 401 for unknown tokens and 404 for missing posts. Call counters, injected
//! failures and per-sort-mode latency make reconciliation behavior testable.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ApiError, Result};
use crate::gateway::FeedGateway;
use crate::types::*;

/// Operations the mock counts and can fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Register,
    Login,
    FetchCurrentUser,
    ListPosts,
    GetPost,
    ListUserPosts,
    CreatePost,
    UpdatePost,
    DeletePost,
    LikePost,
    ListComments,
    CreateComment,
}

#[derive(Debug, Clone)]
struct MockUser {
    id: UserId,
    email: String,
    username: String,
    password: String,
}

#[derive(Debug, Clone)]
struct StoredPost {
    id: PostId,
    author_id: UserId,
    body: String,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: CommentId,
    post_id: PostId,
    author_id: UserId,
    body: String,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MockState {
    users: Vec<MockUser>,
    tokens: HashMap<String, UserId>,
    posts: BTreeMap<PostId, StoredPost>,
    likes: Vec<(PostId, UserId)>,
    comments: Vec<StoredComment>,
    next_user_id: UserId,
    next_post_id: PostId,
    next_comment_id: CommentId,
    calls: HashMap<MockOp, u32>,
    failures: HashMap<MockOp, VecDeque<(u16, String)>>,
    list_delays: HashMap<SortMode, Duration>,
    delays: HashMap<MockOp, Duration>,
}

impl MockState {
    fn user_for_token(&self, token: &AccessToken) -> Result<&MockUser> {
        let user_id = self
            .tokens
            .get(token.secret())
            .ok_or_else(|| ApiError::Unauthorized("invalid token".to_string()))?;
        self.users
            .iter()
            .find(|u| u.id == *user_id)
            .ok_or_else(|| ApiError::Unauthorized("could not find user for this token".to_string()))
    }

    fn username(&self, user_id: UserId) -> String {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn like_count(&self, post_id: PostId) -> u64 {
        self.likes.iter().filter(|(p, _)| *p == post_id).count() as u64
    }

    fn listed(&self, post: &StoredPost) -> Post {
        Post {
            id: post.id,
            author_id: post.author_id,
            author_username: self.username(post.author_id),
            body: post.body.clone(),
            image_url: post.image_url.clone(),
            like_count: self.like_count(post.id),
            created_at: post.created_at,
        }
    }

    /// Create/update responses carry no username and no like count.
    fn bare(post: &StoredPost) -> Post {
        Post {
            id: post.id,
            author_id: post.author_id,
            author_username: String::new(),
            body: post.body.clone(),
            image_url: post.image_url.clone(),
            like_count: 0,
            created_at: post.created_at,
        }
    }

    fn comment(&self, comment: &StoredComment) -> Comment {
        Comment {
            id: comment.id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            author_username: self.username(comment.author_id),
            body: comment.body.clone(),
            created_at: comment.created_at,
        }
    }

    fn comments_for(&self, post_id: PostId) -> Vec<Comment> {
        self.comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .map(|c| self.comment(c))
            .collect()
    }

    fn owned_post(&self, user_id: UserId, post_id: PostId, action: &str) -> Result<&StoredPost> {
        let post = self
            .posts
            .get(&post_id)
            .ok_or_else(|| ApiError::NotFound("post not found".to_string()))?;
        if post.author_id != user_id {
            return Err(ApiError::Forbidden(format!(
                "not authorized to {} this post",
                action
            )));
        }
        Ok(post)
    }
}

/// In-memory implementation of [`FeedGateway`].
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_user_id: 1,
                next_post_id: 1,
                next_comment_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Delay `list_posts` responses for one sort mode.
    pub fn with_list_delay(self, sort: SortMode, delay: Duration) -> Self {
        self.lock().list_delays.insert(sort, delay);
        self
    }

    /// Delay every response of one operation.
    pub fn with_delay(self, op: MockOp, delay: Duration) -> Self {
        self.lock().delays.insert(op, delay);
        self
    }

    /// Make the next call to `op` fail with the given HTTP status.
    pub fn fail_next(&self, op: MockOp, status: u16, message: impl Into<String>) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .push_back((status, message.into()));
    }

    /// Forget every issued token, as if they all expired.
    pub fn revoke_all_tokens(&self) {
        self.lock().tokens.clear();
    }

    /// Number of times `op` was called.
    pub fn call_count(&self, op: MockOp) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total number of calls across all operations.
    pub fn total_calls(&self) -> u32 {
        self.lock().calls.values().sum()
    }

    /// Reset all call counters.
    pub fn reset_call_counts(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panic while holding the lock only happens inside a failing test
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call, then either fail it or wait out its configured latency.
    async fn enter(&self, op: MockOp, sort: Option<SortMode>) -> Result<()> {
        let (failure, delay) = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            let failure = state.failures.get_mut(&op).and_then(|q| q.pop_front());
            let delay = sort
                .and_then(|s| state.list_delays.get(&s).copied())
                .or_else(|| state.delays.get(&op).copied());
            (failure, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some((status, message)) => Err(ApiError::from_status(status, message)),
            None => Ok(()),
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedGateway for MockGateway {
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterReceipt> {
        self.enter(MockOp::Register, None).await?;
        let mut state = self.lock();

        if state.users.iter().any(|u| u.email == request.email) {
            return Err(ApiError::Validation(
                "A user with that email already exists".to_string(),
            ));
        }
        if state.users.iter().any(|u| u.username == request.username) {
            return Err(ApiError::Validation(
                "A user with that username already exists".to_string(),
            ));
        }

        let id = state.next_user_id;
        state.next_user_id += 1;
        state.users.push(MockUser {
            id,
            email: request.email.clone(),
            username: request.username.clone(),
            password: request.password.clone(),
        });

        Ok(RegisterReceipt {
            detail: "user created".to_string(),
        })
    }

    async fn login(&self, email: &str, password: &str) -> Result<AccessToken> {
        self.enter(MockOp::Login, None).await?;
        let mut state = self.lock();

        let user_id = state
            .users
            .iter()
            .find(|u| u.email == email && u.password == password)
            .map(|u| u.id)
            .ok_or_else(|| ApiError::Unauthorized("invalid email or password".to_string()))?;

        let token = format!("mock-{}", uuid::Uuid::new_v4());
        state.tokens.insert(token.clone(), user_id);
        Ok(AccessToken::new(token))
    }

    async fn fetch_current_user(&self, token: &AccessToken) -> Result<CurrentUser> {
        self.enter(MockOp::FetchCurrentUser, None).await?;
        let state = self.lock();
        let user = state.user_for_token(token)?;

        Ok(CurrentUser {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        })
    }

    async fn list_posts(&self, _auth: Option<&AccessToken>, sort: SortMode) -> Result<Vec<Post>> {
        self.enter(MockOp::ListPosts, Some(sort)).await?;
        let state = self.lock();

        let mut posts: Vec<Post> = state.posts.values().map(|p| state.listed(p)).collect();
        match sort {
            SortMode::Newest => posts.sort_by(|a, b| b.id.cmp(&a.id)),
            SortMode::Oldest => posts.sort_by(|a, b| a.id.cmp(&b.id)),
            SortMode::MostLiked => posts.sort_by(|a, b| {
                b.like_count.cmp(&a.like_count).then_with(|| b.id.cmp(&a.id))
            }),
        }
        Ok(posts)
    }

    async fn get_post(&self, _auth: Option<&AccessToken>, post_id: PostId) -> Result<PostDetail> {
        self.enter(MockOp::GetPost, None).await?;
        let state = self.lock();

        let post = state
            .posts
            .get(&post_id)
            .ok_or_else(|| ApiError::NotFound("post not found".to_string()))?;

        Ok(PostDetail {
            post: state.listed(post),
            comments: state.comments_for(post_id),
        })
    }

    async fn list_user_posts(
        &self,
        _auth: Option<&AccessToken>,
        user_id: UserId,
    ) -> Result<Vec<Post>> {
        self.enter(MockOp::ListUserPosts, None).await?;
        let state = self.lock();

        Ok(state
            .posts
            .values()
            .rev()
            .filter(|p| p.author_id == user_id)
            .map(|p| state.listed(p))
            .collect())
    }

    async fn create_post(&self, token: &AccessToken, post: &NewPost) -> Result<Post> {
        self.enter(MockOp::CreatePost, None).await?;
        let mut state = self.lock();
        let author_id = state.user_for_token(token)?.id;

        if post.body.trim().is_empty() {
            return Err(ApiError::Validation("body must not be empty".to_string()));
        }

        let id = state.next_post_id;
        state.next_post_id += 1;
        let stored = StoredPost {
            id,
            author_id,
            body: post.body.clone(),
            image_url: post.image_url.clone(),
            created_at: Utc::now(),
        };
        let created = MockState::bare(&stored);
        state.posts.insert(id, stored);
        Ok(created)
    }

    async fn update_post(&self, token: &AccessToken, post_id: PostId, body: &str) -> Result<Post> {
        self.enter(MockOp::UpdatePost, None).await?;
        let mut state = self.lock();
        let user_id = state.user_for_token(token)?.id;
        state.owned_post(user_id, post_id, "edit")?;

        if body.trim().is_empty() {
            return Err(ApiError::Validation("body must not be empty".to_string()));
        }

        let post = state
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| ApiError::NotFound("post not found".to_string()))?;
        post.body = body.to_string();
        Ok(MockState::bare(post))
    }

    async fn delete_post(&self, token: &AccessToken, post_id: PostId) -> Result<()> {
        self.enter(MockOp::DeletePost, None).await?;
        let mut state = self.lock();
        let user_id = state.user_for_token(token)?.id;
        state.owned_post(user_id, post_id, "delete")?;

        state.likes.retain(|(p, _)| *p != post_id);
        state.comments.retain(|c| c.post_id != post_id);
        state.posts.remove(&post_id);
        Ok(())
    }

    async fn like_post(&self, token: &AccessToken, post_id: PostId) -> Result<()> {
        self.enter(MockOp::LikePost, None).await?;
        let mut state = self.lock();
        let user_id = state.user_for_token(token)?.id;

        if !state.posts.contains_key(&post_id) {
            return Err(ApiError::NotFound("post not found".to_string()));
        }
        state.likes.push((post_id, user_id));
        Ok(())
    }

    async fn list_comments(
        &self,
        _auth: Option<&AccessToken>,
        post_id: PostId,
    ) -> Result<Vec<Comment>> {
        self.enter(MockOp::ListComments, None).await?;
        let state = self.lock();

        if !state.posts.contains_key(&post_id) {
            return Err(ApiError::NotFound("post not found".to_string()));
        }
        Ok(state.comments_for(post_id))
    }

    async fn create_comment(
        &self,
        token: &AccessToken,
        post_id: PostId,
        body: &str,
    ) -> Result<Comment> {
        self.enter(MockOp::CreateComment, None).await?;
        let mut state = self.lock();
        let author_id = state.user_for_token(token)?.id;

        if !state.posts.contains_key(&post_id) {
            return Err(ApiError::NotFound("post not found".to_string()));
        }
        if body.trim().is_empty() {
            return Err(ApiError::Validation("body must not be empty".to_string()));
        }

        let id = state.next_comment_id;
        state.next_comment_id += 1;
        let stored = StoredComment {
            id,
            post_id,
            author_id,
            body: body.to_string(),
            created_at: Utc::now(),
        };
        let created = state.comment(&stored);
        state.comments.push(stored);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn signed_in(mock: &MockGateway, email: &str, username: &str) -> AccessToken {
        mock.register(&RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: "pw".to_string(),
        })
        .await
        .unwrap();
        mock.login(email, "pw").await.unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let mock = MockGateway::new();
        signed_in(&mock, "a@x.com", "alice").await;

        let err = mock
            .register(&RegisterRequest {
                email: "a@x.com".to_string(),
                username: "other".to_string(),
                password: "pw".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_like_count_and_ordering_are_server_side() {
        let mock = MockGateway::new();
        let token = signed_in(&mock, "a@x.com", "alice").await;

        let first = mock.create_post(&token, &NewPost::text("first")).await.unwrap();
        let second = mock.create_post(&token, &NewPost::text("second")).await.unwrap();
        assert_eq!(first.like_count, 0);
        mock.like_post(&token, first.id).await.unwrap();

        let newest = mock.list_posts(None, SortMode::Newest).await.unwrap();
        assert_eq!(newest.iter().map(|p| p.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let liked = mock.list_posts(None, SortMode::MostLiked).await.unwrap();
        assert_eq!(liked[0].id, first.id);
        assert_eq!(liked[0].like_count, 1);
        assert_eq!(liked[0].author_username, "alice");
    }

    #[tokio::test]
    async fn test_only_owner_can_delete() {
        let mock = MockGateway::new();
        let alice = signed_in(&mock, "a@x.com", "alice").await;
        let bob = signed_in(&mock, "b@x.com", "bob").await;

        let post = mock.create_post(&alice, &NewPost::text("mine")).await.unwrap();
        let err = mock.delete_post(&bob, post.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        mock.delete_post(&alice, post.id).await.unwrap();
        let err = mock.get_post(None, post.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_revoked_token_is_unauthorized() {
        let mock = MockGateway::new();
        let token = signed_in(&mock, "a@x.com", "alice").await;
        mock.revoke_all_tokens();

        let err = mock.fetch_current_user(&token).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let mock = MockGateway::new();
        mock.fail_next(MockOp::ListPosts, 503, "maintenance");

        let err = mock.list_posts(None, SortMode::Newest).await.unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 503, .. }));
        assert!(mock.list_posts(None, SortMode::Newest).await.is_ok());
        assert_eq!(mock.call_count(MockOp::ListPosts), 2);
    }
}
