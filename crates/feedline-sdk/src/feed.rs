//! Feed reconciliation.
//!
//! The controller never patches its post list. Every successful mutation is
//! followed by a full refetch under the active sort mode, and the fetched
//! list replaces `items` wholesale. Fetches may overlap (sort changes,
//! mutation refreshes); only the most recently started one is applied.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use feedline_client::{AccessToken, ApiError, NewPost, Post, PostId, SortMode, UserId};
use tracing::{debug, info, warn};

use crate::error::{Result, SdkError};
use crate::sequence::{FetchSequencer, FetchTicket};
use crate::session::SessionHandle;

/// Which posts the controller shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedScope {
    /// Every post, ordered by the sort mode
    Global,
    /// A single post's detail view
    Post(PostId),
    /// Posts by one author, newest first
    User(UserId),
}

/// Snapshot of what the feed currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView {
    pub sort_mode: SortMode,
    pub items: Vec<Post>,
    pub is_loading: bool,
}

impl FeedView {
    pub fn get(&self, post_id: PostId) -> Option<&Post> {
        self.items.iter().find(|p| p.id == post_id)
    }
}

/// A user action that may have only one call in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingAction {
    Create,
    Like(PostId),
    Edit(PostId),
    Remove(PostId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched list now backs the view
    Applied { count: usize },
    /// A later fetch started before this one finished; its result was dropped
    Superseded,
}

struct FeedState {
    view: FeedView,
    pending: HashSet<PendingAction>,
}

pub struct FeedController {
    session: SessionHandle,
    scope: FeedScope,
    state: Mutex<FeedState>,
    sequencer: FetchSequencer,
}

/// Releases a pending action when the operation ends, however it ends.
struct PendingGuard<'a> {
    controller: &'a FeedController,
    action: PendingAction,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.controller.lock().pending.remove(&self.action);
    }
}

/// Clears `is_loading` when a fetch is dropped before it completes.
struct LoadingGuard<'a> {
    controller: &'a FeedController,
    ticket: FetchTicket,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.controller.lock();
        if self.controller.sequencer.is_current(self.ticket) {
            state.view.is_loading = false;
        }
    }
}

fn require_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(SdkError::Validation("post body must not be empty".to_string()));
    }
    Ok(())
}

impl FeedController {
    pub fn new(session: SessionHandle, scope: FeedScope) -> Self {
        Self {
            session,
            scope,
            state: Mutex::new(FeedState {
                view: FeedView {
                    sort_mode: SortMode::default(),
                    items: Vec::new(),
                    is_loading: false,
                },
                pending: HashSet::new(),
            }),
            sequencer: FetchSequencer::new(),
        }
    }

    /// Start with a sort mode other than the default; no fetch is issued.
    pub fn with_sort_mode(self, mode: SortMode) -> Self {
        self.lock().view.sort_mode = mode;
        self
    }

    pub fn scope(&self) -> FeedScope {
        self.scope
    }

    pub fn view(&self) -> FeedView {
        self.lock().view.clone()
    }

    pub fn sort_mode(&self) -> SortMode {
        self.lock().view.sort_mode
    }

    pub fn is_pending(&self, action: PendingAction) -> bool {
        self.lock().pending.contains(&action)
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, action: PendingAction) -> Result<PendingGuard<'_>> {
        if !self.lock().pending.insert(action) {
            debug!(?action, "Action already in flight");
            return Err(SdkError::Busy(format!("{:?}", action)));
        }
        Ok(PendingGuard {
            controller: self,
            action,
        })
    }

    /// Switch the ordering and refetch under it.
    pub async fn set_sort_mode(&self, mode: SortMode) -> Result<RefreshOutcome> {
        self.lock().view.sort_mode = mode;
        debug!(sort = %mode, "Sort mode changed");
        self.refresh().await
    }

    /// Replace `items` with the service's current listing.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let (ticket, sort) = {
            let mut state = self.lock();
            state.view.is_loading = true;
            (self.sequencer.issue(), state.view.sort_mode)
        };
        let token = self.session.token();
        debug!(seq = ticket.seq(), sort = %sort, scope = ?self.scope, "Fetching feed");

        let loading = LoadingGuard {
            controller: self,
            ticket,
            armed: true,
        };
        let fetched = self.fetch(token.as_ref(), sort).await;
        loading.disarm();
        let fetched = self.session.settle(token.as_ref(), fetched);

        let mut state = self.lock();
        if !self.sequencer.is_current(ticket) {
            debug!(
                seq = ticket.seq(),
                latest = self.sequencer.latest(),
                "Discarding stale feed result"
            );
            return Ok(RefreshOutcome::Superseded);
        }
        state.view.is_loading = false;

        match fetched {
            Ok(items) => {
                let count = items.len();
                state.view.items = items;
                debug!(seq = ticket.seq(), count, "Feed applied");
                Ok(RefreshOutcome::Applied { count })
            }
            Err(SdkError::Api(ApiError::NotFound(message))) if self.is_detail() => {
                // The post behind a detail view is gone
                state.view.items.clear();
                Err(ApiError::NotFound(message).into())
            }
            Err(e) => {
                warn!(error = %e, scope = ?self.scope, "Feed fetch failed");
                Err(e)
            }
        }
    }

    fn is_detail(&self) -> bool {
        matches!(self.scope, FeedScope::Post(_))
    }

    async fn fetch(
        &self,
        token: Option<&AccessToken>,
        sort: SortMode,
    ) -> std::result::Result<Vec<Post>, ApiError> {
        let gateway = self.session.gateway();
        match self.scope {
            FeedScope::Global => gateway.list_posts(token, sort).await,
            FeedScope::Post(post_id) => gateway
                .get_post(token, post_id)
                .await
                .map(|detail| vec![detail.post]),
            FeedScope::User(user_id) => gateway.list_user_posts(token, user_id).await,
        }
    }

    /// Publish a post, then refetch.
    pub async fn submit_new_post(&self, body: &str, image_url: Option<&str>) -> Result<Post> {
        require_body(body)?;
        let client = self.session.authenticated_client()?;
        let _pending = self.begin(PendingAction::Create)?;

        let mut post = NewPost::text(body);
        if let Some(url) = image_url.filter(|u| !u.trim().is_empty()) {
            post = post.with_image(url);
        }

        let created = self
            .session
            .settle(Some(client.token()), client.create_post(&post).await)
            .inspect_err(|e| warn!(error = %e, "Create post failed"))?;
        info!(post_id = created.id, "Post created");

        self.refresh().await?;
        Ok(created)
    }

    /// Like a post, then refetch to pick up the new count.
    pub async fn like(&self, post_id: PostId) -> Result<()> {
        let client = self.session.authenticated_client()?;
        let _pending = self.begin(PendingAction::Like(post_id))?;

        self.session
            .settle(Some(client.token()), client.like_post(post_id).await)
            .inspect_err(|e| warn!(post_id, error = %e, "Like failed"))?;
        debug!(post_id, "Post liked");

        self.refresh().await?;
        Ok(())
    }

    /// Replace a post's body, then refetch.
    pub async fn edit(&self, post_id: PostId, body: &str) -> Result<Post> {
        require_body(body)?;
        let client = self.session.authenticated_client()?;
        let _pending = self.begin(PendingAction::Edit(post_id))?;

        let updated = self
            .session
            .settle(Some(client.token()), client.update_post(post_id, body).await)
            .inspect_err(|e| warn!(post_id, error = %e, "Edit failed"))?;
        info!(post_id, "Post edited");

        self.refresh().await?;
        Ok(updated)
    }

    /// Delete a post, then refetch.
    pub async fn remove(&self, post_id: PostId) -> Result<()> {
        let client = self.session.authenticated_client()?;
        let _pending = self.begin(PendingAction::Remove(post_id))?;

        self.session
            .settle(Some(client.token()), client.delete_post(post_id).await)
            .inspect_err(|e| warn!(post_id, error = %e, "Delete failed"))?;
        info!(post_id, "Post deleted");

        match self.refresh().await {
            Ok(_) => Ok(()),
            // Deleting the post a detail view shows leaves it empty
            Err(SdkError::Api(ApiError::NotFound(_))) if self.scope == FeedScope::Post(post_id) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for FeedController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedController")
            .field("scope", &self.scope)
            .field("view", &self.view())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use feedline_client::{MockGateway, MockOp};

    use crate::credential::CredentialStore;
    use crate::session::SessionManager;

    fn anonymous() -> (Arc<MockGateway>, SessionManager) {
        let mock = Arc::new(MockGateway::new());
        let manager = SessionManager::new(mock.clone(), CredentialStore::in_memory());
        (mock, manager)
    }

    #[tokio::test]
    async fn test_mutations_require_session() {
        let (mock, manager) = anonymous();
        let feed = FeedController::new(manager.handle(), FeedScope::Global);

        assert!(matches!(
            feed.submit_new_post("hello", None).await,
            Err(SdkError::NotAuthenticated)
        ));
        assert!(matches!(feed.like(1).await, Err(SdkError::NotAuthenticated)));
        assert!(matches!(feed.remove(1).await, Err(SdkError::NotAuthenticated)));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_edit_rejected_locally() {
        let (mock, manager) = anonymous();
        let feed = FeedController::new(manager.handle(), FeedScope::Global);

        let err = feed.edit(1, "   \n").await.unwrap_err();
        assert!(matches!(err, SdkError::Validation(_)));
        assert_eq!(mock.call_count(MockOp::UpdatePost), 0);
    }

    #[tokio::test]
    async fn test_refresh_clears_loading_on_failure() {
        let (mock, manager) = anonymous();
        let feed = FeedController::new(manager.handle(), FeedScope::Global);
        mock.fail_next(MockOp::ListPosts, 500, "boom");

        assert!(feed.refresh().await.is_err());
        assert!(!feed.view().is_loading);

        assert_eq!(
            feed.refresh().await.unwrap(),
            RefreshOutcome::Applied { count: 0 }
        );
    }

    #[tokio::test]
    async fn test_missing_detail_post_empties_view() {
        let (_mock, manager) = anonymous();
        let feed = FeedController::new(manager.handle(), FeedScope::Post(42));

        let err = feed.refresh().await.unwrap_err();
        assert_eq!(err.kind(), feedline_client::ErrorKind::NotFound);
        assert!(feed.view().items.is_empty());
        assert!(!feed.view().is_loading);
    }
}
