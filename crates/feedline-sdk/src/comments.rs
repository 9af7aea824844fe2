//! Comment reconciliation for a single post.
//!
//! Comments are append-only. Submitting posts one comment and then refetches
//! the whole list, with the same stale-fetch rule as the feed.

use std::sync::{Mutex, MutexGuard, PoisonError};

use feedline_client::{ApiError, Comment, PostId};
use tracing::{debug, info, warn};

use crate::error::{Result, SdkError};
use crate::feed::RefreshOutcome;
use crate::sequence::{FetchSequencer, FetchTicket};
use crate::session::SessionHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct CommentView {
    pub post_id: PostId,
    pub items: Vec<Comment>,
    pub is_loading: bool,
}

struct CommentState {
    view: CommentView,
    submitting: bool,
}

pub struct CommentController {
    session: SessionHandle,
    state: Mutex<CommentState>,
    sequencer: FetchSequencer,
}

struct SubmitGuard<'a>(&'a CommentController);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().submitting = false;
    }
}

/// Clears `is_loading` when a fetch is dropped before it completes.
struct LoadingGuard<'a> {
    controller: &'a CommentController,
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

impl CommentController {
    pub fn new(session: SessionHandle, post_id: PostId) -> Self {
        Self {
            session,
            state: Mutex::new(CommentState {
                view: CommentView {
                    post_id,
                    items: Vec::new(),
                    is_loading: false,
                },
                submitting: false,
            }),
            sequencer: FetchSequencer::new(),
        }
    }

    pub fn post_id(&self) -> PostId {
        self.lock().view.post_id
    }

    pub fn view(&self) -> CommentView {
        self.lock().view.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.lock().submitting
    }

    fn lock(&self) -> MutexGuard<'_, CommentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace `items` with the post's current comments.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let (ticket, post_id) = {
            let mut state = self.lock();
            state.view.is_loading = true;
            (self.sequencer.issue(), state.view.post_id)
        };
        let token = self.session.token();
        debug!(seq = ticket.seq(), post_id, "Fetching comments");

        let loading = LoadingGuard {
            controller: self,
            ticket,
            armed: true,
        };
        let fetched = self
            .session
            .gateway()
            .list_comments(token.as_ref(), post_id)
            .await;
        loading.disarm();
        let fetched = self.session.settle(token.as_ref(), fetched);

        let mut state = self.lock();
        if !self.sequencer.is_current(ticket) {
            debug!(seq = ticket.seq(), post_id, "Discarding stale comments");
            return Ok(RefreshOutcome::Superseded);
        }
        state.view.is_loading = false;

        match fetched {
            Ok(items) => {
                let count = items.len();
                state.view.items = items;
                Ok(RefreshOutcome::Applied { count })
            }
            Err(SdkError::Api(ApiError::NotFound(message))) => {
                // The post is gone, and its comments with it
                state.view.items.clear();
                Err(ApiError::NotFound(message).into())
            }
            Err(e) => {
                warn!(post_id, error = %e, "Comment fetch failed");
                Err(e)
            }
        }
    }

    /// Post a comment, then refetch.
    pub async fn submit(&self, body: &str) -> Result<Comment> {
        if body.trim().is_empty() {
            return Err(SdkError::Validation(
                "comment body must not be empty".to_string(),
            ));
        }
        let client = self.session.authenticated_client()?;

        let post_id = {
            let mut state = self.lock();
            if state.submitting {
                return Err(SdkError::Busy("comment".to_string()));
            }
            state.submitting = true;
            state.view.post_id
        };
        let _guard = SubmitGuard(self);

        let created = self
            .session
            .settle(Some(client.token()), client.create_comment(post_id, body).await)
            .inspect_err(|e| warn!(post_id, error = %e, "Comment failed"))?;
        info!(post_id, comment_id = created.id, "Comment added");

        self.refresh().await?;
        Ok(created)
    }
}

impl std::fmt::Debug for CommentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentController")
            .field("view", &self.view())
            .finish_non_exhaustive()
    }
}
