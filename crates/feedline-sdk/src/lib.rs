//! Session and feed reconciliation for Feedline clients
//!
//! The [`SessionManager`] owns the signed-in identity and its persisted
//! credential. [`FeedController`] and [`CommentController`] hold what a view
//! shows and keep it consistent with the service by refetching after every
//! mutation instead of patching locally.
//!
//! # Example
//!
//! ```rust,no_run
//! use feedline_sdk::{FeedScope, Feedline, SdkConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SdkConfig::load("feedline.toml")?;
//! let app = Feedline::from_config(&config)?;
//! app.session().rehydrate().await;
//!
//! let feed = app.feed(FeedScope::Global);
//! feed.refresh().await?;
//! for post in feed.view().items {
//!     println!("{} ({} likes)", post.body, post.like_count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod comments;
pub mod config;
pub mod credential;
pub mod error;
pub mod feed;
pub mod sequence;
pub mod session;

use std::sync::Arc;

use feedline_client::{FeedGateway, HttpGateway, PostId, SortMode};

// Re-export main types
pub use comments::{CommentController, CommentView};
pub use config::{ConfigError, SdkConfig, StorageConfig};
pub use credential::{CredentialError, CredentialStore, JsonFileStore, KeyValueStore, MemoryStore};
pub use error::{Result, SdkError};
pub use feed::{FeedController, FeedScope, FeedView, PendingAction, RefreshOutcome};
pub use sequence::{FetchSequencer, FetchTicket};
pub use session::{Session, SessionHandle, SessionManager, SessionState};

/// Wires a gateway, a credential store and a session together and hands out
/// controllers bound to that session.
pub struct Feedline {
    session: SessionManager,
    default_sort: SortMode,
}

impl Feedline {
    pub fn new(gateway: Arc<dyn FeedGateway>, credentials: CredentialStore) -> Self {
        Self {
            session: SessionManager::new(gateway, credentials),
            default_sort: SortMode::default(),
        }
    }

    /// Build the HTTP gateway and credential store described by `config`.
    ///
    /// The credential lives in `storage.credential_path` unless
    /// `storage.ephemeral` is set.
    pub fn from_config(config: &SdkConfig) -> Result<Self> {
        let gateway = HttpGateway::new(config.gateway_config())?;
        let credentials = config.storage.credential_store();

        Ok(Self::new(Arc::new(gateway), credentials).with_default_sort(config.feed.default_sort))
    }

    pub fn with_default_sort(mut self, sort: SortMode) -> Self {
        self.default_sort = sort;
        self
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn feed(&self, scope: FeedScope) -> FeedController {
        FeedController::new(self.session.handle(), scope).with_sort_mode(self.default_sort)
    }

    pub fn comments(&self, post_id: PostId) -> CommentController {
        CommentController::new(self.session.handle(), post_id)
    }
}

impl std::fmt::Debug for Feedline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feedline")
            .field("session", &self.session)
            .field("default_sort", &self.default_sort)
            .finish()
    }
}
