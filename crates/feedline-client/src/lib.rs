//! Client for the Feedline social feed API
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use feedline_client::{with_credential, FeedGateway, GatewayConfig, HttpGateway, NewPost};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway: Arc<dyn FeedGateway> = Arc::new(HttpGateway::new(GatewayConfig::default())?);
//!
//! let token = gateway.login("a@x.com", "pw1").await?;
//! let client = with_credential(gateway.clone(), token);
//!
//! let post = client.create_post(&NewPost::text("hi")).await?;
//! client.like_post(post.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod types;

// Re-export main types
pub use client::HttpGateway;
pub use error::{ApiError, ErrorKind, Result};
pub use gateway::{with_credential, AuthenticatedClient, FeedGateway};
pub use mock::{MockGateway, MockOp};
pub use types::*;
