//! # synclog Sync Server
//!
//! HTTP front end for the synclog mutation log.
//!
//! This crate provides:
//! - HTTP endpoints (`/health`, `/api/sync/push`, `/api/sync/pull`)
//! - Bearer authentication with HMAC-SHA256 account tokens
//! - Mapping of engine outcomes onto status codes and JSON error bodies
//!
//! # Authentication
//!
//! Every `/api/*` request must carry `Authorization: Bearer <token>`. The
//! token names the account; the engine never sees a request without one.
//!
//! ```rust,ignore
//! use synclog_server::{AuthConfig, TokenValidator};
//!
//! let validator = TokenValidator::new(AuthConfig::new(secret));
//! let token = validator.create_token(account)?;
//! ```
//!
//! # Status Codes
//!
//! | Outcome                         | Status |
//! |---------------------------------|--------|
//! | success                         | 200    |
//! | malformed JSON, failed validation | 400  |
//! | missing or bad token            | 401    |
//! | storage failure                 | 500    |
//!
//! Storage work runs on the blocking pool; each request is independent and
//! the only shared state is the [`HandlerContext`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{bearer_token, AuthConfig, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::HandlerContext;
pub use server::{Identity, SyncServer};
