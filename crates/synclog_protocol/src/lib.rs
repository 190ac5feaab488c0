//! # synclog protocol
//!
//! JSON wire types for the synclog HTTP API.
//!
//! Field names are camelCase on the wire; timestamps are RFC 3339. Each type
//! converts to or from its `synclog_core` counterpart, so transports never
//! touch the engine's internal types directly.
//!
//! | Endpoint          | Request         | Response        |
//! |-------------------|-----------------|-----------------|
//! | `POST /api/sync/push` | [`PushRequest`] | [`PushResponse`] |
//! | `POST /api/sync/pull` | [`PullRequest`] | [`PullResponse`] |
//! | `GET /health`     | -               | [`HealthResponse`] |
//!
//! Failures carry an [`ErrorBody`].
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;

pub use messages::{
    ErrorBody, HealthResponse, MutationEnvelope, MutationPayload, PullRequest, PullResponse,
    PushRequest, PushResponse,
};
