//! CLI command implementations.

pub mod dump_log;
pub mod issue_token;
pub mod serve;
pub mod verify;
