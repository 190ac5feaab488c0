//! Server configuration.

use crate::auth::AuthConfig;
use std::net::SocketAddr;
use std::time::Duration;
use synclog_core::{IngressLimits, DEFAULT_PAGE_SIZE};

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Records per pull page.
    pub page_size: usize,
    /// Push validation limits.
    pub limits: IngressLimits,
    /// Token signing configuration.
    pub auth: AuthConfig,
}

impl ServerConfig {
    /// Creates a new server configuration signing tokens with `secret`.
    pub fn new(bind_addr: SocketAddr, secret: Vec<u8>) -> Self {
        Self {
            bind_addr,
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 16 * 1024 * 1024,
            page_size: DEFAULT_PAGE_SIZE,
            limits: IngressLimits::default(),
            auth: AuthConfig::new(secret),
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum request body size.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Sets the pull page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the push validation limits.
    pub fn with_limits(mut self, limits: IngressLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the token lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.auth = self.auth.with_expiry(expiry);
        self
    }
}
