//! HTTP routing and the server loop.

use crate::auth::bearer_token;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{run_blocking, HandlerContext};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::future::Future;
use std::sync::Arc;
use synclog_core::{AccountId, MutationStore};
use synclog_protocol::{HealthResponse, PullRequest, PullResponse, PushRequest, PushResponse};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// The account a request was authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub AccountId);

/// The sync server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use synclog_core::JournalStore;
/// use synclog_server::{ServerConfig, SyncServer};
///
/// # async fn run() -> std::io::Result<()> {
/// let store = Arc::new(JournalStore::open_in_memory().unwrap());
/// let config = ServerConfig::new("127.0.0.1:8080".parse().unwrap(), b"secret".to_vec());
/// SyncServer::new(config, store)
///     .serve(async { tokio::signal::ctrl_c().await.ok(); })
///     .await
/// # }
/// ```
pub struct SyncServer {
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server over `store`.
    pub fn new(config: ServerConfig, store: Arc<dyn MutationStore>) -> Self {
        Self {
            context: Arc::new(HandlerContext::new(config, store)),
        }
    }

    /// Shared handler state.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Builds the router: `/health` plus the authenticated `/api/sync/*`.
    pub fn router(&self) -> Router {
        let config = &self.context.config;

        let api = Router::new()
            .route("/api/sync/push", post(push))
            .route("/api/sync/pull", post(pull))
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(&self.context),
                require_account,
            ));

        Router::new()
            .route("/health", get(health))
            .merge(api)
            .layer(DefaultBodyLimit::max(config.max_body_bytes))
            .layer(TimeoutLayer::new(config.request_timeout))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.context))
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the listener fails.
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.context.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(address = ?listener.local_addr().ok(), "sync server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("sync server stopped");
        Ok(())
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn require_account(
    State(context): State<Arc<HandlerContext>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| ServerError::Unauthorized("missing bearer token".into()))?;

    let account = match context.validator().validate_token(token) {
        Ok(account) => account,
        Err(e) => {
            tracing::debug!(error = %e, "token rejected");
            return Err(e);
        }
    };

    request.extensions_mut().insert(Identity(account));
    Ok(next.run(request).await)
}

async fn push(
    State(context): State<Arc<HandlerContext>>,
    Extension(Identity(account)): Extension<Identity>,
    body: Result<Json<PushRequest>, JsonRejection>,
) -> ServerResult<Json<PushResponse>> {
    let Json(request) = body.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    run_blocking(context, move |ctx| ctx.handle_push(account, request))
        .await
        .map(Json)
}

async fn pull(
    State(context): State<Arc<HandlerContext>>,
    Extension(Identity(account)): Extension<Identity>,
    body: Result<Json<PullRequest>, JsonRejection>,
) -> ServerResult<Json<PullResponse>> {
    let Json(request) = body.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    run_blocking(context, move |ctx| ctx.handle_pull(account, request))
        .await
        .map(Json)
}
