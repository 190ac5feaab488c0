//! Request handling shared by every route.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use std::sync::Arc;
use synclog_core::{AccountId, Egress, Ingress, MutationStore};
use synclog_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};

/// Everything a request needs; the only state shared between requests.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    store: Arc<dyn MutationStore>,
    ingress: Ingress,
    egress: Egress,
    validator: TokenValidator,
}

impl HandlerContext {
    /// Creates a handler context over `store`.
    pub fn new(config: ServerConfig, store: Arc<dyn MutationStore>) -> Self {
        let ingress = Ingress::new(Arc::clone(&store), config.limits.clone());
        let egress = Egress::new(Arc::clone(&store), config.page_size);
        let validator = TokenValidator::new(AuthConfig::clone(&config.auth));
        Self {
            config,
            store,
            ingress,
            egress,
            validator,
        }
    }

    /// The token validator for this server.
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn MutationStore> {
        &self.store
    }

    /// Handles a push for an authenticated account. Blocks on storage.
    pub fn handle_push(&self, account: AccountId, request: PushRequest) -> ServerResult<PushResponse> {
        let receipt = self.ingress.push(request.into_command(account))?;
        Ok(PushResponse::from(receipt))
    }

    /// Handles a pull for an authenticated account. Blocks on storage.
    pub fn handle_pull(&self, account: AccountId, request: PullRequest) -> ServerResult<PullResponse> {
        let page = self.egress.pull(request.into_query(account))?;
        Ok(PullResponse::from_page(page)?)
    }
}

/// Runs a blocking handler off the async executor.
pub(crate) async fn run_blocking<T, F>(context: Arc<HandlerContext>, f: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&HandlerContext) -> ServerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&context))
        .await
        .map_err(|e| ServerError::Internal(format!("handler task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::value::RawValue;
    use synclog_core::JournalStore;
    use synclog_protocol::MutationPayload;

    fn context() -> HandlerContext {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), b"secret".to_vec());
        HandlerContext::new(config, Arc::new(JournalStore::open_in_memory().unwrap()))
    }

    #[test]
    fn push_then_pull_from_peer() {
        let ctx = context();
        let account = AccountId::new_v4();

        let pushed = ctx
            .handle_push(
                account,
                PushRequest {
                    device_id: "d1".into(),
                    batch_id: None,
                    mutations: vec![MutationPayload {
                        entity_type: "note".into(),
                        entity_id: "n-1".into(),
                        operation: "create".into(),
                        payload: Some(RawValue::from_string(r#"{"text":"hi"}"#.into()).unwrap()),
                        client_timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
                    }],
                },
            )
            .unwrap();
        assert_eq!(pushed.synced, 1);

        let pulled = ctx
            .handle_pull(
                account,
                PullRequest {
                    device_id: "d2".into(),
                    since: None,
                },
            )
            .unwrap();
        assert_eq!(pulled.mutations.len(), 1);
        assert_eq!(pulled.cursor, 1);
        assert_eq!(ctx.store().head().as_u64(), 1);
    }

    #[test]
    fn invalid_push_is_client_error() {
        let ctx = context();
        let err = ctx
            .handle_push(
                AccountId::new_v4(),
                PushRequest {
                    device_id: String::new(),
                    batch_id: None,
                    mutations: Vec::new(),
                },
            )
            .unwrap_err();
        assert!(err.is_client_error());
    }
}
