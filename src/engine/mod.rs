// Request-dispatch engine: account selection, token refresh, payload build,
// endpoint fallback and response normalization behind one entry point.

pub mod dispatch;
pub mod normalize;
pub mod request;
pub mod selector;
pub mod token_cache;

use crate::error::AppResult;
use crate::models::{AccountRecord, GenerationRequest, GenerationResult, RefreshCredential};
use crate::modules::store::CredentialStore;

use dispatch::{Dispatcher, HttpTransport, UpstreamTransport};
use request::{build_payload, is_thinking_model};
use selector::AccountSelector;
use token_cache::{GoogleExchanger, TokenCache, TokenExchanger};

pub struct Engine<T = HttpTransport, E = GoogleExchanger> {
    store: CredentialStore,
    selector: AccountSelector,
    cache: TokenCache,
    exchanger: E,
    dispatcher: Dispatcher<T>,
}

impl Engine {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            selector: AccountSelector::new(),
            cache: TokenCache::new(),
            exchanger: GoogleExchanger::new(),
            dispatcher: Dispatcher::new(HttpTransport::new()),
        }
    }
}

impl<T: UpstreamTransport, E: TokenExchanger> Engine<T, E> {
    pub fn with_parts(
        store: CredentialStore,
        cache: TokenCache,
        exchanger: E,
        dispatcher: Dispatcher<T>,
    ) -> Self {
        Self {
            store,
            selector: AccountSelector::new(),
            cache,
            exchanger,
            dispatcher,
        }
    }

    /// Full pipeline for one generation call: pick an account, obtain a
    /// bearer token, build the wire payload, walk the endpoints, normalize.
    pub async fn generate(&self, request: GenerationRequest) -> AppResult<GenerationResult> {
        let (account, access_token) = self.checkout_account().await?;
        tracing::debug!("using account {} for model {}", account.email, request.model);

        let project_id = resolve_project_id(&account);
        let payload = build_payload(&request, project_id.as_deref());
        let thinking_model = is_thinking_model(&request.model);

        self.dispatcher
            .dispatch(&access_token, &payload, &request.model, thinking_model)
            .await
    }

    /// Raw `fetchAvailableModels` response, for the model and quota tools.
    pub async fn fetch_models_response(&self) -> AppResult<serde_json::Value> {
        let (_, access_token) = self.checkout_account().await?;
        self.dispatcher.fetch_available_models(&access_token).await
    }

    /// Everything in the store, including disabled/invalid accounts.
    pub fn list_accounts(&self) -> Vec<AccountRecord> {
        self.store.load()
    }

    async fn checkout_account(&self) -> AppResult<(AccountRecord, String)> {
        let accounts = self.store.enabled_accounts();
        let account = self.selector.select(&accounts)?.clone();
        let token = self
            .cache
            .get_access_token(&account, &self.exchanger)
            .await?;
        Ok((account, token))
    }
}

/// Project id precedence: composite-credential fields, then the explicit
/// account field. The request builder falls back to the hardcoded default.
fn resolve_project_id(account: &AccountRecord) -> Option<String> {
    let cred = RefreshCredential::parse(&account.refresh_token);
    cred.project_id
        .or(cred.managed_project_id)
        .or_else(|| account.project_id.clone())
}
