// wallet-session/src/session.rs
//! The wallet session: one authenticated account at a time.
//!
//! `WalletSession` is a cheap handle around shared state. All state changes
//! go through a short-held mutex and are published as [`SessionSnapshot`]s on
//! a watch channel. Connect and re-authentication are serialized by an async
//! mutex, and every teardown or account switch bumps an epoch so a handshake
//! that finishes after the world moved on is dropped instead of committed.

use common::{
    addresses_match, BackendStatus, ChainPolicy, Config, Notice, PersistedSession, ProviderEvent,
    Session, SessionState, WalletKind,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::auth::authenticate;
use crate::error::{RejectedAction, WalletError};
use crate::health::{probe_backend, ProbePolicy};
use crate::network::ensure_network;
use crate::provider::{
    current_chain_id, detect_wallet_kind, parse_chain_id_str, request_accounts, ProviderRequest,
    WalletProvider,
};
use crate::storage::SessionStore;

const NOTICE_CAPACITY: usize = 64;

/// Point-in-time view handed to observers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Chain the wallet was last seen on
    pub chain_id: Option<u64>,
    pub required_chain_id: u64,
    pub backend: BackendStatus,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_on_required_network(&self) -> bool {
        self.chain_id == Some(self.required_chain_id)
    }

    /// Connected but on another chain
    pub fn is_wrong_network(&self) -> bool {
        self.is_connected() && !self.is_on_required_network()
    }

    /// Address of the authenticated session, if any
    pub fn address(&self) -> Option<&str> {
        self.state.session().map(|s| s.address.as_str())
    }
}

/// Result of trying to pick up a persisted session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    NoSession,
    AlreadyConnected,
    Restored { address: String, wrong_network: bool },
}

struct SessionData {
    state: SessionState,
    chain_id: Option<u64>,
    backend: BackendStatus,
    /// Bumped by every teardown and account switch
    epoch: u64,
    /// Provider the current session was established through
    provider: Option<Arc<dyn WalletProvider>>,
}

struct Listener {
    provider: Arc<dyn WalletProvider>,
    handle: JoinHandle<()>,
}

struct Inner {
    config: Config,
    api: ApiClient,
    store: Arc<dyn SessionStore>,
    /// Provider injected at construction, used when connect gets none
    provider: Option<Arc<dyn WalletProvider>>,
    data: Mutex<SessionData>,
    /// Held for the whole of a connect, restore or re-authentication
    flight: tokio::sync::Mutex<()>,
    snapshots: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<Notice>,
    listener: Mutex<Option<Listener>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(listener) = listener.take() {
            listener.handle.abort();
        }
    }
}

#[derive(Clone)]
pub struct WalletSession {
    inner: Arc<Inner>,
}

fn same_provider(a: &Arc<dyn WalletProvider>, b: &Arc<dyn WalletProvider>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn superseded() -> WalletError {
    WalletError::AuthenticationFailed("Wallet account changed during authentication".into())
}

impl WalletSession {
    pub fn new(
        config: Config,
        api: ApiClient,
        store: Arc<dyn SessionStore>,
        provider: Option<Arc<dyn WalletProvider>>,
    ) -> Self {
        let data = SessionData {
            state: SessionState::Disconnected,
            chain_id: None,
            backend: BackendStatus::Unknown,
            epoch: 0,
            provider: None,
        };
        let (snapshots, _) = watch::channel(Self::snapshot_of(&config, &data));
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                config,
                api,
                store,
                provider,
                data: Mutex::new(data),
                flight: tokio::sync::Mutex::new(()),
                snapshots,
                notices,
                listener: Mutex::new(None),
            }),
        }
    }

    /// Build the API client from `config.api_base_url` and the given store
    pub fn from_config(
        config: Config,
        store: Arc<dyn SessionStore>,
        provider: Option<Arc<dyn WalletProvider>>,
    ) -> Result<Self, WalletError> {
        let api = ApiClient::new(&config.api_base_url, store.clone())?;
        Ok(Self::new(config, api, store, provider))
    }

    fn snapshot_of(config: &Config, data: &SessionData) -> SessionSnapshot {
        SessionSnapshot {
            state: data.state.clone(),
            chain_id: data.chain_id,
            required_chain_id: config.network.chain_id,
            backend: data.backend,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.inner.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, data: &SessionData) {
        self.inner.snapshots.send_replace(Self::snapshot_of(&self.inner.config, data));
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut data = self.lock();
        let result = f(&mut data);
        self.publish(&data);
        result
    }

    fn notify(&self, notice: Notice) {
        tracing::debug!("Notice: {}", notice);
        // Nobody listening is fine
        let _ = self.inner.notices.send(notice);
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        Self::snapshot_of(&self.inner.config, &self.lock())
    }

    /// Snapshots as they change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// User-facing notifications
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().state.is_connected()
    }

    /// Authenticated address, `None` unless connected
    pub fn address(&self) -> Option<String> {
        self.lock().state.session().map(|s| s.address.clone())
    }

    pub fn is_on_required_network(&self) -> bool {
        self.snapshot().is_on_required_network()
    }

    /// Startup: probe the backend, restore a persisted session, then listen
    /// for provider events.
    ///
    /// An unreachable backend skips the restore and returns
    /// `BackendUnavailable`; [`retry_backend`](Self::retry_backend) runs the
    /// same sequence again.
    pub async fn initialize(&self) -> Result<RestoreOutcome, WalletError> {
        tracing::info!("Initializing wallet session");

        if let Err(e) = self.probe().await {
            self.register_injected_listener();
            return Err(e);
        }

        let outcome = self.restore().await;
        self.register_injected_listener();
        outcome
    }

    pub async fn retry_backend(&self) -> Result<RestoreOutcome, WalletError> {
        tracing::info!("Retrying backend connection");
        self.initialize().await
    }

    async fn probe(&self) -> Result<(), WalletError> {
        let policy = ProbePolicy::from(&self.inner.config.health_check);
        match probe_backend(&self.inner.api, &policy).await {
            Ok(_) => {
                self.update(|d| d.backend = BackendStatus::Reachable);
                Ok(())
            },
            Err(e) => {
                self.update(|d| d.backend = BackendStatus::Unavailable);
                self.notify(Notice::error(e.to_string()));
                Err(e)
            },
        }
    }

    fn register_injected_listener(&self) {
        if let Some(provider) = self.inner.provider.clone() {
            self.register_listener(&provider);
        }
    }

    /// Subscribe to `provider`'s events. Registering the same provider twice
    /// keeps the existing listener; a different provider replaces it.
    fn register_listener(&self, provider: &Arc<dyn WalletProvider>) {
        let mut slot = self.inner.listener.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = slot.as_ref() {
            if same_provider(&existing.provider, provider) && !existing.handle.is_finished() {
                return;
            }
            existing.handle.abort();
        }

        let events = provider.subscribe();
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(listen(weak, provider.clone(), events));

        tracing::debug!("Registered wallet event listener");
        *slot = Some(Listener { provider: provider.clone(), handle });
    }

    /// Pick up the persisted session without asking for a new signature.
    ///
    /// The token must still verify with the backend and the wallet must still
    /// expose the address; otherwise the persisted entries are discarded.
    pub async fn restore(&self) -> Result<RestoreOutcome, WalletError> {
        let _flight = self.inner.flight.lock().await;

        let epoch = {
            let data = self.lock();
            if data.state.is_connected() {
                return Ok(RestoreOutcome::AlreadyConnected);
            }
            data.epoch
        };

        let persisted = match self.inner.store.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => {
                tracing::debug!("No persisted session");
                return Ok(RestoreOutcome::NoSession);
            },
            Err(e) => {
                tracing::warn!("Discarding unreadable session store: {}", e);
                self.clear_store();
                return Ok(RestoreOutcome::NoSession);
            },
        };

        let provider = self.inner.provider.clone().ok_or(WalletError::NoWalletDetected)?;
        let address = persisted.wallet_address.clone();

        match self.inner.api.verify_token(&persisted.auth_token, &address).await {
            Ok(response) if response.valid => {},
            Ok(_) => return Err(self.discard_persisted(WalletError::TokenInvalid)),
            Err(e) if e.is_rejection() => {
                tracing::info!("Backend rejected persisted token: {}", e);
                return Err(self.discard_persisted(WalletError::TokenInvalid));
            },
            Err(e) => {
                // Keep the entries, the token may be fine once the backend is back
                tracing::warn!("Could not verify persisted token: {}", e);
                return Err(WalletError::BackendUnavailable);
            },
        }

        let accounts = match request_accounts(provider.as_ref(), ProviderRequest::Accounts).await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::warn!("eth_accounts failed during restore: {}", e);
                Vec::new()
            },
        };
        if !accounts.iter().any(|a| addresses_match(a, &address)) {
            tracing::info!("Wallet no longer exposes {}", address);
            return Err(self.discard_persisted(WalletError::NoAccountsReturned));
        }

        let required = self.inner.config.network.chain_id;
        let chain_id = match current_chain_id(provider.as_ref()).await {
            Ok(chain_id) => Some(chain_id),
            Err(e) => {
                tracing::warn!("eth_chainId failed during restore: {}", e);
                None
            },
        };

        let wallet_kind = persisted.wallet_kind.parse().unwrap_or(WalletKind::Unknown);
        let session = Session::new(address.clone(), chain_id.unwrap_or_default(), wallet_kind, persisted.auth_token);

        {
            let mut data = self.lock();
            if data.epoch != epoch {
                tracing::debug!("Session changed while restoring, dropping restore");
                return Ok(RestoreOutcome::NoSession);
            }
            data.state = SessionState::Connected(session);
            data.chain_id = chain_id;
            data.provider = Some(provider.clone());
            self.publish(&data);
        }

        let wrong_network = chain_id != Some(required);
        if wrong_network {
            self.notify(Notice::warning(format!(
                "Please switch back to {}",
                self.inner.config.network.display_name
            )));
        }

        tracing::info!("Restored session for {}", address);
        Ok(RestoreOutcome::Restored { address, wrong_network })
    }

    fn discard_persisted(&self, error: WalletError) -> WalletError {
        self.clear_store();
        self.notify(Notice::error(error.to_string()));
        error
    }

    fn clear_store(&self) {
        if let Err(e) = self.inner.store.clear() {
            tracing::error!("Failed to clear session store: {}", e);
        }
    }

    /// Connect a wallet and authenticate it, returning the address.
    ///
    /// `explicit` overrides the injected provider. Only one connect runs at a
    /// time; a second call while one is in flight fails with `RequestPending`.
    /// Nothing is stored unless every step succeeds.
    pub async fn connect(
        &self,
        preferred: Option<WalletKind>,
        explicit: Option<Arc<dyn WalletProvider>>,
    ) -> Result<String, WalletError> {
        let _flight = match self.inner.flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Connect requested while another is in flight");
                let err = WalletError::RequestPending;
                self.notify(Notice::error(err.to_string()));
                return Err(err);
            },
        };

        let result = self.connect_locked(preferred, explicit).await;
        if let Err(e) = &result {
            tracing::warn!("Wallet connection failed: {:?}", e);
            self.notify(Notice::error(e.to_string()));
        }
        result
    }

    async fn connect_locked(
        &self,
        preferred: Option<WalletKind>,
        explicit: Option<Arc<dyn WalletProvider>>,
    ) -> Result<String, WalletError> {
        if self.lock().backend != BackendStatus::Reachable {
            return Err(WalletError::BackendUnavailable);
        }

        let provider = explicit
            .or_else(|| self.inner.provider.clone())
            .ok_or(WalletError::NoWalletDetected)?;
        let wallet_kind = detect_wallet_kind(preferred, provider.capabilities());
        tracing::info!("Connecting {} wallet", wallet_kind);

        let (epoch, previous_state, previous_chain) = self.update(|d| {
            let previous = (d.epoch, d.state.clone(), d.chain_id);
            d.state = SessionState::Connecting;
            previous
        });

        match self.establish(&provider, wallet_kind, epoch).await {
            Ok(session) => {
                let address = session.address.clone();
                let chain_id = match self.commit(epoch, session, &provider) {
                    Ok(chain_id) => chain_id,
                    Err(e) => {
                        self.roll_back(epoch, previous_state, previous_chain, &e);
                        return Err(e);
                    },
                };
                self.register_listener(&provider);
                if !self.enforce_chain_policy(chain_id) {
                    return Err(WalletError::NetworkSwitchFailed(format!(
                        "Wallet left {} during authentication",
                        self.inner.config.network.display_name
                    )));
                }
                self.notify(Notice::success(format!("Connected via {}!", wallet_kind.display_name())));
                Ok(address)
            },
            Err(e) => {
                self.roll_back(epoch, previous_state, previous_chain, &e);
                Err(e)
            },
        }
    }

    /// Accounts → network → handshake, without touching the store
    async fn establish(
        &self,
        provider: &Arc<dyn WalletProvider>,
        wallet_kind: WalletKind,
        epoch: u64,
    ) -> Result<Session, WalletError> {
        let wallet = provider.as_ref();
        let wallet_config = &self.inner.config.wallet;

        let mut accounts = request_accounts(wallet, ProviderRequest::Accounts)
            .await
            .map_err(|e| WalletError::from_provider(e, RejectedAction::Accounts))?;

        if accounts.is_empty() {
            tracing::debug!("No authorized accounts, asking the wallet");
            accounts = match tokio::time::timeout(
                wallet_config.request_timeout(),
                request_accounts(wallet, ProviderRequest::RequestAccounts),
            )
            .await
            {
                Ok(result) => result.map_err(|e| WalletError::from_provider(e, RejectedAction::Accounts))?,
                Err(_) => {
                    return Err(WalletError::Timeout(format!(
                        "Wallet did not respond within {} seconds. Check that the popup isn't blocked, \
                         your wallet is unlocked, and there is no pending request in the extension.",
                        wallet_config.request_timeout_secs
                    )))
                },
            };
        }

        let address = accounts.into_iter().next().ok_or(WalletError::NoAccountsReturned)?;

        // From here on account events are judged against this address
        {
            let mut data = self.lock();
            if data.epoch != epoch {
                return Err(superseded());
            }
            data.state = SessionState::Authenticating { address: address.clone() };
            self.publish(&data);
        }

        let network = &self.inner.config.network;
        let chain_id = ensure_network(wallet, network).await?;
        self.update(|d| d.chain_id = Some(chain_id));

        let token = authenticate(
            &self.inner.api,
            wallet,
            &address,
            network,
            wallet_config.signature_timeout(),
        )
        .await?;

        Ok(Session::new(address, chain_id, wallet_kind, token))
    }

    /// Persist and publish `session` if nothing superseded it meanwhile.
    ///
    /// Chain changes seen while authenticating win over the chain the
    /// handshake started on. Returns the chain the session is committed on.
    fn commit(&self, epoch: u64, mut session: Session, provider: &Arc<dyn WalletProvider>) -> Result<u64, WalletError> {
        let mut data = self.lock();
        if data.epoch != epoch {
            return Err(superseded());
        }

        self.inner.store.save(&PersistedSession::from(&session))?;

        let chain_id = data.chain_id.unwrap_or(session.chain_id);
        session.chain_id = chain_id;
        data.chain_id = Some(chain_id);
        data.state = SessionState::Connected(session);
        data.provider = Some(provider.clone());
        self.publish(&data);
        Ok(chain_id)
    }

    /// Put back what was there before a failed connect. A superseded connect
    /// leaves the state to whoever superseded it.
    fn roll_back(&self, epoch: u64, previous: SessionState, previous_chain: Option<u64>, error: &WalletError) {
        let mut data = self.lock();
        if data.epoch != epoch {
            return;
        }
        data.state = match previous {
            SessionState::Connected(session) => SessionState::Connected(session),
            _ => SessionState::Error(error.to_string()),
        };
        data.chain_id = previous_chain;
        self.publish(&data);
    }

    /// Ask the wallet of the current session (or the injected one) to move to
    /// the required network
    pub async fn switch_to_required_network(&self) -> Result<u64, WalletError> {
        let provider = self
            .lock()
            .provider
            .clone()
            .or_else(|| self.inner.provider.clone())
            .ok_or(WalletError::NoWalletDetected)?;

        let chain_id = ensure_network(provider.as_ref(), &self.inner.config.network).await?;
        self.update(|d| {
            d.chain_id = Some(chain_id);
            if let SessionState::Connected(session) = &mut d.state {
                session.chain_id = chain_id;
            }
        });
        Ok(chain_id)
    }

    /// Drop the session and the persisted entries. Always succeeds.
    pub fn disconnect(&self) {
        let was_active = self.teardown();
        if was_active {
            tracing::info!("Wallet disconnected");
            self.notify(Notice::success("Wallet disconnected"));
        }
    }

    /// Returns whether there was anything to tear down
    fn teardown(&self) -> bool {
        let was_active = self.update(|d| {
            let was_active = !matches!(d.state, SessionState::Disconnected);
            d.epoch += 1;
            d.state = SessionState::Disconnected;
            d.chain_id = None;
            d.provider = None;
            was_active
        });
        self.clear_store();
        was_active
    }

    fn handle_event(&self, provider: &Arc<dyn WalletProvider>, event: ProviderEvent) {
        tracing::debug!("Wallet event: {:?}", event);
        match event {
            ProviderEvent::AccountsChanged(accounts) => self.handle_accounts_changed(provider, accounts),
            ProviderEvent::ChainChanged(chain) => self.handle_chain_changed(&chain),
            ProviderEvent::Disconnected => self.disconnect(),
        }
    }

    fn handle_accounts_changed(&self, provider: &Arc<dyn WalletProvider>, accounts: Vec<String>) {
        let Some(new_address) = accounts.into_iter().next() else {
            tracing::info!("Wallet exposes no accounts, tearing session down");
            if self.teardown() {
                self.notify(Notice::error("Wallet disconnected"));
            }
            return;
        };

        // Invalidate first, then re-authenticate
        let switch = self.update(|d| {
            let (current, kind) = match &d.state {
                SessionState::Connected(session) => (session.address.clone(), Some(session.wallet_kind)),
                SessionState::Authenticating { address } => (address.clone(), None),
                // Connecting resolves the account itself; nothing is trusted yet
                _ => return None,
            };
            if addresses_match(&current, &new_address) {
                return None;
            }

            d.epoch += 1;
            d.state = SessionState::Authenticating { address: new_address.clone() };
            Some((d.epoch, kind))
        });

        let Some((epoch, kind)) = switch else {
            return;
        };

        tracing::info!("Wallet switched to {}, re-authenticating", new_address);
        let wallet_kind = kind.unwrap_or_else(|| detect_wallet_kind(None, provider.capabilities()));
        let session = self.clone();
        let provider = provider.clone();
        tokio::spawn(async move {
            session.reauthenticate(provider, new_address, wallet_kind, epoch).await;
        });
    }

    async fn reauthenticate(
        &self,
        provider: Arc<dyn WalletProvider>,
        address: String,
        wallet_kind: WalletKind,
        epoch: u64,
    ) {
        // Let an in-flight connect settle; it will notice the epoch moved
        let _flight = self.inner.flight.lock().await;
        if self.lock().epoch != epoch {
            return;
        }

        let network = &self.inner.config.network;
        let result = authenticate(
            &self.inner.api,
            provider.as_ref(),
            &address,
            network,
            self.inner.config.wallet.signature_timeout(),
        )
        .await;

        let token = match result {
            Ok(token) => token,
            Err(e) => {
                if self.lock().epoch == epoch {
                    tracing::warn!("Re-authentication for {} failed: {:?}", address, e);
                    self.teardown();
                    self.notify(Notice::error("Failed to authenticate new account"));
                }
                return;
            },
        };

        let known_chain = self.lock().chain_id;
        let chain_id = match known_chain {
            Some(chain_id) => chain_id,
            None => current_chain_id(provider.as_ref()).await.unwrap_or_default(),
        };

        let session = Session::new(address, chain_id, wallet_kind, token);
        let short = session.short_address();
        match self.commit(epoch, session, &provider) {
            Ok(chain_id) => {
                self.notify(Notice::info(format!("Switched to {}", short)));
                self.enforce_chain_policy(chain_id);
            },
            Err(WalletError::Storage(e)) => {
                tracing::error!("Could not persist switched session: {}", e);
                if self.lock().epoch == epoch {
                    self.teardown();
                    self.notify(Notice::error("Failed to authenticate new account"));
                }
            },
            Err(_) => tracing::debug!("Switch to {} superseded", short),
        }
    }

    fn handle_chain_changed(&self, raw: &str) {
        let Some(chain_id) = parse_chain_id_str(raw) else {
            tracing::warn!("Ignoring unparseable chain id {:?}", raw);
            return;
        };

        let connected = self.update(|d| {
            d.chain_id = Some(chain_id);
            match &mut d.state {
                SessionState::Connected(session) => {
                    session.chain_id = chain_id;
                    true
                },
                _ => false,
            }
        });

        // Connect and restore handle the chain themselves
        if !connected {
            return;
        }

        let network = &self.inner.config.network;
        if chain_id == network.chain_id {
            self.notify(Notice::success(format!("Connected to {}", network.display_name)));
        } else {
            self.enforce_chain_policy(chain_id);
        }
    }

    /// Apply the chain policy to a connected session sitting on `chain_id`.
    /// Returns false if the session was torn down.
    fn enforce_chain_policy(&self, chain_id: u64) -> bool {
        let network = &self.inner.config.network;
        if chain_id == network.chain_id {
            return true;
        }

        match self.inner.config.wallet.chain_policy {
            ChainPolicy::Warn => {
                tracing::warn!("Wallet on chain {}", chain_id);
                self.notify(Notice::warning(format!(
                    "Wrong network! Please switch to {}",
                    network.display_name
                )));
                true
            },
            ChainPolicy::Disconnect => {
                tracing::warn!("Wallet on chain {}, disconnecting", chain_id);
                self.teardown();
                self.notify(Notice::error(format!(
                    "Wrong network! Please switch to {}",
                    network.display_name
                )));
                false
            },
        }
    }
}

async fn listen(
    session: Weak<Inner>,
    provider: Arc<dyn WalletProvider>,
    mut events: broadcast::Receiver<ProviderEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(inner) = session.upgrade() else {
                    break;
                };
                WalletSession { inner }.handle_event(&provider, event);
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} wallet events", skipped);
            },
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Wallet event listener stopped");
}
