// wallet-session/tests/session_flow.rs
// End-to-end session flows against a dev backend on an ephemeral port

use common::{
    digest_signature, BackendStatus, ChainPolicy, Config, NoticeLevel, PersistedSession, ProviderEvent,
    SessionState, WalletKind,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wallet_session::auth::auth_message;
use wallet_session::{
    DevWallet, FileStore, ProviderCapabilities, ProviderError, RejectedAction, RestoreOutcome, SessionSnapshot,
    SessionStore, WalletError, WalletProvider, WalletSession,
};

const ADDR: &str = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F";
const OTHER: &str = "0x2546BcD3c84621e976D8185a91A922aE77ECEc30";
const AVALANCHE: u64 = 43114;

fn spawn_backend() -> String {
    let mut config = Config::default();
    config.dev_backend.addr = "127.0.0.1:0".to_string();
    let addr = dev_backend::spawn(config).expect("dev backend should start");
    format!("http://{}", addr)
}

fn test_config(api_base_url: String) -> Config {
    let mut config = Config::default();
    config.api_base_url = api_base_url;
    config.health_check.attempts = 2;
    config.health_check.attempt_timeout_secs = 2;
    config.health_check.backoff_ms = 10;
    config.wallet.request_timeout_secs = 5;
    config.wallet.signature_timeout_secs = 5;
    config
}

struct Harness {
    session: WalletSession,
    wallet: Arc<DevWallet>,
    store: Arc<FileStore>,
    _dir: TempDir,
}

fn harness_with(config: Config, wallet: DevWallet) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(dir.path().join("session.json")));
    let wallet = Arc::new(wallet);
    let provider: Arc<dyn WalletProvider> = wallet.clone();
    let session = WalletSession::from_config(config, store.clone(), Some(provider)).unwrap();
    Harness { session, wallet, store, _dir: dir }
}

fn harness(wallet: DevWallet) -> Harness {
    harness_with(test_config(spawn_backend()), wallet)
}

async fn wait_for(session: &WalletSession, done: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
    let mut snapshots = session.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            if done(&snapshot) {
                return snapshot;
            }
            snapshots.changed().await.expect("session dropped");
        }
    })
    .await
    .expect("timed out waiting for session state")
}

/// Block until the wallet has been asked for `count` calls of `method`
async fn wait_for_request(wallet: &DevWallet, method: &str, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while wallet.request_count(method) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for wallet request")
}

async fn connected(h: &Harness) -> String {
    assert_eq!(h.session.initialize().await.unwrap(), RestoreOutcome::NoSession);
    h.session.connect(None, None).await.unwrap()
}

#[tokio::test]
async fn test_connect_authenticates_and_persists() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));

    let address = connected(&h).await;
    assert_eq!(address, ADDR);

    let snapshot = h.session.snapshot();
    assert!(snapshot.is_connected());
    assert!(snapshot.is_on_required_network());
    assert_eq!(snapshot.address(), Some(ADDR));

    let persisted = h.store.load().unwrap().expect("session should be persisted");
    assert_eq!(persisted.wallet_address, ADDR);
    assert_eq!(persisted.wallet_kind, "metamask");

    // The persisted token is one the backend accepts
    let check = h.session.api().verify_token(&persisted.auth_token, ADDR).await.unwrap();
    assert!(check.valid);

    assert_eq!(
        h.wallet.requests(),
        vec!["eth_accounts", "eth_requestAccounts", "eth_chainId", "personal_sign"]
    );
}

#[tokio::test]
async fn test_connect_with_fixed_nonce_sends_signed_message() {
    let message = auth_message(ADDR, "abc123", "Avalanche");
    let signature = digest_signature(ADDR, &message);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/system/health")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":"ok"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/auth/nonce")
        .match_query(mockito::Matcher::UrlEncoded("wallet".into(), ADDR.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"nonce":"abc123"}"#)
        .create_async()
        .await;
    let verify = server
        .mock("POST", "/api/auth/verify")
        .match_body(mockito::Matcher::Json(serde_json::json!({
            "wallet": ADDR,
            "signature": signature,
            "message": message,
            "nonce": "abc123",
            "chainId": 43114
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"fixed-token"}"#)
        .create_async()
        .await;

    let h = harness_with(test_config(server.url()), DevWallet::new(vec![ADDR.into()], AVALANCHE));
    h.session.initialize().await.unwrap();
    h.session.connect(None, None).await.unwrap();

    verify.assert_async().await;
    assert_eq!(h.store.load().unwrap().unwrap().auth_token, "fixed-token");
}

#[tokio::test]
async fn test_rejected_account_request() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    h.wallet.fail_next("eth_requestAccounts", ProviderError::user_rejected());
    let mut notices = h.session.notices();

    h.session.initialize().await.unwrap();
    let err = h.session.connect(None, None).await.unwrap_err();

    assert!(matches!(err, WalletError::UserRejected(RejectedAction::Accounts)));
    assert!(!h.session.snapshot().state.is_authenticated());
    assert!(h.store.load().unwrap().is_none());
    assert_eq!(h.wallet.request_count("personal_sign"), 0);
    assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_rejected_signature_leaves_nothing_behind() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    h.wallet.fail_next("personal_sign", ProviderError::user_rejected());

    h.session.initialize().await.unwrap();
    let err = h.session.connect(None, None).await.unwrap_err();

    assert!(matches!(err, WalletError::UserRejected(RejectedAction::Signature)));
    assert!(matches!(h.session.snapshot().state, SessionState::Error(_)));
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_switches_to_known_network_without_adding() {
    let h = harness(DevWallet::new(vec![ADDR.into()], 1).with_known_chain(AVALANCHE));

    connected(&h).await;

    assert_eq!(h.wallet.request_count("wallet_addEthereumChain"), 0);
    assert_eq!(h.wallet.request_count("wallet_switchEthereumChain"), 1);
    assert_eq!(h.wallet.chain_id(), AVALANCHE);
    assert!(h.session.is_on_required_network());
}

#[tokio::test]
async fn test_adds_unknown_network_then_switches() {
    let h = harness(DevWallet::new(vec![ADDR.into()], 1));

    connected(&h).await;

    let network_calls: Vec<_> = h
        .wallet
        .requests()
        .into_iter()
        .filter(|m| m.starts_with("wallet_"))
        .collect();
    assert_eq!(
        network_calls,
        vec!["wallet_switchEthereumChain", "wallet_addEthereumChain", "wallet_switchEthereumChain"]
    );
    assert!(h.session.snapshot().is_connected());
}

#[tokio::test]
async fn test_restore_reuses_valid_token() {
    let backend = spawn_backend();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let wallet = Arc::new(DevWallet::new(vec![ADDR.into()], AVALANCHE));

    let first = WalletSession::from_config(
        test_config(backend.clone()),
        Arc::new(FileStore::new(&path)),
        Some(wallet.clone() as Arc<dyn WalletProvider>),
    )
    .unwrap();
    first.initialize().await.unwrap();
    first.connect(None, None).await.unwrap();
    drop(first);

    // A fresh start picks the session up without asking for a signature
    let second = WalletSession::from_config(
        test_config(backend),
        Arc::new(FileStore::new(&path)),
        Some(wallet.clone() as Arc<dyn WalletProvider>),
    )
    .unwrap();
    let outcome = second.initialize().await.unwrap();

    assert_eq!(outcome, RestoreOutcome::Restored { address: ADDR.into(), wrong_network: false });
    assert!(second.is_connected());
    assert_eq!(wallet.request_count("personal_sign"), 1);
}

#[tokio::test]
async fn test_restore_discards_invalid_token() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE).authorized());
    h.store
        .save(&PersistedSession {
            wallet_address: ADDR.into(),
            auth_token: "not-a-jwt".into(),
            wallet_kind: "metamask".into(),
        })
        .unwrap();

    let err = h.session.initialize().await.unwrap_err();

    assert!(matches!(err, WalletError::TokenInvalid));
    assert!(!h.session.is_connected());
    assert!(h.store.load().unwrap().is_none());
    assert_eq!(h.wallet.request_count("personal_sign"), 0);
}

#[tokio::test]
async fn test_restore_requires_wallet_to_expose_address() {
    let backend = spawn_backend();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");

    let first = WalletSession::from_config(
        test_config(backend.clone()),
        Arc::new(FileStore::new(&path)),
        Some(Arc::new(DevWallet::new(vec![ADDR.into()], AVALANCHE)) as Arc<dyn WalletProvider>),
    )
    .unwrap();
    first.initialize().await.unwrap();
    first.connect(None, None).await.unwrap();
    drop(first);

    // The wallet was reset and no longer authorizes the origin
    let store = Arc::new(FileStore::new(&path));
    let second = WalletSession::from_config(
        test_config(backend),
        store.clone(),
        Some(Arc::new(DevWallet::new(vec![ADDR.into()], AVALANCHE)) as Arc<dyn WalletProvider>),
    )
    .unwrap();
    let err = second.initialize().await.unwrap_err();

    assert!(matches!(err, WalletError::NoAccountsReturned));
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_account_switch_reauthenticates() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;
    let old_token = h.store.load().unwrap().unwrap().auth_token;

    h.wallet.set_accounts(vec![OTHER.into()]);

    let snapshot = wait_for(&h.session, |s| s.address() == Some(OTHER)).await;
    assert!(snapshot.is_connected());
    assert_eq!(h.wallet.request_count("personal_sign"), 2);

    let persisted = h.store.load().unwrap().unwrap();
    assert_eq!(persisted.wallet_address, OTHER);
    assert_ne!(persisted.auth_token, old_token);
}

#[tokio::test]
async fn test_failed_reauthentication_tears_session_down() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;
    let mut notices = h.session.notices();

    h.wallet.fail_next("personal_sign", ProviderError::user_rejected());
    h.wallet.set_accounts(vec![OTHER.into()]);

    // The old account's session is gone as soon as the switch is seen
    let snapshot = wait_for(&h.session, |s| !s.is_connected()).await;
    assert_ne!(snapshot.address(), Some(ADDR));

    wait_for(&h.session, |s| s.state == SessionState::Disconnected).await;
    assert!(h.store.load().unwrap().is_none());

    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv()).await.unwrap().unwrap();
    assert_eq!(notice.message, "Failed to authenticate new account");
}

#[tokio::test]
async fn test_empty_accounts_disconnects() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;

    h.wallet.set_accounts(vec![]);

    wait_for(&h.session, |s| s.state == SessionState::Disconnected).await;
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_provider_disconnect_event() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;

    h.wallet.emit(ProviderEvent::Disconnected);

    wait_for(&h.session, |s| s.state == SessionState::Disconnected).await;
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_chain_change_warns_by_default() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;
    let mut notices = h.session.notices();

    h.wallet.set_chain(1);

    let snapshot = wait_for(&h.session, |s| s.chain_id == Some(1)).await;
    assert!(snapshot.is_connected());
    assert!(snapshot.is_wrong_network());
    assert!(h.store.load().unwrap().is_some());

    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv()).await.unwrap().unwrap();
    assert_eq!(notice.level, NoticeLevel::Warning);

    h.wallet.set_chain(AVALANCHE);
    let snapshot = wait_for(&h.session, |s| s.chain_id == Some(AVALANCHE)).await;
    assert!(snapshot.is_on_required_network());
    assert!(snapshot.is_connected());
}

#[tokio::test]
async fn test_chain_change_can_disconnect() {
    let mut config = test_config(spawn_backend());
    config.wallet.chain_policy = ChainPolicy::Disconnect;
    let h = harness_with(config, DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;

    h.wallet.set_chain(1);

    wait_for(&h.session, |s| s.state == SessionState::Disconnected).await;
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_disconnect_twice() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;

    h.session.disconnect();
    let first = h.session.snapshot();
    h.session.disconnect();

    assert_eq!(h.session.snapshot(), first);
    assert!(!first.is_connected());
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_second_connect_while_pending_is_rejected() {
    let h = harness(
        DevWallet::new(vec![ADDR.into()], AVALANCHE).with_request_accounts_delay(Duration::from_millis(300)),
    );
    h.session.initialize().await.unwrap();

    let first = tokio::spawn({
        let session = h.session.clone();
        async move { session.connect(None, None).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = h.session.connect(None, None).await.unwrap_err();
    assert!(matches!(err, WalletError::RequestPending));

    assert_eq!(first.await.unwrap().unwrap(), ADDR);
    assert_eq!(h.wallet.request_count("eth_requestAccounts"), 1);
    assert!(h.session.is_connected());
}

#[tokio::test]
async fn test_unreachable_backend() {
    let h = harness_with(
        test_config("http://127.0.0.1:9".to_string()),
        DevWallet::new(vec![ADDR.into()], AVALANCHE),
    );

    let err = h.session.initialize().await.unwrap_err();
    assert!(matches!(err, WalletError::BackendUnavailable));

    let err = h.session.connect(None, None).await.unwrap_err();
    assert!(matches!(err, WalletError::BackendUnavailable));
    assert!(h.wallet.requests().is_empty());
}

#[tokio::test]
async fn test_connected_implies_token_and_address() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;

    let snapshot = h.session.snapshot();
    let session = snapshot.state.session().expect("connected session");
    assert!(!session.auth_token.is_empty());
    assert_eq!(h.session.address().as_deref(), Some(ADDR));
    assert_eq!(h.store.load().unwrap().unwrap().auth_token, session.auth_token);
}

#[tokio::test]
async fn test_account_request_times_out() {
    let mut config = test_config(spawn_backend());
    config.wallet.request_timeout_secs = 1;
    let h = harness_with(
        config,
        DevWallet::new(vec![ADDR.into()], AVALANCHE).with_request_accounts_delay(Duration::from_secs(2)),
    );
    h.session.initialize().await.unwrap();

    let err = h.session.connect(None, None).await.unwrap_err();

    match &err {
        WalletError::Timeout(message) => assert!(message.contains("popup")),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(!h.session.is_connected());
    assert!(h.store.load().unwrap().is_none());
    assert_eq!(h.wallet.request_count("personal_sign"), 0);
}

#[tokio::test]
async fn test_failed_reconnect_keeps_existing_session() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;
    let token = h.store.load().unwrap().unwrap().auth_token;

    h.wallet.fail_next("personal_sign", ProviderError::user_rejected());
    let err = h.session.connect(None, None).await.unwrap_err();
    assert!(matches!(err, WalletError::UserRejected(RejectedAction::Signature)));

    let snapshot = h.session.snapshot();
    assert!(snapshot.is_connected());
    assert_eq!(snapshot.address(), Some(ADDR));
    assert_eq!(h.store.load().unwrap().unwrap().auth_token, token);
}

#[tokio::test]
async fn test_account_switch_during_handshake_supersedes_connect() {
    let h = harness(
        DevWallet::new(vec![ADDR.into(), OTHER.into()], AVALANCHE)
            .with_signature_delay(Duration::from_millis(300)),
    );
    h.session.initialize().await.unwrap();
    let mut notices = h.session.notices();

    let pending = tokio::spawn({
        let session = h.session.clone();
        async move { session.connect(None, None).await }
    });
    wait_for_request(&h.wallet, "personal_sign", 1).await;

    // The signature for ADDR still completes, but the wallet has moved on
    h.wallet.emit(ProviderEvent::AccountsChanged(vec![OTHER.into(), ADDR.into()]));

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, WalletError::AuthenticationFailed(_)));

    // ADDR never made it to a committed session
    let messages = tokio::time::timeout(Duration::from_secs(5), async {
        let mut messages = Vec::new();
        loop {
            let message = notices.recv().await.unwrap().message;
            let done = message.starts_with("Switched to");
            messages.push(message);
            if done {
                return messages;
            }
        }
    })
    .await
    .unwrap();
    assert!(!messages.iter().any(|m| m.starts_with("Connected via")));
    assert_eq!(messages.last().map(String::as_str), Some("Switched to 0x2546...Ec30"));

    let snapshot = h.session.snapshot();
    assert!(snapshot.is_connected());
    assert_eq!(snapshot.address(), Some(OTHER));
    assert_eq!(h.store.load().unwrap().unwrap().wallet_address, OTHER);
}

#[tokio::test]
async fn test_chain_change_during_handshake_is_kept() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE).with_signature_delay(Duration::from_millis(300)));
    h.session.initialize().await.unwrap();
    let mut notices = h.session.notices();

    let pending = tokio::spawn({
        let session = h.session.clone();
        async move { session.connect(None, None).await }
    });
    wait_for_request(&h.wallet, "personal_sign", 1).await;
    h.wallet.set_chain(1);

    assert_eq!(pending.await.unwrap().unwrap(), ADDR);

    let snapshot = h.session.snapshot();
    assert!(snapshot.is_connected());
    assert_eq!(snapshot.chain_id, Some(1));
    assert_eq!(snapshot.state.session().map(|s| s.chain_id), Some(1));
    assert!(snapshot.is_wrong_network());

    let mut levels = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        levels.push(notice.level);
    }
    assert!(levels.contains(&NoticeLevel::Warning));
}

#[tokio::test]
async fn test_chain_change_during_handshake_can_disconnect() {
    let mut config = test_config(spawn_backend());
    config.wallet.chain_policy = ChainPolicy::Disconnect;
    let h = harness_with(
        config,
        DevWallet::new(vec![ADDR.into()], AVALANCHE).with_signature_delay(Duration::from_millis(300)),
    );
    h.session.initialize().await.unwrap();

    let pending = tokio::spawn({
        let session = h.session.clone();
        async move { session.connect(None, None).await }
    });
    wait_for_request(&h.wallet, "personal_sign", 1).await;
    h.wallet.set_chain(1);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, WalletError::NetworkSwitchFailed(_)));

    wait_for(&h.session, |s| s.state == SessionState::Disconnected).await;
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_retry_backend_recovers() {
    let mut server = mockito::Server::new_async().await;
    let down = server
        .mock("GET", "/system/health")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let h = harness_with(test_config(server.url()), DevWallet::new(vec![ADDR.into()], AVALANCHE));
    let err = h.session.initialize().await.unwrap_err();
    assert!(matches!(err, WalletError::BackendUnavailable));
    assert_eq!(h.session.snapshot().backend, BackendStatus::Unavailable);
    down.assert_async().await;

    down.remove_async().await;
    server
        .mock("GET", "/system/health")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":"ok"}"#)
        .create_async()
        .await;

    assert_eq!(h.session.retry_backend().await.unwrap(), RestoreOutcome::NoSession);
    assert_eq!(h.session.snapshot().backend, BackendStatus::Reachable);
}

#[tokio::test]
async fn test_switch_back_to_required_network() {
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE));
    connected(&h).await;

    h.wallet.set_chain(1);
    wait_for(&h.session, |s| s.chain_id == Some(1)).await;

    assert_eq!(h.session.switch_to_required_network().await.unwrap(), AVALANCHE);

    let snapshot = h.session.snapshot();
    assert!(snapshot.is_connected());
    assert!(snapshot.is_on_required_network());
    assert_eq!(snapshot.state.session().map(|s| s.chain_id), Some(AVALANCHE));
    assert_eq!(h.wallet.chain_id(), AVALANCHE);
}

#[tokio::test]
async fn test_restore_on_wrong_network_warns() {
    let backend = spawn_backend();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let wallet = Arc::new(DevWallet::new(vec![ADDR.into()], AVALANCHE));

    let first = WalletSession::from_config(
        test_config(backend.clone()),
        Arc::new(FileStore::new(&path)),
        Some(wallet.clone() as Arc<dyn WalletProvider>),
    )
    .unwrap();
    first.initialize().await.unwrap();
    first.connect(None, None).await.unwrap();
    drop(first);

    wallet.set_chain(1);

    let second = WalletSession::from_config(
        test_config(backend),
        Arc::new(FileStore::new(&path)),
        Some(wallet.clone() as Arc<dyn WalletProvider>),
    )
    .unwrap();
    let mut notices = second.notices();
    let outcome = second.initialize().await.unwrap();

    assert_eq!(outcome, RestoreOutcome::Restored { address: ADDR.into(), wrong_network: true });
    assert!(second.snapshot().is_wrong_network());

    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.level, NoticeLevel::Warning);
    assert_eq!(notice.message, "Please switch back to Avalanche");
}

#[tokio::test]
async fn test_preferred_wallet_kind_is_persisted() {
    let both = ProviderCapabilities { is_metamask: true, is_core_wallet: true };

    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE).with_capabilities(both));
    h.session.initialize().await.unwrap();
    h.session.connect(Some(WalletKind::MetaMask), None).await.unwrap();
    assert_eq!(h.store.load().unwrap().unwrap().wallet_kind, "metamask");

    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE).with_capabilities(both));
    h.session.initialize().await.unwrap();
    h.session.connect(Some(WalletKind::Core), None).await.unwrap();
    assert_eq!(h.store.load().unwrap().unwrap().wallet_kind, "core");

    // A preference the wallet cannot back up is ignored
    let metamask_only = ProviderCapabilities { is_metamask: true, is_core_wallet: false };
    let h = harness(DevWallet::new(vec![ADDR.into()], AVALANCHE).with_capabilities(metamask_only));
    h.session.initialize().await.unwrap();
    h.session.connect(Some(WalletKind::Core), None).await.unwrap();
    assert_eq!(h.store.load().unwrap().unwrap().wallet_kind, "metamask");
}
