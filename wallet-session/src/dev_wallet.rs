// wallet-session/src/dev_wallet.rs
//! In-memory wallet for development and tests.
//!
//! Behaves like an injected browser wallet: accounts must be authorized
//! through `eth_requestAccounts` before `eth_accounts` returns them, unknown
//! chains answer 4902, and signatures use [`common::digest_signature`] so the
//! dev backend can check them. Failures can be scripted per method.

use async_trait::async_trait;
use common::{addresses_match, digest_signature, ProviderEvent};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::{ProviderError, UNRECOGNIZED_CHAIN};
use crate::provider::{parse_chain_id_str, ProviderCapabilities, ProviderRequest, WalletProvider};

const EVENT_CAPACITY: usize = 32;

struct DevWalletState {
    accounts: Vec<String>,
    authorized: bool,
    chain_id: u64,
    known_chains: HashSet<u64>,
    failures: HashMap<&'static str, VecDeque<ProviderError>>,
    log: Vec<ProviderRequest>,
    request_accounts_delay: Option<Duration>,
    signature_delay: Option<Duration>,
}

pub struct DevWallet {
    state: Mutex<DevWalletState>,
    capabilities: ProviderCapabilities,
    events: broadcast::Sender<ProviderEvent>,
}

impl DevWallet {
    /// Wallet exposing `accounts` (unauthorized) on `chain_id`
    pub fn new(accounts: Vec<String>, chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut known_chains = HashSet::new();
        known_chains.insert(chain_id);

        Self {
            state: Mutex::new(DevWalletState {
                accounts,
                authorized: false,
                chain_id,
                known_chains,
                failures: HashMap::new(),
                log: Vec::new(),
                request_accounts_delay: None,
                signature_delay: None,
            }),
            capabilities: ProviderCapabilities { is_metamask: true, is_core_wallet: false },
            events,
        }
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Pretend the origin was approved in an earlier visit
    pub fn authorized(self) -> Self {
        self.state().authorized = true;
        self
    }

    pub fn with_known_chain(self, chain_id: u64) -> Self {
        self.state().known_chains.insert(chain_id);
        self
    }

    pub fn with_request_accounts_delay(self, delay: Duration) -> Self {
        self.state().request_accounts_delay = Some(delay);
        self
    }

    pub fn with_signature_delay(self, delay: Duration) -> Self {
        self.state().signature_delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, DevWalletState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next request for `method` fail with `error`
    pub fn fail_next(&self, method: &'static str, error: ProviderError) {
        self.state().failures.entry(method).or_default().push_back(error);
    }

    /// Replace the exposed accounts and notify subscribers, as a wallet does
    /// when the user switches or removes accounts
    pub fn set_accounts(&self, accounts: Vec<String>) {
        self.state().accounts = accounts.clone();
        self.emit(ProviderEvent::AccountsChanged(accounts));
    }

    /// Move to another chain from inside the wallet
    pub fn set_chain(&self, chain_id: u64) {
        {
            let mut state = self.state();
            state.chain_id = chain_id;
            state.known_chains.insert(chain_id);
        }
        self.emit(ProviderEvent::ChainChanged(format!("0x{:x}", chain_id)));
    }

    pub fn emit(&self, event: ProviderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn chain_id(&self) -> u64 {
        self.state().chain_id
    }

    /// Methods requested so far, oldest first
    pub fn requests(&self) -> Vec<&'static str> {
        self.state().log.iter().map(ProviderRequest::method).collect()
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.state().log.iter().filter(|r| r.method() == method).count()
    }

    pub fn logged_requests(&self) -> Vec<ProviderRequest> {
        self.state().log.clone()
    }

    fn sign(&self, message_hex: &str, address: &str) -> Result<Value, ProviderError> {
        let state = self.state();
        if !state.authorized || !state.accounts.iter().any(|a| addresses_match(a, address)) {
            return Err(ProviderError::new(4100, "The requested account has not been authorized"));
        }

        let raw = message_hex.strip_prefix("0x").unwrap_or(message_hex);
        let bytes = hex::decode(raw)
            .map_err(|e| ProviderError::new(-32602, format!("Invalid message encoding: {}", e)))?;
        let message = String::from_utf8(bytes)
            .map_err(|e| ProviderError::new(-32602, format!("Message is not UTF-8: {}", e)))?;

        Ok(json!(digest_signature(address, &message)))
    }
}

#[async_trait]
impl WalletProvider for DevWallet {
    async fn request(&self, request: ProviderRequest) -> Result<Value, ProviderError> {
        let method = request.method();
        tracing::debug!("DevWallet request: {}", method);

        let (failure, delay) = {
            let mut state = self.state();
            state.log.push(request.clone());
            let failure = state.failures.get_mut(method).and_then(VecDeque::pop_front);
            let delay = match request {
                ProviderRequest::RequestAccounts => state.request_accounts_delay,
                ProviderRequest::PersonalSign(..) => state.signature_delay,
                _ => None,
            };
            (failure, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = failure {
            return Err(error);
        }

        match request {
            ProviderRequest::Accounts => {
                let state = self.state();
                let accounts = if state.authorized { state.accounts.clone() } else { Vec::new() };
                Ok(json!(accounts))
            },
            ProviderRequest::RequestAccounts => {
                let mut state = self.state();
                state.authorized = true;
                Ok(json!(state.accounts))
            },
            ProviderRequest::ChainId => Ok(json!(format!("0x{:x}", self.state().chain_id))),
            ProviderRequest::SwitchChain([params]) => {
                let chain_id = parse_chain_id_str(&params.chain_id)
                    .ok_or_else(|| ProviderError::new(-32602, "Invalid chain id"))?;
                {
                    let mut state = self.state();
                    if !state.known_chains.contains(&chain_id) {
                        return Err(ProviderError::new(
                            UNRECOGNIZED_CHAIN,
                            format!("Unrecognized chain ID \"{}\"", params.chain_id),
                        ));
                    }
                    state.chain_id = chain_id;
                }
                self.emit(ProviderEvent::ChainChanged(params.chain_id));
                Ok(Value::Null)
            },
            ProviderRequest::AddChain([params]) => {
                let chain_id = parse_chain_id_str(&params.chain_id)
                    .ok_or_else(|| ProviderError::new(-32602, "Invalid chain id"))?;
                self.state().known_chains.insert(chain_id);
                Ok(Value::Null)
            },
            ProviderRequest::PersonalSign(message, address) => self.sign(&message, &address),
        }
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
