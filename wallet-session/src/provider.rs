// wallet-session/src/provider.rs
//! Abstraction over an injected EIP-1193 wallet provider.
//!
//! The session never reaches for a global provider object. Whoever builds a
//! [`WalletSession`](crate::WalletSession) hands it an implementation of
//! [`WalletProvider`]: a browser bridge in production, [`DevWallet`](crate::DevWallet)
//! in development and tests.

use async_trait::async_trait;
use common::{NativeCurrency, NetworkConfig, ProviderEvent, WalletKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::ProviderError;

/// `wallet_switchEthereumChain` parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchChainParams {
    pub chain_id: String,
}

/// `wallet_addEthereumChain` parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl From<&NetworkConfig> for AddChainParams {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            chain_id: network.chain_id_hex(),
            chain_name: network.chain_name.clone(),
            native_currency: network.native_currency.clone(),
            rpc_urls: network.rpc_urls.clone(),
            block_explorer_urls: network.block_explorer_urls.clone(),
        }
    }
}

/// Requests the session issues through `request({method, params})`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ProviderRequest {
    /// Accounts already authorized for this origin; never prompts
    #[serde(rename = "eth_accounts")]
    Accounts,

    /// Opens the wallet's approval prompt
    #[serde(rename = "eth_requestAccounts")]
    RequestAccounts,

    #[serde(rename = "eth_chainId")]
    ChainId,

    #[serde(rename = "wallet_switchEthereumChain")]
    SwitchChain([SwitchChainParams; 1]),

    #[serde(rename = "wallet_addEthereumChain")]
    AddChain([AddChainParams; 1]),

    /// `[hex encoded message, address]`
    #[serde(rename = "personal_sign")]
    PersonalSign(String, String),
}

impl ProviderRequest {
    pub fn method(&self) -> &'static str {
        match self {
            ProviderRequest::Accounts => "eth_accounts",
            ProviderRequest::RequestAccounts => "eth_requestAccounts",
            ProviderRequest::ChainId => "eth_chainId",
            ProviderRequest::SwitchChain(_) => "wallet_switchEthereumChain",
            ProviderRequest::AddChain(_) => "wallet_addEthereumChain",
            ProviderRequest::PersonalSign(..) => "personal_sign",
        }
    }

    pub fn switch_chain(network: &NetworkConfig) -> Self {
        ProviderRequest::SwitchChain([SwitchChainParams { chain_id: network.chain_id_hex() }])
    }

    pub fn add_chain(network: &NetworkConfig) -> Self {
        ProviderRequest::AddChain([AddChainParams::from(network)])
    }

    pub fn personal_sign(message: &str, address: &str) -> Self {
        ProviderRequest::PersonalSign(format!("0x{}", hex::encode(message.as_bytes())), address.to_string())
    }
}

/// Flags a provider sets on itself (`isMetaMask`, `isCoreWallet`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub is_metamask: bool,
    pub is_core_wallet: bool,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Send one JSON-RPC style request to the wallet
    async fn request(&self, request: ProviderRequest) -> Result<Value, ProviderError>;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Stream of `accountsChanged` / `chainChanged` / `disconnect` notifications
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Pick the wallet kind: an explicit preference only counts when the provider
/// confirms it, otherwise Core wins over MetaMask (Core also sets `isMetaMask`).
pub fn detect_wallet_kind(preferred: Option<WalletKind>, caps: ProviderCapabilities) -> WalletKind {
    match preferred {
        Some(WalletKind::Core) if caps.is_core_wallet => return WalletKind::Core,
        Some(WalletKind::MetaMask) if caps.is_metamask => return WalletKind::MetaMask,
        _ => {},
    }

    if caps.is_core_wallet {
        WalletKind::Core
    } else if caps.is_metamask {
        WalletKind::MetaMask
    } else {
        WalletKind::Unknown
    }
}

/// Parse a chain id reported as `0xa86a`, `"43114"` or a JSON number
pub fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_chain_id_str(s),
        _ => None,
    }
}

pub fn parse_chain_id_str(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Decode an account list result; anything but an array of strings is empty
pub fn parse_accounts(value: Value) -> Vec<String> {
    serde_json::from_value::<Vec<String>>(value).unwrap_or_default()
}

/// `eth_accounts` or `eth_requestAccounts`
pub async fn request_accounts(
    provider: &dyn WalletProvider,
    request: ProviderRequest,
) -> Result<Vec<String>, ProviderError> {
    let value = provider.request(request).await?;
    Ok(parse_accounts(value))
}

pub async fn current_chain_id(provider: &dyn WalletProvider) -> Result<u64, ProviderError> {
    let value = provider.request(ProviderRequest::ChainId).await?;
    parse_chain_id(&value)
        .ok_or_else(|| ProviderError::new(-32603, format!("Unexpected chain id: {}", value)))
}
