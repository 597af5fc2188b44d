// common/src/models/session.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which injected provider supplied the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    MetaMask,
    Core,
    Unknown,
}

impl WalletKind {
    /// Value written to the session store
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::MetaMask => "metamask",
            WalletKind::Core => "core",
            WalletKind::Unknown => "unknown",
        }
    }

    /// Name shown to the user
    pub fn display_name(&self) -> &'static str {
        match self {
            WalletKind::MetaMask => "MetaMask",
            WalletKind::Core => "Core Wallet",
            WalletKind::Unknown => "Wallet",
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metamask" => Ok(WalletKind::MetaMask),
            "core" => Ok(WalletKind::Core),
            "unknown" => Ok(WalletKind::Unknown),
            other => Err(format!("unknown wallet kind: {}", other)),
        }
    }
}

/// An authenticated wallet binding.
///
/// A `Session` only exists once the backend has verified a signature (or a
/// previously issued token on restore), so holding one means the address is
/// authenticated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Account as reported by the wallet
    pub address: String,
    /// Network the wallet was on when last observed
    pub chain_id: u64,
    pub wallet_kind: WalletKind,
    /// Bearer credential issued by the backend
    pub auth_token: String,
    /// When the binding was established or restored
    pub connected_at: DateTime<Utc>,
}

impl Session {
    pub fn new(address: String, chain_id: u64, wallet_kind: WalletKind, auth_token: String) -> Self {
        Self {
            address,
            chain_id,
            wallet_kind,
            auth_token,
            connected_at: Utc::now(),
        }
    }

    /// Short form used in notices, e.g. `0x71C7...976F`
    pub fn short_address(&self) -> String {
        shorten_address(&self.address)
    }
}

/// Lifecycle of the single session the client maintains
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Resolving accounts and network, no address trusted yet
    Connecting,
    /// Signature handshake running for `address`; not authenticated
    Authenticating { address: String },
    Connected(Session),
    /// Last attempt failed; behaves like `Disconnected`
    Error(String),
}

impl SessionState {
    /// True only for a fully authenticated session
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected(_))
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_connected()
    }

    /// Address the state currently refers to, authenticated or not
    pub fn address(&self) -> Option<&str> {
        match self {
            SessionState::Authenticating { address } => Some(address),
            SessionState::Connected(session) => Some(&session.address),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Connected(session) => Some(session),
            _ => None,
        }
    }
}

/// Reachability of the backend as last probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    #[default]
    Unknown,
    Reachable,
    Unavailable,
}

/// The three entries kept in the session store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub wallet_address: String,
    pub auth_token: String,
    pub wallet_kind: String,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            wallet_address: session.address.clone(),
            auth_token: session.auth_token.clone(),
            wallet_kind: session.wallet_kind.as_str().to_string(),
        }
    }
}

/// Wallet addresses are hex and compare without regard to checksum casing
pub fn addresses_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// `0x` followed by 40 hex digits
pub fn is_well_formed_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
