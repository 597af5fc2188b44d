// wallet-session/src/error.rs
use std::fmt;
use thiserror::Error;

/// EIP-1193 error codes the session reacts to
pub const USER_REJECTED: i64 = 4001;
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
pub const REQUEST_PENDING: i64 = -32002;

/// Error returned by a wallet provider for a single request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED, "User rejected the request.")
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED || self.message.to_ascii_lowercase().contains("user rejected")
    }

    pub fn is_pending(&self) -> bool {
        self.code == REQUEST_PENDING
    }
}

/// Failures talking to the backend over HTTP
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} is required")]
    MissingArgument(&'static str),

    #[error("No auth token found")]
    MissingToken,

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Session store error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Backend answered, but said no
    pub fn is_rejection(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if (400..500).contains(status))
    }
}

/// Failures reading or writing persisted session entries
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt session file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Which interactive wallet prompt the user declined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedAction {
    Accounts,
    Signature,
    NetworkSwitch,
    NetworkAdd,
}

impl fmt::Display for RejectedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectedAction::Accounts => "Connection request rejected",
            RejectedAction::Signature => "Signature request rejected",
            RejectedAction::NetworkSwitch => "Network switch rejected",
            RejectedAction::NetworkAdd => "Adding the network was rejected",
        };
        f.write_str(text)
    }
}

/// Every failure the session reports to its callers.
///
/// The `Display` text is what the user sees; the variants carry enough
/// detail for logging.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Backend is not reachable. Please retry in a moment.")]
    BackendUnavailable,

    #[error("No wallet detected. Please install MetaMask or Core Wallet.")]
    NoWalletDetected,

    #[error("No accounts returned from wallet")]
    NoAccountsReturned,

    #[error("{0} by user")]
    UserRejected(RejectedAction),

    #[error("Request pending. Please check your wallet.")]
    RequestPending,

    #[error("Failed to switch network: {0}")]
    NetworkSwitchFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Your session has expired. Please reconnect your wallet.")]
    TokenInvalid,

    #[error("{0}")]
    Timeout(String),

    #[error("Could not persist session: {0}")]
    Storage(#[from] StorageError),

    #[error("Backend request failed: {0}")]
    Api(#[from] ApiError),
}

impl WalletError {
    /// Translate a provider error raised while `action` was pending
    pub fn from_provider(err: ProviderError, action: RejectedAction) -> Self {
        if err.is_user_rejection() {
            WalletError::UserRejected(action)
        } else if err.is_pending() {
            WalletError::RequestPending
        } else {
            match action {
                RejectedAction::NetworkSwitch | RejectedAction::NetworkAdd => {
                    WalletError::NetworkSwitchFailed(err.message)
                },
                RejectedAction::Signature => WalletError::AuthenticationFailed(err.message),
                RejectedAction::Accounts => WalletError::NoAccountsReturned,
            }
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, WalletError::UserRejected(_))
    }
}
