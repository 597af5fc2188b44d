// wallet-session/src/lib.rs
//! Wallet connection and signature-based sessions against the Avio backend.

pub mod api;
pub mod auth;
pub mod dev_wallet;
pub mod error;
pub mod health;
pub mod network;
pub mod provider;
pub mod session;
pub mod storage;

pub use api::ApiClient;
pub use dev_wallet::DevWallet;
pub use error::{ApiError, ProviderError, RejectedAction, StorageError, WalletError};
pub use provider::{ProviderCapabilities, ProviderRequest, WalletProvider};
pub use session::{RestoreOutcome, SessionSnapshot, WalletSession};
pub use storage::{FileStore, MemoryStore, SessionStore};
