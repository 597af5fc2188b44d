// wallet-session/src/auth.rs
use common::{NetworkConfig, VerifyRequest};
use std::time::Duration;

use crate::api::ApiClient;
use crate::error::{ApiError, ProviderError, RejectedAction, WalletError};
use crate::provider::{ProviderRequest, WalletProvider};

/// The exact text the wallet is asked to sign
pub fn auth_message(address: &str, nonce: &str, network_name: &str) -> String {
    format!(
        "Welcome to Avio!\n\nSign this message to authenticate.\n\nAddress: {}\nNonce: {}\nChain: {}\n\nThis signature is free and won't cost gas.",
        address, nonce, network_name
    )
}

/// Nonce → sign → verify. Returns the bearer token the backend issued.
///
/// Nothing is stored here; committing the token is the caller's job.
pub async fn authenticate(
    api: &ApiClient,
    provider: &dyn WalletProvider,
    address: &str,
    network: &NetworkConfig,
    signature_timeout: Duration,
) -> Result<String, WalletError> {
    let nonce = api.nonce(address).await.map_err(backend_failure)?.nonce;
    tracing::debug!("Received nonce for {}", address);

    let message = auth_message(address, &nonce, &network.display_name);

    let signature = match tokio::time::timeout(
        signature_timeout,
        provider.request(ProviderRequest::personal_sign(&message, address)),
    )
    .await
    {
        Ok(Ok(value)) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletError::AuthenticationFailed("Wallet returned no signature".into()))?,
        Ok(Err(e)) => return Err(signature_failure(e)),
        Err(_) => {
            return Err(WalletError::Timeout(
                "Signature request timed out. Please check your wallet and try again.".into(),
            ))
        },
    };

    let request = VerifyRequest {
        wallet: address.to_string(),
        signature,
        message,
        nonce,
        chain_id: network.chain_id,
    };

    let token = api.verify(&request).await.map_err(backend_failure)?.token;
    if token.is_empty() {
        return Err(WalletError::AuthenticationFailed("Backend returned an empty token".into()));
    }

    tracing::info!("Authenticated {}", address);
    Ok(token)
}

fn signature_failure(e: ProviderError) -> WalletError {
    tracing::warn!("personal_sign failed: {}", e);
    WalletError::from_provider(e, RejectedAction::Signature)
}

// A 4xx means the backend refused the nonce or signature; anything else is transport
fn backend_failure(e: ApiError) -> WalletError {
    tracing::warn!("Authentication request failed: {}", e);
    match e {
        ApiError::Status { status, message } if (400..500).contains(&status) => {
            WalletError::AuthenticationFailed(message)
        },
        other => WalletError::Api(other),
    }
}
