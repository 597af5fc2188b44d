// wallet-session/src/network.rs
use common::NetworkConfig;

use crate::error::{RejectedAction, WalletError, UNRECOGNIZED_CHAIN};
use crate::provider::{current_chain_id, ProviderRequest, WalletProvider};

/// Make sure the wallet sits on `network`, switching (and registering the
/// chain first if the wallet has never seen it). Returns the chain id the
/// wallet ends up on.
pub async fn ensure_network(provider: &dyn WalletProvider, network: &NetworkConfig) -> Result<u64, WalletError> {
    let chain_id = current_chain_id(provider)
        .await
        .map_err(|e| WalletError::NetworkSwitchFailed(e.message))?;

    if chain_id == network.chain_id {
        return Ok(chain_id);
    }

    tracing::info!("Wallet on chain {}, switching to {} ({})", chain_id, network.chain_name, network.chain_id);

    match provider.request(ProviderRequest::switch_chain(network)).await {
        Ok(_) => {},
        Err(e) if e.code == UNRECOGNIZED_CHAIN => {
            tracing::info!("{} unknown to wallet, adding it", network.chain_name);

            provider
                .request(ProviderRequest::add_chain(network))
                .await
                .map_err(|e| {
                    tracing::warn!("wallet_addEthereumChain failed: {}", e);
                    WalletError::from_provider(e, RejectedAction::NetworkAdd)
                })?;

            provider
                .request(ProviderRequest::switch_chain(network))
                .await
                .map_err(|e| WalletError::from_provider(e, RejectedAction::NetworkSwitch))?;
        },
        Err(e) => {
            tracing::warn!("wallet_switchEthereumChain failed: {}", e);
            return Err(WalletError::from_provider(e, RejectedAction::NetworkSwitch));
        },
    }

    Ok(network.chain_id)
}
