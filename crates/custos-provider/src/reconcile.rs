//! Balance reconciliation: spendable balance net of committed-but-unconfirmed
//! spends.

use futures::future::try_join_all;
use rust_decimal::Decimal;
use tracing::debug;

use custos_core::amount::from_minor_units;
use custos_core::error::ProviderError;
use custos_core::traits::AccountChainClient;
use custos_core::types::{PendingSpends, ReserveWallet};

use crate::wallet_selection::WalletFunds;

/// Spendable balance of one wallet: confirmed minus pending.
///
/// Pending exceeding confirmed is the caller's bookkeeping gone wrong;
/// it is reported as a data-integrity error rather than clamped, since
/// clamping would hide double-spend risk.
pub fn reconcile(
    address: &str,
    confirmed: Decimal,
    pending: Decimal,
) -> Result<Decimal, ProviderError> {
    if pending > confirmed {
        return Err(ProviderError::InconsistentPendingSpend {
            address: address.to_string(),
            confirmed,
            pending,
        });
    }
    Ok(confirmed - pending)
}

/// Reconciled spendable balances for a pool of reserve wallets.
///
/// Confirmed balances are fetched in one batched round trip (falling back to
/// per-wallet fan-out inside the client); ordering between wallets carries no
/// meaning.
pub async fn spendable_balances<C>(
    client: &C,
    wallets: &[ReserveWallet],
    pending: &PendingSpends,
    decimals: u32,
) -> Result<Vec<WalletFunds>, ProviderError>
where
    C: AccountChainClient + ?Sized,
{
    let addresses: Vec<String> = wallets.iter().map(|w| w.address.clone()).collect();
    let balances = client.balances(&addresses).await?;
    addresses
        .into_iter()
        .zip(balances)
        .map(|(address, wei)| {
            let confirmed = from_minor_units(wei, decimals)?;
            let spendable = reconcile(&address, confirmed, pending.pending_for(&address))?;
            debug!(%address, %confirmed, %spendable, "reconciled wallet balance");
            Ok(WalletFunds { address, spendable })
        })
        .collect()
}

/// Pending transaction counts (next nonces) for a pool of reserve wallets,
/// fetched concurrently.
pub async fn next_nonces<C>(
    client: &C,
    wallets: &[ReserveWallet],
) -> Result<Vec<(String, u64)>, ProviderError>
where
    C: AccountChainClient + ?Sized,
{
    let fetches = wallets.iter().map(|w| client.transaction_count(&w.address));
    let counts = try_join_all(fetches).await?;
    Ok(wallets
        .iter()
        .map(|w| w.address.clone())
        .zip(counts)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn reconcile_subtracts_pending() {
        assert_eq!(reconcile("w1", dec("10"), dec("3.5")).unwrap(), dec("6.5"));
    }

    #[test]
    fn reconcile_zero_pending_is_identity() {
        assert_eq!(reconcile("w1", dec("7.25"), Decimal::ZERO).unwrap(), dec("7.25"));
    }

    #[test]
    fn reconcile_exact_commitment_leaves_zero() {
        assert_eq!(reconcile("w1", dec("2"), dec("2")).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn reconcile_rejects_inconsistent_pending() {
        let err = reconcile("w1", dec("1"), dec("2")).unwrap_err();
        assert_eq!(
            err,
            ProviderError::InconsistentPendingSpend {
                address: "w1".into(),
                confirmed: dec("1"),
                pending: dec("2"),
            }
        );
    }
}
