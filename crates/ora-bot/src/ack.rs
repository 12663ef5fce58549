//! Concurrent acknowledgement waiting.

use std::time::Duration;

use ora_chain::{ChainHandle, Receipt};
use ora_types::{Address, TxHash};
use tokio::task::JoinSet;
use tracing::warn;

use crate::Result;

/// Wait for every `(signer, hash)` receipt concurrently, each bounded by
/// `timeout`. Results come back in completion order.
pub async fn join_receipts(
    chain: &ChainHandle,
    pending: Vec<(Address, TxHash)>,
    timeout: Duration,
) -> Vec<(Address, Result<Receipt>)> {
    let mut set = JoinSet::new();
    for (signer, hash) in pending {
        let chain = chain.clone();
        set.spawn(async move {
            let receipt = chain.wait_for_receipt(hash, timeout).await;
            (signer, receipt.map_err(Into::into))
        });
    }
    let mut out = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => out.push(result),
            Err(e) => warn!(error = %e, "bot: receipt task failed"),
        }
    }
    out
}

/// Count of mined, successful receipts.
pub fn successes(results: &[(Address, Result<Receipt>)]) -> usize {
    results
        .iter()
        .filter(|(_, r)| matches!(r, Ok(receipt) if receipt.success()))
        .count()
}
