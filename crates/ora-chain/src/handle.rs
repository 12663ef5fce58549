//! Shared async access to a [`LocalChain`].
//!
//! The coordinator talks to the ledger only through a [`ChainHandle`]:
//! reads take a snapshot under the lock, writes queue transactions, and
//! acknowledgements are awaited with a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use ora_types::TxHash;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chain::LocalChain;
use crate::tx::{self, Receipt, Transaction};
use crate::{ChainError, Result};

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cloneable handle to a shared ledger.
#[derive(Clone, Debug)]
pub struct ChainHandle {
    inner: Arc<Mutex<LocalChain>>,
    poll_interval: Duration,
}

impl ChainHandle {
    /// Wrap a chain for shared use.
    pub fn new(chain: LocalChain) -> Self {
        Self {
            inner: Arc::new(Mutex::new(chain)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the receipt poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run `f` against the current chain state.
    pub async fn read<R>(&self, f: impl FnOnce(&LocalChain) -> R) -> R {
        let chain = self.inner.lock().await;
        f(&chain)
    }

    /// Run `f` with mutable access, e.g. to mine or use the faucet.
    pub async fn write<R>(&self, f: impl FnOnce(&mut LocalChain) -> R) -> R {
        let mut chain = self.inner.lock().await;
        f(&mut chain)
    }

    /// Queue a transaction.
    ///
    /// # Errors
    ///
    /// - [`ChainError::NonceTooLow`] if the explicit nonce was already mined
    pub async fn submit(&self, tx: Transaction) -> Result<TxHash> {
        self.inner.lock().await.submit(tx)
    }

    /// Wait until `hash` is mined, for at most `timeout`.
    ///
    /// A reverted transaction still yields its receipt; check
    /// [`Receipt::success`].
    ///
    /// # Errors
    ///
    /// - [`ChainError::UnknownTransaction`] if the hash is neither pending nor mined
    /// - [`ChainError::ReceiptTimeout`] if the transaction is still pending at the deadline
    pub async fn wait_for_receipt(&self, hash: TxHash, timeout: Duration) -> Result<Receipt> {
        let poll = async {
            loop {
                {
                    let chain = self.inner.lock().await;
                    if let Some(receipt) = chain.receipt(&hash) {
                        return Ok(receipt.clone());
                    }
                    if !chain.is_pending(&hash) {
                        return Err(ChainError::UnknownTransaction(tx::short_hash(&hash)));
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::ReceiptTimeout(tx::short_hash(&hash))),
        }
    }

    /// Queue a transaction and wait for its receipt.
    ///
    /// # Errors
    ///
    /// Any error of [`submit`](Self::submit) or [`wait_for_receipt`](Self::wait_for_receipt).
    pub async fn submit_and_wait(&self, tx: Transaction, timeout: Duration) -> Result<Receipt> {
        let hash = self.submit(tx).await?;
        self.wait_for_receipt(hash, timeout).await
    }

    /// Mine a block every `interval` until `shutdown` fires.
    pub fn spawn_miner(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "chain: interval miner started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let receipts = handle.write(|c| c.mine_block()).await;
                        if !receipts.is_empty() {
                            debug!(txs = receipts.len(), "chain: miner produced block");
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("chain: interval miner stopped");
                        break;
                    }
                }
            }
        })
    }
}
