//! The local ledger.
//!
//! Height starts at 0 (genesis). Mining a block increments the height and
//! executes the pending pool at the new height. Reads always observe the
//! state after the last mined block.

use std::collections::HashMap;

use ora_oracle::token::{Balances, TokenBank};
use ora_oracle::{CallContext, OracleParams, StakingOracle};
use ora_types::{
    Address, Amount, BlockHeight, BucketNumber, LogPosition, LoggedEvent, NodeInfo, OracleEvent,
    Price, TxHash,
};
use tracing::{debug, trace};

use crate::tx::{self, Call, Receipt, Transaction};
use crate::{ChainError, Result};

/// In-process ledger driving a [`StakingOracle`].
#[derive(Debug)]
pub struct LocalChain {
    oracle: StakingOracle,
    bank: Balances,
    height: BlockHeight,
    nonces: HashMap<Address, u64>,
    pending: Vec<(TxHash, u64, Transaction)>,
    receipts: HashMap<TxHash, Receipt>,
    log: Vec<LoggedEvent>,
    sequence: u64,
    automine: bool,
}

impl LocalChain {
    /// Create a chain at genesis with a fresh oracle.
    ///
    /// # Errors
    ///
    /// - [`ChainError::Oracle`] if `params` do not validate
    pub fn new(params: OracleParams) -> Result<Self> {
        Ok(Self {
            oracle: StakingOracle::new(params)?,
            bank: Balances::new(),
            height: 0,
            nonces: HashMap::new(),
            pending: Vec::new(),
            receipts: HashMap::new(),
            log: Vec::new(),
            sequence: 0,
            automine: false,
        })
    }

    /// Mine a block for every submitted transaction.
    pub fn with_automine(mut self, automine: bool) -> Self {
        self.automine = automine;
        self
    }

    /// Height of the last mined block.
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// The oracle state as of the last mined block.
    pub fn oracle(&self) -> &StakingOracle {
        &self.oracle
    }

    /// Token balances as of the last mined block.
    pub fn balances(&self) -> &Balances {
        &self.bank
    }

    /// Spendable ORA of `who`.
    pub fn balance_of(&self, who: &Address) -> Amount {
        self.bank.balance_of(who)
    }

    /// Development faucet: mint ORA directly, outside any block.
    ///
    /// # Errors
    ///
    /// - [`ChainError::Oracle`] on supply overflow
    pub fn faucet(&mut self, to: &Address, amount: Amount) -> Result<()> {
        self.bank.mint(to, amount)?;
        debug!(%to, amount, "chain: faucet mint");
        Ok(())
    }

    /// Nonce of the sender's next mined transaction.
    pub fn confirmed_nonce(&self, who: &Address) -> u64 {
        self.nonces.get(who).copied().unwrap_or(0)
    }

    /// Nonce a new transaction from `who` should carry, counting pending ones.
    pub fn pending_nonce(&self, who: &Address) -> u64 {
        self.pending
            .iter()
            .filter(|(_, _, t)| t.from == *who)
            .filter_map(|(_, _, t)| t.nonce)
            .map(|n| n + 1)
            .max()
            .unwrap_or(0)
            .max(self.confirmed_nonce(who))
    }

    /// Number of queued transactions.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue a transaction and return its hash.
    ///
    /// # Errors
    ///
    /// - [`ChainError::NonceTooLow`] if the explicit nonce was already mined
    pub fn submit(&mut self, mut tx: Transaction) -> Result<TxHash> {
        let expected = self.confirmed_nonce(&tx.from);
        let nonce = match tx.nonce {
            Some(n) if n < expected => {
                return Err(ChainError::NonceTooLow { expected, got: n });
            }
            Some(n) => n,
            None => self.pending_nonce(&tx.from),
        };
        tx.nonce = Some(nonce);
        self.sequence += 1;
        let hash = tx::tx_hash(&tx.from, nonce, self.sequence);
        trace!(from = %tx.from, nonce, call = tx.call.name(), hash = %tx::short_hash(&hash), "chain: tx queued");
        self.pending.push((hash, nonce, tx));
        if self.automine {
            self.mine_block();
        }
        Ok(hash)
    }

    /// Mine one block containing every executable pending transaction.
    ///
    /// Transactions run in submission order. One whose nonce is ahead of its
    /// sender waits for the gap to fill within the same block, and stays
    /// pending if it never does. One whose nonce is behind fails.
    pub fn mine_block(&mut self) -> Vec<Receipt> {
        self.height += 1;
        let height = self.height;
        let mut receipts = Vec::new();
        let mut log_index: u32 = 0;
        let mut queue = std::mem::take(&mut self.pending);

        loop {
            let mut progressed = false;
            let mut deferred = Vec::new();
            for (hash, nonce, tx) in queue {
                let expected = self.confirmed_nonce(&tx.from);
                if nonce > expected {
                    deferred.push((hash, nonce, tx));
                    continue;
                }
                progressed = true;
                let receipt = if nonce < expected {
                    Receipt {
                        tx_hash: hash,
                        height,
                        call: tx.call,
                        error: Some(ChainError::NonceTooLow {
                            expected,
                            got: nonce,
                        }),
                        events: Vec::new(),
                    }
                } else {
                    self.nonces.insert(tx.from, expected + 1);
                    self.execute(hash, height, tx, &mut log_index)
                };
                self.receipts.insert(hash, receipt.clone());
                receipts.push(receipt);
            }
            if deferred.is_empty() || !progressed {
                self.pending = deferred;
                break;
            }
            queue = deferred;
        }

        debug!(
            height,
            txs = receipts.len(),
            failed = receipts.iter().filter(|r| !r.success()).count(),
            still_pending = self.pending.len(),
            "chain: block mined"
        );
        receipts
    }

    /// Mine `count` blocks.
    pub fn mine_blocks(&mut self, count: u64) {
        for _ in 0..count {
            self.mine_block();
        }
    }

    /// Mine until the next bucket begins.
    pub fn mine_to_next_bucket(&mut self) {
        let clock = self.oracle.params().clock();
        // the next mined block must land at the first height of the next bucket
        let target = clock.bucket_start(clock.bucket_at(self.height) + 1);
        while self.height < target {
            self.mine_block();
        }
    }

    fn execute(
        &mut self,
        hash: TxHash,
        height: BlockHeight,
        tx: Transaction,
        log_index: &mut u32,
    ) -> Receipt {
        let ctx = CallContext::new(tx.from, height);
        let outcome = match &tx.call {
            Call::Transfer { to, amount } => self
                .bank
                .transfer(&tx.from, to, *amount)
                .map(|()| Vec::new()),
            Call::RegisterNode { stake } => self.oracle.register_node(&ctx, &mut self.bank, *stake),
            Call::AddStake { amount } => self.oracle.add_stake(&ctx, &mut self.bank, *amount),
            Call::ExitNode { index } => self.oracle.exit_node(&ctx, &mut self.bank, *index),
            Call::ReportPrice { price } => self.oracle.report_price(&ctx, *price),
            Call::RecordBucketMedian { bucket } => self.oracle.record_bucket_median(&ctx, *bucket),
            Call::SlashNode {
                node,
                bucket,
                report_index,
                registry_index,
            } => self.oracle.slash_node(
                &ctx,
                &mut self.bank,
                *node,
                *bucket,
                *report_index,
                *registry_index,
            ),
            Call::ClaimReward => self.oracle.claim_reward(&ctx, &mut self.bank),
        };

        match outcome {
            Ok(events) => {
                let logged: Vec<LoggedEvent> = events
                    .into_iter()
                    .map(|event| {
                        let position = LogPosition {
                            height,
                            index: *log_index,
                        };
                        *log_index += 1;
                        LoggedEvent { position, event }
                    })
                    .collect();
                self.log.extend(logged.iter().cloned());
                Receipt {
                    tx_hash: hash,
                    height,
                    call: tx.call,
                    error: None,
                    events: logged,
                }
            }
            Err(err) => {
                debug!(from = %tx.from, call = tx.call.name(), error = %err, "chain: call reverted");
                Receipt {
                    tx_hash: hash,
                    height,
                    call: tx.call,
                    error: Some(ChainError::Oracle(err)),
                    events: Vec::new(),
                }
            }
        }
    }

    /// Receipt of a mined transaction.
    pub fn receipt(&self, hash: &TxHash) -> Option<&Receipt> {
        self.receipts.get(hash)
    }

    /// Whether `hash` is still queued.
    pub fn is_pending(&self, hash: &TxHash) -> bool {
        self.pending.iter().any(|(h, _, _)| h == hash)
    }

    /// Every logged event, in ledger order.
    pub fn events(&self) -> &[LoggedEvent] {
        &self.log
    }

    /// Logged events at or after `from`.
    pub fn events_since(&self, from: LogPosition) -> Vec<LoggedEvent> {
        self.log
            .iter()
            .filter(|e| e.position >= from)
            .cloned()
            .collect()
    }

    // -- oracle views at the current height --------------------------------

    /// Bucket at the current height.
    pub fn current_bucket_number(&self) -> BucketNumber {
        self.oracle.current_bucket_number(self.height)
    }

    /// See [`StakingOracle::get_past_price`].
    pub fn get_past_price(&self, bucket: BucketNumber) -> Result<Price> {
        Ok(self.oracle.get_past_price(bucket)?)
    }

    /// See [`StakingOracle::get_latest_price`].
    pub fn get_latest_price(&self) -> Result<Price> {
        Ok(self.oracle.get_latest_price(self.height)?)
    }

    /// See [`StakingOracle::get_effective_stake`].
    pub fn get_effective_stake(&self, node: &Address) -> Amount {
        self.oracle.get_effective_stake(node, self.height)
    }

    /// See [`StakingOracle::get_outlier_nodes`].
    pub fn get_outlier_nodes(&self, bucket: BucketNumber) -> Result<Vec<Address>> {
        Ok(self.oracle.get_outlier_nodes(bucket)?)
    }

    /// See [`StakingOracle::get_slashed_status`].
    pub fn get_slashed_status(&self, node: &Address, bucket: BucketNumber) -> (Price, bool) {
        self.oracle.get_slashed_status(node, bucket)
    }

    /// See [`StakingOracle::get_node_addresses`].
    pub fn get_node_addresses(&self) -> Vec<Address> {
        self.oracle.get_node_addresses()
    }

    /// See [`StakingOracle::get_node_info`].
    pub fn get_node_info(&self, node: &Address) -> NodeInfo {
        self.oracle.get_node_info(node)
    }

    /// `PriceReported` events for `bucket`, in ledger order.
    pub fn price_reports(&self, bucket: BucketNumber) -> Vec<LoggedEvent> {
        self.log
            .iter()
            .filter(|e| matches!(e.event, OracleEvent::PriceReported { bucket: b, .. } if b == bucket))
            .cloned()
            .collect()
    }
}
