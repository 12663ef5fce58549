//! Transactions and receipts.

use ora_types::{Address, Amount, BlockHeight, BucketNumber, LoggedEvent, Price, TxHash};
use serde::{Deserialize, Serialize};

use crate::ChainError;

/// A state-changing call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    /// ORA transfer from the sender.
    Transfer { to: Address, amount: Amount },
    RegisterNode { stake: Amount },
    AddStake { amount: Amount },
    ExitNode { index: u64 },
    ReportPrice { price: Price },
    RecordBucketMedian { bucket: BucketNumber },
    SlashNode {
        node: Address,
        bucket: BucketNumber,
        report_index: u64,
        registry_index: u64,
    },
    ClaimReward,
}

impl Call {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::RegisterNode { .. } => "registerNode",
            Self::AddStake { .. } => "addStake",
            Self::ExitNode { .. } => "exitNode",
            Self::ReportPrice { .. } => "reportPrice",
            Self::RecordBucketMedian { .. } => "recordBucketMedian",
            Self::SlashNode { .. } => "slashNode",
            Self::ClaimReward => "claimReward",
        }
    }
}

/// A signed-by-assumption call from `from`.
///
/// `nonce: None` lets the ledger assign the sender's next pending nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub nonce: Option<u64>,
    pub call: Call,
}

impl Transaction {
    /// Transaction with a ledger-assigned nonce.
    pub fn new(from: Address, call: Call) -> Self {
        Self {
            from,
            nonce: None,
            call,
        }
    }

    /// Transaction with an explicit nonce.
    pub fn with_nonce(from: Address, nonce: u64, call: Call) -> Self {
        Self {
            from,
            nonce: Some(nonce),
            call,
        }
    }
}

/// Outcome of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub height: BlockHeight,
    pub call: Call,
    /// `None` on success.
    pub error: Option<ChainError>,
    pub events: Vec<LoggedEvent>,
}

impl Receipt {
    /// Whether the call applied.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Deterministic transaction hash.
pub fn tx_hash(from: &Address, nonce: u64, sequence: u64) -> TxHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"ora-tx");
    hasher.update(from.as_bytes());
    hasher.update(&nonce.to_le_bytes());
    hasher.update(&sequence.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Short hex form of a hash for logs.
pub fn short_hash(hash: &TxHash) -> String {
    format!("0x{}", hex::encode(&hash[..6]))
}
