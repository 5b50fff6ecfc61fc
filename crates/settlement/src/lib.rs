//! Settlement: batching accepted trades into epochs, committing a Merkle
//! root of the net credits on chain and executing the underlying order pairs.

pub mod builder;
pub mod chain;
pub mod merkle;

pub use crate::{
    builder::{BatchStatus, ClaimProof, Config, RetryConfig, SettlementBatch, SettlementBuilder},
    chain::{ChainSink, DryRunChainSink, TxId},
};

use primitive_types::H256;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown epoch {0}")]
    UnknownEpoch(u64),
    #[error("epoch {0} cannot be processed in its current status")]
    InvalidStatus(u64),
    #[error("no signed order stored for {0:?}")]
    MissingOrder(H256),
    #[error("arithmetic overflow while netting settlement deltas")]
    Math,
    #[error(transparent)]
    Merkle(#[from] merkle::Error),
    #[error("chain commit failed after retries: {0}")]
    CommitFailed(#[source] anyhow::Error),
}
