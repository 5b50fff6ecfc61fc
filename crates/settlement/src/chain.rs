use {
    model::{keccak256, order::Order},
    primitive_types::{H256, U256},
};

pub type TxId = H256;

/// The on-chain side of settlement. The engine treats the chain as an opaque
/// sink: epochs are committed as a Merkle root plus the total claimable
/// amount, matched order pairs are handed over for on-chain execution.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChainSink: Send + Sync {
    async fn commit_epoch(&self, root: H256, total_amount: U256) -> anyhow::Result<TxId>;

    async fn match_orders(
        &self,
        taker_order: Order,
        maker_orders: Vec<Order>,
        taker_fill: U256,
        maker_fills: Vec<U256>,
    ) -> anyhow::Result<TxId>;
}

/// Stand-in sink for deployments without a configured chain endpoint. Every
/// call succeeds with a deterministic pseudo transaction id so the rest of
/// the settlement lifecycle can be exercised end to end.
#[derive(Debug, Default)]
pub struct DryRunChainSink;

#[async_trait::async_trait]
impl ChainSink for DryRunChainSink {
    async fn commit_epoch(&self, root: H256, total_amount: U256) -> anyhow::Result<TxId> {
        let mut buffer = [0u8; 64];
        buffer[..32].copy_from_slice(root.as_bytes());
        total_amount.to_big_endian(&mut buffer[32..]);
        let tx = H256(keccak256(&buffer));
        tracing::info!(?root, %total_amount, ?tx, "dry run epoch commit");
        Ok(tx)
    }

    async fn match_orders(
        &self,
        taker_order: Order,
        maker_orders: Vec<Order>,
        taker_fill: U256,
        _maker_fills: Vec<U256>,
    ) -> anyhow::Result<TxId> {
        let tx = H256(keccak256(&taker_order.struct_hash()));
        tracing::info!(
            makers = maker_orders.len(),
            %taker_fill,
            ?tx,
            "dry run order match"
        );
        Ok(tx)
    }
}
