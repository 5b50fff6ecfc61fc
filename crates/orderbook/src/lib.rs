//! Order service wiring: the validation pipeline in front of the matching
//! engine plus the periodic settlement, liveness and reconciliation tasks.

pub mod arguments;
pub mod orderbook;
pub mod reconciliation;

pub use crate::orderbook::{Accepted, Orderbook, Rejection, RejectionCode};

use {
    crate::{
        arguments::Arguments,
        reconciliation::{LedgerMirrorLookup, Reconciler},
    },
    anyhow::{Context as _, Result},
    clap::Parser as _,
    events::{Broadcaster, EpochData, Event, Liveness},
    ledger::Ledger,
    matching::MatchingEngine,
    model::DomainSeparator,
    risk::RiskEngine,
    settlement::{DryRunChainSink, SettlementBuilder},
    std::{sync::Arc, time::Duration},
    tokio::sync::Notify,
};

pub async fn start(args: impl Iterator<Item = String>) -> Result<()> {
    let args = Arguments::parse_from(args);
    observe::tracing::initialize(&args.log_filter);
    tracing::info!("running order book with validated arguments:\n{}", args);
    run(args).await
}

pub async fn run(args: Arguments) -> Result<()> {
    let domain_separator = DomainSeparator::new(args.chain_id, args.verifying_contract);
    let ledger = Arc::new(Ledger::new());
    let risk = Arc::new(RiskEngine::new(Default::default()));
    let matching = Arc::new(MatchingEngine::new(ledger.clone(), domain_separator));
    let settlement = Arc::new(SettlementBuilder::new(
        settlement::Config {
            batch_size: args.settlement_batch_size,
            retry: settlement::RetryConfig {
                max_retries: args.commit_max_retries,
                base_delay: args.commit_base_delay,
                max_delay: args.commit_max_delay,
            },
        },
        Arc::new(DryRunChainSink),
    ));
    let broadcaster = Arc::new(Broadcaster::new());
    let batch_ready = Arc::new(Notify::new());
    // The service handle is what an API layer (out of scope here) consumes;
    // the periodic tasks below keep the core running regardless.
    let _orderbook = Arc::new(Orderbook::new(
        domain_separator,
        ledger.clone(),
        risk,
        matching,
        settlement.clone(),
        broadcaster.clone(),
        batch_ready.clone(),
    ));

    let sweeper = events::spawn_sweeper(
        broadcaster.clone(),
        Liveness {
            heartbeat_timeout: args.heartbeat_timeout,
            sweep_interval: args.sweep_interval,
        },
    );

    let settlement_task = tokio::spawn(settlement_loop(
        settlement,
        broadcaster,
        batch_ready,
        args.settlement_interval,
    ));

    let reconciler = Reconciler::new(
        ledger.clone(),
        Arc::new(LedgerMirrorLookup(ledger)),
        reconciliation::Config {
            interval: args.reconciliation_interval,
            threshold_ppm: args.reconciliation_threshold_ppm,
            ..Default::default()
        },
    )
    .context("invalid reconciliation configuration")?;
    let reconciliation_task = tokio::spawn(Arc::new(reconciler).run_forever());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    sweeper.stop();
    settlement_task.abort();
    reconciliation_task.abort();
    Ok(())
}

/// Cuts, commits and executes settlement epochs, either on the timer or as
/// soon as the order service signals a full batch.
pub async fn settlement_loop(
    settlement: Arc<SettlementBuilder>,
    broadcaster: Arc<Broadcaster>,
    batch_ready: Arc<Notify>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = batch_ready.notified() => {}
        }
        let batch = match settlement.create_batch() {
            Ok(Some(batch)) => batch,
            Ok(None) => continue,
            Err(err) => {
                tracing::error!(?err, "failed to cut settlement epoch");
                continue;
            }
        };
        let tx = match settlement.commit(batch.epoch_id).await {
            Ok(tx) => tx,
            Err(err) => {
                tracing::error!(epoch = batch.epoch_id, ?err, "epoch commit failed");
                continue;
            }
        };
        broadcaster.publish_settlement(Event::epoch_committed(EpochData {
            epoch_id: batch.epoch_id,
            merkle_root: batch.merkle_root,
            total: batch.total,
            tx,
        }));
        match settlement.execute(batch.epoch_id).await {
            Ok(status) => {
                tracing::info!(epoch = batch.epoch_id, ?status, "epoch executed")
            }
            Err(err) => tracing::error!(epoch = batch.epoch_id, ?err, "epoch execution failed"),
        }
    }
}
