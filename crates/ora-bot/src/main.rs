//! ora-bot: runs a development ledger and coordinates oracle nodes on it.
//!
//! Loads `bot.toml`, mines blocks on an interval, stakes the managed nodes,
//! then loops reporting cycles until Ctrl-C or SIGTERM.

use std::time::Duration;

use anyhow::Context;
use ora_bot::accounts::Accounts;
use ora_bot::config::BotConfig;
use ora_bot::cycle::{Coordinator, CycleState};
use ora_bot::price::FixedPrice;
use ora_bot::setup;
use ora_chain::{ChainHandle, LocalChain};
use ora_oracle::OracleParams;
use ora_types::{ora, Price};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = BotConfig::load().context("loading bot config")?;

    // 2. Initialize tracing; RUST_LOG wins over the configured level
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(format!("ora={}", config.logging.level))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        path = %BotConfig::config_path().display(),
        nodes = config.bot.node_count,
        auto_slash = config.bot.auto_slash,
        "ORA bot starting"
    );

    // 3. Development ledger with a funded operator
    let params = OracleParams {
        bucket_window: config.chain.bucket_window,
        ..OracleParams::default()
    };
    let mut chain = LocalChain::new(params)?;
    let accounts = Accounts::dev(config.bot.node_count);
    chain.faucet(
        &accounts.operator,
        ora(u128::from(config.chain.genesis_supply_ora)),
    )?;
    let chain = ChainHandle::new(chain);

    // 4. Shutdown channel and interval miner
    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
    let miner = chain.spawn_miner(
        Duration::from_millis(config.chain.block_interval_ms),
        shutdown_tx.subscribe(),
    );
    spawn_signal_listener(shutdown_tx.clone());

    // 5. Stake every managed node
    let summary = setup::ensure_nodes(
        &chain,
        &accounts,
        config.bot.default_stake(),
        config.bot.receipt_timeout(),
    )
    .await;
    if summary.failed > 0 {
        warn!(failed = summary.failed, "node setup incomplete, continuing");
    }

    // 6. Cycle until shutdown
    let price_source = Box::new(FixedPrice(Price::from(config.bot.initial_price)));
    let mut coordinator = Coordinator::new(chain, accounts, config, price_source);
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut state = CycleState::default();
    loop {
        tokio::select! {
            (next, _) = coordinator.run_cycle(state) => state = next,
            _ = shutdown_rx.recv() => break,
        }

        match BotConfig::load() {
            Ok(fresh) => coordinator.set_config(fresh),
            Err(e) => warn!(error = %e, "config reload failed, keeping previous"),
        }

        tokio::select! {
            _ = tokio::time::sleep(coordinator.config().bot.cycle_interval()) => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    // Graceful shutdown
    info!("ORA bot shutting down");
    let _ = shutdown_tx.send(());
    let _ = miner.await;
    info!("ORA bot stopped");
    Ok(())
}

/// Forward Ctrl-C and SIGTERM to the shutdown channel.
fn spawn_signal_listener(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut term =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "SIGTERM handler unavailable");
                        let _ = tokio::signal::ctrl_c().await;
                        info!("Ctrl-C received, shutting down");
                        let _ = shutdown_tx.send(());
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
                _ = term.recv() => info!("SIGTERM received, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, shutting down");
        }
        let _ = shutdown_tx.send(());
    });
}
