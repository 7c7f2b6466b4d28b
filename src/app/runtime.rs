use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::{cli, config};
use crate::chain::EvmRpcClient;
use crate::core::wheel::shared_wheel;
use crate::core::{FloorBoard, IndexerStatus, Orderbookd};
use crate::indexer::{IndexerSettings, OrderbookIndexer};
use crate::manager::{ManagerSettings, OrderManager};
use crate::queue::PgQueue;
use crate::store::PgOrderStore;
use crate::transport::jsonrpc;

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow!(e))
}

async fn connect_pool(settings: &config::Settings) -> Result<PgPool> {
    let db = &settings.database;
    let statement_timeout_ms = db.statement_timeout_ms;
    PgPoolOptions::new()
        .min_connections(db.min_pool_size)
        .max_connections(db.max_pool_size)
        .acquire_timeout(Duration::from_secs(db.acquire_timeout_seconds))
        .max_lifetime(Duration::from_secs(db.max_lifetime_seconds))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                let stmt = format!("SET statement_timeout = {statement_timeout_ms}");
                sqlx::query(&stmt).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(settings.database_url()?)
        .await
        .context("failed to connect to postgres")
}

fn indexer_settings(settings: &config::Settings) -> Result<IndexerSettings> {
    Ok(IndexerSettings {
        chain: settings.chain.name.clone(),
        chain_id: settings.chain.id,
        index_type: settings.indexer.index_type,
        dex_address: settings.dex_address()?,
        currency_address: settings.currency_address(),
        batch_size: settings.indexer.batch_size,
        confirmation_lag: settings.chain.confirmation_lag(),
        sleep_interval: Duration::from_secs(settings.indexer.sleep_interval_secs),
    })
}

fn manager_settings(settings: &config::Settings) -> ManagerSettings {
    let om = &settings.order_manager;
    ManagerSettings {
        chain: settings.chain.name.clone(),
        project: om.project.clone(),
        exact_floor_price: om.exact_floor_price,
        price_index_max_len: om.price_index_max_len,
        expiry_workers: om.expiry_workers,
        expiry_queue_capacity: om.expiry_queue_capacity,
        floor_sweep_interval: Duration::from_secs(om.floor_sweep_interval_secs),
        floor_retention: Duration::from_secs(om.floor_retention_secs),
        retention_sweep_interval: Duration::from_secs(om.retention_sweep_interval_secs),
        listing_dedup_ttl: Duration::from_secs(om.listing_dedup_ttl_secs),
        poll_interval: Duration::from_millis(om.queue_poll_interval_ms),
    }
}

pub async fn run() -> Result<()> {
    let args = cli::Args::parse();
    let settings = config::Settings::load(&args.config).context("load configuration")?;
    init_tracing(&settings.service.log_level)?;

    info!(chain = %settings.chain.name, "Starting orderbookd");

    let pool = connect_pool(&settings).await?;
    let store = PgOrderStore::new(pool.clone(), &settings.chain.name);
    let queue = PgQueue::new(pool);
    let chain = EvmRpcClient::new(settings.rpc_url()?, settings.chain.rpc_timeout())
        .context("build chain client")?;

    let status = IndexerStatus::default();
    let floors = FloorBoard::default();
    let wheel = shared_wheel();

    let manager = OrderManager::new(
        store.clone(),
        queue.clone(),
        manager_settings(&settings),
        wheel.clone(),
        floors.clone(),
    );
    manager.start().await.context("start order manager")?;

    let indexer = OrderbookIndexer::new(
        chain,
        store,
        queue,
        indexer_settings(&settings)?,
        status.clone(),
    );
    let start_block = indexer
        .load_checkpoint()
        .await
        .context("read indexer checkpoint")?;
    tokio::spawn(indexer.sync_loop(start_block));

    let state = Orderbookd::new(settings.chain.name.clone(), status, floors, wheel);
    let addr: SocketAddr = settings
        .rpc
        .addr
        .parse()
        .with_context(|| format!("invalid rpc.addr {}", settings.rpc.addr))?;
    let handle = jsonrpc::start_rpc(state, addr, &settings.rpc).await?;
    info!("JSON-RPC listening on {addr}");

    let stop_handle = handle.clone();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            jsonrpc::stop_rpc(&stop_handle);
        }
        _ = handle.stopped() => {}
    }

    Ok(())
}
