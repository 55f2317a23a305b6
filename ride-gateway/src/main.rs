//! Ride-hailing backend: boots the ride lifecycle core (state machine + outbox dispatcher) and
//! the driver session engine behind three HTTP/WebSocket listeners.
//!
//! Follows the teacher's split between a thin `main` and a `spawn_tasks`/`TaskGroup` bootstrap:
//! every long-running activity -- each HTTP listener and the outbox dispatcher -- is registered
//! against one shared [`session_task::ShutdownSignal`], and a single `ctrl_c` triggers an orderly
//! wind-down of all of them.

mod api;
mod config;
mod entities;
mod http;
mod listener;
mod state;
mod ws_transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::Router;
use geo_index::{GeoIndex, InMemoryGeoIndex};
use message_bus::Producer;
use message_bus_kafka::KafkaProducer;
use ride_auth::{Authenticator, HmacAuthenticator};
use ride_billing::Biller;
use ride_core::{OutboxDispatcher, RideCore};
use ride_store::Repository;
use ride_store_postgres::PgRepository;
use session_task::TaskGroup;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::Conf;
use crate::entities::EntityTable;
use crate::listener::HttpListener;
use crate::state::AppState;

fn main() -> anyhow::Result<()> {
    let conf = Conf::from_env().context("failed to load configuration")?;
    init_logging(&conf.log_directive);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(run(conf))
}

fn init_logging(directive: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| directive.to_owned().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(conf: Conf) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "ride-gateway starting");

    let repo: Arc<dyn Repository> = PgRepository::connect(&conf.store_dsn)
        .await
        .context("failed to connect to the relational store")?;

    let rides = Arc::new(RideCore::new(repo.clone(), conf.ride_table.clone()));
    rides.bootstrap().await.context("failed to bootstrap ride tables")?;

    let drivers = Arc::new(EntityTable::new(repo.clone(), "drivers"));
    drivers.bootstrap().await.context("failed to bootstrap drivers table")?;

    let passengers = Arc::new(EntityTable::new(repo.clone(), "passengers"));
    passengers.bootstrap().await.context("failed to bootstrap passengers table")?;

    if let Some(addr) = &conf.geo_addr {
        warn!(%addr, "geo.addr is configured but no remote geo-index adapter is implemented (see DESIGN.md); falling back to the in-process index");
    }
    let geo: Arc<dyn GeoIndex> = Arc::new(InMemoryGeoIndex::new());

    let auth: Arc<dyn Authenticator> = Arc::new(HmacAuthenticator::new(conf.auth_secret));
    let biller = Biller::new(conf.biller_base_cost, conf.biller_km_charge);

    let producer: Arc<dyn Producer> =
        Arc::new(KafkaProducer::connect(&conf.bus_brokers).context("failed to connect to the message bus")?);

    let mut tasks = TaskGroup::new();
    let shutdown_signal = tasks.shutdown_signal();

    let dispatcher = OutboxDispatcher::new(
        repo.clone(),
        producer.clone(),
        conf.ride_table,
        conf.driver_topic,
        conf.driver_key,
    )
    .with_sweep_interval(conf.outbox_sweep_interval);
    tasks.register(dispatcher);

    let app_state = Arc::new(AppState {
        rides,
        drivers,
        passengers,
        geo,
        auth,
        biller,
        shutdown_signal: shutdown_signal.clone(),
    });

    let driver_router: Router<Arc<AppState>> = Router::new()
        .merge(api::drivers::router())
        .merge(api::ws::router())
        .layer(TraceLayer::new_for_http());
    let passenger_router: Router<Arc<AppState>> = Router::new()
        .merge(api::passengers::router())
        .layer(TraceLayer::new_for_http());
    let ride_router: Router<Arc<AppState>> = Router::new()
        .merge(api::rides::router())
        .layer(TraceLayer::new_for_http());

    tasks.register(
        HttpListener::bind("driver", &conf.http_addr_driver, driver_router, app_state.clone())
            .await
            .context("failed to start the driver listener")?,
    );
    tasks.register(
        HttpListener::bind("passenger", &conf.http_addr_passenger, passenger_router, app_state.clone())
            .await
            .context("failed to start the passenger listener")?,
    );
    tasks.register(
        HttpListener::bind("ride", &conf.http_addr_ride, ride_router, app_state.clone())
            .await
            .context("failed to start the ride listener")?,
    );

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");

    let shutdown_handle = tasks.shutdown_handle();
    shutdown_handle.signal();

    tokio::select! {
        _ = shutdown_handle.all_closed() => {
            info!("all tasks shut down cleanly");
        }
        _ = tokio::time::sleep(Duration::from_secs(10)) => {
            warn!("some tasks did not shut down within the grace period");
        }
    }

    for outcome in tasks.join_all().await {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(%error, "a task exited with an error"),
            Err(error) => warn!(%error, "a task panicked or was cancelled"),
        }
    }

    repo.close_listener().await;
    producer.close().await;

    Ok(())
}
