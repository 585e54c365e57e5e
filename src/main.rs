use std::sync::Arc;

use tokio::sync::{broadcast, Semaphore};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod backend;
pub mod config;
pub mod dns;
pub mod dnssec;
pub mod error;
pub mod resolver;
pub mod server;

use backend::NamecoinBackend;
use config::ServerConfig;
use dnssec::ZoneKey;
use resolver::QueryResolver;
use server::{run_tcp_server, run_udp_server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    if config.worker_threads > 0 {
        runtime_builder.worker_threads(config.worker_threads);
    }
    let runtime = runtime_builder
        .enable_all()
        .thread_name("mimir-worker")
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mimir=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("mimir starting up");
    info!(
        "configuration: bind={}, zone suffix={}, rpc={}",
        config.bind_addr, config.zone_suffix, config.namecoin_rpc_url
    );

    // key setup: the KSK must exist on disk, the ZSK may be transient
    let ksk = ZoneKey::load(&config.public_key, &config.private_key)?;
    let zsk = if config.zone_public_key.is_empty() {
        info!("no ZSK configured, generating a transient one");
        ZoneKey::generate_zsk()?
    } else {
        ZoneKey::load(&config.zone_public_key, &config.zone_private_key)?
    };

    let backend = Arc::new(NamecoinBackend::new(&config));
    let resolver = Arc::new(QueryResolver::new(backend, ksk, zsk));
    let query_semaphore = Arc::new(Semaphore::new(config.max_concurrent_queries));
    let (shutdown_tx, _) = broadcast::channel(1);

    let udp_task = tokio::spawn(run_udp_server(
        config.clone(),
        resolver.clone(),
        query_semaphore.clone(),
        shutdown_tx.subscribe(),
    ));
    let tcp_task = tokio::spawn(run_tcp_server(
        config.clone(),
        resolver.clone(),
        query_semaphore.clone(),
        shutdown_tx.subscribe(),
    ));

    info!("ready");

    let shutdown_signal = async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    };

    tokio::select! {
        result = udp_task => {
            error!("UDP listener exited: {:?}", result);
        }
        result = tcp_task => {
            error!("TCP listener exited: {:?}", result);
        }
        _ = shutdown_signal => {
            info!("signal received, stopping");
        }
    }

    let _ = shutdown_tx.send(());
    info!("mimir shut down");

    Ok(())
}
