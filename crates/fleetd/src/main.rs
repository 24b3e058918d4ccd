//! fleetd: the FleetGrid daemon.
//!
//! Single binary over the FleetGrid crates:
//! - State store (redb)
//! - Placement strategies
//! - Headroom policy
//! - SDN subnet allocator
//!
//! # Usage
//!
//! ```text
//! fleetd subnet --pool 169.254.0.0/16 --prefix 27 --index 8
//! fleetd place --data-dir /var/lib/fleetgrid --workload web-3
//! fleetd headroom --hosts 3 --containers 25 --target 10
//! fleetd allocate --data-dir /var/lib/fleetgrid --network app-7
//! fleetd run --data-dir /var/lib/fleetgrid --interval-secs 30
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fleetgrid_autoscale::HeadroomPolicy;
use fleetgrid_core::{Cidr, FleetConfig, subnet_at};
use fleetgrid_placement::{
    PlacementStrategy, PredicateRegistry, StrategyChain, host_views, workload_for_placement,
};
use fleetgrid_sdn::{InMemoryProvisioner, SdnProvider};
use fleetgrid_state::StateStore;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetd", about = "FleetGrid daemon")]
struct Cli {
    /// Path to fleet.toml; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the index-th subnet of a pool.
    Subnet {
        #[arg(long, default_value = "169.254.0.0/16")]
        pool: Cidr,

        #[arg(long, default_value = "24")]
        prefix: u8,

        #[arg(long, allow_negative_numbers = true)]
        index: i64,
    },

    /// Print the hosts a workload may be placed on.
    Place {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/fleetgrid")]
        data_dir: PathBuf,

        /// Workload to place.
        #[arg(long)]
        workload: String,
    },

    /// Evaluate the headroom policy for the given counts.
    Headroom {
        #[arg(long)]
        hosts: u32,

        #[arg(long)]
        containers: u32,

        /// Headroom count, overriding the configured target.
        #[arg(long)]
        target: Option<u32>,
    },

    /// Allocate (or look up) the subnet of a network without touching the
    /// data plane. Lists all allocations when no network is given.
    Allocate {
        #[arg(long, default_value = "/var/lib/fleetgrid")]
        data_dir: PathBuf,

        #[arg(long)]
        network: Option<String>,
    },

    /// Watch the store and publish headroom signals until Ctrl-C.
    Run {
        #[arg(long, default_value = "/var/lib/fleetgrid")]
        data_dir: PathBuf,

        /// Recompute interval in seconds.
        #[arg(long, default_value = "30")]
        interval_secs: u64,
    },
}

#[derive(Serialize)]
struct Allocation {
    network_id: String,
    cidr: Cidr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = FleetConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Subnet {
            pool,
            prefix,
            index,
        } => {
            println!("{}", subnet_at(&pool, prefix, index)?);
            Ok(())
        }
        Command::Place { data_dir, workload } => place(&config, &data_dir, &workload),
        Command::Headroom {
            hosts,
            containers,
            target,
        } => headroom(&config, hosts, containers, target),
        Command::Allocate { data_dir, network } => {
            allocate(&config, &data_dir, network.as_deref()).await
        }
        Command::Run {
            data_dir,
            interval_secs,
        } => run(&config, &data_dir, interval_secs).await,
    }
}

fn init_tracing(json: bool) {
    // Logs go to stderr so command output stays parseable.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleetd=debug,fleetgrid=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("fleetgrid.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

fn place(config: &FleetConfig, data_dir: &Path, workload_id: &str) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let registry = Arc::new(PredicateRegistry::with_builtins());
    let chain = StrategyChain::from_config(&config.placement, registry)?;

    let workload = workload_for_placement(&store, workload_id)?;
    let hosts = host_views(&store)?;
    let admitted = chain.filter_hosts(&hosts, &workload)?;
    info!(
        workload = %workload_id,
        candidates = hosts.len(),
        admitted = admitted.len(),
        strategies = ?chain.names(),
        "placement evaluated"
    );

    let ids: Vec<&str> = admitted.iter().map(|h| h.id()).collect();
    println!("{}", serde_json::to_string_pretty(&ids)?);
    Ok(())
}

fn headroom(
    config: &FleetConfig,
    hosts: u32,
    containers: u32,
    target: Option<u32>,
) -> anyhow::Result<()> {
    let mut headroom_config = config.headroom.clone();
    if target.is_some() {
        headroom_config.count = target;
        headroom_config.percent = None;
    }
    let policy = HeadroomPolicy::from_config(&headroom_config, config.placement.max_containers)?;
    let report = policy.evaluate(&policy.snapshot(hosts, containers));
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn allocate(
    config: &FleetConfig,
    data_dir: &Path,
    network_id: Option<&str>,
) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let provider = SdnProvider::new(config.sdn.clone())
        .with_store(store)?
        .with_provisioner(Arc::new(InMemoryProvisioner::new()));

    match network_id {
        Some(id) => {
            let cidr = provider.ensure_network(id).await?;
            let allocation = Allocation {
                network_id: id.to_string(),
                cidr,
            };
            println!("{}", serde_json::to_string_pretty(&allocation)?);
        }
        None => {
            let space = provider.list_managed_network_address_space().await;
            println!("{}", serde_json::to_string_pretty(&space)?);
        }
    }
    Ok(())
}

async fn run(config: &FleetConfig, data_dir: &Path, interval_secs: u64) -> anyhow::Result<()> {
    info!("FleetGrid daemon starting");

    let store = open_store(data_dir)?;
    let policy = HeadroomPolicy::from_config(&config.headroom, config.placement.max_containers)?
        .with_sink(Box::new(|report| {
            Box::pin(async move {
                println!("{}", serde_json::to_string(&report)?);
                anyhow::Ok(())
            })
        }));
    info!(
        max_containers = policy.max_containers(),
        interval = interval_secs,
        "headroom policy initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let headroom_handle = tokio::spawn(async move {
        policy
            .run_polling(
                Duration::from_secs(interval_secs),
                move || Ok((Some(store.host_count()?), Some(store.deployed_count()?))),
                shutdown_rx,
            )
            .await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = headroom_handle.await;

    info!("FleetGrid daemon stopped");
    Ok(())
}
