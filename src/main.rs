#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Emberchain node entrypoint (systemd-friendly).
//! Loads or creates the wallet, starts the chain and the peer mesh, and
//! keeps the process alive.

use std::sync::Arc;

use emberchain::core::consensus::pow::PowConsensus;
use emberchain::core::economics::incentive::DelayedReward;
use emberchain::core::runtime::blockchain::Blockchain;
use emberchain::core::security::keystore::Wallet;
use emberchain::core::state::storage::FileStorage;
use emberchain::core::types::{ChainSettings, NodeIdentity, P2pSettings};
use emberchain::monitoring::metrics::Metrics;
use emberchain::networking::peer::PeerService;
use emberchain::node::Node;
use tracing::info;
use uuid::Uuid;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let data_dir = env("EMBER_DATA_DIR", "./data");
    let p2p_port: u16 = env_parse("EMBER_P2P_PORT", 7101);
    let seed_peers: Vec<String> = env("EMBER_SEEDS", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let chain = ChainSettings {
        blockchain_name: env("EMBER_NETWORK", "emberchain-main"),
        difficulty: env_parse("EMBER_DIFFICULTY", 3),
        fixed_reward: env_parse("EMBER_REWARD", 50),
        min_entries_per_block: env_parse("EMBER_MIN_ENTRIES", 2),
        storage_path: env("EMBER_STORAGE_PATH", &format!("{data_dir}/chain.db")),
        genesis_timestamp: env_parse("EMBER_GENESIS_TS", 1_700_000_000_000),
        genesis_entries: env("EMBER_GENESIS_ENTRIES", "Genesis Block"),
    };
    let p2p = P2pSettings {
        port: p2p_port,
        seed_peers,
        auto_start: env_parse("EMBER_P2P_AUTOSTART", true),
    };

    let wallet = match Wallet::load_or_create(&data_dir) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("wallet init failed: {e}");
            std::process::exit(1);
        }
    };

    let identity = NodeIdentity {
        id: Uuid::new_v4().to_string(),
        label: env("EMBER_LABEL", "ember-node"),
        ip: env("EMBER_IP", "127.0.0.1"),
        url: format!("ws://{}:{}", env("EMBER_IP", "127.0.0.1"), p2p_port),
        p2p_port,
        web_service_port: env_parse("EMBER_WEB_PORT", 7001),
        owner_address: wallet.public_key_hex(),
    };

    let metrics = Arc::new(Metrics::new().expect("metrics init failed"));
    let storage = Arc::new(FileStorage::new(&chain.storage_path));
    let consensus = Arc::new(PowConsensus::new(
        identity.id.clone(),
        identity.owner_address.clone(),
        chain.difficulty,
    ));
    let incentive = Arc::new(DelayedReward::new(chain.fixed_reward));

    let blockchain = Blockchain::new(chain, consensus, incentive, storage, Arc::clone(&metrics));
    let peers = PeerService::new(identity.clone(), Arc::clone(&blockchain), metrics);
    let node = Node::new(identity, blockchain, peers);

    info!(node = %node.identity().id, data_dir = %data_dir, "emberchain node starting");

    match node.start(&p2p).await {
        Ok(addr) => {
            if let Some(addr) = addr {
                info!(%addr, "mesh up");
            }
        }
        Err(e) => {
            eprintln!("node start failed: {e}");
            std::process::exit(1);
        }
    }

    // Wait forever (or until shutdown signal).
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
