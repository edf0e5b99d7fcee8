use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use twine_core::Identity;
use twine_link::netif;
use twine_link::udp6::{Udp6Config, Udp6Link};
use twine_link::Link;
use twine_node::{Config, NodeError};
use twine_router::{DataCallback, Router};

#[derive(Parser)]
#[command(name = "twine-node", about = "twine overlay mesh node")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/twine/config.toml")]
    config: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config from {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        twine_node::logging::init_json(&config.logging.filter);
    } else {
        twine_node::logging::init(&config.logging.filter);
    }

    if let Err(e) = run(config) {
        tracing::error!("node failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), NodeError> {
    let identity = match &config.node.secret_key {
        Some(secret) => Identity::from_hex(secret)?,
        None => {
            let identity = Identity::generate();
            info!("no secret_key configured, generated a fresh identity");
            identity
        }
    };
    info!(address = %identity.address(), "node identity");

    let on_data: DataCallback = Box::new(|pkt| {
        info!(source = %pkt.source, len = pkt.payload.len(), "datagram received");
    });
    let router = Router::with_interval(
        identity,
        Some(on_data),
        Duration::from_secs(config.node.adv_interval_secs.max(1)),
    );
    router.set_forwarding(config.node.forwarding);

    let mut links: Vec<Arc<Udp6Link>> = Vec::new();
    if config.udp6.enabled {
        let interfaces = netif::enumerate_link_local(&config.udp6.allowed, &config.udp6.ignored)?;
        if interfaces.is_empty() {
            warn!("no usable link-local interfaces found");
        }
        for iface in interfaces {
            let link = Udp6Link::open(Udp6Config::for_interface(&iface, config.udp6.port))?;
            link.start()?;
            info!(link = %link.name(), address = %link.address(), "link up");
            router.link_manager().add_link(link.clone());
            links.push(link);
        }
    }

    router.start();

    // Park until SIGINT/SIGTERM.
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| NodeError::Config(format!("failed to install signal handler: {e}")))?;
    let _ = rx.recv();

    info!("shutting down");
    router.stop();
    for link in &links {
        link.stop();
    }
    Ok(())
}
