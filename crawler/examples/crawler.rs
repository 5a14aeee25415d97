//! Example of using the dht-peers crawler against a simulated overlay.
//!
//! The overlay is a random graph held in memory. Some of its peers are stale
//! and fail resolution, some refuse connections, and some are in dial backoff
//! for a while, which exercises every path of the crawler.

use clap::Parser;
use dht_peers_crawler::{
    CrawlerBuilder, Dht, DhtError, DialError, Host, LookupFailurePolicy, PeerAddressInfo, PeerId,
};
use log::LevelFilter;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of peers in the simulated overlay.
    #[arg(short, long, default_value = "200")]
    nodes: usize,

    /// Connections each simulated peer reports.
    #[arg(short, long, default_value = "4")]
    fanout: usize,

    /// Number of connection workers.
    #[arg(short, long, default_value = "16")]
    workers: usize,

    /// Anchor rounds to run, runs until Ctrl-C if omitted.
    #[arg(short, long)]
    rounds: Option<usize>,

    /// Upper bound of the random delay before each dial, in milliseconds.
    #[arg(short = 'j', long, default_value = "2000")]
    max_jitter_ms: u64,

    /// Stop the crawl on the first failed closest peers lookup.
    #[arg(long)]
    strict: bool,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// A simulated peer.
struct Node {
    info: PeerAddressInfo,
    /// Stale DHT entry, resolution fails.
    stale: bool,
    /// Dials are refused.
    unreachable: bool,
    neighbours: Vec<PeerId>,
}

/// In-memory overlay acting as both the DHT and the network host.
struct Overlay {
    nodes: HashMap<PeerId, Node>,
    ids: Vec<PeerId>,
    /// Remaining backoff answers per peer.
    backoff: Mutex<HashMap<PeerId, u32>>,
    connected: Mutex<HashMap<PeerId, usize>>,
}

impl Overlay {
    fn generate(size: usize, fanout: usize) -> Self {
        let mut rng = rand::thread_rng();
        let ids: Vec<PeerId> = (0..size)
            .map(|_| PeerId::from_bytes(rng.gen::<[u8; 32]>().to_vec()))
            .collect();

        let mut nodes = HashMap::new();
        let mut backoff = HashMap::new();
        for (i, id) in ids.iter().enumerate() {
            let address = SocketAddr::new(
                Ipv4Addr::new(10, (i >> 16) as u8, (i >> 8) as u8, i as u8).into(),
                4001,
            );
            let neighbours = ids
                .choose_multiple(&mut rng, fanout)
                .filter(|n| *n != id)
                .cloned()
                .collect();
            if rng.gen_bool(0.1) {
                backoff.insert(id.clone(), rng.gen_range(1..4));
            }
            nodes.insert(
                id.clone(),
                Node {
                    info: PeerAddressInfo::new(id.clone()).with_addresses(vec![address]),
                    stale: rng.gen_bool(0.1),
                    unreachable: rng.gen_bool(0.2),
                    neighbours,
                },
            );
        }

        Overlay {
            nodes,
            ids,
            backoff: Mutex::new(backoff),
            connected: Mutex::new(HashMap::new()),
        }
    }

    async fn network_delay() {
        let millis = rand::thread_rng().gen_range(5..50);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

impl Dht for Overlay {
    async fn closest_peers(&self, _key: &str) -> Result<Vec<PeerId>, DhtError> {
        Self::network_delay().await;
        let closest = self
            .ids
            .choose_multiple(&mut rand::thread_rng(), 20)
            .cloned()
            .collect();
        Ok(closest)
    }

    async fn resolve_peer(&self, id: &PeerId) -> Result<PeerAddressInfo, DhtError> {
        Self::network_delay().await;
        match self.nodes.get(id) {
            Some(node) if !node.stale => Ok(node.info.clone()),
            _ => Err(DhtError::NotFound),
        }
    }

    async fn peers_connected_to(&self, id: &PeerId) -> Result<Vec<PeerAddressInfo>, DhtError> {
        Self::network_delay().await;
        let node = self.nodes.get(id).ok_or(DhtError::NotFound)?;
        Ok(node
            .neighbours
            .iter()
            .filter_map(|n| self.nodes.get(n))
            .map(|n| n.info.clone())
            .collect())
    }
}

impl Host for Overlay {
    async fn connect(&self, info: &PeerAddressInfo) -> Result<(), DialError> {
        Self::network_delay().await;
        if let Some(remaining) = self.backoff.lock().unwrap().get_mut(&info.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DialError::Backoff);
            }
        }
        match self.nodes.get(&info.id) {
            Some(node) if !node.unreachable => {
                self.connected.lock().unwrap().insert(info.id.clone(), 1);
                Ok(())
            }
            Some(_) => Err(DialError::Refused("connection refused".to_string())),
            None => Err(DialError::NoAddresses),
        }
    }

    fn live_connections_to(&self, id: &PeerId) -> usize {
        self.connected.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    // Configure fern logger
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()
        .unwrap();

    log::info!("CRAWLING A SIMULATED OVERLAY");

    let overlay = Overlay::generate(args.nodes, args.fanout);
    log::debug!(
        "Generated overlay with {} peers and fanout {}",
        args.nodes,
        args.fanout
    );

    let mut builder = CrawlerBuilder::new()
        .with_workers(args.workers)?
        .with_max_dial_jitter(Duration::from_millis(args.max_jitter_ms))
        .with_round_delay(Duration::from_secs(1))
        .with_backoff(6, Duration::from_millis(100), Duration::from_millis(500))
        .with_status_interval(Duration::from_secs(5));
    if let Some(rounds) = args.rounds {
        builder = builder.with_max_rounds(rounds);
    }
    if args.strict {
        builder = builder.with_lookup_failure_policy(LookupFailurePolicy::Abort);
    }

    // The overlay serves as both the DHT and the host.
    let overlay = std::sync::Arc::new(overlay);
    let crawler = builder.build(SharedOverlay(overlay.clone()), SharedOverlay(overlay));
    let mut handle = crawler.crawl();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut count = 0;
    loop {
        tokio::select! {
            peer = handle.recv() => match peer {
                Some(peer) => {
                    count += 1;
                    log::info!("Connected Peer: {peer}");
                }
                None => break,
            },
            _ = &mut ctrl_c => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let stats = handle.stats();
    handle.shutdown();
    handle.join().await?;

    log::info!("Discovered {count} peers: {stats}");
    Ok(())
}

/// Shares one [`Overlay`] between the crawler's DHT and host slots.
struct SharedOverlay(std::sync::Arc<Overlay>);

impl Dht for SharedOverlay {
    async fn closest_peers(&self, key: &str) -> Result<Vec<PeerId>, DhtError> {
        self.0.closest_peers(key).await
    }

    async fn resolve_peer(&self, id: &PeerId) -> Result<PeerAddressInfo, DhtError> {
        self.0.resolve_peer(id).await
    }

    async fn peers_connected_to(&self, id: &PeerId) -> Result<Vec<PeerAddressInfo>, DhtError> {
        self.0.peers_connected_to(id).await
    }
}

impl Host for SharedOverlay {
    async fn connect(&self, info: &PeerAddressInfo) -> Result<(), DialError> {
        self.0.connect(info).await
    }

    fn live_connections_to(&self, id: &PeerId) -> usize {
        self.0.live_connections_to(id)
    }
}
