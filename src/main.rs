use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rand::Rng;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::ratelimit::{ClientKey, SlidingWindowLimiter};

/// Drive a sliding-window limiter with simulated client traffic.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Override the per-window quota
    #[arg(long)]
    max_requests: Option<usize>,

    /// Traffic pattern to run
    #[arg(long, value_enum, default_value_t = Scenario::Burst)]
    scenario: Scenario,

    /// How long the `traffic` scenario runs before stopping on its own
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// One client fires more requests than its quota with no delay
    Burst,
    /// Several clients send paced requests concurrently
    Clients,
    /// One client exhausts its quota and waits for the window to slide
    Sliding,
    /// Random repeat and one-shot clients until Ctrl+C or the duration ends
    Traffic,
}

/// Counts of decisions made during a scenario.
#[derive(Debug, Default, Clone, Copy, Serialize)]
struct Tally {
    allowed: u64,
    denied: u64,
}

impl Tally {
    fn record(&mut self, allowed: bool) {
        if allowed {
            self.allowed += 1;
        } else {
            self.denied += 1;
        }
    }

    fn merge(&mut self, other: Tally) {
        self.allowed += other.allowed;
        self.denied += other.denied;
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    scenario: String,
    window_ms: u64,
    max_requests: usize,
    #[serde(flatten)]
    tally: Tally,
    tracked_clients: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_tracing(&config.logging);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &cli.config {
        Some(path) => info!(path = %path.display(), "Loaded configuration"),
        None => info!("Loaded configuration from defaults and environment"),
    }

    let limiter = Arc::new(SlidingWindowLimiter::with_config(&config.rate_limiting)?);

    let tally = match cli.scenario {
        Scenario::Burst => run_burst(&limiter),
        Scenario::Clients => run_clients(&limiter).await?,
        Scenario::Sliding => run_sliding(&limiter).await,
        Scenario::Traffic => {
            run_traffic(&limiter, Duration::from_secs(cli.duration_secs)).await
        }
    };

    let summary = Summary {
        scenario: format!("{:?}", cli.scenario).to_lowercase(),
        window_ms: config.rate_limiting.window_ms,
        max_requests: config.rate_limiting.max_requests,
        tally,
        tracked_clients: limiter.tracked_clients(),
    };

    limiter.close().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!("Turnstile stopped");
    Ok(())
}

/// Load the layered configuration and apply command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<TurnstileConfig> {
    let mut config = TurnstileConfig::load(cli.config.as_deref())?;
    if let Some(window_ms) = cli.window_ms {
        config.rate_limiting.window_ms = window_ms;
    }
    if let Some(max_requests) = cli.max_requests {
        config.rate_limiting.max_requests = max_requests;
    }
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Twice the quota, back to back, from one client.
fn run_burst(limiter: &SlidingWindowLimiter) -> Tally {
    let client = "burst_client";
    let mut tally = Tally::default();

    for i in 1..=limiter.max_requests() * 2 {
        let allowed = limiter.allow(client);
        info!(client = client, request = i, allowed = allowed, "Burst request");
        tally.record(allowed);
    }

    tally
}

/// Three clients, each sending a quota's worth of paced requests in parallel.
async fn run_clients(limiter: &Arc<SlidingWindowLimiter>) -> anyhow::Result<Tally> {
    let pace = limiter.window() / 10;

    let tasks = ["client1", "client2", "client3"].map(|client| {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let mut tally = Tally::default();
            for i in 1..=limiter.max_requests() {
                let allowed = limiter.allow(client);
                info!(client = client, request = i, allowed = allowed, "Client request");
                tally.record(allowed);
                tokio::time::sleep(pace).await;
            }
            tally
        })
    });

    let mut total = Tally::default();
    for result in futures::future::join_all(tasks).await {
        total.merge(result?);
    }
    Ok(total)
}

/// Exhaust the quota, then probe at half and full window.
async fn run_sliding(limiter: &SlidingWindowLimiter) -> Tally {
    let client = "sliding_client";
    let half = limiter.window() / 2;
    let mut tally = Tally::default();

    for _ in 0..limiter.max_requests() {
        tally.record(limiter.allow(client));
    }
    info!(client = client, "Quota consumed");

    tokio::time::sleep(half).await;
    let allowed = limiter.allow(client);
    info!(client = client, allowed = allowed, "Probe after half a window");
    tally.record(allowed);

    tokio::time::sleep(limiter.window() - half).await;
    let allowed = limiter.allow(client);
    info!(client = client, allowed = allowed, "Probe after a full window");
    tally.record(allowed);

    tally
}

/// Mixed traffic: a few chatty clients plus a stream of one-shot visitors.
///
/// The tracked-client count is logged every second; it stays bounded because
/// the reclaimer evicts visitors once their single request ages out.
async fn run_traffic(limiter: &SlidingWindowLimiter, duration: Duration) -> Tally {
    let mut tally = Tally::default();
    let mut one_shot_id: u64 = 0;

    let mut requests = tokio::time::interval(Duration::from_millis(10));
    let mut report = tokio::time::interval(Duration::from_secs(1));

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Traffic duration elapsed");
                break;
            }
            _ = &mut shutdown => break,
            _ = report.tick() => {
                info!(
                    tracked_clients = limiter.tracked_clients(),
                    allowed = tally.allowed,
                    denied = tally.denied,
                    "Traffic progress"
                );
            }
            _ = requests.tick() => {
                let key = {
                    let mut rng = rand::thread_rng();
                    if rng.gen_bool(0.3) {
                        one_shot_id += 1;
                        ClientKey::new(format!("visitor-{}", one_shot_id))
                    } else {
                        let regular: u8 = rng.gen_range(1..=5);
                        let peer: SocketAddr =
                            ([192, 168, 0, regular], 40000 + u16::from(regular)).into();
                        ClientKey::from_request_parts(None, Some(peer))
                    }
                };
                tally.record(limiter.allow(key.as_str()));
            }
        }
    }

    tally
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping traffic");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping traffic");
        }
    }
}
