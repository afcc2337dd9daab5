use anyhow::Context;
use bo_service::{serve_connection, GridRefinementConfig, GridRefinementService};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Parse `low:high` pairs separated by commas, e.g. `0:1,-5:10`.
fn parse_bounds(raw: &str) -> anyhow::Result<Vec<(f64, f64)>> {
    raw.split(',')
        .map(|pair| -> anyhow::Result<(f64, f64)> {
            let (low, high) = pair
                .split_once(':')
                .with_context(|| format!("bound {pair:?} is not low:high"))?;
            Ok((low.trim().parse()?, high.trim().parse()?))
        })
        .collect()
}

fn config_from_env() -> anyhow::Result<GridRefinementConfig> {
    let mut config = GridRefinementConfig::default();
    if let Ok(raw) = std::env::var("BO_SANDBOX_BOUNDS") {
        config.bounds = parse_bounds(&raw)?;
    }
    if let Ok(raw) = std::env::var("BO_SANDBOX_POINTS") {
        config.points_per_axis = raw.parse().context("BO_SANDBOX_POINTS")?;
    }
    if let Ok(raw) = std::env::var("BO_SANDBOX_STAGES") {
        config.stages = raw.parse().context("BO_SANDBOX_STAGES")?;
    }
    if let Ok(raw) = std::env::var("BO_SANDBOX_MAXIMIZE") {
        config.maximize = raw.parse().context("BO_SANDBOX_MAXIMIZE")?;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("BO_SANDBOX_ADDR").unwrap_or_else(|_| "127.0.0.1:5555".to_string());
    let config = config_from_env()?;

    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, budget = config.budget(), "sandbox optimization service listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        let config = config.clone();

        // Each connection is one optimization run with fresh state.
        tokio::spawn(async move {
            info!(peer = %peer, "run started");
            let mut service = match GridRefinementService::new(config) {
                Ok(service) => service,
                Err(e) => {
                    error!(error = %e, "invalid sandbox configuration");
                    return;
                }
            };
            if let Err(e) = serve_connection(socket, &mut service).await {
                error!(peer = %peer, error = %e, "connection failed");
            }
        });
    }
}
