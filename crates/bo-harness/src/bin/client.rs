use bo_harness::{HarnessConfig, OptimizationLoop};
use bo_service::ServiceSession;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // An optional JSON config path; otherwise BO_* environment variables.
    let config = match std::env::args().nth(1) {
        Some(path) => HarnessConfig::from_file(&path)?,
        None => HarnessConfig::from_env()?,
    };
    let benchmark = config.benchmark()?;
    let criteria = config.criteria()?;

    info!(address = %config.service.address, benchmark = %config.benchmark, "waiting for optimization service");
    let mut session = ServiceSession::open(&config.service).await?;

    let mut harness = OptimizationLoop::new(benchmark, config.loop_options());
    let outcome = harness.run(session.service()).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "failed to close session");
    }

    match outcome.verify(&criteria) {
        Ok(report) => {
            info!(
                best_value = report.best_value,
                best_query = %report.best_query,
                found_at = report.found_at_iteration,
                iterations = report.iterations,
                "converged to known optimum"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, termination = ?outcome.termination, "did not converge");
            Err(e.into())
        }
    }
}
