pub mod builders;
pub mod fake_executor;
pub mod job_client;

use std::sync::Once;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use insightdag::engine::TrackerEvent;
use insightdag::types::WorkflowStatus;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Wait until the observer bus reports the workflow entering `status`.
pub async fn wait_for_workflow_status(
    rx: &mut broadcast::Receiver<TrackerEvent>,
    status: WorkflowStatus,
) {
    with_timeout(async {
        loop {
            match rx.recv().await {
                Ok(TrackerEvent::WorkflowStatusChanged { to, .. }) if to == status => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event bus closed before workflow reached {status}")
                }
            }
        }
    })
    .await
}
