//! TCP readiness polling for freshly started services.
//!
//! Databases take a few seconds between container start and accepting
//! connections. The build must not begin before they do, so the runner
//! polls the published port until it connects or the deadline passes.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::error::PipelineError;

/// Delay between connection attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll `host:port` until a TCP connection succeeds. Returns how long the
/// service took to come up.
pub async fn wait_ready(
    service: &str,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<Duration, PipelineError> {
    let start = Instant::now();
    let addr = format!("{host}:{port}");
    loop {
        match TcpStream::connect(addr.as_str()).await {
            Ok(_) => return Ok(start.elapsed()),
            Err(e) => {
                if start.elapsed() >= timeout {
                    tracing::warn!(service, addr = %addr, error = %e, "service never became ready");
                    return Err(PipelineError::ServiceTimeout {
                        service: service.to_string(),
                        secs: timeout.as_secs(),
                    });
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}
