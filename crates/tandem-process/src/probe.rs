//! Active readiness probe
//!
//! Text markers only say the server *claims* to be ready. When enabled, the
//! supervisor confirms the claim by connecting to the advertised address.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use url::{Host, Url};

use tandem_core::prelude::*;

/// Delay between connection attempts
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for a single connection attempt
const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// Resolve `url` to the `(host, port)` pair a client should connect to.
///
/// Wildcard bind addresses (`0.0.0.0`, `::`) are mapped to loopback.
pub fn probe_target(url: &str) -> Result<(String, u16)> {
    let parsed = Url::parse(url).map_err(|e| Error::probe(format!("invalid url '{}': {}", url, e)))?;

    let host = match parsed.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) if addr.is_unspecified() => "127.0.0.1".to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) if addr.is_unspecified() => "::1".to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return Err(Error::probe(format!("url '{}' has no host", url))),
    };

    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| Error::probe(format!("url '{}' has no port", url)))?;

    Ok((host, port))
}

/// Poll until a TCP connection to `url` succeeds or `deadline` elapses.
pub async fn wait_until_accepting(url: &str, deadline: Duration) -> Result<()> {
    let (host, port) = probe_target(url)?;
    let give_up_at = Instant::now() + deadline;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match timeout(ATTEMPT_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => {
                debug!("{}:{} accepting after {} attempt(s)", host, port, attempts);
                return Ok(());
            }
            Ok(Err(e)) => trace!("probe {}:{} attempt {}: {}", host, port, attempts, e),
            Err(_) => trace!("probe {}:{} attempt {} timed out", host, port, attempts),
        }

        if Instant::now() + RETRY_INTERVAL >= give_up_at {
            return Err(Error::probe(format!(
                "{}:{} not accepting connections after {:?}",
                host, port, deadline
            )));
        }
        sleep(RETRY_INTERVAL).await;
    }
}
