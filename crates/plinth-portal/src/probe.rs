use std::time::Duration;

use tokio::net::TcpStream;

use crate::forward::ProxyTarget;

// Per-attempt TCP connect deadline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: 15,
            delay: Duration::from_secs(2),
        }
    }
}

// Advisory: the caller treats `false` as a warning, never a startup failure.
pub async fn wait_for_backend(target: &ProxyTarget, settings: ProbeSettings) -> bool {
    for attempt in 1..=settings.attempts {
        let connect = TcpStream::connect((target.host.as_str(), target.port));
        match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(stream)) => {
                drop(stream);
                tracing::info!(attempt, %target, "backend reachable");
                return true;
            }
            Ok(Err(err)) => {
                tracing::debug!(attempt, %target, error = %err, "backend connect failed");
            }
            Err(_) => {
                tracing::debug!(attempt, %target, "backend connect timed out");
            }
        }
        if attempt < settings.attempts {
            tokio::time::sleep(settings.delay).await;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_for(addr: std::net::SocketAddr) -> ProxyTarget {
        ProxyTarget {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }

    #[tokio::test]
    async fn listening_backend_is_found_on_first_attempt() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = target_for(listener.local_addr().unwrap());

        let settings = ProbeSettings {
            attempts: 3,
            delay: Duration::from_millis(10),
        };
        assert!(wait_for_backend(&target, settings).await);
    }

    #[tokio::test]
    async fn attempts_exhaust_against_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = target_for(listener.local_addr().unwrap());
        drop(listener);

        let settings = ProbeSettings {
            attempts: 2,
            delay: Duration::from_millis(10),
        };
        assert!(!wait_for_backend(&target, settings).await);
    }
}
