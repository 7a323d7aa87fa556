use std::net::SocketAddr;
use std::time::Duration;

use crate::forward::ProxyTarget;
use crate::probe::ProbeSettings;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub listen: SocketAddr,
    pub target: ProxyTarget,
    pub probe: ProbeSettings,
}

impl PortalConfig {
    // PLINTH_PORTAL_LISTEN (default 0.0.0.0:80), PLINTH_BACKEND_HOST/PORT
    // (default 127.0.0.1:8080), PLINTH_PROBE_ATTEMPTS (default 15),
    // PLINTH_PROBE_DELAY_SECS (default 2). Unset or unparseable values use
    // the default.
    pub fn from_env() -> Self {
        let listen = env_parsed::<SocketAddr>("PLINTH_PORTAL_LISTEN")
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 80)));
        let host =
            env_string("PLINTH_BACKEND_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = env_parsed::<u16>("PLINTH_BACKEND_PORT").unwrap_or(8080);
        let attempts = env_parsed::<u64>("PLINTH_PROBE_ATTEMPTS")
            .map(|v| v.clamp(1, 600) as u32)
            .unwrap_or(15);
        let delay_secs = env_parsed::<u64>("PLINTH_PROBE_DELAY_SECS")
            .map(|v| v.clamp(1, 60))
            .unwrap_or(2);

        Self {
            listen,
            target: ProxyTarget { host, port },
            probe: ProbeSettings {
                attempts,
                delay: Duration::from_secs(delay_secs),
            },
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
