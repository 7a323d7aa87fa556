use std::net::SocketAddr;
use std::path::PathBuf;

use crate::sink;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub listen: SocketAddr,
    pub scratch_dir: PathBuf,
    pub startup_pid_file: PathBuf,
    pub startup_unit: String,
}

impl AgentConfig {
    // PLINTH_AGENT_LISTEN (default 0.0.0.0:8090), PLINTH_SCRATCH_DIR
    // (default <tmp>/plinth-agent), PLINTH_STARTUP_PID_FILE (default
    // /run/plinth/display.pid), PLINTH_STARTUP_UNIT (default
    // plinth-display.service). Unset or unparseable values use the default.
    pub fn from_env() -> Self {
        let listen = env_parsed::<SocketAddr>("PLINTH_AGENT_LISTEN")
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8090)));
        let scratch_dir = env_string("PLINTH_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(sink::default_scratch_dir);
        let startup_pid_file = env_string("PLINTH_STARTUP_PID_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/run/plinth/display.pid"));
        let startup_unit =
            env_string("PLINTH_STARTUP_UNIT").unwrap_or_else(|| "plinth-display.service".to_string());

        Self {
            listen,
            scratch_dir,
            startup_pid_file,
            startup_unit,
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
