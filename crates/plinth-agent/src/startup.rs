use std::path::PathBuf;

use tokio::process::Command;

// Both fields are best-effort observations, never errors.
#[derive(Debug, Clone, Copy)]
pub struct ReloadReport {
    pub reload_sent: bool,
    pub service_active: bool,
}

// The long-lived display command is owned by its own supervisor, which
// records its PID in a well-known file. This only signals it.
pub struct StartupController {
    pid_file: PathBuf,
    unit: String,
}

impl StartupController {
    pub fn new(pid_file: PathBuf, unit: String) -> Self {
        Self { pid_file, unit }
    }

    pub async fn reload(&self) -> ReloadReport {
        let reload_sent = match self.read_pid().await {
            Some(pid) => {
                let rc = unsafe { libc::kill(pid, libc::SIGHUP) };
                if rc == -1 {
                    let err = std::io::Error::last_os_error();
                    tracing::warn!(pid, error = %err, "reload signal failed");
                    false
                } else {
                    tracing::info!(pid, "reload signal sent");
                    true
                }
            }
            None => false,
        };

        ReloadReport {
            reload_sent,
            service_active: self.service_active().await,
        }
    }

    async fn read_pid(&self) -> Option<i32> {
        let raw = match tokio::fs::read_to_string(&self.pid_file).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(path = %self.pid_file.display(), error = %err, "pid file not readable");
                return None;
            }
        };
        match raw.trim().parse::<i32>() {
            // Zero and negatives would address groups, not the one process.
            Ok(pid) if pid > 0 => Some(pid),
            _ => {
                tracing::warn!(path = %self.pid_file.display(), "pid file contents invalid");
                None
            }
        }
    }

    // A missing systemctl (containers, tests) reads as inactive.
    async fn service_active(&self) -> bool {
        let result = Command::new("systemctl")
            .arg("is-active")
            .arg("--quiet")
            .arg(&self.unit)
            .status()
            .await;
        match result {
            Ok(status) => status.success(),
            Err(err) => {
                tracing::debug!(unit = %self.unit, error = %err, "systemctl not available");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_with(pid_file: PathBuf) -> StartupController {
        StartupController::new(pid_file, "plinth-test-no-such-unit.service".to_string())
    }

    #[tokio::test]
    async fn missing_pid_file_reports_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(dir.path().join("absent.pid"));
        let report = controller.reload().await;
        assert!(!report.reload_sent);
    }

    #[tokio::test]
    async fn garbage_pid_file_reports_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("display.pid");
        std::fs::write(&pid_file, "not-a-pid\n").unwrap();
        let controller = controller_with(pid_file);
        assert!(!controller.reload().await.reload_sent);
    }

    #[tokio::test]
    async fn live_pid_gets_the_signal() {
        // A child of ours we are allowed to signal; SIGHUP ends it.
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("display.pid");
        std::fs::write(&pid_file, format!("{pid}\n")).unwrap();

        let controller = controller_with(pid_file);
        let report = controller.reload().await;
        assert!(report.reload_sent);

        let _ = child.wait().await;
    }
}
