//! WebDriver server process management
//!
//! Each engine run spawns its own driver on a fresh local port and kills it
//! when the run ends, so no driver state carries over between engines. On
//! Unix the driver leads its own process group and the whole group is
//! killed, browsers it launched included.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use crate::common::{Error, Result};

use super::client::WebDriverClient;

/// Delay between readiness polls while the driver starts
const READY_POLL: Duration = Duration::from_millis(50);

/// A running WebDriver server
pub struct DriverProcess {
    /// Driver subprocess
    child: Child,
    /// Port the driver listens on
    port: u16,
    /// Executable, for log messages
    path: PathBuf,
}

impl DriverProcess {
    /// Spawn a driver and wait until it accepts sessions
    pub async fn spawn(path: &Path, start_timeout: Duration) -> Result<Self> {
        let port = free_port()?;

        let mut command = std::process::Command::new(path);
        command.arg(format!("--port={}", port));
        let child = isolate(command)
            .spawn()
            .map_err(|e| {
                Error::DriverStartFailed(format!("Failed to start {}: {}", path.display(), e))
            })?;

        let mut driver = Self {
            child,
            port,
            path: path.to_path_buf(),
        };
        tracing::debug!(driver = %path.display(), port, "Spawned WebDriver server");

        if let Err(e) = driver.wait_ready(start_timeout).await {
            driver.stop().await;
            return Err(e);
        }
        Ok(driver)
    }

    /// OS process id, while the driver is running
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Base URL of the driver's HTTP endpoint
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    async fn wait_ready(&mut self, start_timeout: Duration) -> Result<()> {
        let status = WebDriverClient::new(self.base_url())?;
        let deadline = Instant::now() + start_timeout;

        loop {
            if Instant::now() >= deadline {
                return Err(Error::DriverStartTimeout(start_timeout.as_secs()));
            }

            if let Some(status) = self.child.try_wait()? {
                return Err(Error::DriverStartFailed(format!(
                    "{} exited during startup ({})",
                    self.path.display(),
                    status
                )));
            }

            tokio::time::sleep(READY_POLL).await;

            match status.is_ready().await {
                Ok(true) => {
                    tracing::debug!(port = self.port, "WebDriver server ready");
                    return Ok(());
                }
                Ok(false) | Err(_) => continue,
            }
        }
    }

    /// Kill the driver and everything it launched, then reap it
    pub async fn stop(&mut self) {
        self.kill_group();
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Driver {} already gone: {}", self.path.display(), e);
        }
    }
}

impl DriverProcess {
    #[cfg(unix)]
    fn kill_group(&self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        let Ok(pgid) = libc::pid_t::try_from(pid) else {
            return;
        };
        // SAFETY: killpg only sends a signal; the group was created for this driver
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(
                pgid,
                "killpg failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        // Best effort, since we can't await in drop
        self.kill_group();
        let _ = self.child.start_kill();
    }
}

/// Detach stdio, kill on drop, and on Unix start a new process group
fn isolate(mut command: std::process::Command) -> Command {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut command = Command::from(command);
    command.kill_on_drop(true);
    command
}

/// Ask the OS for an unused local port
pub fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Resolve the driver executable
///
/// An explicitly configured path is used as-is when it exists; bare names
/// (configured or default) are looked up on `PATH`.
pub fn resolve_driver(configured: Option<&Path>, default_name: &str) -> Result<PathBuf> {
    let candidate = configured.unwrap_or_else(|| Path::new(default_name));

    if candidate.components().count() > 1 {
        return if candidate.exists() {
            Ok(candidate.to_path_buf())
        } else {
            Err(Error::driver_not_found(
                default_name,
                &[candidate.display().to_string()],
            ))
        };
    }

    which::which(candidate)
        .map_err(|_| Error::driver_not_found(&candidate.display().to_string(), &["PATH"]))
}
