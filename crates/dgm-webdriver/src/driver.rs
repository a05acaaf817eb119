//! Locally spawned WebDriver server.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use dgm_pipeline::BackendError;

use crate::capabilities::Browser;
use crate::client::WireClient;

/// Environment variable naming the driver executable.
pub const DRIVER_PATH_ENV: &str = "DGM_WEBDRIVER_PATH";

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A driver process owned by the backend. Killed on drop.
pub(crate) struct DriverProcess {
    child: Child,
    path: PathBuf,
}

impl DriverProcess {
    /// Start `path` listening on `port` and wait until it accepts sessions.
    pub(crate) fn spawn(
        path: &Path,
        port: u16,
        client: &WireClient,
        startup_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let child = Command::new(path)
            .arg(format!("--port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                BackendError::unavailable(format!("cannot start {}: {e}", path.display()))
            })?;

        let mut process = Self {
            child,
            path: path.to_path_buf(),
        };
        process.wait_ready(client, startup_timeout)?;
        tracing::info!(driver = %path.display(), port, "Started WebDriver server");
        Ok(process)
    }

    fn wait_ready(&mut self, client: &WireClient, timeout: Duration) -> Result<(), BackendError> {
        let start = Instant::now();
        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(BackendError::unavailable(format!(
                    "{} exited during startup ({status})",
                    self.path.display()
                )));
            }
            if client.is_ready() {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(BackendError::unavailable(format!(
                    "{} not ready after {} ms",
                    self.path.display(),
                    timeout.as_millis()
                )));
            }
            std::thread::sleep(STATUS_POLL_INTERVAL);
        }
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        tracing::debug!(driver = %self.path.display(), "Stopped WebDriver server");
    }
}

/// Locate the driver executable for `browser`.
///
/// Checks the configured path, then [`DRIVER_PATH_ENV`], then `PATH`.
pub(crate) fn find_driver(configured: Option<&Path>, browser: Browser) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.exists().then(|| path.to_path_buf());
    }

    if let Ok(path) = std::env::var(DRIVER_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    which::which(browser.driver_binary()).ok()
}

/// Port of an `http://host:port` URL, if it names a loopback host.
pub(crate) fn local_port(url: &str) -> Option<u16> {
    let authority = url.strip_prefix("http://")?.split('/').next()?;
    let (host, port) = authority.rsplit_once(':')?;
    if !matches!(host, "127.0.0.1" | "localhost" | "[::1]") {
        return None;
    }
    port.parse().ok()
}
