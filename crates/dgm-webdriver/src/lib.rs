//! WebDriver rendering backend for dgm.
//!
//! [`WebDriverBackend`] implements [`RenderBackend`] over the W3C WebDriver
//! protocol. Each launched surface is one browser session. When no server
//! answers at the configured loopback URL, the backend starts the browser's
//! driver (`chromedriver`, `geckodriver`) itself and stops it on drop.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dgm_webdriver::{WebDriverBackend, WebDriverConfig};
//!
//! let backend = Arc::new(WebDriverBackend::new(WebDriverConfig::default()));
//! let orchestrator = dgm_pipeline::BatchOrchestrator::new(backend, renderer);
//! ```

mod capabilities;
mod client;
mod driver;
#[cfg(test)]
mod fake;
mod surface;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dgm_pipeline::{BackendError, RenderBackend, RenderFidelity, Surface};

pub use capabilities::Browser;
pub use driver::DRIVER_PATH_ENV;

use client::WireClient;
use driver::DriverProcess;
use surface::WebDriverSurface;

/// Default WebDriver server URL (chromedriver's default port).
pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:9515";

/// WebDriver backend settings.
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Server URL.
    pub url: String,
    pub browser: Browser,
    /// Driver executable to start when no server answers.
    pub driver_path: Option<PathBuf>,
    /// Extra browser command-line arguments.
    pub browser_args: Vec<String>,
    /// Bound on a single WebDriver request.
    pub request_timeout: Duration,
    /// Page load timeout sent with each new session.
    pub page_load_timeout: Duration,
    /// Bound on driver startup.
    pub startup_timeout: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WEBDRIVER_URL.to_owned(),
            browser: Browser::default(),
            driver_path: None,
            browser_args: Vec::new(),
            request_timeout: Duration::from_secs(30),
            page_load_timeout: dgm_pipeline::DEFAULT_TIMEOUT,
            startup_timeout: Duration::from_secs(10),
        }
    }
}

/// Headless browser backend speaking WebDriver.
pub struct WebDriverBackend {
    config: WebDriverConfig,
    client: Arc<WireClient>,
    driver: Mutex<Option<DriverProcess>>,
}

impl WebDriverBackend {
    /// Create a backend. No connection is made until the first launch.
    #[must_use]
    pub fn new(config: WebDriverConfig) -> Self {
        let client = Arc::new(WireClient::new(&config.url, config.request_timeout));
        Self {
            config,
            client,
            driver: Mutex::new(None),
        }
    }

    /// Backend settings.
    #[must_use]
    pub fn config(&self) -> &WebDriverConfig {
        &self.config
    }

    /// Make sure a server answers, starting a local driver if needed.
    fn ensure_server(&self) -> Result<(), BackendError> {
        let mut driver = self
            .driver
            .lock()
            .map_err(|_| BackendError::unavailable("WebDriver state lock poisoned"))?;
        if driver.is_some() || self.client.is_ready() {
            return Ok(());
        }

        // Remote servers report their own errors on session creation.
        let Some(port) = driver::local_port(self.client.base_url()) else {
            return Ok(());
        };

        let binary = self.config.browser.driver_binary();
        let path = driver::find_driver(self.config.driver_path.as_deref(), self.config.browser)
            .ok_or_else(|| {
                BackendError::unavailable(format!(
                    "no WebDriver server at {} and {binary} not found; install it or set backend.driver_path",
                    self.client.base_url()
                ))
            })?;

        *driver = Some(DriverProcess::spawn(
            &path,
            port,
            &self.client,
            self.config.startup_timeout,
        )?);
        Ok(())
    }
}

impl RenderBackend for WebDriverBackend {
    fn launch(&self, fidelity: &RenderFidelity) -> Result<Box<dyn Surface>, BackendError> {
        self.ensure_server()?;
        let body = capabilities::new_session_body(
            self.config.browser,
            fidelity,
            &self.config.browser_args,
            self.config.page_load_timeout,
        );
        let surface = WebDriverSurface::create(Arc::clone(&self.client), &body)?;
        Ok(Box::new(surface))
    }
}
