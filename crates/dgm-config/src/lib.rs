//! Configuration management for dgm.
//!
//! Parses `dgm.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings are applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! These fields support `${VAR}` and `${VAR:-default}`:
//! - `backend.webdriver_url`
//! - `backend.driver_path`

mod expand;

use dgm_pipeline::{DEFAULT_FIT_MARGIN, DEFAULT_LANGUAGE, MAX_JOBS};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "dgm.toml";

/// Accepted `output.on_failure` values.
pub const FAILURE_POLICIES: &[&str] = &["link", "keep-source", "placeholder"];

/// Accepted `backend.browser` values.
pub const BROWSERS: &[&str] = &["chrome", "chromium", "firefox"];

/// CLI settings that override configuration file values.
///
/// Only `Some` fields override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub scale_factor: Option<f64>,
    pub timeout_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub auto_fit: Option<bool>,
    pub jobs: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub sources_dir: Option<PathBuf>,
    pub webdriver_url: Option<String>,
    pub on_failure: Option<String>,
}

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rendering parameters.
    pub render: RenderConfig,
    /// Output locations (paths are relative strings from TOML).
    output: OutputConfigRaw,
    /// Diagram block detection.
    pub extract: ExtractConfig,
    /// Rendering backend (paths are relative strings from TOML).
    backend: BackendConfigRaw,

    /// Resolved output configuration (set after loading).
    #[serde(skip)]
    pub output_resolved: OutputConfig,
    /// Resolved backend configuration (set after loading).
    #[serde(skip)]
    pub backend_resolved: BackendConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Rendering parameters.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Viewport width in CSS pixels.
    pub width: u32,
    /// Viewport height in CSS pixels.
    pub height: u32,
    /// Device pixel ratio.
    pub scale_factor: f64,
    /// Per-diagram readiness timeout.
    pub timeout_ms: u64,
    /// Extra delay before the layout stability check.
    pub fixed_settle_delay_ms: u64,
    /// Size the capture to the diagram instead of the viewport.
    pub auto_fit: bool,
    /// Margin added around auto-fitted diagrams.
    pub fit_margin: u32,
    /// Concurrent render sessions.
    pub jobs: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            scale_factor: 1.0,
            timeout_ms: 10_000,
            fixed_settle_delay_ms: 0,
            auto_fit: false,
            fit_margin: DEFAULT_FIT_MARGIN,
            jobs: 1,
        }
    }
}

/// Raw output configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OutputConfigRaw {
    dir: Option<String>,
    sources_dir: Option<String>,
    link_base: Option<String>,
    on_failure: Option<String>,
}

/// Resolved output configuration with absolute paths.
#[derive(Debug)]
pub struct OutputConfig {
    /// Image directory. `None` means `images/` next to the document.
    pub dir: Option<PathBuf>,
    /// Where extracted sources are persisted. `None` disables persistence.
    pub sources_dir: Option<PathBuf>,
    /// Link prefix for image references. `None` derives it from the paths.
    pub link_base: Option<String>,
    /// Rewrite policy for failed diagrams.
    pub on_failure: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            sources_dir: None,
            link_base: None,
            on_failure: "link".to_owned(),
        }
    }
}

/// Diagram block detection.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Fence info string identifying diagram blocks.
    pub language: String,
    /// Suffix unit ids with a hash of the diagram source.
    pub content_ids: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_owned(),
            content_ids: false,
        }
    }
}

/// Raw backend configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BackendConfigRaw {
    webdriver_url: Option<String>,
    driver_path: Option<String>,
    browser: Option<String>,
    browser_args: Vec<String>,
    library_url: Option<String>,
}

/// Resolved backend configuration.
#[derive(Debug)]
pub struct BackendConfig {
    /// WebDriver server URL.
    pub webdriver_url: String,
    /// Driver executable to start when no server answers.
    pub driver_path: Option<PathBuf>,
    /// Browser name.
    pub browser: String,
    /// Extra browser command-line arguments.
    pub browser_args: Vec<String>,
    /// Diagram library script URL. `None` uses the pinned default.
    pub library_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:9515".to_owned(),
            driver_path: None,
            browser: "chrome".to_owned(),
            browser_args: Vec::new(),
            library_url: None,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`backend.webdriver_url`").
        field: String,
        /// Error message (e.g., "${`GRID_URL`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn require_one_of(value: &str, allowed: &[&str], field: &str) -> Result<(), ConfigError> {
    if !allowed.contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{field} must be one of {} (got \"{value}\")",
            allowed.join(", ")
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `dgm.toml` in current directory and parents.
    /// CLI settings take precedence over file values; the merged result is
    /// validated.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        let render = &mut self.render;
        if let Some(width) = settings.width {
            render.width = width;
        }
        if let Some(height) = settings.height {
            render.height = height;
        }
        if let Some(scale_factor) = settings.scale_factor {
            render.scale_factor = scale_factor;
        }
        if let Some(timeout_ms) = settings.timeout_ms {
            render.timeout_ms = timeout_ms;
        }
        if let Some(settle_ms) = settings.settle_ms {
            render.fixed_settle_delay_ms = settle_ms;
        }
        if let Some(auto_fit) = settings.auto_fit {
            render.auto_fit = auto_fit;
        }
        if let Some(jobs) = settings.jobs {
            render.jobs = jobs;
        }
        if let Some(dir) = &settings.output_dir {
            self.output_resolved.dir = Some(dir.clone());
        }
        if let Some(dir) = &settings.sources_dir {
            self.output_resolved.sources_dir = Some(dir.clone());
        }
        if let Some(policy) = &settings.on_failure {
            self.output_resolved.on_failure.clone_from(policy);
        }
        if let Some(url) = &settings.webdriver_url {
            self.backend_resolved.webdriver_url.clone_from(url);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve(config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Expand environment variables and resolve paths against `config_dir`.
    fn resolve(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        let resolve = |path: Option<&String>| path.map(|p| config_dir.join(p));

        self.output_resolved = OutputConfig {
            dir: resolve(self.output.dir.as_ref()),
            sources_dir: resolve(self.output.sources_dir.as_ref()),
            link_base: self.output.link_base.clone(),
            on_failure: self
                .output
                .on_failure
                .clone()
                .unwrap_or_else(|| OutputConfig::default().on_failure),
        };

        let defaults = BackendConfig::default();
        let webdriver_url =
            expand::expand_opt(self.backend.webdriver_url.as_deref(), "backend.webdriver_url")?;
        let driver_path =
            expand::expand_opt(self.backend.driver_path.as_deref(), "backend.driver_path")?;
        self.backend_resolved = BackendConfig {
            webdriver_url: webdriver_url.unwrap_or(defaults.webdriver_url),
            driver_path: driver_path.map(|p| config_dir.join(p)),
            browser: self.backend.browser.clone().unwrap_or(defaults.browser),
            browser_args: self.backend.browser_args.clone(),
            library_url: self.backend.library_url.clone(),
        };

        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_render()?;
        self.validate_extract()?;
        self.validate_output()?;
        self.validate_backend()?;
        Ok(())
    }

    fn validate_render(&self) -> Result<(), ConfigError> {
        let render = &self.render;
        if render.width == 0 || render.height == 0 {
            return Err(ConfigError::Validation(format!(
                "render.width and render.height must be greater than 0 (got {}x{})",
                render.width, render.height
            )));
        }
        if !render.scale_factor.is_finite() || render.scale_factor < 1.0 {
            return Err(ConfigError::Validation(format!(
                "render.scale_factor must be at least 1 (got {})",
                render.scale_factor
            )));
        }
        if render.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "render.timeout_ms must be greater than 0".to_owned(),
            ));
        }
        if render.jobs == 0 || render.jobs > MAX_JOBS {
            return Err(ConfigError::Validation(format!(
                "render.jobs must be between 1 and {MAX_JOBS} (got {})",
                render.jobs
            )));
        }
        Ok(())
    }

    fn validate_extract(&self) -> Result<(), ConfigError> {
        let language = &self.extract.language;
        require_non_empty(language, "extract.language")?;
        if language.chars().any(|c| c.is_whitespace() || c == '`') {
            return Err(ConfigError::Validation(
                "extract.language cannot contain whitespace or backticks".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_output(&self) -> Result<(), ConfigError> {
        require_one_of(
            &self.output_resolved.on_failure,
            FAILURE_POLICIES,
            "output.on_failure",
        )
    }

    fn validate_backend(&self) -> Result<(), ConfigError> {
        let backend = &self.backend_resolved;
        require_non_empty(&backend.webdriver_url, "backend.webdriver_url")?;
        require_http_url(&backend.webdriver_url, "backend.webdriver_url")?;
        require_one_of(&backend.browser, BROWSERS, "backend.browser")?;
        if let Some(url) = &backend.library_url {
            require_http_url(url, "backend.library_url")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(toml: &str) -> Config {
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve(Path::new("/project")).unwrap();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.render.width, 800);
        assert_eq!(config.render.height, 600);
        assert_eq!(config.render.scale_factor, 1.0);
        assert_eq!(config.render.timeout_ms, 10_000);
        assert_eq!(config.render.jobs, 1);
        assert!(!config.render.auto_fit);
        assert_eq!(config.extract.language, "mermaid");
        assert_eq!(config.output_resolved.dir, None);
        assert_eq!(config.output_resolved.on_failure, "link");
        assert_eq!(config.backend_resolved.webdriver_url, "http://127.0.0.1:9515");
        assert_eq!(config.backend_resolved.browser, "chrome");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = parse("");

        assert_eq!(config.render.width, 800);
        assert_eq!(config.output_resolved.sources_dir, None);
        assert_eq!(config.backend_resolved.driver_path, None);
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"
[render]
width = 1200
height = 900
scale_factor = 2.0
timeout_ms = 5000
fixed_settle_delay_ms = 250
auto_fit = true
fit_margin = 16
jobs = 4

[output]
dir = "build/images"
sources_dir = "build/mermaid"
link_base = "/assets/diagrams"
on_failure = "placeholder"

[extract]
language = "mmd"
content_ids = true

[backend]
webdriver_url = "http://127.0.0.1:4444"
driver_path = "tools/chromedriver"
browser = "firefox"
browser_args = ["--no-sandbox"]
library_url = "https://cdn.example.com/mermaid.min.js"
"#,
        );

        assert_eq!(config.render.width, 1200);
        assert_eq!(config.render.scale_factor, 2.0);
        assert_eq!(config.render.fixed_settle_delay_ms, 250);
        assert!(config.render.auto_fit);
        assert_eq!(config.render.fit_margin, 16);
        assert_eq!(config.render.jobs, 4);
        assert_eq!(
            config.output_resolved.dir,
            Some(PathBuf::from("/project/build/images"))
        );
        assert_eq!(
            config.output_resolved.sources_dir,
            Some(PathBuf::from("/project/build/mermaid"))
        );
        assert_eq!(
            config.output_resolved.link_base.as_deref(),
            Some("/assets/diagrams")
        );
        assert_eq!(config.output_resolved.on_failure, "placeholder");
        assert_eq!(config.extract.language, "mmd");
        assert!(config.extract.content_ids);
        assert_eq!(
            config.backend_resolved.driver_path,
            Some(PathBuf::from("/project/tools/chromedriver"))
        );
        assert_eq!(config.backend_resolved.browser, "firefox");
        assert_eq!(config.backend_resolved.browser_args, vec!["--no-sandbox"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_expansion_in_backend() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("DGM_TEST_CFG_GRID", "http://grid:4444");
        }
        let config = parse("[backend]\nwebdriver_url = \"${DGM_TEST_CFG_GRID}\"\n");
        assert_eq!(config.backend_resolved.webdriver_url, "http://grid:4444");
        unsafe {
            std::env::remove_var("DGM_TEST_CFG_GRID");
        }
    }

    #[test]
    fn test_env_expansion_missing_var() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("DGM_TEST_CFG_NO_DRIVER");
        }
        let mut config: Config =
            toml::from_str("[backend]\ndriver_path = \"${DGM_TEST_CFG_NO_DRIVER}\"\n").unwrap();

        let err = config.resolve(Path::new("/project")).unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { ref field, .. } if field == "backend.driver_path"));
    }

    #[test]
    fn test_cli_settings_override() {
        let mut config = parse("[render]\nwidth = 1200\njobs = 2\n");
        let settings = CliSettings {
            width: Some(640),
            jobs: Some(6),
            auto_fit: Some(true),
            output_dir: Some(PathBuf::from("out")),
            webdriver_url: Some("http://localhost:4444".to_owned()),
            on_failure: Some("keep-source".to_owned()),
            ..CliSettings::default()
        };

        config.apply_cli_settings(&settings);

        assert_eq!(config.render.width, 640);
        assert_eq!(config.render.height, 600);
        assert_eq!(config.render.jobs, 6);
        assert!(config.render.auto_fit);
        assert_eq!(config.output_resolved.dir, Some(PathBuf::from("out")));
        assert_eq!(config.output_resolved.on_failure, "keep-source");
        assert_eq!(config.backend_resolved.webdriver_url, "http://localhost:4444");
    }

    #[test]
    fn test_validate_rejects_zero_size() {
        let config = parse("[render]\nwidth = 0\n");

        let err = config.validate().unwrap_err();

        assert!(err.to_string().contains("render.width"));
    }

    #[test]
    fn test_validate_rejects_small_scale() {
        let config = parse("[render]\nscale_factor = 0.5\n");

        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_jobs_bounds() {
        assert!(parse("[render]\njobs = 0\n").validate().is_err());
        let at_limit = format!("[render]\njobs = {MAX_JOBS}\n");
        assert!(parse(&at_limit).validate().is_ok());
        let over_limit = format!("[render]\njobs = {}\n", MAX_JOBS + 1);
        assert!(parse(&over_limit).validate().is_err());
    }

    #[test]
    fn test_validate_on_failure() {
        let err = parse("[output]\non_failure = \"ignore\"\n")
            .validate()
            .unwrap_err();

        assert!(err.to_string().contains("link, keep-source, placeholder"));
    }

    #[test]
    fn test_validate_backend() {
        assert!(
            parse("[backend]\nwebdriver_url = \"127.0.0.1:9515\"\n")
                .validate()
                .is_err()
        );
        assert!(parse("[backend]\nbrowser = \"safari\"\n").validate().is_err());
        assert!(
            parse("[backend]\nlibrary_url = \"mermaid.js\"\n")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_language() {
        assert!(parse("[extract]\nlanguage = \"\"\n").validate().is_err());
        assert!(
            parse("[extract]\nlanguage = \"mer maid\"\n")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dgm.toml");
        std::fs::write(&path, "[output]\ndir = \"images\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.config_path, Some(path));
        assert_eq!(config.output_resolved.dir, Some(temp.path().join("images")));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/dgm.toml")), None).unwrap_err();

        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dgm.toml");
        std::fs::write(&path, "[render\nwidth = ").unwrap();

        let err = Config::load(Some(&path), None).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_validates_cli_overrides() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dgm.toml");
        std::fs::write(&path, "").unwrap();
        let settings = CliSettings {
            jobs: Some(32),
            ..CliSettings::default()
        };

        let err = Config::load(Some(&path), Some(&settings)).unwrap_err();

        assert!(err.to_string().contains("render.jobs"));
    }
}
