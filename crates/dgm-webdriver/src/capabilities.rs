//! Session capabilities for supported browsers.

use std::time::Duration;

use dgm_pipeline::RenderFidelity;
use serde_json::{Value, json};

/// Browser driven through WebDriver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

impl Browser {
    /// Parse a browser name (`chrome`, `chromium`, `firefox`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Some(Self::Chrome),
            "firefox" => Some(Self::Firefox),
            _ => None,
        }
    }

    /// Name of the driver executable for this browser.
    #[must_use]
    pub fn driver_binary(self) -> &'static str {
        match self {
            Self::Chrome => "chromedriver",
            Self::Firefox => "geckodriver",
        }
    }
}

/// `POST /session` body for a headless browser at `fidelity`.
///
/// `page_load` becomes the session's page load timeout, so a stalled
/// navigation fails inside the driver instead of holding the request open.
pub(crate) fn new_session_body(
    browser: Browser,
    fidelity: &RenderFidelity,
    extra_args: &[String],
    page_load: Duration,
) -> Value {
    let scale = fidelity.scale_factor();
    let mut always_match = match browser {
        Browser::Chrome => {
            let mut args = vec![
                "--headless=new".to_owned(),
                "--disable-gpu".to_owned(),
                "--hide-scrollbars".to_owned(),
                "--allow-file-access-from-files".to_owned(),
                format!("--force-device-scale-factor={scale}"),
                format!("--window-size={},{}", fidelity.width(), fidelity.height()),
            ];
            args.extend(extra_args.iter().cloned());
            json!({
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args },
            })
        }
        Browser::Firefox => {
            let mut args = vec![
                "-headless".to_owned(),
                format!("--width={}", fidelity.width()),
                format!("--height={}", fidelity.height()),
            ];
            args.extend(extra_args.iter().cloned());
            json!({
                "browserName": "firefox",
                "moz:firefoxOptions": {
                    "args": args,
                    "prefs": { "layout.css.devPixelsPerPx": scale.to_string() },
                },
            })
        }
    };

    let page_load_ms = u64::try_from(page_load.as_millis()).unwrap_or(u64::MAX);
    always_match["timeouts"] = json!({ "pageLoad": page_load_ms });

    json!({ "capabilities": { "alwaysMatch": always_match } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_browser_parse() {
        assert_eq!(Browser::parse("chrome"), Some(Browser::Chrome));
        assert_eq!(Browser::parse("Chromium"), Some(Browser::Chrome));
        assert_eq!(Browser::parse("firefox"), Some(Browser::Firefox));
        assert_eq!(Browser::parse("safari"), None);
    }

    #[test]
    fn test_chrome_session_body() {
        let fidelity = RenderFidelity::new(1024, 768, 2.0).unwrap();

        let body = new_session_body(
            Browser::Chrome,
            &fidelity,
            &["--no-sandbox".to_owned()],
            Duration::from_secs(10),
        );

        let caps = &body["capabilities"]["alwaysMatch"];
        assert_eq!(caps["browserName"], "chrome");
        let args: Vec<&str> = caps["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_str().unwrap())
            .collect();
        assert!(args.contains(&"--headless=new"));
        assert!(args.contains(&"--force-device-scale-factor=2"));
        assert!(args.contains(&"--window-size=1024,768"));
        assert_eq!(args.last(), Some(&"--no-sandbox"));
    }

    #[test]
    fn test_firefox_session_body() {
        let fidelity = RenderFidelity::new(800, 600, 1.5).unwrap();

        let body = new_session_body(Browser::Firefox, &fidelity, &[], Duration::from_secs(10));

        let caps = &body["capabilities"]["alwaysMatch"];
        assert_eq!(caps["browserName"], "firefox");
        assert_eq!(caps["moz:firefoxOptions"]["args"][0], "-headless");
        assert_eq!(
            caps["moz:firefoxOptions"]["prefs"]["layout.css.devPixelsPerPx"],
            "1.5"
        );
    }

    #[test]
    fn test_session_body_sets_page_load_timeout() {
        let fidelity = RenderFidelity::default();

        for browser in [Browser::Chrome, Browser::Firefox] {
            let body = new_session_body(browser, &fidelity, &[], Duration::from_millis(2500));

            assert_eq!(body["capabilities"]["alwaysMatch"]["timeouts"]["pageLoad"], 2500);
        }
    }
}
