//! Rendered extraction through a browser
//!
//! Pages that only show their content after script runs are loaded in a
//! WebDriver session. Collapsed sections and "load more" controls are
//! clicked before the final markup is captured and handed to the static
//! HTML extractor.

use crate::config::RenderConfig;
use async_trait::async_trait;
use std::time::Duration;
use thirtyfour::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Pause between two expansion clicks
const CLICK_PAUSE: Duration = Duration::from_millis(250);

/// Errors from the rendering capability
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no rendering backend configured")]
    NotConfigured,

    #[error("browser session failed: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
}

/// Loads a URL in a browser and returns the settled markup
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url) -> Result<String, RenderError>;
}

/// Renderer backed by a WebDriver endpoint (chromedriver, selenium)
pub struct WebDriverRenderer {
    endpoint: String,
    settings: RenderConfig,
    user_agent: String,
}

impl WebDriverRenderer {
    pub fn new(endpoint: impl Into<String>, settings: RenderConfig, user_agent: String) -> Self {
        Self {
            endpoint: endpoint.into(),
            settings,
            user_agent,
        }
    }

    async fn open_session(&self) -> Result<WebDriver, RenderError> {
        let session_err = |e: WebDriverError| RenderError::Session(e.to_string());

        let mut caps = DesiredCapabilities::chrome();
        caps.set_headless().map_err(session_err)?;
        caps.add_chrome_arg("--disable-dev-shm-usage")
            .map_err(session_err)?;
        caps.add_chrome_arg(&format!("--user-agent={}", self.user_agent))
            .map_err(session_err)?;

        let driver = WebDriver::new(&self.endpoint, caps)
            .await
            .map_err(session_err)?;
        driver
            .set_page_load_timeout(Duration::from_secs(self.settings.page_load_timeout_secs))
            .await
            .map_err(session_err)?;
        Ok(driver)
    }

    async fn capture(&self, driver: &WebDriver, url: &Url) -> Result<String, RenderError> {
        let nav_err = |e: WebDriverError| RenderError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        };
        let settle = Duration::from_millis(self.settings.settle_ms);

        driver.goto(url.as_str()).await.map_err(nav_err)?;
        tokio::time::sleep(settle).await;

        let clicks = self.expand(driver).await;
        if clicks > 0 {
            debug!("Expanded {} element(s) on {}", clicks, url);
            tokio::time::sleep(settle).await;
        }

        driver.source().await.map_err(nav_err)
    }

    /// Clicks visible expansion controls; returns the number of clicks made
    async fn expand(&self, driver: &WebDriver) -> usize {
        let mut clicks = 0;

        for css in &self.settings.expand_selectors {
            let Ok(elements) = driver.find_all(By::Css(css.as_str())).await else {
                continue;
            };

            for element in elements {
                if clicks >= self.settings.max_clicks {
                    return clicks;
                }
                if !element.is_displayed().await.unwrap_or(false) {
                    continue;
                }
                if element.click().await.is_ok() {
                    clicks += 1;
                    tokio::time::sleep(CLICK_PAUSE).await;
                }
            }
        }

        clicks
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn render(&self, url: &Url) -> Result<String, RenderError> {
        let driver = self.open_session().await?;
        let result = self.capture(&driver, url).await;

        if let Err(e) = driver.quit().await {
            warn!("Failed to close browser session: {}", e);
        }

        result
    }
}
