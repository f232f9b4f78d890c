use anyhow::{Context, Result, anyhow};
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::time::Duration;
use tracing::debug;

/// Configuration for fallback browser rendering
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Timeout for page navigation in seconds
    pub navigation_timeout_seconds: u64,
    /// Whether to run the browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Additional Chrome arguments
    pub chrome_args: Vec<String>,
    /// User agent string to use
    pub user_agent: String,
}

impl Default for BrowserConfig {
    #[inline]
    fn default() -> Self {
        Self {
            navigation_timeout_seconds: 30,
            headless: true,
            window_width: 1280,
            window_height: 720,
            chrome_args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--disable-extensions".to_string(),
                "--disable-plugins".to_string(),
            ],
            user_agent: crate::scrape::USER_AGENT.to_string(),
        }
    }
}

/// Fetch the fully rendered HTML of a page through a headless browser.
///
/// A fresh browser is launched per call. Rendering only runs for pages static
/// extraction could not handle, so the launch cost is acceptable and no pool
/// state has to be kept alive between requests.
pub async fn render_page(url: &str, config: &BrowserConfig) -> Result<String> {
    debug!("Rendering {url} in headless browser");

    let url = url.to_string();
    let config = config.clone();
    let navigation_timeout = Duration::from_secs(config.navigation_timeout_seconds);
    // Outer timeout covers browser launch on top of navigation, so a hung
    // Chrome process cannot stall the whole ingestion.
    let outer_timeout = navigation_timeout + Duration::from_secs(15);

    let render = tokio::task::spawn_blocking(move || render_page_sync(&url, &config));

    match tokio::time::timeout(outer_timeout, render).await {
        Ok(joined) => joined.context("Browser rendering task panicked")?,
        Err(_) => Err(anyhow!(
            "Browser rendering timed out after {} seconds",
            outer_timeout.as_secs()
        )),
    }
}

fn render_page_sync(url: &str, config: &BrowserConfig) -> Result<String> {
    let args: Vec<&OsStr> = config.chrome_args.iter().map(OsStr::new).collect();
    let launch_options = LaunchOptions {
        headless: config.headless,
        window_size: Some((config.window_width, config.window_height)),
        args,
        ..Default::default()
    };

    let browser = Browser::new(launch_options).context("Failed to launch browser instance")?;
    let tab = browser.new_tab().context("Failed to create browser tab")?;

    tab.set_user_agent(&config.user_agent, None, None)
        .context("Failed to set user agent")?;
    tab.set_default_timeout(Duration::from_secs(config.navigation_timeout_seconds));

    tab.navigate_to(url)
        .with_context(|| format!("Failed to navigate to {url}"))?
        .wait_until_navigated()
        .with_context(|| format!("Navigation to {url} did not complete"))?;

    tab.get_content()
        .with_context(|| format!("Failed to read rendered content of {url}"))
}
