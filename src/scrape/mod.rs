pub mod browser;


use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

use crate::WebRagError;
use browser::BrowserConfig;

/// Extracted text shorter than this is treated as a failed extraction;
/// cookie walls and bot-check pages tend to fall under it.
pub const MIN_CONTENT_LENGTH: usize = 200;

/// Timeout for the plain HTTP fetch. Kept short so the browser fallback
/// starts quickly on slow JS-heavy sites.
const STATIC_TIMEOUT_SECONDS: u64 = 12;

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Seam for page fetching. The ingestion pipeline only depends on this
/// trait, so tests can run it without touching the network.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Fetch a URL and return its readable text, or `None` when nothing
    /// usable could be extracted. Extraction failures are not errors; the
    /// caller records a placeholder and moves on to the next URL.
    async fn extract(&self, url: &str) -> Option<String>;
}

/// Production extractor: a static HTTP fetch first, then a headless browser
/// render for pages that only produce content client-side.
pub struct WebExtractor {
    http: reqwest::Client,
    browser_config: BrowserConfig,
}

impl WebExtractor {
    pub fn new() -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(STATIC_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| WebRagError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            browser_config: BrowserConfig::default(),
        })
    }

    async fn extract_static(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Static fetch of {url} failed: {e}");
                return None;
            }
        };

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to read body of {url}: {e}");
                return None;
            }
        };

        extract_text_from_html(&html)
    }

    async fn extract_rendered(&self, url: &str) -> Option<String> {
        let html = match browser::render_page(url, &self.browser_config).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Browser rendering of {url} failed: {e}");
                return None;
            }
        };

        extract_text_from_html(&html)
    }
}

#[async_trait]
impl PageExtractor for WebExtractor {
    async fn extract(&self, url: &str) -> Option<String> {
        if let Some(text) = self.extract_static(url).await {
            debug!("Extracted {} chars from {url} statically", text.len());
            return Some(text);
        }

        debug!("Static extraction of {url} came up short, trying browser");
        let text = self.extract_rendered(url).await;
        if let Some(text) = &text {
            debug!("Extracted {} chars from {url} via browser", text.len());
        }
        text
    }
}

/// Pull readable text out of an HTML document.
///
/// Prefers a main content area when the page has one, strips script, style,
/// and chrome elements, and rejects results at or under [`MIN_CONTENT_LENGTH`]
/// characters.
pub fn extract_text_from_html(html: &str) -> Option<String> {
    let unwanted_selector = Selector::parse(
        "script, style, noscript, iframe, nav, header, footer, aside, form, button",
    )
    .expect("valid selector");
    let main_content_selector =
        Selector::parse("main, article, .content, .main-content, #content, #main")
            .expect("valid selector");
    let body_selector = Selector::parse("body").expect("valid selector");

    let document = Html::parse_document(html);

    // Narrow to the main content area when the page marks one up, otherwise
    // work with the whole body.
    let scoped_html = document
        .select(&main_content_selector)
        .next()
        .or_else(|| document.select(&body_selector).next())
        .map_or_else(|| document.html(), |element| element.html());

    let mut fragment = Html::parse_fragment(&scoped_html);
    remove_unwanted_elements(&mut fragment, &unwanted_selector);

    let text: String = fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().len() > MIN_CONTENT_LENGTH {
        Some(text)
    } else {
        None
    }
}

fn remove_unwanted_elements(document: &mut Html, unwanted_selector: &Selector) {
    // Collect node ids first so detaching does not invalidate the traversal.
    let unwanted_node_ids: Vec<_> = document
        .select(unwanted_selector)
        .map(|element| element.id())
        .collect();

    for node_id in unwanted_node_ids {
        if let Some(mut node) = document.tree.get_mut(node_id) {
            node.detach();
        }
    }
}

/// Fetch every URL and combine the results into one document.
///
/// Each successful page is framed with a `--- SOURCE: <url> ---` header so
/// provenance survives chunking; failed pages leave a bracketed placeholder
/// instead of aborting the run. URLs are processed in order and the output
/// order matches the input order.
pub async fn fetch_and_combine(extractor: &dyn PageExtractor, urls: &[String]) -> String {
    let mut parts = Vec::with_capacity(urls.len());

    for url in urls {
        match extractor.extract(url).await {
            Some(text) => parts.push(format!("--- SOURCE: {url} ---\n{text}\n")),
            None => {
                warn!("Could not extract content from {url}");
                parts.push(format!("[Could not extract content from: {url}]"));
            }
        }
    }

    parts.join("\n\n").trim().to_string()
}
