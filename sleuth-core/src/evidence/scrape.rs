//! Page fetching and main-content extraction.

use super::ScrapedPage;
use crate::error::ConfigError;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Elements whose text never counts as page content.
const BOILERPLATE_TAGS: [&str; 6] = ["script", "style", "nav", "footer", "header", "aside"];

/// Tried in order; the first selector with a match wins.
const CONTENT_SELECTORS: [&str; 8] = [
    "main",
    "article",
    ".content",
    ".main-content",
    ".post-content",
    ".entry-content",
    "#content",
    ".article-body",
];

static CONTENT: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTENT_SELECTORS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .collect()
});
static TITLE: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("title").ok());
static H1: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("h1").ok());
static BODY: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("body").ok());

/// Fetches pages and reduces them to title plus readable text.
pub struct PageScraper {
    client: Client,
    content_limit: usize,
}

impl PageScraper {
    pub fn new(timeout: Duration, content_limit: usize) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            content_limit,
        })
    }

    /// Fetch `url` and extract its content. Errors are recorded on the page.
    pub async fn scrape(&self, url: &str) -> ScrapedPage {
        match self.fetch(url).await {
            Ok(html) => {
                let (title, content) = extract_page(&html, self.content_limit);
                debug!(url, chars = content.chars().count(), "Scraped page");
                ScrapedPage {
                    url: url.to_string(),
                    title,
                    content,
                    error: None,
                }
            }
            Err(e) => {
                warn!(url, error = %e, "Scrape failed");
                ScrapedPage::failed(url, e.to_string())
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// Extract `(title, content)` from an HTML document.
///
/// Title comes from `<title>`, then the first `<h1>`, then "No title".
/// Content is the text of the first matching content selector, or the whole
/// body, with whitespace collapsed and cut to `content_limit` characters.
/// Boilerplate elements are ignored throughout.
pub fn extract_page(html: &str, content_limit: usize) -> (String, String) {
    let document = Html::parse_document(html);

    let mut title = select_text(&document, TITLE.as_ref());
    if title.is_empty() {
        title = H1
            .as_ref()
            .and_then(|sel| document.select(sel).find(|el| !is_boilerplate(el)))
            .map(|el| visible_text(el).trim().to_string())
            .unwrap_or_default();
    }
    if title.is_empty() {
        title = "No title".to_string();
    }

    let mut content = String::new();
    for selector in CONTENT.iter() {
        let matches: Vec<ElementRef<'_>> = document
            .select(selector)
            .filter(|el| !is_boilerplate(el))
            .collect();
        if !matches.is_empty() {
            content = matches.into_iter().map(visible_text).collect::<String>();
            content = content.trim().to_string();
            break;
        }
    }
    if content.is_empty() {
        content = select_text(&document, BODY.as_ref());
    }

    (title, normalize(&content, content_limit))
}

/// Collapse whitespace runs to single spaces, trim and cut to `limit` chars.
fn normalize(text: &str, limit: usize) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(limit)
        .collect()
}

fn select_text(document: &Html, selector: Option<&Selector>) -> String {
    let Some(selector) = selector else {
        return String::new();
    };
    document
        .select(selector)
        .filter(|el| !is_boilerplate(el))
        .map(visible_text)
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_boilerplate_tag(name: &str) -> bool {
    BOILERPLATE_TAGS.contains(&name)
}

/// True when the element or any ancestor is a boilerplate element.
fn is_boilerplate(el: &ElementRef<'_>) -> bool {
    is_boilerplate_tag(el.value().name())
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| is_boilerplate_tag(a.value().name()))
}

fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) if !is_boilerplate_tag(element.name()) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}
