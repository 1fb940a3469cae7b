//! HTML page scraper for image context.

use std::collections::HashMap;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::http_client::HttpClient;
use super::retry::{with_backoff, RetryPolicy};
use super::{PageScraper, ScrapeError, ScrapedPage};

const HEADING_TAGS: &[&str] = &["h2", "h3", "h4"];
const CAPTION_SIBLING_TAGS: &[&str] = &["p", "div", "span"];

struct ContextSelectors {
    title: Selector,
    h1: Selector,
    img: Selector,
    figcaption: Selector,
    subheading: Selector,
}

impl ContextSelectors {
    fn new() -> Self {
        Self {
            title: Selector::parse("title").expect("title selector"),
            h1: Selector::parse("h1").expect("h1 selector"),
            img: Selector::parse("img").expect("img selector"),
            figcaption: Selector::parse("figcaption").expect("figcaption selector"),
            subheading: Selector::parse("h2, h3, h4").expect("subheading selector"),
        }
    }
}

/// Scrapes pages over HTTP and extracts title, first `<h1>` and adjacent text.
pub struct HtmlPageScraper {
    http: HttpClient,
    retry: RetryPolicy,
}

impl HtmlPageScraper {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            retry: RetryPolicy::page_fetch(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_page(&self, page_url: &str) -> Result<String, ScrapeError> {
        let response = self
            .http
            .get(page_url)
            .await
            .map_err(ScrapeError::from_reqwest)?;

        let status = response.status.as_u16();
        if status == 403 {
            return Err(ScrapeError::Forbidden {
                url: page_url.to_string(),
            });
        }
        if !response.is_success() {
            return Err(ScrapeError::Http { status });
        }

        response.text().await.map_err(ScrapeError::from_reqwest)
    }
}

#[async_trait]
impl PageScraper for HtmlPageScraper {
    async fn scrape(&self, page_url: &str, image_urls: &[String]) -> Result<ScrapedPage, ScrapeError> {
        let label = format!("fetch page {}", page_url);
        let body = with_backoff(&self.retry, &label, || self.fetch_page(page_url)).await?;
        let page = extract_context(&body, image_urls);
        debug!(
            "Scraped {}: title={:?} h1={:?}",
            page_url, page.title, page.heading
        );
        Ok(page)
    }
}

/// Extract page context from an HTML document.
///
/// Adjacent text for an image comes from the first source that matches for
/// each `<img>` referencing it: the enclosing `<figure>`'s `<figcaption>`, a
/// following sibling whose class mentions "caption", or the closest preceding
/// `<h2>`-`<h4>`. Multiple matching `<img>` tags are joined with `" | "`.
pub fn extract_context(html: &str, image_urls: &[String]) -> ScrapedPage {
    let document = Html::parse_document(html);
    let selectors = ContextSelectors::new();

    let title = document
        .select(&selectors.title)
        .next()
        .map(stripped_text)
        .unwrap_or_default();
    let heading = document
        .select(&selectors.h1)
        .next()
        .map(stripped_text)
        .unwrap_or_default();

    let mut adjacent = HashMap::new();
    for image_url in image_urls {
        let text = find_adjacent_text(&document, &selectors, image_url);
        adjacent.insert(image_url.clone(), text);
    }

    ScrapedPage {
        title,
        heading,
        adjacent,
    }
}

fn find_adjacent_text(document: &Html, selectors: &ContextSelectors, image_url: &str) -> String {
    let mut tags: Vec<ElementRef> = matching_images(document, selectors, "src", image_url);
    if tags.is_empty() {
        tags = matching_images(document, selectors, "data-src", image_url);
    }

    let mut texts = Vec::new();
    for img in tags {
        if let Some(caption) = figure_caption(img, selectors) {
            texts.push(caption);
            continue;
        }
        if let Some(caption) = caption_sibling(img) {
            texts.push(caption);
            continue;
        }
        if let Some(heading) = preceding_heading(img, selectors) {
            texts.push(heading);
        }
    }

    texts.join(" | ")
}

fn matching_images<'a>(
    document: &'a Html,
    selectors: &ContextSelectors,
    attr: &str,
    image_url: &str,
) -> Vec<ElementRef<'a>> {
    document
        .select(&selectors.img)
        .filter(|img| {
            img.value()
                .attr(attr)
                .map(|value| value.contains(image_url))
                .unwrap_or(false)
        })
        .collect()
}

fn figure_caption(img: ElementRef, selectors: &ContextSelectors) -> Option<String> {
    let parent = img.parent().and_then(ElementRef::wrap)?;
    if parent.value().name() != "figure" {
        return None;
    }
    parent.select(&selectors.figcaption).next().map(stripped_text)
}

fn caption_sibling(img: ElementRef) -> Option<String> {
    img.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| {
            CAPTION_SIBLING_TAGS.contains(&el.value().name())
                && el
                    .value()
                    .attr("class")
                    .map(|class| class.to_lowercase().contains("caption"))
                    .unwrap_or(false)
        })
        .map(stripped_text)
}

/// Walk backwards from the image, then up through its ancestors, looking for
/// the nearest subheading.
fn preceding_heading(img: ElementRef, selectors: &ContextSelectors) -> Option<String> {
    let mut current = Some(img);
    while let Some(node) = current {
        for sibling in node.prev_siblings().filter_map(ElementRef::wrap) {
            if HEADING_TAGS.contains(&sibling.value().name()) {
                return Some(stripped_text(sibling));
            }
            if let Some(last) = sibling.select(&selectors.subheading).last() {
                return Some(stripped_text(last));
            }
        }
        current = node.parent().and_then(ElementRef::wrap);
    }
    None
}

fn stripped_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_title_and_heading() {
        let html = "<html><head><title> Garden Tips </title></head>\
                    <body><h1>Spring <em>planting</em></h1><h1>Second</h1></body></html>";
        let page = extract_context(html, &[]);
        assert_eq!(page.title, "Garden Tips");
        assert_eq!(page.heading, "Spring planting");
    }

    #[test]
    fn test_missing_title_is_empty() {
        let page = extract_context("<html><body><p>hi</p></body></html>", &[]);
        assert_eq!(page.title, "");
        assert_eq!(page.heading, "");
    }

    #[test]
    fn test_figcaption_wins() {
        let html = r#"<h2>Section</h2>
            <figure><img src="https://cdn.test/a.jpg"><figcaption>A red barn</figcaption></figure>"#;
        let page = extract_context(html, &urls(&["https://cdn.test/a.jpg"]));
        assert_eq!(page.adjacent_text("https://cdn.test/a.jpg"), "A red barn");
    }

    #[test]
    fn test_caption_class_sibling() {
        let html = r#"<div><img src="/b.png"><span class="wp-Caption-text">Sunset</span></div>"#;
        let page = extract_context(html, &urls(&["/b.png"]));
        assert_eq!(page.adjacent_text("/b.png"), "Sunset");
    }

    #[test]
    fn test_preceding_heading_through_ancestors() {
        let html = r#"<body>
            <section><h2>Old</h2><h3>Tools we use</h3></section>
            <div><p>intro</p><div><img data-src="/c.webp"></div></div>
            <h2>After</h2></body>"#;
        let page = extract_context(html, &urls(&["/c.webp"]));
        assert_eq!(page.adjacent_text("/c.webp"), "Tools we use");
    }

    #[test]
    fn test_multiple_tags_joined() {
        let html = r#"<figure><img src="/d.jpg"><figcaption>One</figcaption></figure>
            <figure><img src="/d.jpg"><figcaption>Two</figcaption></figure>"#;
        let page = extract_context(html, &urls(&["/d.jpg"]));
        assert_eq!(page.adjacent_text("/d.jpg"), "One | Two");
    }

    #[test]
    fn test_unmatched_image_has_no_text() {
        let page = extract_context("<h2>x</h2><img src='/other.jpg'>", &urls(&["/e.jpg"]));
        assert_eq!(page.adjacent_text("/e.jpg"), "");
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/blocked")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;

        let scraper = HtmlPageScraper::new(HttpClient::new(Duration::from_secs(5), Duration::ZERO))
            .with_retry_policy(RetryPolicy::immediate(3));
        let err = scraper
            .scrape(&format!("{}/blocked", server.url()), &[])
            .await
            .unwrap_err();

        assert!(err.is_forbidden());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_soft_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let scraper = HtmlPageScraper::new(HttpClient::new(Duration::from_secs(5), Duration::ZERO))
            .with_retry_policy(RetryPolicy::immediate(2));
        let err = scraper
            .scrape(&format!("{}/flaky", server.url()), &[])
            .await
            .unwrap_err();

        assert!(!err.is_forbidden());
        assert_eq!(err.to_string(), "HTTP error: 500");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_scrape_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/post")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<title>Post</title><h1>Hello</h1><figure><img src='/i.jpg'><figcaption>Cap</figcaption></figure>")
            .create_async()
            .await;

        let scraper = HtmlPageScraper::new(HttpClient::new(Duration::from_secs(5), Duration::ZERO));
        let page = scraper
            .scrape(&format!("{}/post", server.url()), &urls(&["/i.jpg"]))
            .await
            .unwrap();

        assert_eq!(page.title, "Post");
        assert_eq!(page.heading, "Hello");
        assert_eq!(page.adjacent_text("/i.jpg"), "Cap");
    }
}
