//! DOM extraction heuristics for channel listing pages.
//!
//! Listing markup shifts between site revisions, so candidate anchors are
//! located by trying a prioritized list of shapes; the first shape that
//! yields at least one node wins.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// A post discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCandidate {
    pub title: String,
    pub url: String,
    pub post_id: String,
}

/// Anchor shapes in priority order. Later entries are progressively less
/// specific; the bare `a[href]` fallback relies on the post-path filter.
const NODE_SHAPES: &[&str] = &[
    "div.video-item a[href]",
    "article a[href]",
    "div.thumb a[href]",
    "li a[href]",
    "a[href]",
];

/// Extract the host-assigned post id: the path segment following the
/// post-path marker.
pub fn extract_post_id(url: &str, marker: &str) -> Option<String> {
    let start = url.find(marker)? + marker.len();
    let rest = &url[start..];
    let id: String = rest
        .chars()
        .take_while(|c| !matches!(c, '/' | '?' | '#'))
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Derive the page count from the first listing page.
///
/// Listing pagination links carry byte offsets (`?o=N`); the page count is
/// the largest offset divided by the listing page size, plus one.
pub fn total_pages(html: &str, page_size: usize) -> usize {
    let document = Html::parse_document(html);
    let anchors = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return 1,
    };

    let mut max_offset = 0usize;
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if let Some(query) = href.split('?').nth(1) {
            for pair in query.split('&') {
                let mut parts = pair.splitn(2, '=');
                let key = parts.next().unwrap_or("");
                if key == "o" || key == "offset" {
                    if let Some(Ok(offset)) = parts.next().map(str::parse::<usize>) {
                        max_offset = max_offset.max(offset);
                    }
                }
            }
        }
    }

    max_offset / page_size.max(1) + 1
}

/// Build the URL for a listing page. Page 1 is the channel URL itself;
/// later pages append the byte offset.
pub fn page_url(channel_url: &str, page: usize, page_size: usize) -> String {
    if page <= 1 {
        return channel_url.to_string();
    }
    let offset = (page - 1) * page_size;
    let separator = if channel_url.contains('?') { '&' } else { '?' };
    format!("{}{}o={}", channel_url, separator, offset)
}

/// Extract post candidates from a listing page, in DOM order.
pub fn extract_candidates(html: &str, channel_url: &str, marker: &str) -> Vec<PostCandidate> {
    let document = Html::parse_document(html);
    let base = Url::parse(channel_url).ok();

    for shape in NODE_SHAPES {
        let Ok(selector) = Selector::parse(shape) else {
            continue;
        };
        let nodes: Vec<ElementRef<'_>> = document.select(&selector).collect();
        if nodes.is_empty() {
            continue;
        }

        let mut candidates = Vec::new();
        for node in &nodes {
            let Some(href) = node.value().attr("href") else {
                continue;
            };
            if !href.contains(marker) {
                continue;
            }
            let Some(url) = absolutize(base.as_ref(), href) else {
                continue;
            };
            let Some(post_id) = extract_post_id(&url, marker) else {
                continue;
            };
            candidates.push(PostCandidate {
                title: node_title(node),
                url,
                post_id,
            });
        }

        if !candidates.is_empty() {
            debug!(shape, count = candidates.len(), "listing shape matched");
            return candidates;
        }
    }

    Vec::new()
}

fn absolutize(base: Option<&Url>, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

/// Pull a display title out of an anchor node, preferring attribute-carrying
/// elements over loose text.
fn node_title(node: &ElementRef<'_>) -> String {
    if let Some(title) = node.value().attr("title") {
        let title = title.trim();
        if !title.is_empty() {
            return title.to_string();
        }
    }

    for attr_selector in ["[title]", "img[alt]"] {
        if let Ok(selector) = Selector::parse(attr_selector) {
            for child in node.select(&selector) {
                let value = child
                    .value()
                    .attr("title")
                    .or_else(|| child.value().attr("alt"))
                    .unwrap_or("")
                    .trim();
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }
    }

    let text: String = node.text().collect::<Vec<_>>().join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "untitled".to_string()
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "/post/";

    #[test]
    fn test_extract_post_id() {
        assert_eq!(
            extract_post_id("https://example/post/X1", MARKER),
            Some("X1".to_string())
        );
        assert_eq!(
            extract_post_id("https://example/post/X1/comments", MARKER),
            Some("X1".to_string())
        );
        assert_eq!(
            extract_post_id("https://example/post/X1?ref=feed", MARKER),
            Some("X1".to_string())
        );
        assert_eq!(extract_post_id("https://example/about", MARKER), None);
        assert_eq!(extract_post_id("https://example/post/", MARKER), None);
    }

    #[test]
    fn test_total_pages_from_offsets() {
        let html = r#"
            <div class="pager">
                <a href="/ch/alpha.html?o=30">2</a>
                <a href="/ch/alpha.html?o=60">3</a>
                <a href="/ch/alpha.html?o=120">last</a>
            </div>
        "#;
        assert_eq!(total_pages(html, 30), 5);
    }

    #[test]
    fn test_total_pages_without_pagination() {
        assert_eq!(total_pages("<html><body>one page</body></html>", 30), 1);
    }

    #[test]
    fn test_page_url() {
        assert_eq!(page_url("https://example/ch/a.html", 1, 30), "https://example/ch/a.html");
        assert_eq!(
            page_url("https://example/ch/a.html", 3, 30),
            "https://example/ch/a.html?o=60"
        );
        assert_eq!(
            page_url("https://example/ch/a.html?sort=new", 2, 30),
            "https://example/ch/a.html?sort=new&o=30"
        );
    }

    #[test]
    fn test_extract_candidates_preferred_shape() {
        let html = r#"
            <div class="video-item">
                <a href="/post/X1" title="First clip"><img src="1.jpg"></a>
            </div>
            <div class="video-item">
                <a href="/post/X2"><img alt="Second clip" src="2.jpg"></a>
            </div>
            <a href="/post/X9">should not win over the specific shape</a>
        "#;
        let candidates = extract_candidates(html, "https://example/ch/a.html", MARKER);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "First clip");
        assert_eq!(candidates[0].url, "https://example/post/X1");
        assert_eq!(candidates[0].post_id, "X1");
        assert_eq!(candidates[1].title, "Second clip");
    }

    #[test]
    fn test_extract_candidates_fallback_shape() {
        let html = r#"
            <p>
                <a href="/post/X1">Plain link</a>
                <a href="/about">not a post</a>
            </p>
        "#;
        let candidates = extract_candidates(html, "https://example/ch/a.html", MARKER);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].post_id, "X1");
        assert_eq!(candidates[0].title, "Plain link");
    }

    #[test]
    fn test_extract_candidates_dom_order() {
        let html = r#"
            <li><a href="/post/B">b</a></li>
            <li><a href="/post/A">a</a></li>
        "#;
        let candidates = extract_candidates(html, "https://example/ch/a.html", MARKER);
        assert_eq!(candidates[0].post_id, "B");
        assert_eq!(candidates[1].post_id, "A");
    }
}
