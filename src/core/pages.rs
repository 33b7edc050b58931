use crate::domain::model::{PageMeta, PageStamp};
use crate::domain::ports::Transport;
use crate::utils::error::Result;
use reqwest::Method;
use serde_json::Value;
use url::Url;

pub(crate) fn page_url(base_url: &str, job_id: &str, page: u64, size: usize) -> String {
    format!(
        "{}/reports/{}/contents?page={}&size={}",
        base_url, job_id, page, size
    )
}

/// Pull-based traversal of a ready report's pages. Each call to
/// [`PageWalker::next_page`] fetches one page and yields its provenance stamp
/// together with the extracted items; the stamp comes first so callers can
/// track page-level provenance even when items are consumed lazily.
///
/// Discovery of the next page tries three strategies in priority order:
/// the response's own `_links.next` href (with the requested page size
/// injected if the link omits it), then normalized pagination metadata, then
/// a length fallback where a full page implies another may exist and a short
/// or empty page is the last-page sentinel.
pub struct PageWalker<'a, T: Transport> {
    transport: &'a T,
    base_url: &'a str,
    job_id: &'a str,
    size: usize,
    next_url: Option<String>,
    page_no: u64,
}

impl<'a, T: Transport> PageWalker<'a, T> {
    pub fn new(transport: &'a T, base_url: &'a str, job_id: &'a str, size: usize) -> Self {
        Self {
            transport,
            base_url,
            job_id,
            size,
            next_url: Some(page_url(base_url, job_id, 0, size)),
            page_no: 0,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<(PageStamp, Vec<Value>)>> {
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };

        let page = self.transport.request(Method::GET, &url, None).await?;
        let items = extract_items(&page);
        let meta = normalize_page_meta(&page);
        let stamp = PageStamp {
            page_no: self.page_no,
            count: items.len(),
            meta,
        };

        if let Some(next) = hal_next_with_size(&page, self.base_url, self.size) {
            self.page_no += 1;
            self.next_url = Some(next);
            return Ok(Some((stamp, items)));
        }

        if let (Some(number), Some(total)) = (meta.number, meta.total_pages) {
            if number + 1 < total {
                self.page_no = number + 1;
                self.next_url = Some(page_url(self.base_url, self.job_id, number + 1, self.size));
                return Ok(Some((stamp, items)));
            }
            // on the reported last page; the length check below still guards
            // against metadata that undercounts
        }

        if self.size > 0 && items.len() == self.size {
            self.page_no += 1;
            self.next_url = Some(page_url(self.base_url, self.job_id, self.page_no, self.size));
        }

        Ok(Some((stamp, items)))
    }
}

/// Pulls the item list out of any of the envelope shapes the server is known
/// to produce. Total: an unrecognized shape yields an empty list, never an
/// error.
pub fn extract_items(page: &Value) -> Vec<Value> {
    if let Value::Array(items) = page {
        return items.clone();
    }
    if let Some(Value::Array(items)) = page.get("content") {
        return items.clone();
    }
    if let Some(embedded) = page.get("_embedded") {
        if let Some(Value::Array(items)) = embedded.get("items") {
            return items.clone();
        }
        if let Some(Value::Array(items)) = embedded.get("findings") {
            return items.clone();
        }
    }
    if let Some(Value::Array(items)) = page.get("findings") {
        return items.clone();
    }
    Vec::new()
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_count(container: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .find_map(|key| container.get(*key).and_then(as_count))
}

/// Normalizes pagination metadata out of the response. The server mixes two
/// key conventions (camelCase and snake_case) and two nesting locations
/// (top level and `_embedded`), so every candidate spot is consulted and the
/// first value found per field wins.
pub fn normalize_page_meta(payload: &Value) -> PageMeta {
    let mut meta = PageMeta::default();

    let blocks = [
        payload.get("page"),
        payload.get("page_metadata"),
        payload.get("_embedded").and_then(|e| e.get("page")),
        payload.get("_embedded").and_then(|e| e.get("page_metadata")),
    ];
    for block in blocks.into_iter().flatten() {
        if !block.is_object() {
            continue;
        }
        if meta.number.is_none() {
            meta.number = first_count(block, &["number", "page_number"]);
        }
        if meta.total_pages.is_none() {
            meta.total_pages = first_count(block, &["totalPages", "total_pages"]);
        }
        if meta.size.is_none() {
            meta.size = first_count(block, &["size"]);
        }
        if meta.total_elements.is_none() {
            meta.total_elements = first_count(block, &["totalElements", "total_elements"]);
        }
        if meta.number.is_some() && meta.total_pages.is_some() {
            break;
        }
    }

    if meta.total_elements.is_none() {
        meta.total_elements = first_count(payload, &["totalElements", "total_elements"]).or_else(
            || {
                payload
                    .get("_embedded")
                    .and_then(|e| first_count(e, &["totalElements", "total_elements"]))
            },
        );
    }

    meta
}

fn hal_next(page: &Value, base_url: &str) -> Option<String> {
    let href = page
        .get("_links")?
        .get("next")?
        .get("href")?
        .as_str()
        .filter(|href| !href.is_empty())?;
    if href.starts_with("http") {
        Some(href.to_string())
    } else {
        Some(format!("{}{}", base_url, href))
    }
}

/// Follows the HAL next link, forcing the caller's page size into the query
/// when the link omits it so the page size stays stable across the walk. An
/// href that does not parse as a URL is followed untouched.
fn hal_next_with_size(page: &Value, base_url: &str, size: usize) -> Option<String> {
    let href = hal_next(page, base_url)?;
    let Ok(mut url) = Url::parse(&href) else {
        return Some(href);
    };
    if !url.query_pairs().any(|(key, _)| key == "size") {
        url.query_pairs_mut()
            .append_pair("size", &size.to_string());
    }
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Transport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages keyed by full URL and records every request, so
    /// tests can assert both what was fetched and what was not.
    struct RoutedTransport {
        routes: HashMap<String, Value>,
        requests: Mutex<Vec<String>>,
    }

    impl RoutedTransport {
        fn new(routes: Vec<(String, Value)>) -> Self {
            Self {
                routes: routes.into_iter().collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RoutedTransport {
        async fn request(
            &self,
            _method: Method,
            url: &str,
            _body: Option<&Value>,
        ) -> Result<Value> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.routes.get(url) {
                Some(page) => Ok(page.clone()),
                None => panic!("unexpected request: {}", url),
            }
        }
    }

    const BASE: &str = "https://api.test";

    async fn walk_all<T: Transport>(
        walker: &mut PageWalker<'_, T>,
    ) -> (Vec<PageStamp>, Vec<Value>) {
        let mut stamps = Vec::new();
        let mut items = Vec::new();
        while let Some((stamp, page_items)) = walker.next_page().await.unwrap() {
            stamps.push(stamp);
            items.extend(page_items);
        }
        (stamps, items)
    }

    fn items(n: usize) -> Value {
        Value::Array((0..n).map(|i| json!({"n": i})).collect())
    }

    #[test]
    fn test_extract_items_shapes() {
        let rows = json!([{"a": 1}, {"a": 2}]);
        assert_eq!(extract_items(&rows).len(), 2);
        assert_eq!(extract_items(&json!({"content": [{"a": 1}]})).len(), 1);
        assert_eq!(
            extract_items(&json!({"_embedded": {"items": [{}, {}, {}]}})).len(),
            3
        );
        assert_eq!(
            extract_items(&json!({"_embedded": {"findings": [{}]}})).len(),
            1
        );
        assert_eq!(extract_items(&json!({"findings": [{}, {}]})).len(), 2);
        assert!(extract_items(&json!({"unexpected": "shape"})).is_empty());
        assert!(extract_items(&json!(null)).is_empty());
    }

    #[test]
    fn test_extract_items_prefers_content_over_findings() {
        let page = json!({
            "content": [{"a": 1}],
            "findings": [{"a": 1}, {"a": 2}]
        });
        assert_eq!(extract_items(&page).len(), 1);
    }

    #[test]
    fn test_meta_normalization_camel_case_top_level() {
        let meta = normalize_page_meta(&json!({
            "page": {"number": 2, "totalPages": 7, "size": 100, "totalElements": 650}
        }));
        assert_eq!(meta.number, Some(2));
        assert_eq!(meta.total_pages, Some(7));
        assert_eq!(meta.size, Some(100));
        assert_eq!(meta.total_elements, Some(650));
    }

    #[test]
    fn test_meta_normalization_snake_case_embedded() {
        let meta = normalize_page_meta(&json!({
            "_embedded": {
                "page_metadata": {"page_number": "4", "total_pages": "9"}
            }
        }));
        assert_eq!(meta.number, Some(4));
        assert_eq!(meta.total_pages, Some(9));
    }

    #[test]
    fn test_meta_total_elements_found_at_top_level() {
        let meta = normalize_page_meta(&json!({"totalElements": 12}));
        assert_eq!(meta.total_elements, Some(12));
        let meta = normalize_page_meta(&json!({"_embedded": {"total_elements": 5}}));
        assert_eq!(meta.total_elements, Some(5));
    }

    #[test]
    fn test_meta_normalization_missing_is_all_none() {
        assert_eq!(normalize_page_meta(&json!({"content": []})), PageMeta::default());
    }

    #[tokio::test]
    async fn test_length_fallback_stops_after_short_page() {
        // pages of sizes [5, 5, 5, 3] with no links or metadata: the walker
        // must stop after four pages and never request a fifth
        let transport = RoutedTransport::new(vec![
            (page_url(BASE, "r-1", 0, 5), items(5)),
            (page_url(BASE, "r-1", 1, 5), items(5)),
            (page_url(BASE, "r-1", 2, 5), items(5)),
            (page_url(BASE, "r-1", 3, 5), items(3)),
        ]);
        let mut walker = PageWalker::new(&transport, BASE, "r-1", 5);
        let (stamps, collected) = walk_all(&mut walker).await;

        assert_eq!(stamps.len(), 4);
        assert_eq!(collected.len(), 18);
        assert_eq!(transport.requested().len(), 4);
        assert_eq!(
            stamps.iter().map(|s| s.page_no).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_empty_first_page_terminates_immediately() {
        let transport =
            RoutedTransport::new(vec![(page_url(BASE, "r-1", 0, 5), items(0))]);
        let mut walker = PageWalker::new(&transport, BASE, "r-1", 5);
        let (stamps, collected) = walk_all(&mut walker).await;

        assert_eq!(stamps.len(), 1);
        assert!(collected.is_empty());
        assert_eq!(transport.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_hal_link_is_followed_with_size_injected() {
        let first = json!({
            "content": [{"n": 0}],
            "_links": {"next": {"href": "/reports/r-1/contents?page=1"}}
        });
        let transport = RoutedTransport::new(vec![
            (page_url(BASE, "r-1", 0, 7), first),
            // injected size keeps the page size stable across the walk
            (
                format!("{}/reports/r-1/contents?page=1&size=7", BASE),
                items(1),
            ),
        ]);
        let mut walker = PageWalker::new(&transport, BASE, "r-1", 7);
        let (stamps, collected) = walk_all(&mut walker).await;

        assert_eq!(stamps.len(), 2);
        assert_eq!(collected.len(), 2);
    }

    #[tokio::test]
    async fn test_hal_link_with_size_is_followed_verbatim() {
        let first = json!({
            "content": [{"n": 0}],
            "_links": {"next": {"href": format!("{}/reports/r-1/contents?page=1&size=50", BASE)}}
        });
        let transport = RoutedTransport::new(vec![
            (page_url(BASE, "r-1", 0, 7), first),
            (
                format!("{}/reports/r-1/contents?page=1&size=50", BASE),
                items(1),
            ),
        ]);
        let mut walker = PageWalker::new(&transport, BASE, "r-1", 7);
        let (stamps, _) = walk_all(&mut walker).await;
        assert_eq!(stamps.len(), 2);
    }

    #[tokio::test]
    async fn test_metadata_strategy_advances_past_short_pages() {
        // item counts are below the requested size, so only the metadata can
        // drive the walk to page 1
        let transport = RoutedTransport::new(vec![
            (
                page_url(BASE, "r-1", 0, 50),
                json!({
                    "content": [{"n": 0}, {"n": 1}],
                    "page": {"number": 0, "totalPages": 2}
                }),
            ),
            (
                page_url(BASE, "r-1", 1, 50),
                json!({
                    "content": [{"n": 2}],
                    "page": {"number": 1, "totalPages": 2}
                }),
            ),
        ]);
        let mut walker = PageWalker::new(&transport, BASE, "r-1", 50);
        let (stamps, collected) = walk_all(&mut walker).await;

        assert_eq!(stamps.len(), 2);
        assert_eq!(collected.len(), 3);
        assert_eq!(stamps[1].page_no, 1);
    }

    #[tokio::test]
    async fn test_metadata_last_page_with_full_count_falls_back_to_length() {
        // metadata says this is the last page but the page is full, so the
        // length fallback still probes once more and finds the true end
        let transport = RoutedTransport::new(vec![
            (
                page_url(BASE, "r-1", 0, 2),
                json!({
                    "content": [{"n": 0}, {"n": 1}],
                    "page": {"number": 0, "totalPages": 1}
                }),
            ),
            (page_url(BASE, "r-1", 1, 2), items(0)),
        ]);
        let mut walker = PageWalker::new(&transport, BASE, "r-1", 2);
        let (stamps, collected) = walk_all(&mut walker).await;

        assert_eq!(stamps.len(), 2);
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn test_hal_next_relative_href_gets_base_url() {
        let page = json!({"_links": {"next": {"href": "/reports/r-1/contents?page=3"}}});
        let next = hal_next_with_size(&page, BASE, 10).unwrap();
        assert_eq!(next, format!("{}/reports/r-1/contents?page=3&size=10", BASE));
    }

    #[test]
    fn test_hal_next_absent_or_empty() {
        assert!(hal_next_with_size(&json!({}), BASE, 10).is_none());
        assert!(
            hal_next_with_size(&json!({"_links": {"next": {"href": ""}}}), BASE, 10).is_none()
        );
    }
}
