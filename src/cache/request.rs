//! Request/response model and strategy classification.

use bytes::Bytes;
use http::Method;
use url::Url;

/// What kind of resource a request is for, as reported by the page runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Other,
}

/// An intercepted outgoing page request.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: Method,
    pub url: Url,
    /// Raw `Accept` header, if any
    pub accept: Option<String>,
    pub destination: Destination,
    /// True for top-level page navigations
    pub navigation: bool,
}

impl PageRequest {
    /// A plain GET for `url` with no classification hints.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            accept: None,
            destination: Destination::Other,
            navigation: false,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn navigate(mut self) -> Self {
        self.navigation = true;
        self
    }

    /// Cache key: the exact request URL.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }
}

/// A response as held in cache buckets or returned from the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl PageResponse {
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }
}

/// How to source a response for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
    /// Non-GET: never intercepted, straight to the network
    PassThrough,
}

impl Strategy {
    /// Metrics label
    pub fn label(self) -> &'static str {
        match self {
            Self::NetworkFirst => "network_first",
            Self::CacheFirst => "cache_first",
            Self::StaleWhileRevalidate => "stale_while_revalidate",
            Self::PassThrough => "pass_through",
        }
    }
}

/// Routing decision, evaluated in order:
///
/// 1. non-GET → pass through untouched
/// 2. navigation, or `Accept` indicating an HTML document → network-first
/// 3. same-origin script/style → stale-while-revalidate
/// 4. same-origin image/font → cache-first
/// 5. everything else → stale-while-revalidate
pub fn classify(request: &PageRequest, app_origin: &Url) -> Strategy {
    if request.method != Method::GET {
        return Strategy::PassThrough;
    }

    let wants_html = request
        .accept
        .as_deref()
        .is_some_and(|accept| accept.contains("text/html"));
    if request.navigation || wants_html {
        return Strategy::NetworkFirst;
    }

    let same_origin = request.url.origin() == app_origin.origin();
    if same_origin {
        match request.destination {
            Destination::Script | Destination::Style => {
                return Strategy::StaleWhileRevalidate;
            }
            Destination::Image | Destination::Font => {
                return Strategy::CacheFirst;
            }
            _ => {}
        }
    }

    Strategy::StaleWhileRevalidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://app.example.com").unwrap()
    }

    fn same_origin(path: &str) -> Url {
        origin().join(path).unwrap()
    }

    #[test]
    fn test_non_get_passes_through() {
        let mut req = PageRequest::get(same_origin("/entries"));
        req.method = Method::POST;
        assert_eq!(classify(&req, &origin()), Strategy::PassThrough);
    }

    #[test]
    fn test_navigation_is_network_first() {
        let req = PageRequest::get(same_origin("/")).navigate();
        assert_eq!(classify(&req, &origin()), Strategy::NetworkFirst);
    }

    #[test]
    fn test_html_accept_is_network_first() {
        let req = PageRequest::get(same_origin("/deep/link"))
            .with_accept("text/html,application/xhtml+xml");
        assert_eq!(classify(&req, &origin()), Strategy::NetworkFirst);
    }

    #[test]
    fn test_same_origin_script_and_style_revalidate() {
        for dest in [Destination::Script, Destination::Style] {
            let req = PageRequest::get(same_origin("/asset")).with_destination(dest);
            assert_eq!(classify(&req, &origin()), Strategy::StaleWhileRevalidate);
        }
    }

    #[test]
    fn test_same_origin_image_and_font_cache_first() {
        for dest in [Destination::Image, Destination::Font] {
            let req = PageRequest::get(same_origin("/asset")).with_destination(dest);
            assert_eq!(classify(&req, &origin()), Strategy::CacheFirst);
        }
    }

    #[test]
    fn test_cross_origin_image_revalidates() {
        let req = PageRequest::get(Url::parse("https://cdn.example.net/pic.png").unwrap())
            .with_destination(Destination::Image);
        assert_eq!(classify(&req, &origin()), Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_unclassified_same_origin_revalidates() {
        let req = PageRequest::get(same_origin("/data.json"));
        assert_eq!(classify(&req, &origin()), Strategy::StaleWhileRevalidate);
    }
}
