//! Best-effort page metadata enrichment.
//!
//! Given an item's link, fetch the page, read its social-preview description
//! and image, and probe the image's dimensions. Enrichment never fails: every
//! problem along the way degrades to an absent field and a `debug!` line.

pub mod meta;
pub mod probe;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{Client, Response};
use tracing::debug;
use url::{Host, Url};

use newsmirror_shared::{
    EnrichmentConfig, ImageDescriptor, NewsMirrorError, Result, SizeClass,
};

pub use meta::{PageMetadata, extract_meta};
pub use probe::{ProbedImage, probe_image};

/// User-Agent string for page and image requests.
const USER_AGENT: &str = concat!("newsmirror/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Secondary metadata scraped from an item's page.
///
/// "Nothing found" and "fetch failed" look the same here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub description: Option<String>,
    pub image: Option<ImageDescriptor>,
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Fetches pages and preview images for new items.
#[derive(Debug, Clone)]
pub struct Enricher {
    client: Client,
    max_image_bytes: u64,
    max_page_bytes: u64,
    /// Allow localhost/private hosts (local mock servers).
    allow_private_hosts: bool,
}

impl Enricher {
    /// Build an enricher from the `[enrichment]` config section.
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        // Redirects are followed by hand so every hop passes `check_target`.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                NewsMirrorError::config(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            max_image_bytes: config.max_image_bytes,
            max_page_bytes: config.max_page_bytes,
            allow_private_hosts: false,
        })
    }

    /// Allow fetching from localhost and private address ranges.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }

    /// Enrich a single page URL. Never fails.
    pub async fn enrich(&self, url: &str) -> Enrichment {
        let page_url = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                debug!(%url, error = %e, "enrichment skipped: unparseable url");
                return Enrichment::default();
            }
        };

        let (final_url, html) = match self.fetch_page(&page_url).await {
            Ok(page) => page,
            Err(e) => {
                debug!(url = %page_url, error = %e, "enrichment degraded: page unavailable");
                return Enrichment::default();
            }
        };

        let meta = extract_meta(&html);

        let image = match meta.image_url.as_deref() {
            Some(raw) => match final_url.join(raw) {
                Ok(image_url) => match self.fetch_image(&image_url).await {
                    Ok(descriptor) => Some(descriptor),
                    Err(e) => {
                        debug!(url = %image_url, error = %e, "enrichment degraded: image unusable");
                        None
                    }
                },
                Err(e) => {
                    debug!(image = raw, error = %e, "enrichment degraded: bad image url");
                    None
                }
            },
            None => {
                debug!(url = %page_url, "no preview image on page");
                None
            }
        };

        Enrichment {
            description: meta.description,
            image,
        }
    }

    /// GET a page and return the URL it was served from with its body.
    async fn fetch_page(&self, url: &Url) -> Result<(Url, String)> {
        let (final_url, response) = self.get(url).await?;
        let body = read_capped(&final_url, response, self.max_page_bytes).await?;
        Ok((final_url, String::from_utf8_lossy(&body).into_owned()))
    }

    /// GET an image and probe it into a descriptor.
    async fn fetch_image(&self, url: &Url) -> Result<ImageDescriptor> {
        let (final_url, response) = self.get(url).await?;
        let bytes = read_capped(&final_url, response, self.max_image_bytes).await?;

        let probed = probe_image(&bytes)?;
        Ok(ImageDescriptor {
            url: url.to_string(),
            width: probed.width,
            height: probed.height,
            file_extension: probed.format,
            size_class: SizeClass::from_width(probed.width),
        })
    }

    /// GET `url`, following up to [`MAX_REDIRECTS`] redirects. Returns the
    /// final URL and its successful response.
    async fn get(&self, url: &Url) -> Result<(Url, Response)> {
        self.check_target(url)?;

        let mut current = url.clone();
        let mut hops = 0;
        loop {
            let response = self
                .client
                .get(current.as_str())
                .send()
                .await
                .map_err(|e| NewsMirrorError::upstream(current.as_str(), e.to_string()))?;

            let status = response.status();
            if !status.is_redirection() {
                if !status.is_success() {
                    return Err(NewsMirrorError::upstream(
                        current.as_str(),
                        format!("HTTP {status}"),
                    ));
                }
                return Ok((current, response));
            }

            if hops == MAX_REDIRECTS {
                return Err(NewsMirrorError::upstream(
                    url.as_str(),
                    format!("more than {MAX_REDIRECTS} redirects"),
                ));
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    NewsMirrorError::upstream(
                        current.as_str(),
                        format!("HTTP {status} without location"),
                    )
                })?;
            let next = self.redirect_target(&current, location)?;
            debug!(from = %current, to = %next, "following redirect");
            current = next;
            hops += 1;
        }
    }

    /// Resolve a `Location` header against the current URL and vet the result.
    fn redirect_target(&self, from: &Url, location: &str) -> Result<Url> {
        let next = from.join(location).map_err(|e| {
            NewsMirrorError::upstream(from.as_str(), format!("bad redirect '{location}': {e}"))
        })?;
        self.check_target(&next)?;
        Ok(next)
    }

    fn check_target(&self, url: &Url) -> Result<()> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NewsMirrorError::upstream(
                url.as_str(),
                "unsupported scheme",
            ));
        }
        if !self.allow_private_hosts && is_ssrf_target(url) {
            return Err(NewsMirrorError::upstream(
                url.as_str(),
                "blocked non-public target",
            ));
        }
        Ok(())
    }
}

/// Read a response body, giving up as soon as it grows past `cap` bytes.
async fn read_capped(url: &Url, mut response: Response, cap: u64) -> Result<Vec<u8>> {
    let too_large = |size: u64| {
        NewsMirrorError::upstream(
            url.as_str(),
            format!("body too large ({size} bytes, cap {cap})"),
        )
    };

    if let Some(len) = response.content_length() {
        if len > cap {
            return Err(too_large(len));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        NewsMirrorError::upstream(url.as_str(), format!("failed to read body: {e}"))
    })? {
        let size = (body.len() + chunk.len()) as u64;
        if size > cap {
            return Err(too_large(size));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a non-HTTP scheme or a local/private host.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(Host::Ipv4(v4)) => is_private_v4(&v4),
        Some(Host::Ipv6(v6)) => is_private_v6(&v6),
        Some(Host::Domain(host)) => {
            let host = host.trim_end_matches('.');
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

fn is_private_v4(v4: &Ipv4Addr) -> bool {
    let octets = v4.octets();
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_broadcast()
        || v4.is_unspecified()
        // 100.64.0.0/10 (carrier-grade NAT)
        || (octets[0] == 100 && (octets[1] & 0xC0) == 64)
}

fn is_private_v6(v6: &Ipv6Addr) -> bool {
    if let Some(v4) = v6.to_ipv4_mapped() {
        return is_private_v4(&v4);
    }
    let first = v6.segments()[0];
    v6.is_loopback()
        || v6.is_unspecified()
        // fc00::/7 (unique local)
        || (first & 0xFE00) == 0xFC00
        // fe80::/10 (link local)
        || (first & 0xFFC0) == 0xFE80
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::png_bytes;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn enricher() -> Enricher {
        Enricher::new(&EnrichmentConfig::default())
            .unwrap()
            .allow_private_hosts()
    }

    fn page_with(meta: &str) -> String {
        format!("<html><head><title>t</title>{meta}</head><body><p>hi</p></body></html>")
    }

    async fn mount_page(server: &MockServer, route: &str, html: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(html)
                    .insert_header("content-type", "text/html"),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn ssrf_blocks_local_targets() {
        for raw in [
            "file:///etc/passwd",
            "http://localhost:8080/",
            "http://127.0.0.1/",
            "http://10.0.0.4/x",
            "http://192.168.1.1/",
            "http://[::1]/",
            "http://printer.local/",
            "http://localhost./",
            "http://api.internal./",
            "http://[::ffff:127.0.0.1]/",
            "http://[::ffff:10.0.0.1]/",
            "http://[fd12:3456::1]/",
            "http://[fe80::1]/",
        ] {
            let url = Url::parse(raw).unwrap();
            assert!(is_ssrf_target(&url), "{raw} should be blocked");
        }
        for raw in [
            "https://example.com/post",
            "http://[2606:4700::1111]/",
            "http://[::ffff:93.184.216.34]/",
        ] {
            let url = Url::parse(raw).unwrap();
            assert!(!is_ssrf_target(&url), "{raw} should be allowed");
        }
    }

    #[tokio::test]
    async fn mapped_loopback_degrades_to_empty() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/secret",
            page_with(r#"<meta property="og:description" content="internal-only">"#),
        )
        .await;
        let port = server.address().port();

        let enricher = Enricher::new(&EnrichmentConfig::default()).unwrap();
        let out = enricher
            .enrich(&format!("http://[::ffff:127.0.0.1]:{port}/secret"))
            .await;

        assert_eq!(out, Enrichment::default());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn redirect_hops_are_vetted() {
        let enricher = Enricher::new(&EnrichmentConfig::default()).unwrap();
        let from = Url::parse("https://example.com/hop").unwrap();

        for location in [
            "http://127.0.0.1:8080/secret",
            "http://[::ffff:127.0.0.1]/secret",
            "http://localhost./admin",
            "file:///etc/passwd",
        ] {
            assert!(
                enricher.redirect_target(&from, location).is_err(),
                "{location} should be refused"
            );
        }

        let next = enricher.redirect_target(&from, "/landing").unwrap();
        assert_eq!(next.as_str(), "https://example.com/landing");
    }

    #[tokio::test]
    async fn follows_redirect_and_resolves_against_final_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/short"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/blog/post"))
            .mount(&server)
            .await;
        mount_page(
            &server,
            "/blog/post",
            page_with(
                r#"<meta property="og:description" content="Moved here">
                   <meta property="og:image" content="cover.png">"#,
            ),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/blog/cover.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(640, 480)))
            .mount(&server)
            .await;

        let out = enricher().enrich(&format!("{}/short", server.uri())).await;

        assert_eq!(out.description.as_deref(), Some("Moved here"));
        let image = out.image.expect("image probed");
        assert_eq!(image.url, format!("{}/blog/cover.png", server.uri()));
    }

    #[tokio::test]
    async fn redirect_to_other_scheme_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hop"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "ftp://127.0.0.1/secret"),
            )
            .mount(&server)
            .await;

        let out = enricher().enrich(&format!("{}/hop", server.uri())).await;
        assert_eq!(out, Enrichment::default());
    }

    #[tokio::test]
    async fn redirect_loop_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let out = enricher().enrich(&format!("{}/loop", server.uri())).await;

        assert_eq!(out, Enrichment::default());
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), MAX_REDIRECTS + 1);
    }

    #[tokio::test]
    async fn blocked_host_degrades_to_empty() {
        let enricher = Enricher::new(&EnrichmentConfig::default()).unwrap();
        let out = enricher.enrich("http://127.0.0.1:9/page").await;
        assert_eq!(out, Enrichment::default());
    }

    #[tokio::test]
    async fn full_enrichment_with_relative_image() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/post",
            page_with(
                r#"<meta property="og:description" content="Launch notes">
                   <meta property="og:image" content="/img/cover.png">"#,
            ),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/img/cover.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(1200, 630)))
            .mount(&server)
            .await;

        let out = enricher().enrich(&format!("{}/post", server.uri())).await;

        assert_eq!(out.description.as_deref(), Some("Launch notes"));
        let image = out.image.expect("image probed");
        assert_eq!(image.url, format!("{}/img/cover.png", server.uri()));
        assert_eq!((image.width, image.height), (1200, 630));
        assert_eq!(image.file_extension, "png");
        assert_eq!(image.size_class, SizeClass::Expanded);
    }

    #[tokio::test]
    async fn narrow_image_is_normal() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/small",
            page_with(r#"<meta property="og:image" content="/thumb.png">"#),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/thumb.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(599, 300)))
            .mount(&server)
            .await;

        let out = enricher().enrich(&format!("{}/small", server.uri())).await;
        assert!(out.description.is_none());
        assert_eq!(out.image.unwrap().size_class, SizeClass::Normal);
    }

    #[tokio::test]
    async fn page_not_found_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let out = enricher().enrich(&format!("{}/gone", server.uri())).await;
        assert_eq!(out, Enrichment::default());
    }

    #[tokio::test]
    async fn missing_image_tag_keeps_description() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/text-only",
            page_with(r#"<meta property="og:description" content="Words only">"#),
        )
        .await;

        let out = enricher()
            .enrich(&format!("{}/text-only", server.uri()))
            .await;
        assert_eq!(out.description.as_deref(), Some("Words only"));
        assert!(out.image.is_none());
    }

    #[tokio::test]
    async fn corrupt_image_keeps_description() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/broken",
            page_with(
                r#"<meta property="og:description" content="Still here">
                   <meta property="og:image" content="/broken.png">"#,
            ),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/broken.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"definitely not a png".to_vec()))
            .mount(&server)
            .await;

        let out = enricher().enrich(&format!("{}/broken", server.uri())).await;
        assert_eq!(out.description.as_deref(), Some("Still here"));
        assert!(out.image.is_none());
    }

    #[tokio::test]
    async fn oversized_image_is_rejected() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/big",
            page_with(r#"<meta property="og:image" content="/big.png">"#),
        )
        .await;
        let mut body = png_bytes(800, 800);
        body.resize(4096, 0);
        Mock::given(method("GET"))
            .and(path("/big.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let config = EnrichmentConfig {
            max_image_bytes: 1024,
            ..EnrichmentConfig::default()
        };
        let enricher = Enricher::new(&config).unwrap().allow_private_hosts();
        let out = enricher.enrich(&format!("{}/big", server.uri())).await;
        assert!(out.image.is_none());
    }

    #[tokio::test]
    async fn oversized_page_is_skipped() {
        let server = MockServer::start().await;
        let padding = "x".repeat(8 * 1024);
        mount_page(
            &server,
            "/bloated",
            page_with(&format!(
                r#"<meta property="og:description" content="Too big">{padding}"#
            )),
        )
        .await;

        let config = EnrichmentConfig {
            max_page_bytes: 4 * 1024,
            ..EnrichmentConfig::default()
        };
        let enricher = Enricher::new(&config).unwrap().allow_private_hosts();
        let out = enricher.enrich(&format!("{}/bloated", server.uri())).await;
        assert_eq!(out, Enrichment::default());
    }

    /// Serve one endless chunked body (no content-length) and report how many
    /// body bytes were written before the client hung up.
    async fn serve_chunked_forever() -> (Url, tokio::task::JoinHandle<usize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        const LIMIT: usize = 64 * 1024 * 1024;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;

            let head = "HTTP/1.1 200 OK\r\ncontent-type: image/png\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return 0;
            }

            let chunk = vec![0u8; 64 * 1024];
            let frame = format!("{:x}\r\n", chunk.len());
            let mut sent = 0;
            while sent < LIMIT {
                if socket.write_all(frame.as_bytes()).await.is_err()
                    || socket.write_all(&chunk).await.is_err()
                    || socket.write_all(b"\r\n").await.is_err()
                {
                    break;
                }
                sent += chunk.len();
            }
            sent
        });

        let url = Url::parse(&format!("http://{addr}/huge.png")).unwrap();
        (url, handle)
    }

    #[tokio::test]
    async fn chunked_image_stops_at_cap() {
        let (url, server) = serve_chunked_forever().await;
        let config = EnrichmentConfig {
            max_image_bytes: 1024,
            ..EnrichmentConfig::default()
        };
        let enricher = Enricher::new(&config).unwrap().allow_private_hosts();

        let result = enricher.fetch_image(&url).await;
        assert!(result.is_err());
        drop(enricher);

        let sent = tokio::time::timeout(std::time::Duration::from_secs(30), server)
            .await
            .expect("server finished")
            .unwrap();
        assert!(sent < 64 * 1024 * 1024, "client read the whole body ({sent} bytes)");
    }

    #[tokio::test]
    async fn unparseable_url_is_empty() {
        let out = enricher().enrich("not a url").await;
        assert_eq!(out, Enrichment::default());
    }
}
