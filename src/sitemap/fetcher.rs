use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use reqwest::redirect::Policy;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::util::{validate_url, UrlValidationError};

/// Redirect hops followed before a candidate is abandoned.
const MAX_REDIRECTS: usize = 5;

/// `Accept` header sent for sitemap candidates.
pub const ACCEPT_SITEMAP: &str = "text/xml, application/xml, application/gzip";
/// `Accept` header sent for `robots.txt`.
pub const ACCEPT_ROBOTS: &str = "text/plain, */*";

/// A successful (2xx) response to a single candidate request.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// URL the request was issued against.
    pub url: String,
    /// Declared `Content-Type`, lowercased; empty when the server sent none.
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Reasons a single candidate request missed.
///
/// The discovery resolver absorbs every one of these and moves on to the next
/// candidate; they never reach the caller of `discover_sitemap`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The candidate URL failed validation (bad scheme, private host, ...)
    #[error("Rejected URL: {0}")]
    Rejected(String),
}

/// Why a redirect was not followed. Surfaces as [`FetchError::Network`].
#[derive(Debug, Error)]
pub enum RedirectRefused {
    #[error("Too many redirects (max {0})")]
    TooMany(usize),
    #[error("Redirect loop detected at {0}")]
    Loop(String),
    #[error("Redirect target rejected: {0}")]
    Rejected(#[from] UrlValidationError),
}

/// The one network capability discovery needs: a GET that yields the body and
/// declared content type of a 2xx response, or a miss.
pub trait Transport {
    fn get(
        &self,
        url: &str,
        accept: &'static str,
    ) -> impl Future<Output = Result<FetchedResource, FetchError>> + Send;
}

/// [`Transport`] over a `reqwest` client.
///
/// Each request is bounded by a timeout and a body size limit, and carries an
/// identifying `User-Agent`. Hosts that resolve to localhost or private ranges
/// are rejected unless `allow_private_hosts` is set.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
    max_response_bytes: usize,
    allow_private_hosts: bool,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_response_bytes: config.max_response_bytes,
            allow_private_hosts: config.allow_private_hosts,
        }
    }

    /// Builds a client with the pooling and redirect settings used for discovery.
    ///
    /// Redirect targets pass the same host validation as the first request,
    /// so a public candidate cannot bounce discovery onto a private address.
    pub fn build_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .redirect(redirect_policy(config.allow_private_hosts))
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
    }

    async fn fetch(&self, url: &str, accept: &'static str) -> Result<FetchedResource, FetchError> {
        if !self.allow_private_hosts {
            // SEC: robots.txt is attacker-controlled and may point anywhere
            validate_url(url).map_err(|e| FetchError::Rejected(e.to_string()))?;
        }

        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .header(reqwest::header::USER_AGENT, &self.user_agent);

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let body = tokio::time::timeout(
            self.timeout,
            read_limited_bytes(response, self.max_response_bytes),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;

        Ok(FetchedResource {
            url: url.to_owned(),
            content_type,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn get(
        &self,
        url: &str,
        accept: &'static str,
    ) -> impl Future<Output = Result<FetchedResource, FetchError>> + Send {
        self.fetch(url, accept)
    }
}

fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        match check_redirect(attempt.url(), attempt.previous(), allow_private_hosts) {
            Ok(()) => {
                tracing::debug!(
                    from = %attempt.previous().last().map(Url::as_str).unwrap_or("initial"),
                    to = %attempt.url(),
                    hop = attempt.previous().len(),
                    "Following redirect"
                );
                attempt.follow()
            }
            Err(refused) => {
                tracing::debug!(to = %attempt.url(), reason = %refused, "Refusing redirect");
                attempt.error(refused)
            }
        }
    })
}

/// Decides whether the hop to `next` may be followed. `previous` holds every
/// URL already requested in this chain, starting with the original.
fn check_redirect(
    next: &Url,
    previous: &[Url],
    allow_private_hosts: bool,
) -> Result<(), RedirectRefused> {
    if previous.len() > MAX_REDIRECTS {
        return Err(RedirectRefused::TooMany(MAX_REDIRECTS));
    }
    if previous.iter().any(|prev| prev == next) {
        return Err(RedirectRefused::Loop(next.to_string()));
    }
    if !allow_private_hosts {
        validate_url(next.as_str())?;
    }
    Ok(())
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_transport() -> HttpTransport {
        let config = Config {
            allow_private_hosts: true,
            ..Config::default()
        };
        HttpTransport::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn test_get_success_returns_body_and_content_type() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<urlset/>", "Application/XML; charset=UTF-8"),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/sitemap.xml", mock_server.uri());
        let resource = local_transport().get(&url, ACCEPT_SITEMAP).await.unwrap();

        assert_eq!(resource.url, url);
        assert_eq!(resource.content_type, "application/xml; charset=utf-8");
        assert_eq!(resource.body, b"<urlset/>");
    }

    #[tokio::test]
    async fn test_get_sends_accept_and_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/sitemap.xml", mock_server.uri());
        assert!(local_transport().get(&url, ACCEPT_SITEMAP).await.is_ok());

        let requests = mock_server.received_requests().await.unwrap();
        let headers = &requests[0].headers;
        assert_eq!(headers.get("accept").unwrap().to_str().unwrap(), ACCEPT_SITEMAP);
        assert_eq!(
            headers.get("user-agent").unwrap().to_str().unwrap(),
            Config::default().user_agent
        );
    }

    #[tokio::test]
    async fn test_get_404_is_http_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = format!("{}/missing.xml", mock_server.uri());
        match local_transport().get(&url, ACCEPT_SITEMAP).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; 2048]))
            .mount(&mock_server)
            .await;

        let config = Config {
            allow_private_hosts: true,
            max_response_bytes: 1024,
            ..Config::default()
        };
        let transport = HttpTransport::new(reqwest::Client::new(), &config);
        let url = format!("{}/big.xml", mock_server.uri());

        assert!(matches!(
            transport.get(&url, ACCEPT_SITEMAP).await,
            Err(FetchError::ResponseTooLarge)
        ));
    }

    #[tokio::test]
    async fn test_get_slow_response_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let config = Config {
            allow_private_hosts: true,
            request_timeout_secs: 1,
            ..Config::default()
        };
        let transport = HttpTransport::new(reqwest::Client::new(), &config);
        let url = format!("{}/slow.xml", mock_server.uri());

        assert!(matches!(
            transport.get(&url, ACCEPT_SITEMAP).await,
            Err(FetchError::Timeout)
        ));
    }

    fn chain(urls: &[&str]) -> Vec<Url> {
        urls.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    #[test]
    fn test_redirect_to_public_host_followed() {
        let next = Url::parse("https://cdn.example.com/sitemap.xml").unwrap();
        let previous = chain(&["https://example.com/sitemap.xml"]);
        assert!(check_redirect(&next, &previous, false).is_ok());
    }

    #[test]
    fn test_redirect_to_private_host_refused() {
        let previous = chain(&["https://example.com/sitemap.xml"]);
        for target in [
            "http://169.254.169.254/latest/meta-data",
            "http://127.0.0.1:8080/sitemap.xml",
            "http://[::ffff:10.0.0.1]/sitemap.xml",
            "file:///etc/passwd",
        ] {
            let next = Url::parse(target).unwrap();
            assert!(
                matches!(
                    check_redirect(&next, &previous, false),
                    Err(RedirectRefused::Rejected(_))
                ),
                "{target} should be refused"
            );
            assert!(check_redirect(&next, &previous, true).is_ok());
        }
    }

    #[test]
    fn test_redirect_loop_and_hop_limit() {
        let previous = chain(&["https://example.com/a", "https://example.com/b"]);
        let back = Url::parse("https://example.com/a").unwrap();
        assert!(matches!(
            check_redirect(&back, &previous, true),
            Err(RedirectRefused::Loop(_))
        ));

        let long: Vec<String> = (0..=MAX_REDIRECTS)
            .map(|i| format!("https://example.com/hop{i}"))
            .collect();
        let long: Vec<&str> = long.iter().map(String::as_str).collect();
        let next = Url::parse("https://example.com/final").unwrap();
        assert!(matches!(
            check_redirect(&next, &chain(&long), true),
            Err(RedirectRefused::TooMany(_))
        ));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_a_miss() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.xml"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/b.xml"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.xml"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/a.xml"))
            .mount(&mock_server)
            .await;

        let config = Config {
            allow_private_hosts: true,
            ..Config::default()
        };
        let transport = HttpTransport::new(HttpTransport::build_client(&config).unwrap(), &config);
        let url = format!("{}/a.xml", mock_server.uri());

        assert!(matches!(
            transport.get(&url, ACCEPT_SITEMAP).await,
            Err(FetchError::Network(_))
        ));
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_redirect_followed_to_sitemap() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old.xml"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new.xml"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<urlset/>", "application/xml"))
            .mount(&mock_server)
            .await;

        let config = Config {
            allow_private_hosts: true,
            ..Config::default()
        };
        let transport = HttpTransport::new(HttpTransport::build_client(&config).unwrap(), &config);
        let url = format!("{}/old.xml", mock_server.uri());

        let resource = transport.get(&url, ACCEPT_SITEMAP).await.unwrap();
        assert_eq!(resource.body, b"<urlset/>");
    }

    #[tokio::test]
    async fn test_private_host_rejected_by_default() {
        let transport = HttpTransport::new(reqwest::Client::new(), &Config::default());
        let result = transport
            .get("http://127.0.0.1:9/sitemap.xml", ACCEPT_SITEMAP)
            .await;
        assert!(matches!(result, Err(FetchError::Rejected(_))));
    }
}
