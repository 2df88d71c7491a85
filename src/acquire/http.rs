//! HTTP transport
//!
//! Thin layer over a `ureq` agent that adds what every acquisition needs:
//! an `Accept` header built from the accepted content types, the single
//! retry on a gateway timeout, strict status and content-type checks, and
//! debug logging of rate-limit and ETag headers.

use crate::core::cancel::CancelToken;
use crate::core::config::CacheConfig;
use crate::core::error::{CacheError, Result};
use crate::internal::wildcard::WildcardMatcher;
use std::io::Read;
use std::time::Duration;

/// Matches any content type
pub const MIME_ALL: &str = "*/*";

pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Accept header for the GitHub REST API
pub const MIME_GITHUB_JSON: &str = "application/vnd.github.v3+json";

/// Types archive hosts commonly mislabel binaries with; tolerated for downloads.
pub const ARCHIVE_FALLBACK_MIMES: [&str; 4] = [
    "binary/octet-stream",
    "application/x-gzip",
    "application/zip",
    "application/tar+gzip",
];

const STATUS_GATEWAY_TIMEOUT: u16 = 504;

/// Headers worth surfacing as diagnostics.
const DIAGNOSTIC_HEADERS: [&str; 3] = ["x-ratelimit-remaining", "x-ratelimit-reset", "etag"];

/// An open 200 response.
pub struct HttpBody {
    pub url: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    reader: Box<dyn Read + Send + Sync + 'static>,
}

impl HttpBody {
    pub fn reader(&mut self) -> &mut (dyn Read + Send + Sync + 'static) {
        &mut *self.reader
    }

    pub fn into_string(mut self) -> Result<String> {
        let mut text = String::new();
        self.reader
            .read_to_string(&mut text)
            .map_err(|e| CacheError::transport(&self.url, format!("failed to read body: {e}")))?;
        Ok(text)
    }
}

/// HTTP client configured from a [`CacheConfig`].
pub struct HttpClient {
    agent: ureq::Agent,
    /// Agent without proxy, for hosts listed in `non_proxy_hosts`.
    direct: Option<ureq::Agent>,
    non_proxy_hosts: Vec<WildcardMatcher>,
    authorization: Option<String>,
    gateway_retry_delay: Duration,
    cancel: CancelToken,
}

impl HttpClient {
    pub fn new(config: &CacheConfig, cancel: CancelToken) -> Result<Self> {
        let base = || {
            ureq::AgentBuilder::new()
                .timeout_connect(config.connect_timeout)
                .timeout_read(config.read_timeout)
                .user_agent(&config.user_agent)
        };

        let (agent, direct, non_proxy_hosts) = match &config.proxy {
            Some(proxy) => {
                let url = proxy.to_url();
                let p = ureq::Proxy::new(&url).map_err(|e| {
                    CacheError::Configuration(format!(
                        "invalid proxy {}:{}: {e}",
                        proxy.host, proxy.port
                    ))
                })?;
                tracing::debug!(host = %proxy.host, port = proxy.port, "using proxy");
                let matchers = proxy
                    .non_proxy_hosts
                    .iter()
                    .map(|h| WildcardMatcher::new(h, false))
                    .collect();
                (base().proxy(p).build(), Some(base().build()), matchers)
            }
            None => (base().build(), None, Vec::new()),
        };

        Ok(Self {
            agent,
            direct,
            non_proxy_hosts,
            authorization: config.authorization.clone(),
            gateway_retry_delay: config.gateway_retry_delay,
            cancel,
        })
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn agent_for(&self, url: &str) -> &ureq::Agent {
        if let (Some(direct), Some(host)) = (&self.direct, host_of(url))
            && self.non_proxy_hosts.iter().any(|m| m.matches(host))
        {
            tracing::debug!(host, "bypassing proxy");
            return direct;
        }
        &self.agent
    }

    fn request(&self, url: &str, accept: &[String]) -> ureq::Request {
        let mut request = self.agent_for(url).get(url);
        if !accept.is_empty() {
            request = request.set("Accept", &accept.join(", "));
        }
        if let Some(auth) = &self.authorization {
            request = request.set("Authorization", auth);
        }
        request
    }

    /// GET `url`, retrying once on 504. Anything but 200 is an error.
    fn call(&self, url: &str, accept: &[String]) -> Result<ureq::Response> {
        let mut retried = false;
        loop {
            self.cancel.check()?;
            tracing::debug!(url, accept = %accept.join(", "), "GET");
            match self.request(url, accept).call() {
                Ok(response) if response.status() == 200 => return Ok(response),
                Ok(response) => {
                    return Err(CacheError::HttpStatus {
                        url: url.to_owned(),
                        status: response.status(),
                    });
                }
                Err(ureq::Error::Status(STATUS_GATEWAY_TIMEOUT, _)) if !retried => {
                    tracing::warn!(url, delay = ?self.gateway_retry_delay, "gateway timeout, retrying");
                    self.cancel.sleep(self.gateway_retry_delay)?;
                    retried = true;
                }
                Err(ureq::Error::Status(STATUS_GATEWAY_TIMEOUT, _)) => {
                    return Err(CacheError::transport(
                        url,
                        "gateway timeout persisted after retry",
                    ));
                }
                Err(ureq::Error::Status(status, _)) => {
                    return Err(CacheError::HttpStatus {
                        url: url.to_owned(),
                        status,
                    });
                }
                Err(ureq::Error::Transport(t)) => {
                    return Err(CacheError::transport(url, t.to_string()));
                }
            }
        }
    }

    /// Open a 200 response after validating its content type.
    ///
    /// `binary` adds `application/octet-stream` to the accepted types and
    /// tolerates the usual mislabelled archive types.
    pub fn open(&self, url: &str, accepted: &[String], binary: bool) -> Result<HttpBody> {
        let mut accept: Vec<String> = accepted.to_vec();
        if binary && !accept.iter().any(|a| a.trim().eq_ignore_ascii_case(MIME_OCTET_STREAM)) {
            accept.push(MIME_OCTET_STREAM.to_owned());
        }

        let response = self.call(url, &accept)?;
        log_diagnostic_headers(url, &response);

        let content_type = response.header("content-type").map(str::to_owned);
        check_content_type(url, content_type.as_deref(), &accept, binary)?;

        let content_length = response
            .header("content-length")
            .and_then(|s| s.trim().parse().ok());
        let etag = response.header("etag").map(str::to_owned);

        Ok(HttpBody {
            url: url.to_owned(),
            content_type,
            content_length,
            etag,
            reader: Box::new(response.into_reader()),
        })
    }

    pub fn get_text(&self, url: &str, accepted: &[String]) -> Result<String> {
        self.open(url, accepted, false)?.into_string()
    }

    pub fn get_json(&self, url: &str, accepted: &[String]) -> Result<serde_json::Value> {
        let text = self.get_text(url, accepted)?;
        serde_json::from_str(&text)
            .map_err(|e| CacheError::transport(url, format!("invalid JSON: {e}")))
    }
}

fn log_diagnostic_headers(url: &str, response: &ureq::Response) {
    for name in DIAGNOSTIC_HEADERS {
        if let Some(value) = response.header(name) {
            tracing::debug!(url, header = name, value, "response header");
        }
    }
    if let Some(remaining) = response.header("x-ratelimit-remaining")
        && remaining.trim() == "0"
    {
        tracing::warn!(
            url,
            reset = response.header("x-ratelimit-reset").unwrap_or("?"),
            "rate limit exhausted"
        );
    }
}

/// Reject a response whose type matches none of `accepted`.
pub fn check_content_type(
    url: &str,
    content_type: Option<&str>,
    accepted: &[String],
    binary: bool,
) -> Result<()> {
    if accepted.is_empty() || accepted.iter().any(|a| a.trim() == MIME_ALL) {
        return Ok(());
    }
    let actual = content_type.unwrap_or("");
    let ok = accepted.iter().any(|a| mime_matches(a, actual))
        || (binary && ARCHIVE_FALLBACK_MIMES.iter().any(|a| mime_matches(a, actual)));
    if ok {
        Ok(())
    } else {
        Err(CacheError::UnexpectedContentType {
            url: url.to_owned(),
            content_type: actual.to_owned(),
            accepted: accepted.join(", "),
        })
    }
}

/// Same top-level type and at least one `+`-separated subtype part in common,
/// so `application/vnd.github.v3+json` matches `application/json`.
pub fn mime_matches(expected: &str, actual: &str) -> bool {
    fn parse(mime: &str) -> Option<(String, Vec<String>)> {
        let essence = mime.split(';').next()?.trim().to_ascii_lowercase();
        let (kind, sub) = essence.split_once('/')?;
        let parts = sub.split('+').map(|p| p.trim().to_owned()).collect();
        Some((kind.trim().to_owned(), parts))
    }
    match (parse(expected), parse(actual)) {
        (Some((ek, es)), Some((ak, asub))) => ek == ak && es.iter().any(|p| asub.contains(p)),
        _ => false,
    }
}

/// Host part of an absolute URL.
pub fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = match host_port.strip_prefix('[') {
        Some(v6) => v6.split(']').next()?,
        None => host_port.split(':').next()?,
    };
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_matching() {
        assert!(mime_matches("application/zip", "application/zip"));
        assert!(mime_matches("application/zip", "Application/ZIP; charset=binary"));
        assert!(mime_matches(MIME_GITHUB_JSON, "application/json; charset=utf-8"));
        assert!(mime_matches("application/tar+gzip", "application/gzip"));
        assert!(!mime_matches("application/zip", "text/html"));
        assert!(!mime_matches("application/zip", ""));
    }

    #[test]
    fn test_check_content_type() {
        let accepted = vec!["application/zip".to_owned()];
        assert!(check_content_type("u", Some("application/zip"), &accepted, false).is_ok());
        assert!(check_content_type("u", Some("text/html"), &accepted, false).is_err());
        assert!(check_content_type("u", None, &accepted, false).is_err());
        // Mislabelled archives pass only for binary downloads.
        assert!(check_content_type("u", Some("binary/octet-stream"), &accepted, true).is_ok());
        assert!(check_content_type("u", Some("binary/octet-stream"), &accepted, false).is_err());
        assert!(check_content_type("u", Some("text/html"), &[MIME_ALL.to_owned()], false).is_ok());
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://api.github.com/repos/x"), Some("api.github.com"));
        assert_eq!(host_of("http://user:pw@proxy.local:8080/x"), Some("proxy.local"));
        assert_eq!(host_of("http://[::1]:9000/"), Some("::1"));
        assert_eq!(host_of("not a url"), None);
    }

    mod http_mock_tests {
        use super::*;
        use crate::core::config::CacheConfig;
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, Request, ResponseTemplate};

        fn client() -> HttpClient {
            let mut config = CacheConfig::with_root(std::env::temp_dir());
            config.gateway_retry_delay = Duration::from_millis(10);
            HttpClient::new(&config, CancelToken::new()).unwrap()
        }

        fn accept(types: &[&str]) -> Vec<String> {
            types.iter().map(|s| s.to_string()).collect()
        }

        #[tokio::test]
        async fn test_get_text_sends_accept_header() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/text"))
                .and(|req: &Request| {
                    req.headers.get("accept").and_then(|v| v.to_str().ok())
                        == Some("text/plain, application/json")
                })
                .respond_with(ResponseTemplate::new(200).set_body_string("Hello, World!"))
                .expect(1)
                .mount(&mock_server)
                .await;

            let url = format!("{}/text", mock_server.uri());
            let text = client()
                .get_text(&url, &accept(&["text/plain", "application/json"]))
                .unwrap();
            assert_eq!(text, "Hello, World!");
        }

        #[tokio::test]
        async fn test_gateway_timeout_retried_once() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/flaky"))
                .respond_with(ResponseTemplate::new(504))
                .up_to_n_times(1)
                .mount(&mock_server)
                .await;
            Mock::given(method("GET"))
                .and(path("/flaky"))
                .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
                .mount(&mock_server)
                .await;

            let url = format!("{}/flaky", mock_server.uri());
            assert_eq!(client().get_text(&url, &accept(&[MIME_ALL])).unwrap(), "ok");
        }

        #[tokio::test]
        async fn test_second_gateway_timeout_fails() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/down"))
                .respond_with(ResponseTemplate::new(504))
                .expect(2)
                .mount(&mock_server)
                .await;

            let url = format!("{}/down", mock_server.uri());
            let err = client().get_text(&url, &accept(&[MIME_ALL])).unwrap_err();
            assert!(err.to_string().contains("gateway timeout"));
        }

        #[tokio::test]
        async fn test_non_200_is_fatal() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/gone"))
                .respond_with(ResponseTemplate::new(404))
                .expect(1)
                .mount(&mock_server)
                .await;
            Mock::given(method("GET"))
                .and(path("/empty"))
                .respond_with(ResponseTemplate::new(204))
                .mount(&mock_server)
                .await;

            let c = client();
            let err = c
                .get_text(&format!("{}/gone", mock_server.uri()), &accept(&[MIME_ALL]))
                .unwrap_err();
            assert!(matches!(err, CacheError::HttpStatus { status: 404, .. }));

            let err = c
                .get_text(&format!("{}/empty", mock_server.uri()), &accept(&[MIME_ALL]))
                .unwrap_err();
            assert!(matches!(err, CacheError::HttpStatus { status: 204, .. }));
        }

        #[tokio::test]
        async fn test_unexpected_content_type_rejected() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/page"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/html")
                        .set_body_string("<html/>"),
                )
                .mount(&mock_server)
                .await;

            let url = format!("{}/page", mock_server.uri());
            let err = client()
                .open(&url, &accept(&["application/zip"]), true)
                .err()
                .unwrap();
            assert!(matches!(err, CacheError::UnexpectedContentType { .. }));
        }

        #[tokio::test]
        async fn test_authorization_passed_through() {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/private"))
                .and(header("authorization", "Bearer t0ken"))
                .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
                .expect(1)
                .mount(&mock_server)
                .await;

            let mut config = CacheConfig::with_root(std::env::temp_dir());
            config.authorization = Some("Bearer t0ken".to_owned());
            let c = HttpClient::new(&config, CancelToken::new()).unwrap();
            let url = format!("{}/private", mock_server.uri());
            assert_eq!(c.get_text(&url, &accept(&[MIME_ALL])).unwrap(), "secret");
        }
    }
}
