//! Fetch capability — outbound HTTP scoped to an allowed-host set.
//!
//! Defense order for each request: URL syntax, scheme membership, host
//! classification (blocked patterns, private/metadata address space,
//! then the allowed set), a sliding one-minute rate window, header
//! sanitization. Redirects are never followed by the HTTP client;
//! each hop re-enters the same admission procedure and consumes its own
//! rate slot, so a redirect cannot bounce into a private network.
//!
//! The response size cap is enforced twice: a `Content-Length`
//! pre-check as an optimization, and authoritative accounting while the
//! consumer streams the body.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::redirect::Policy;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::CapabilityError;
use crate::security::hosts;

use super::{wildcard_match, BlockedHook};

/// Default response size cap: 10 MiB.
const DEFAULT_MAX_RESPONSE: u64 = 10 * 1024 * 1024;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-capability request rate.
const DEFAULT_RATE_PER_MINUTE: usize = 60;

/// Redirect hop limit, on top of per-hop re-admission.
const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Header names a skill may never set itself.
const DEFAULT_BLOCKED_HEADERS: [&str; 5] = [
    "host",
    "authorization",
    "cookie",
    "x-forwarded-for",
    "x-real-ip",
];

/// Hook fired for each admitted outbound request with the target URL.
pub type RequestHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Construction parameters for [`FetchCapability`].
#[derive(Clone)]
pub struct FetchConfig {
    /// Host patterns requests must match. `*.example.com` matches any
    /// subdomain and the apex; `10.*` matches by prefix.
    pub allowed_hosts: Vec<String>,
    /// Extra blocked host patterns. Private ranges, link-local space and
    /// metadata endpoints are always refused regardless of this list.
    pub blocked_hosts: Vec<String>,
    pub allowed_schemes: Vec<String>,
    pub max_response_bytes: u64,
    pub timeout: Duration,
    pub max_requests_per_minute: usize,
    pub default_headers: HashMap<String, String>,
    pub blocked_headers: Vec<String>,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            blocked_hosts: Vec::new(),
            allowed_schemes: vec!["https".to_string()],
            max_response_bytes: DEFAULT_MAX_RESPONSE,
            timeout: DEFAULT_TIMEOUT,
            max_requests_per_minute: DEFAULT_RATE_PER_MINUTE,
            default_headers: HashMap::new(),
            blocked_headers: DEFAULT_BLOCKED_HEADERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl FetchConfig {
    pub fn allow_host(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_hosts.push(pattern.into());
        self
    }

    pub fn allow_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.allowed_schemes.push(scheme.into());
        self
    }
}

/// One outbound request as a skill describes it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Builds a request from interpreter JSON parameters.
    pub fn from_params(params: &Value) -> Result<Self, CapabilityError> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(CapabilityError::fetch)?;
        let method = params
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_string();
        let headers = params
            .get("headers")
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let body = params
            .get("body")
            .and_then(|v| v.as_str())
            .map(String::from);
        Ok(Self {
            url: url.to_string(),
            method,
            headers,
            body,
        })
    }
}

/// A streamed response whose body is re-capped during consumption.
pub struct FetchResponse {
    inner: reqwest::Response,
    url: String,
    cap: u64,
    read: u64,
    on_blocked: Option<BlockedHook>,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("inner", &self.inner)
            .field("url", &self.url)
            .field("cap", &self.cap)
            .field("read", &self.read)
            .field("on_blocked", &self.on_blocked.is_some())
            .finish()
    }
}

impl FetchResponse {
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// Response headers as a plain string map (non-UTF-8 values are
    /// dropped).
    pub fn header_map(&self) -> HashMap<String, String> {
        self.inner
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect()
    }

    /// Reads the next body chunk, aborting the stream once accumulated
    /// bytes cross the cap.
    pub async fn chunk(&mut self) -> Result<Option<bytes::Bytes>, CapabilityError> {
        let chunk = self.inner.chunk().await.map_err(|_| CapabilityError::fetch())?;
        if let Some(bytes) = &chunk {
            self.read += bytes.len() as u64;
            if self.read > self.cap {
                warn!(url = %self.url, "response body exceeded size cap mid-stream");
                if let Some(hook) = &self.on_blocked {
                    hook("fetch", &self.url, "Response exceeds size cap");
                }
                return Err(CapabilityError::fetch());
            }
        }
        Ok(chunk)
    }

    /// Drains the capped body to a byte vector.
    pub async fn bytes(mut self) -> Result<Vec<u8>, CapabilityError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Drains the capped body to text (lossy UTF-8).
    pub async fn text(self) -> Result<String, CapabilityError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Outbound HTTP capability.
pub struct FetchCapability {
    config: FetchConfig,
    client: reqwest::Client,
    window: Mutex<Vec<Instant>>,
    on_request: Option<RequestHook>,
    on_blocked: Option<BlockedHook>,
}

/// Host pattern matching: `*.example.com` matches subdomains and the
/// apex, everything else is a plain wildcard match.
fn host_matches(pattern: &str, host: &str) -> bool {
    let p = pattern.to_lowercase();
    let h = host.to_lowercase();
    if let Some(apex) = p.strip_prefix("*.") {
        return h == apex || h.ends_with(&format!(".{apex}"));
    }
    wildcard_match(&p, &h)
}

impl FetchCapability {
    pub fn new(config: FetchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            client,
            window: Mutex::new(Vec::new()),
            on_request: None,
            on_blocked: None,
        }
    }

    pub fn on_request(mut self, hook: RequestHook) -> Self {
        self.on_request = Some(hook);
        self
    }

    pub fn on_blocked(mut self, hook: BlockedHook) -> Self {
        self.on_blocked = Some(hook);
        self
    }

    fn refuse(&self, target: &str, reason: &str) -> CapabilityError {
        warn!(target, reason, "fetch blocked");
        if let Some(hook) = &self.on_blocked {
            hook("fetch", target, reason);
        }
        CapabilityError::fetch()
    }

    /// URL syntax, scheme and host admission.
    fn admit(&self, url_str: &str) -> Result<Url, CapabilityError> {
        let url = Url::parse(url_str).map_err(|_| self.refuse(url_str, "Blocked URL"))?;

        let scheme = url.scheme().to_lowercase();
        if !self.config.allowed_schemes.iter().any(|s| s.eq_ignore_ascii_case(&scheme)) {
            return Err(self.refuse(url_str, "Scheme not allowed"));
        }

        let host = url
            .host_str()
            .ok_or_else(|| self.refuse(url_str, "Blocked URL"))?;

        if self
            .config
            .blocked_hosts
            .iter()
            .any(|p| host_matches(p, host))
        {
            return Err(self.refuse(url_str, "Host not allowed"));
        }
        if hosts::is_blocked_hostname(host)
            || hosts::is_private_ip(host)
            || hosts::is_cloud_metadata_ip(host)
        {
            return Err(self.refuse(url_str, "Host not allowed"));
        }
        if !self
            .config
            .allowed_hosts
            .iter()
            .any(|p| host_matches(p, host))
        {
            return Err(self.refuse(url_str, "Host not allowed"));
        }

        Ok(url)
    }

    /// One slot of the sliding one-minute window. Every redirect hop
    /// takes its own slot.
    fn take_rate_slot(&self, target: &str) -> Result<(), CapabilityError> {
        let mut window = self.window.lock();
        let now = Instant::now();
        let minute = Duration::from_secs(60);
        window.retain(|t| now.duration_since(*t) < minute);
        if window.len() >= self.config.max_requests_per_minute {
            let retry_after = window
                .first()
                .map(|t| minute.saturating_sub(now.duration_since(*t)))
                .unwrap_or(minute);
            drop(window);
            return Err(self.refuse(
                target,
                &format!("Rate limit exceeded, retry in {}s", retry_after.as_secs()),
            ));
        }
        window.push(now);
        Ok(())
    }

    /// Default headers first, then caller headers minus the blocked
    /// names.
    fn sanitize_headers(&self, caller: &HashMap<String, String>) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .config
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, value) in caller {
            let lower = name.to_lowercase();
            if self.config.blocked_headers.iter().any(|b| *b == lower) {
                debug!(header = %name, "dropping caller header");
                continue;
            }
            out.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            out.push((name.clone(), value.clone()));
        }
        out
    }

    /// Performs one request, chasing redirects through admission.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, CapabilityError> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| self.refuse(&request.url, "Method not allowed"))?;

        let mut url = self.admit(&request.url)?;
        self.take_rate_slot(&request.url)?;
        let headers = self.sanitize_headers(&request.headers);

        let mut hops = 0;
        loop {
            if let Some(hook) = &self.on_request {
                hook(url.as_str());
            }
            debug!(url = %url, method = %method, "sending request");

            let mut builder = self.client.request(method.clone(), url.clone());
            for (name, value) in &headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|_| self.refuse(url.as_str(), "Request failed"))?;

            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| self.refuse(url.as_str(), "Blocked redirect"))?;
                hops += 1;
                if hops > self.config.max_redirects {
                    return Err(self.refuse(url.as_str(), "Too many redirects"));
                }
                let next = url
                    .join(location)
                    .map_err(|_| self.refuse(url.as_str(), "Blocked redirect"))?;
                // A redirect target gets no special treatment: full
                // admission plus its own rate slot.
                url = self.admit(next.as_str())?;
                self.take_rate_slot(url.as_str())?;
                continue;
            }

            if let Some(length) = response.content_length() {
                if length > self.config.max_response_bytes {
                    return Err(self.refuse(url.as_str(), "Response exceeds size cap"));
                }
            }

            return Ok(FetchResponse {
                inner: response,
                url: url.to_string(),
                cap: self.config.max_response_bytes,
                read: 0,
                on_blocked: self.on_blocked.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn capability() -> FetchCapability {
        FetchCapability::new(FetchConfig::default().allow_host("api.example.com"))
    }

    fn capability_with_reasons() -> (FetchCapability, Arc<PlMutex<Vec<String>>>) {
        let reasons: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
        let sink = reasons.clone();
        let cap = capability().on_blocked(Arc::new(move |_op, _target, reason| {
            sink.lock().push(reason.to_string());
        }));
        (cap, reasons)
    }

    // ── host patterns ───────────────────────────────────────────

    #[test]
    fn test_host_pattern_wildcard_subdomain() {
        assert!(host_matches("*.example.com", "api.example.com"));
        assert!(host_matches("*.example.com", "a.b.example.com"));
        // The apex matches too.
        assert!(host_matches("*.example.com", "example.com"));
        assert!(!host_matches("*.example.com", "example.org"));
        assert!(!host_matches("*.example.com", "notexample.com"));
    }

    #[test]
    fn test_host_pattern_prefix() {
        assert!(host_matches("10.*", "10.0.0.1"));
        assert!(!host_matches("10.*", "110.0.0.1"));
    }

    #[test]
    fn test_host_pattern_exact() {
        assert!(host_matches("api.example.com", "api.example.com"));
        assert!(host_matches("api.example.com", "API.EXAMPLE.COM"));
        assert!(!host_matches("api.example.com", "www.example.com"));
    }

    // ── admission ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_invalid_url_refused() {
        let (cap, reasons) = capability_with_reasons();
        let err = cap.fetch(FetchRequest::get("not a url")).await.unwrap_err();
        assert_eq!(err.to_string(), "Request blocked");
        assert_eq!(reasons.lock().as_slice(), ["Blocked URL"]);
    }

    #[tokio::test]
    async fn test_scheme_not_allowed() {
        let (cap, reasons) = capability_with_reasons();
        // Default scheme set is https-only.
        let err = cap
            .fetch(FetchRequest::get("http://api.example.com/"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request blocked");
        assert_eq!(reasons.lock().as_slice(), ["Scheme not allowed"]);

        let err = cap
            .fetch(FetchRequest::get("ftp://api.example.com/x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request blocked");
    }

    #[tokio::test]
    async fn test_metadata_endpoint_refused() {
        let cap = FetchCapability::new(
            FetchConfig {
                allowed_schemes: vec!["http".to_string(), "https".to_string()],
                ..FetchConfig::default()
            }
            .allow_host("api.example.com"),
        );
        let reasons: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
        let sink = reasons.clone();
        let cap = cap.on_blocked(Arc::new(move |_op, _t, reason| {
            sink.lock().push(reason.to_string());
        }));

        let err = cap
            .fetch(FetchRequest::get("http://169.254.169.254/latest/meta-data/"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request blocked");
        assert_eq!(reasons.lock().as_slice(), ["Host not allowed"]);
    }

    #[tokio::test]
    async fn test_mapped_ipv6_refused() {
        let cap = FetchCapability::new(
            FetchConfig {
                allowed_schemes: vec!["http".to_string()],
                ..FetchConfig::default()
            }
            .allow_host("*"),
        );
        let err = cap
            .fetch(FetchRequest::get("http://[::ffff:127.0.0.1]/"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request blocked");
        assert!(hosts::is_private_ip("::ffff:127.0.0.1"));
    }

    #[tokio::test]
    async fn test_private_and_localhost_refused_even_when_allowed() {
        // An over-broad allow pattern never overrides the address-space
        // tables.
        let cap = FetchCapability::new(
            FetchConfig {
                allowed_schemes: vec!["http".to_string(), "https".to_string()],
                ..FetchConfig::default()
            }
            .allow_host("*"),
        );
        for url in [
            "http://localhost/",
            "http://127.0.0.1/",
            "http://10.0.0.5/admin",
            "http://192.168.1.1/",
            "http://internal.corp.local/",
            "https://db.internal/",
        ] {
            assert!(cap.fetch(FetchRequest::get(url)).await.is_err(), "{url}");
        }
    }

    #[tokio::test]
    async fn test_host_not_in_allowed_set_refused() {
        let (cap, reasons) = capability_with_reasons();
        let err = cap
            .fetch(FetchRequest::get("https://evil.example.org/"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request blocked");
        assert_eq!(reasons.lock().as_slice(), ["Host not allowed"]);
    }

    #[tokio::test]
    async fn test_blocked_host_pattern_wins_over_allowed() {
        let cap = FetchCapability::new(FetchConfig {
            allowed_hosts: vec!["*.example.com".to_string()],
            blocked_hosts: vec!["staging.example.com".to_string()],
            ..FetchConfig::default()
        });
        assert!(cap
            .fetch(FetchRequest::get("https://staging.example.com/"))
            .await
            .is_err());
    }

    // ── rate window ─────────────────────────────────────────────

    #[test]
    fn test_rate_window_fills_and_reports_retry() {
        let cap = FetchCapability::new(FetchConfig {
            max_requests_per_minute: 2,
            ..FetchConfig::default()
        });
        assert!(cap.take_rate_slot("https://x/").is_ok());
        assert!(cap.take_rate_slot("https://x/").is_ok());
        assert!(cap.take_rate_slot("https://x/").is_err());
    }

    #[test]
    fn test_rate_window_reason_mentions_retry() {
        let reasons: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
        let sink = reasons.clone();
        let cap = FetchCapability::new(FetchConfig {
            max_requests_per_minute: 1,
            ..FetchConfig::default()
        })
        .on_blocked(Arc::new(move |_op, _t, reason| {
            sink.lock().push(reason.to_string());
        }));
        cap.take_rate_slot("u").unwrap();
        cap.take_rate_slot("u").unwrap_err();
        assert!(reasons.lock()[0].starts_with("Rate limit exceeded"));
    }

    // ── headers ─────────────────────────────────────────────────

    #[test]
    fn test_sanitize_headers_drops_blocked() {
        let cap = capability();
        let mut caller = HashMap::new();
        caller.insert("Authorization".to_string(), "Bearer x".to_string());
        caller.insert("Cookie".to_string(), "session=1".to_string());
        caller.insert("X-Forwarded-For".to_string(), "1.2.3.4".to_string());
        caller.insert("Accept".to_string(), "text/html".to_string());

        let headers = cap.sanitize_headers(&caller);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "Accept");
    }

    #[test]
    fn test_sanitize_headers_caller_overrides_default() {
        let mut config = FetchConfig::default();
        config
            .default_headers
            .insert("User-Agent".to_string(), "skilljail/0.1".to_string());
        let cap = FetchCapability::new(config);

        let mut caller = HashMap::new();
        caller.insert("user-agent".to_string(), "custom".to_string());
        let headers = cap.sanitize_headers(&caller);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].1, "custom");
    }

    // ── request parsing ─────────────────────────────────────────

    #[test]
    fn test_from_params() {
        let params = serde_json::json!({
            "url": "https://api.example.com/v1",
            "method": "post",
            "headers": { "Accept": "application/json" },
            "body": "{}"
        });
        let req = FetchRequest::from_params(&params).unwrap();
        assert_eq!(req.url, "https://api.example.com/v1");
        assert_eq!(req.method, "post");
        assert_eq!(req.headers.get("Accept").unwrap(), "application/json");
        assert_eq!(req.body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_from_params_missing_url() {
        let params = serde_json::json!({ "method": "GET" });
        assert!(FetchRequest::from_params(&params).is_err());
    }

    #[tokio::test]
    async fn test_bad_method_refused() {
        let cap = capability();
        let mut req = FetchRequest::get("https://api.example.com/");
        req.method = "NOT A METHOD".to_string();
        assert!(cap.fetch(req).await.is_err());
    }
}
