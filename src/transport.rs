// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Resilient HTTP Transport
 * Pooled HTTP client with retry, per-origin rate limiting and breaker guard
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::circuit_breaker::BreakerRegistry;
use crate::config::EngineConfig;
use crate::errors::AuditError;
use crate::rate_limiter::HostRateLimiter;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::types::CheckCategory;
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Maximum captured response body (10MB) to prevent memory exhaustion
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

const ENGINE_USER_AGENT: &str =
    "AiVedhaGuard/1.4 (+https://aivedha.ai/guard; security-audit)";

/// Policy applied to a single fetch
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_attempts: u32,
    pub respect_breaker: bool,
    pub follow_redirects: bool,
    /// Breaker partition the attempt is accounted against
    pub category: CheckCategory,
    pub correlation_id: String,
}

impl FetchPolicy {
    pub fn for_check(category: CheckCategory, correlation_id: &str) -> Self {
        Self {
            max_attempts: 3,
            respect_breaker: true,
            follow_redirects: true,
            category,
            correlation_id: correlation_id.to_string(),
        }
    }

    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    pub fn single_attempt(mut self) -> Self {
        self.max_attempts = 1;
        self
    }
}

/// A fully buffered HTTP exchange as seen by the checks
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status_code: u16,
    /// Lowercased header names, in wire order; repeated names preserved
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Negotiated protocol: HTTP/1.1, HTTP/2, HTTP/3
    pub http_version: String,
    pub final_url: String,
    pub duration_ms: u64,
}

impl TransportResponse {
    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        let lowered = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == lowered)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeated header (e.g. Set-Cookie)
    pub fn headers_all(&self, name: &str) -> Vec<&str> {
        let lowered = name.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(|(k, _)| *k == lowered)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status_code)
    }
}

/// Process-wide HTTP transport shared by all audits.
///
/// Every attempt passes breaker admission (when the policy asks for it),
/// then the per-origin token bucket, then the pooled reqwest client.
/// Retries follow the engine backoff policy and only fire for retryable
/// kinds: connection errors, timeouts, 5xx, 408 and 429.
pub struct HttpTransport {
    client: Client,
    client_no_redirect: Client,
    retry: RetryPolicy,
    default_max_attempts: u32,
    rate_limiter: Arc<HostRateLimiter>,
    breakers: Arc<BreakerRegistry>,
}

impl HttpTransport {
    pub fn new(
        config: &EngineConfig,
        breakers: Arc<BreakerRegistry>,
        rate_limiter: Arc<HostRateLimiter>,
    ) -> Result<Self, AuditError> {
        let builder = || {
            Client::builder()
                .user_agent(ENGINE_USER_AGENT)
                .connect_timeout(config.connect_timeout)
                .timeout(config.read_timeout)
                .pool_max_idle_per_host(config.per_host_pool)
                .pool_idle_timeout(config.pool_idle_ttl)
                .gzip(true)
        };

        let client = builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| AuditError::Internal(format!("client build failed: {}", e)))?;
        let client_no_redirect = builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuditError::Internal(format!("client build failed: {}", e)))?;

        Ok(Self {
            client,
            client_no_redirect,
            retry: RetryPolicy::default(),
            default_max_attempts: config.max_attempts,
            rate_limiter,
            breakers,
        })
    }

    /// Origin key for pooling, rate limiting and breakers
    pub fn origin_of(url: &Url) -> String {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port = url
            .port_or_known_default()
            .map(|p| p.to_string())
            .unwrap_or_default();
        format!("{}://{}:{}", scheme, host, port)
    }

    pub async fn get(&self, url: &str, policy: &FetchPolicy) -> Result<TransportResponse, AuditError> {
        self.fetch(Method::GET, url, &[], None, policy).await
    }

    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        policy: &FetchPolicy,
    ) -> Result<TransportResponse, AuditError> {
        self.fetch(Method::GET, url, headers, None, policy).await
    }

    /// Execute one HTTP exchange under the transport's resilience policies.
    ///
    /// Responses with retryable statuses (5xx/408/429) are retried until the
    /// attempt budget runs out, then returned to the caller as-is; checks
    /// inspect `status_code` themselves. Connection-level failures surface
    /// as classified `AuditError` kinds.
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<String>,
        policy: &FetchPolicy,
    ) -> Result<TransportResponse, AuditError> {
        let parsed = Url::parse(url).map_err(|e| AuditError::InvalidTarget {
            reason: format!("{}: {}", url, e),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AuditError::InvalidTarget {
                reason: format!("{}: no host", url),
            })?
            .to_string();
        let origin = Self::origin_of(&parsed);

        let max_attempts = if policy.max_attempts > 0 {
            policy.max_attempts
        } else {
            self.default_max_attempts
        };
        let retry = self.retry.clone().with_max_attempts(max_attempts);

        let result = retry_with_backoff(&retry, url, |attempt| {
            let method = method.clone();
            let url = url.to_string();
            let host = host.clone();
            let origin = origin.clone();
            let body = body.clone();
            let headers: Vec<(String, String)> = headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            async move {
                self.attempt(
                    attempt,
                    max_attempts,
                    method,
                    &url,
                    &host,
                    &origin,
                    &headers,
                    body,
                    policy,
                )
                .await
            }
        })
        .await;

        if let Err(ref err) = result {
            debug!(
                correlation_id = %policy.correlation_id,
                "fetch gave up on {}: {}",
                url, err
            );
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        attempt: u32,
        max_attempts: u32,
        method: Method,
        url: &str,
        host: &str,
        origin: &str,
        headers: &[(String, String)],
        body: Option<String>,
        policy: &FetchPolicy,
    ) -> Result<TransportResponse, AuditError> {
        // The permit stays alive for the whole attempt; if the future is
        // dropped before an outcome is recorded, a half-open probe slot is
        // released rather than wedged.
        let permit = if policy.respect_breaker {
            Some(self.breakers.acquire(host, policy.category).await?)
        } else {
            None
        };
        let limit = self.rate_limiter.acquire(origin).await;
        if let Err(err) = limit {
            // Not the remote host's fault; release the admission un-counted
            drop(permit);
            return Err(err);
        }

        debug!(
            correlation_id = %policy.correlation_id,
            "attempt {}/{} {} {}",
            attempt, max_attempts, method, url
        );

        let client = if policy.follow_redirects {
            &self.client
        } else {
            &self.client_no_redirect
        };
        let mut request = client.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let started = Instant::now();
        let outcome = request.send().await;

        match outcome {
            Ok(response) => {
                let status = response.status().as_u16();
                let retryable_status = status >= 500 || status == 408 || status == 429;
                if policy.respect_breaker {
                    self.breakers
                        .record(host, policy.category, status < 500)
                        .await;
                }

                if retryable_status && attempt < max_attempts {
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    return Err(AuditError::HttpStatus {
                        status,
                        url: url.to_string(),
                        retry_after,
                    });
                }

                self.buffer_response(response, started).await
            }
            Err(err) => {
                if policy.respect_breaker {
                    self.breakers.record(host, policy.category, false).await;
                }
                Err(AuditError::from_reqwest(&err, url))
            }
        }
    }

    async fn buffer_response(
        &self,
        response: reqwest::Response,
        started: Instant,
    ) -> Result<TransportResponse, AuditError> {
        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let http_version = match response.version() {
            reqwest::Version::HTTP_09 => "HTTP/0.9",
            reqwest::Version::HTTP_10 => "HTTP/1.0",
            reqwest::Version::HTTP_11 => "HTTP/1.1",
            reqwest::Version::HTTP_2 => "HTTP/2",
            reqwest::Version::HTTP_3 => "HTTP/3",
            _ => "HTTP/?",
        }
        .to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();

        let final_url_for_err = final_url.clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuditError::from_reqwest(&e, &final_url_for_err))?;
        let truncated = &bytes[..bytes.len().min(MAX_BODY_SIZE)];
        let body = String::from_utf8_lossy(truncated).into_owned();

        Ok(TransportResponse {
            status_code,
            headers,
            body,
            http_version,
            final_url,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Retry-After carries either delta-seconds or an HTTP-date; a date in the
/// past means retry immediately
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_includes_default_port() {
        let url = Url::parse("https://example.org/path").unwrap();
        assert_eq!(HttpTransport::origin_of(&url), "https://example.org:443");
        let url = Url::parse("http://example.org:8080/").unwrap();
        assert_eq!(HttpTransport::origin_of(&url), "http://example.org:8080");
    }

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let response = TransportResponse {
            status_code: 200,
            headers: vec![
                ("strict-transport-security".into(), "max-age=63072000".into()),
                ("set-cookie".into(), "a=1".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
            body: String::new(),
            http_version: "HTTP/2".into(),
            final_url: "https://example.org/".into(),
            duration_ms: 10,
        };
        assert_eq!(
            response.header("Strict-Transport-Security"),
            Some("max-age=63072000")
        );
        assert_eq!(response.headers_all("Set-Cookie").len(), 2);
        assert!(response.header("x-missing").is_none());
    }

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));

        let future = (chrono::Utc::now() + chrono::Duration::seconds(30)).to_rfc2822();
        let parsed = parse_retry_after(&future).unwrap();
        assert!(parsed > Duration::from_secs(20) && parsed <= Duration::from_secs(30));

        let past = (chrono::Utc::now() - chrono::Duration::seconds(30)).to_rfc2822();
        assert_eq!(parse_retry_after(&past), Some(Duration::ZERO));

        assert!(parse_retry_after("soon").is_none());
    }
}
