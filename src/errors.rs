// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Audit Engine Error Types
 * Typed error taxonomy for the audit engine with retry classification
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the engine
pub type EngineResult<T> = Result<T, AuditError>;

/// Main audit engine error type
#[derive(Error, Debug, Clone)]
pub enum AuditError {
    /// TCP connection could not be established
    #[error("Connection failed to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// Operation exceeded its deadline
    #[error("Timed out after {duration:?} on {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// DNS resolution failed for a transient reason
    #[error("DNS resolution failed for {host}: {reason}")]
    Dns { host: String, reason: String },

    /// The name does not exist; fatal for the audit
    #[error("Domain does not exist: {host}")]
    DnsNxdomain { host: String },

    /// TLS negotiation or certificate validation failed for good
    #[error("TLS failure for {host}: {reason}")]
    Tls { host: String, reason: String },

    /// TLS handshake failed for a transient reason (reset, timeout, EOF)
    #[error("Transient TLS failure for {host}: {reason}")]
    TlsTransient { host: String, reason: String },

    /// Non-success HTTP status surfaced to the caller
    #[error("HTTP status {status} from {url}")]
    HttpStatus {
        status: u16,
        url: String,
        retry_after: Option<Duration>,
    },

    /// Per-host rate limit queue is saturated
    #[error("Rate limit saturated for {origin}")]
    RateLimited { origin: String },

    /// Circuit breaker is open for the target host
    #[error("Circuit breaker open for {host} ({category})")]
    BreakerOpen { host: String, category: String },

    /// Target failed pre-flight validation; the audit fails fast
    #[error("Invalid audit target: {reason}")]
    InvalidTarget { reason: String },

    /// Audit was cancelled by the caller
    #[error("Audit cancelled")]
    Cancelled,

    /// Unexpected internal failure
    #[error("Internal engine error: {0}")]
    Internal(String),

    /// A credit hold was already committed or refunded
    #[error("Credit hold {hold_id} is already terminal")]
    AlreadyTerminal { hold_id: String },
}

impl AuditError {
    /// Stable machine-readable kind code, surfaced in `CheckResult.error_kind`
    pub fn kind(&self) -> &'static str {
        match self {
            AuditError::Connect { .. } => "connect",
            AuditError::Timeout { .. } => "timeout",
            AuditError::Dns { .. } => "dns",
            AuditError::DnsNxdomain { .. } => "dns_nxdomain",
            AuditError::Tls { .. } => "tls",
            AuditError::TlsTransient { .. } => "tls_transient",
            AuditError::HttpStatus { .. } => "http_status",
            AuditError::RateLimited { .. } => "rate_limited",
            AuditError::BreakerOpen { .. } => "breaker_open",
            AuditError::InvalidTarget { .. } => "invalid_target",
            AuditError::Cancelled => "cancelled",
            AuditError::Internal(_) => "internal",
            AuditError::AlreadyTerminal { .. } => "already_terminal",
        }
    }

    /// Whether the transport layer may retry this failure.
    ///
    /// Connection-level errors and 5xx/408/429 responses are retryable;
    /// fatal input errors and open breakers are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AuditError::Connect { .. }
            | AuditError::Timeout { .. }
            | AuditError::Dns { .. }
            | AuditError::TlsTransient { .. }
            | AuditError::RateLimited { .. } => true,
            AuditError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Whether the whole audit should fail fast before any check runs
    pub fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            AuditError::InvalidTarget { .. } | AuditError::DnsNxdomain { .. }
        )
    }

    /// Server-suggested retry delay, if any (429/503 Retry-After)
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AuditError::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify a reqwest error into an engine error kind
    pub fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        let host = err
            .url()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| url.to_string());
        let detail = source_chain(err);

        if err.is_timeout() {
            return AuditError::Timeout {
                operation: format!("fetch {}", url),
                duration: Duration::ZERO,
            };
        }

        let lowered = detail.to_lowercase();
        if lowered.contains("certificate")
            || lowered.contains("tls")
            || lowered.contains("handshake")
        {
            return tls_error(host, detail);
        }
        if lowered.contains("failed to lookup address")
            || lowered.contains("name or service not known")
            || lowered.contains("nodename nor servname")
        {
            // getaddrinfo failure is indistinguishable from NXDOMAIN here;
            // the resolver pre-flight catches true NXDOMAIN earlier.
            return AuditError::DnsNxdomain { host };
        }
        if lowered.contains("dns") {
            return AuditError::Dns {
                host,
                reason: detail,
            };
        }
        if err.is_connect() {
            return AuditError::Connect {
                url: url.to_string(),
                reason: detail,
            };
        }

        AuditError::Internal(detail)
    }
}

/// A handshake cut short by the network is worth another attempt; a
/// certificate the peer cannot fix mid-audit is not
fn tls_error(host: String, reason: String) -> AuditError {
    let lowered = reason.to_lowercase();
    let transient = lowered.contains("timed out")
        || lowered.contains("timeout")
        || lowered.contains("reset")
        || lowered.contains("eof")
        || lowered.contains("broken pipe");
    if transient && !lowered.contains("certificate") {
        AuditError::TlsTransient { host, reason }
    } else {
        AuditError::Tls { host, reason }
    }
}

/// Flatten a reqwest error's source chain into one line for classification
fn source_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}
