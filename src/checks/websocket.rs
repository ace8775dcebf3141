// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - WebSocket Security Check
 * Discovers WebSocket endpoints from the root document, flags unencrypted
 * ws:// transport and missing Origin enforcement
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use super::{CheckContext, CheckOutcome, SecurityCheck};
use crate::errors::AuditError;
use crate::types::{Finding, Severity};
use async_trait::async_trait;
use futures_util::SinkExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{debug, info};
use url::Url;

static WS_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bwss?://[^\s"'<>\\)]+"#).unwrap());

const PROBE_PATHS: &[&str] = &["/ws", "/websocket"];
const FOREIGN_ORIGIN: &str = "https://audit-probe.aivedha.invalid";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Absolute ws:// and wss:// URLs referenced in a document body
pub fn discover_ws_urls(body: &str) -> Vec<String> {
    let mut urls: Vec<String> = WS_URL_RE
        .find_iter(body)
        .map(|m| m.as_str().trim_end_matches(&['.', ',', ';'][..]).to_string())
        .collect();
    urls.sort();
    urls.dedup();
    urls
}

enum HandshakeResult {
    Accepted,
    Rejected(u16),
    Unreachable(String),
}

pub struct WebSocketSecurityCheck;

impl WebSocketSecurityCheck {
    /// Attempt a handshake, optionally asserting a cross-site Origin
    async fn handshake(&self, ws_url: &str, origin: Option<&str>) -> HandshakeResult {
        let parsed = match Url::parse(ws_url) {
            Ok(u) => u,
            Err(e) => return HandshakeResult::Unreachable(e.to_string()),
        };
        let host = parsed.host_str().unwrap_or("localhost").to_string();

        let mut builder = tungstenite::handshake::client::Request::builder()
            .uri(ws_url)
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            );
        if let Some(origin) = origin {
            builder = builder.header("Origin", origin);
        }
        let request = match builder.body(()) {
            Ok(req) => req,
            Err(e) => return HandshakeResult::Unreachable(e.to_string()),
        };

        match timeout(HANDSHAKE_TIMEOUT, connect_async(request)).await {
            Ok(Ok((mut stream, _response))) => {
                let _ = stream.send(tungstenite::Message::Close(None)).await;
                HandshakeResult::Accepted
            }
            Ok(Err(tungstenite::Error::Http(response))) => {
                HandshakeResult::Rejected(response.status().as_u16())
            }
            Ok(Err(e)) => HandshakeResult::Unreachable(e.to_string()),
            Err(_) => HandshakeResult::Unreachable("handshake timed out".into()),
        }
    }

    /// Endpoints referenced by the root document plus conventional paths
    /// that answer an upgrade
    async fn discover(&self, ctx: &CheckContext) -> Result<Vec<String>, AuditError> {
        let root = ctx.root().await?;
        let mut endpoints = discover_ws_urls(&root.body);

        if endpoints.is_empty() {
            for path in PROBE_PATHS {
                let candidate = format!("wss://{}{}", ctx.host, path);
                match self.handshake(&candidate, None).await {
                    HandshakeResult::Accepted => endpoints.push(candidate),
                    HandshakeResult::Rejected(status) if status != 404 => {
                        debug!("[WebSocket] {} answered upgrade with {}", candidate, status);
                    }
                    _ => {}
                }
            }
        }
        Ok(endpoints)
    }
}

#[async_trait]
impl SecurityCheck for WebSocketSecurityCheck {
    fn id(&self) -> &'static str {
        "websocket_security"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<CheckOutcome, AuditError> {
        info!("[WebSocket] Scanning: {}", ctx.host);

        let endpoints = tokio::select! {
            endpoints = self.discover(ctx) => endpoints?,
            _ = ctx.cancel.cancelled() => return Err(AuditError::Cancelled),
        };
        if endpoints.is_empty() {
            return Ok(CheckOutcome::pass(100).with_findings(vec![Finding::new(
                Severity::Info,
                "WS_NONE_DETECTED",
                "No WebSocket endpoints referenced by the target",
            )]));
        }

        let mut findings = Vec::new();
        let mut score: i64 = 100;

        let insecure: Vec<&String> = endpoints
            .iter()
            .filter(|u| u.to_ascii_lowercase().starts_with("ws://"))
            .collect();
        if !insecure.is_empty() {
            score -= 60;
            findings.push(
                Finding::new(
                    Severity::High,
                    "WS_INSECURE_SCHEME",
                    format!(
                        "{} WebSocket endpoint(s) use unencrypted ws:// transport",
                        insecure.len()
                    ),
                )
                .with_evidence(
                    insecure
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
            );
        }

        // One origin probe against the first encrypted endpoint is enough
        // to judge enforcement for the deployment.
        if let Some(secure) = endpoints
            .iter()
            .find(|u| u.to_ascii_lowercase().starts_with("wss://"))
        {
            let probed = tokio::select! {
                result = self.handshake(secure, Some(FOREIGN_ORIGIN)) => result,
                _ = ctx.cancel.cancelled() => return Err(AuditError::Cancelled),
            };
            match probed {
                HandshakeResult::Accepted => {
                    score -= 50;
                    findings.push(
                        Finding::new(
                            Severity::High,
                            "WS_ORIGIN_NOT_ENFORCED",
                            "WebSocket endpoint accepts handshakes from a \
                             cross-site Origin",
                        )
                        .with_evidence(format!("{} accepted Origin {}", secure, FOREIGN_ORIGIN)),
                    );
                }
                HandshakeResult::Rejected(status) => {
                    findings.push(Finding::new(
                        Severity::Info,
                        "WS_ORIGIN_ENFORCED",
                        format!("Cross-site Origin rejected with status {}", status),
                    ));
                }
                HandshakeResult::Unreachable(reason) => {
                    findings.push(
                        Finding::new(
                            Severity::Info,
                            "WS_PROBE_INCONCLUSIVE",
                            "Origin enforcement probe could not complete a handshake",
                        )
                        .with_evidence(reason),
                    );
                }
            }
        }

        let score = score.max(0) as u8;
        let status = if findings.iter().any(|f| f.severity >= Severity::High) {
            CheckOutcome::fail(score, findings)
        } else if score < 100 {
            CheckOutcome::warn(score, findings)
        } else {
            CheckOutcome::pass(score).with_findings(findings)
        };
        Ok(status)
    }
}
