// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Audit Engine Library
 * Exposes the audit engine modules for the CLI and the request handlers
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

pub mod cache;
pub mod checks;
pub mod circuit_breaker;
pub mod config;
pub mod credits;
pub mod engine;
pub mod errors;
pub mod orchestrator;
pub mod preload;
pub mod progress;
pub mod rate_limiter;
pub mod registry;
pub mod report;
pub mod retry;
pub mod stores;
pub mod transport;
pub mod types;
