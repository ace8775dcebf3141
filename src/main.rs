// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Audit CLI
 * Runs the audit engine locally with in-memory collaborators
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use aivedha_guard::config::EngineConfig;
use aivedha_guard::engine::AuditEngine;
use aivedha_guard::registry;
use aivedha_guard::stores::{
    Collaborators, MemoryCacheStore, MemoryCreditService, MemoryProgressChannel,
    MemoryProgressLog, MemoryReportStore,
};
use aivedha_guard::types::{AuditProfile, AuditRequest, UserContext, ENGINE_VERSION};

#[derive(Parser)]
#[command(name = "guard", version, about = "AiVedha Guard security audit engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Audit a target URL and print the report
    Audit {
        /// Target URL, e.g. https://example.org/
        url: String,

        /// Audit profile: basic, standard or deep
        #[arg(long, default_value = "standard")]
        profile: String,

        /// Comma-separated subset of check ids to run
        #[arg(long)]
        checks: Option<String>,

        /// Print the raw report JSON instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// List the checks a profile selects
    Checks {
        #[arg(long, default_value = "deep")]
        profile: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Audit {
            url,
            profile,
            checks,
            json,
        } => audit(url, profile, checks, json).await,
        Command::Checks { profile } => list_checks(profile),
    }
}

fn parse_profile(profile: &str) -> Result<AuditProfile> {
    AuditProfile::parse(profile)
        .ok_or_else(|| anyhow!("unknown profile {} (basic|standard|deep)", profile))
}

async fn audit(url: String, profile: String, checks: Option<String>, json: bool) -> Result<()> {
    let profile = parse_profile(&profile)?;
    let requested_checks = checks.map(|list| {
        list.split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>()
    });

    let channel = Arc::new(MemoryProgressChannel::new());
    let collaborators = Collaborators {
        reports: Arc::new(MemoryReportStore::new()),
        cache: Arc::new(MemoryCacheStore::new()),
        credits: Arc::new(MemoryCreditService::new()),
        progress_log: Arc::new(MemoryProgressLog::new()),
        progress_channel: channel.clone(),
    };
    let engine = AuditEngine::new(EngineConfig::from_env(), collaborators)
        .map_err(|e| anyhow!("engine construction failed: {}", e))?;

    // Live progress on stderr while the audit runs
    let mut events = channel.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            eprintln!(
                "[{:>3}%] {:?}/{:?} {}",
                event.percent, event.phase, event.state, event.detail
            );
        }
    });

    let request = AuditRequest {
        target_url: url,
        profile,
        requested_checks,
        user: UserContext {
            user_id: "cli".to_string(),
            plan: "local".to_string(),
            credit_hold_id: Uuid::new_v4().to_string(),
        },
        correlation_id: Uuid::new_v4().to_string(),
    };

    info!("guard v{} auditing {}", ENGINE_VERSION, request.target_url);
    let report = engine
        .invoke_audit(&request)
        .await
        .map_err(|e| anyhow!("audit failed: {}", e))?;
    printer.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "{}  [{}]  score {}/100",
        report.target_url,
        report.profile,
        report.overall_score
    );
    for (category, score) in &report.categories {
        println!("  {:<12} {:>3}", category, score);
    }
    println!();
    for check in &report.checks {
        println!(
            "  {:<24} {:<8} {:>3}  {}ms{}",
            check.check_id,
            check.status.as_str(),
            check.score,
            check.duration_ms,
            if check.from_cache { "  (cached)" } else { "" }
        );
        for finding in &check.findings {
            println!("      [{}] {} - {}", finding.severity, finding.code, finding.message);
        }
    }
    Ok(())
}

fn list_checks(profile: String) -> Result<()> {
    let profile = parse_profile(&profile)?;
    for spec in registry::list(profile) {
        println!(
            "{:<24} {:<10} weight {:>2}  cost {:>2}  {}",
            spec.id,
            spec.category.as_str(),
            spec.weight,
            spec.cost_units,
            if spec.cacheable { "cacheable" } else { "uncached" }
        );
    }
    Ok(())
}
