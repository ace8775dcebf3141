// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Check Registry
 * Declarative catalog of security checks with profiles and dependencies
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::errors::AuditError;
use crate::types::{AuditProfile, CheckCategory};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet, VecDeque};

const HOUR_S: u64 = 3_600;
const DAY_S: u64 = 86_400;

/// Immutable catalog entry describing one check
#[derive(Debug, Clone)]
pub struct CheckSpec {
    /// Stable id, referenced by reports, cache keys and dependencies
    pub id: &'static str,
    pub category: CheckCategory,
    /// Scoring weight, 1..10
    pub weight: u8,
    /// Contribution to the credit debit
    pub cost_units: u32,
    pub default_timeout_ms: u64,
    pub depends_on: &'static [&'static str],
    /// Skip this check when a dependency failed or errored
    pub requires_prereq_pass: bool,
    pub cacheable: bool,
    pub cache_ttl_s: u64,
    /// Smallest profile that includes the check
    pub min_profile: AuditProfile,
}

fn profile_rank(profile: AuditProfile) -> u8 {
    match profile {
        AuditProfile::Basic => 0,
        AuditProfile::Standard => 1,
        AuditProfile::Deep => 2,
    }
}

/// The static check catalog, loaded once at engine startup.
///
/// basic: transport + tls + core headers. standard adds content and
/// cross-origin policy checks. deep adds CT verification, SRI, DoH and
/// WebSocket probes.
pub static CATALOG: Lazy<Vec<CheckSpec>> = Lazy::new(|| {
    vec![
        CheckSpec {
            id: "reachability",
            category: CheckCategory::Transport,
            weight: 3,
            cost_units: 1,
            default_timeout_ms: 15_000,
            depends_on: &[],
            requires_prereq_pass: false,
            cacheable: false,
            cache_ttl_s: 0,
            min_profile: AuditProfile::Basic,
        },
        CheckSpec {
            id: "http_versions",
            category: CheckCategory::Transport,
            weight: 5,
            cost_units: 2,
            default_timeout_ms: 15_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Basic,
        },
        CheckSpec {
            id: "tls_baseline",
            category: CheckCategory::Tls,
            weight: 9,
            cost_units: 2,
            default_timeout_ms: 15_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Basic,
        },
        CheckSpec {
            id: "hsts",
            category: CheckCategory::Headers,
            weight: 8,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Basic,
        },
        CheckSpec {
            id: "csp",
            category: CheckCategory::Headers,
            weight: 8,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Basic,
        },
        CheckSpec {
            id: "content_type_options",
            category: CheckCategory::Headers,
            weight: 4,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Basic,
        },
        CheckSpec {
            id: "frame_protection",
            category: CheckCategory::Headers,
            weight: 5,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Basic,
        },
        CheckSpec {
            id: "referrer_policy",
            category: CheckCategory::Headers,
            weight: 3,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Basic,
        },
        // -- standard --------------------------------------------------
        CheckSpec {
            id: "hsts_preload",
            category: CheckCategory::Tls,
            weight: 6,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["hsts"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: DAY_S,
            min_profile: AuditProfile::Standard,
        },
        CheckSpec {
            id: "cookie_security",
            category: CheckCategory::Content,
            weight: 6,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Standard,
        },
        CheckSpec {
            id: "mixed_content",
            category: CheckCategory::Content,
            weight: 7,
            cost_units: 2,
            default_timeout_ms: 20_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Standard,
        },
        CheckSpec {
            id: "cache_control",
            category: CheckCategory::Content,
            weight: 3,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Standard,
        },
        CheckSpec {
            id: "server_timing",
            category: CheckCategory::Headers,
            weight: 2,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Standard,
        },
        CheckSpec {
            id: "cors_policy",
            category: CheckCategory::Policy,
            weight: 7,
            cost_units: 2,
            default_timeout_ms: 15_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Standard,
        },
        CheckSpec {
            id: "cross_origin_isolation",
            category: CheckCategory::Policy,
            weight: 5,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Standard,
        },
        CheckSpec {
            id: "permissions_policy",
            category: CheckCategory::Policy,
            weight: 4,
            cost_units: 1,
            default_timeout_ms: 10_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Standard,
        },
        // -- deep ------------------------------------------------------
        CheckSpec {
            id: "subresource_integrity",
            category: CheckCategory::Content,
            weight: 6,
            cost_units: 3,
            default_timeout_ms: 25_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: HOUR_S,
            min_profile: AuditProfile::Deep,
        },
        CheckSpec {
            id: "cert_transparency",
            category: CheckCategory::Tls,
            weight: 7,
            cost_units: 3,
            default_timeout_ms: 20_000,
            depends_on: &["tls_baseline"],
            requires_prereq_pass: true,
            cacheable: true,
            cache_ttl_s: DAY_S,
            min_profile: AuditProfile::Deep,
        },
        CheckSpec {
            id: "doh_support",
            category: CheckCategory::Dns,
            weight: 3,
            cost_units: 2,
            default_timeout_ms: 20_000,
            depends_on: &[],
            requires_prereq_pass: false,
            cacheable: true,
            cache_ttl_s: DAY_S,
            min_profile: AuditProfile::Deep,
        },
        CheckSpec {
            id: "websocket_security",
            category: CheckCategory::Transport,
            weight: 4,
            cost_units: 3,
            default_timeout_ms: 20_000,
            depends_on: &["reachability"],
            requires_prereq_pass: true,
            cacheable: false,
            cache_ttl_s: 0,
            min_profile: AuditProfile::Deep,
        },
    ]
});

/// Look up a catalog entry by id
pub fn get(id: &str) -> Option<&'static CheckSpec> {
    CATALOG.iter().find(|spec| spec.id == id)
}

/// Checks selected for a profile
pub fn list(profile: AuditProfile) -> Vec<&'static CheckSpec> {
    CATALOG
        .iter()
        .filter(|spec| profile_rank(spec.min_profile) <= profile_rank(profile))
        .collect()
}

/// Resolve the check set for a request: the profile selection, optionally
/// narrowed to an explicit subset. Dependencies of requested checks are
/// pulled in so the DAG stays closed.
pub fn resolve(
    profile: AuditProfile,
    requested: Option<&[String]>,
) -> Result<Vec<&'static CheckSpec>, AuditError> {
    let selected = list(profile);
    let Some(requested) = requested else {
        return Ok(selected);
    };

    let available: HashMap<&str, &'static CheckSpec> =
        selected.iter().map(|spec| (spec.id, *spec)).collect();
    let mut wanted: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for id in requested {
        let spec = available.get(id.as_str()).ok_or_else(|| {
            AuditError::InvalidTarget {
                reason: format!("unknown check {} for profile {}", id, profile),
            }
        })?;
        queue.push_back(spec.id);
    }
    while let Some(id) = queue.pop_front() {
        if !wanted.insert(id) {
            continue;
        }
        if let Some(spec) = available.get(id) {
            for dep in spec.depends_on {
                queue.push_back(dep);
            }
        }
    }

    Ok(selected
        .into_iter()
        .filter(|spec| wanted.contains(spec.id))
        .collect())
}

/// Kahn topological sort; errors on unknown references or cycles
pub fn topo_sort(
    specs: &[&'static CheckSpec],
) -> Result<Vec<&'static CheckSpec>, AuditError> {
    let ids: HashSet<&str> = specs.iter().map(|s| s.id).collect();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for spec in specs {
        indegree.entry(spec.id).or_insert(0);
        for dep in spec.depends_on {
            if !ids.contains(dep) {
                return Err(AuditError::Internal(format!(
                    "check {} depends on unknown check {}",
                    spec.id, dep
                )));
            }
            *indegree.entry(spec.id).or_insert(0) += 1;
            dependents.entry(dep).or_default().push(spec.id);
        }
    }

    let by_id: HashMap<&str, &'static CheckSpec> =
        specs.iter().map(|spec| (spec.id, *spec)).collect();
    let mut ready: VecDeque<&str> = specs
        .iter()
        .filter(|spec| indegree[spec.id] == 0)
        .map(|spec| spec.id)
        .collect();
    let mut ordered = Vec::with_capacity(specs.len());

    while let Some(id) = ready.pop_front() {
        ordered.push(by_id[id]);
        if let Some(children) = dependents.get(id) {
            for child in children {
                let degree = indegree.get_mut(child).expect("child in indegree map");
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(child);
                }
            }
        }
    }

    if ordered.len() != specs.len() {
        return Err(AuditError::Internal(
            "check dependency graph has a cycle".into(),
        ));
    }
    Ok(ordered)
}

/// Validate the whole catalog; called once at engine construction
pub fn validate_catalog() -> Result<(), AuditError> {
    let all: Vec<&'static CheckSpec> = CATALOG.iter().collect();
    topo_sort(&all)?;
    for spec in &all {
        if spec.weight == 0 || spec.weight > 10 {
            return Err(AuditError::Internal(format!(
                "check {} has out-of-range weight {}",
                spec.id, spec.weight
            )));
        }
        if spec.cacheable && spec.cache_ttl_s == 0 {
            return Err(AuditError::Internal(format!(
                "cacheable check {} has zero TTL",
                spec.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_valid() {
        validate_catalog().unwrap();
    }

    #[test]
    fn profile_sizes() {
        assert_eq!(list(AuditProfile::Basic).len(), 8);
        assert_eq!(list(AuditProfile::Standard).len(), 16);
        assert_eq!(list(AuditProfile::Deep).len(), 20);
    }

    #[test]
    fn topo_sort_respects_dependencies() {
        let specs = list(AuditProfile::Deep);
        let ordered = topo_sort(&specs).unwrap();
        let position: HashMap<&str, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.id, i))
            .collect();
        for spec in &ordered {
            for dep in spec.depends_on {
                assert!(
                    position[dep] < position[spec.id],
                    "{} must come after {}",
                    spec.id,
                    dep
                );
            }
        }
        assert_eq!(ordered[0].id, "reachability");
    }

    #[test]
    fn cycle_is_detected() {
        static A: CheckSpec = CheckSpec {
            id: "a",
            category: CheckCategory::Headers,
            weight: 1,
            cost_units: 1,
            default_timeout_ms: 1_000,
            depends_on: &["b"],
            requires_prereq_pass: false,
            cacheable: false,
            cache_ttl_s: 0,
            min_profile: AuditProfile::Basic,
        };
        static B: CheckSpec = CheckSpec {
            id: "b",
            category: CheckCategory::Headers,
            weight: 1,
            cost_units: 1,
            default_timeout_ms: 1_000,
            depends_on: &["a"],
            requires_prereq_pass: false,
            cacheable: false,
            cache_ttl_s: 0,
            min_profile: AuditProfile::Basic,
        };
        assert!(topo_sort(&[&A, &B]).is_err());
    }

    #[test]
    fn resolve_pulls_in_dependencies() {
        let specs = resolve(
            AuditProfile::Standard,
            Some(&["hsts_preload".to_string()]),
        )
        .unwrap();
        let ids: HashSet<&str> = specs.iter().map(|s| s.id).collect();
        assert!(ids.contains("hsts_preload"));
        assert!(ids.contains("hsts"));
        assert!(ids.contains("reachability"));
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn resolve_rejects_checks_outside_profile() {
        let err = resolve(
            AuditProfile::Basic,
            Some(&["cert_transparency".to_string()]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_target");
    }
}
