// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - HSTS Preload Snapshot
 * Compiled-in snapshot of the browser preload list for offline lookups
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use once_cell::sync::Lazy;
use std::collections::HashSet;

static SNAPSHOT_RAW: &str = include_str!("../data/hsts_preload.txt");

static SNAPSHOT: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    SNAPSHOT_RAW
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
});

/// Offline membership test against the shipped preload snapshot.
///
/// Preload entries cover subdomains, so `www.github.com` matches the
/// `github.com` entry. Whole preloaded TLDs (`google`, `dev`, …) match any
/// host beneath them.
pub fn contains(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let mut suffix = host.as_str();
    loop {
        if SNAPSHOT.contains(suffix) {
            return true;
        }
        match suffix.split_once('.') {
            Some((_, rest)) => suffix = rest,
            None => return false,
        }
    }
}

/// Snapshot size, exposed for report metadata and sanity tests
pub fn snapshot_len() -> usize {
    SNAPSHOT.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(contains("github.com"));
        assert!(contains("paypal.com"));
        assert!(!contains("definitely-not-preloaded.example"));
    }

    #[test]
    fn subdomains_match_parent_entry() {
        assert!(contains("www.github.com"));
        assert!(contains("deep.nested.stripe.com"));
    }

    #[test]
    fn preloaded_tld_matches() {
        assert!(contains("anything.google"));
        assert!(contains("my-site.dev"));
    }

    #[test]
    fn normalization() {
        assert!(contains("GitHub.COM"));
        assert!(contains("github.com."));
    }

    #[test]
    fn snapshot_is_nonempty() {
        assert!(snapshot_len() > 40);
    }
}
