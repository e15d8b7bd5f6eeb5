// crates/graph-gateway-mcp/src/rate_limit.rs
// ============================================================================
// Module: Rate Limiter
// Description: Fixed-window per-identity request counters.
// Purpose: Bound request volume per caller before signature checks run.
// Dependencies: graph-gateway-config, axum (headers)
// ============================================================================

//! ## Overview
//! Each identity owns a counter and a window start. The first request opens a
//! window; later requests inside the window increment the counter and are
//! rejected once it exceeds the budget. A periodic sweep drops entries whose
//! window ended more than two widths ago, and the table is capped at
//! `max_entries` identities. A new identity arriving at a full table always
//! opens its window; the entry with the oldest window is evicted to make room.
//!
//! Time is supplied by the caller in milliseconds since the Unix epoch so the
//! limiter is deterministic under test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::PoisonError;

use axum::http::HeaderMap;
use graph_gateway_config::RateLimitConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the caller's API key.
const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the proxy chain.
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Bucket shared by unidentifiable callers.
pub const UNKNOWN_IDENTITY: &str = "unknown";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Counter state for one identity.
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    /// Requests seen in the current window.
    count: u32,
    /// Window start (ms since epoch).
    window_start_ms: u64,
}

/// Admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Configured budget per window.
    pub limit: u32,
    /// Requests observed in the current window, including this one.
    pub count: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Window end in Unix seconds, rounded up.
    pub reset_secs: u64,
    /// Seconds until the window ends, set on rejection.
    pub retry_after_secs: Option<u64>,
}

/// Fixed-window rate limiter shared by all HTTP handlers.
#[derive(Debug)]
pub struct RateLimiter {
    /// Limiter settings.
    config: RateLimitConfig,
    /// Counters keyed by identity.
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the limiter settings.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admits or rejects one request for `identity` at `now_ms`.
    #[must_use]
    pub fn admit(&self, identity: &str, now_ms: u64) -> RateDecision {
        let limit = self.config.max_requests;
        let window_ms = self.config.window_ms;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(identity) && entries.len() >= self.config.max_entries {
            sweep_entries(&mut entries, window_ms, now_ms);
            if entries.len() >= self.config.max_entries {
                evict_oldest(&mut entries);
            }
        }
        let entry = entries.entry(identity.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start_ms: now_ms,
        });
        if now_ms.saturating_sub(entry.window_start_ms) >= window_ms {
            entry.count = 0;
            entry.window_start_ms = now_ms;
        }
        entry.count = entry.count.saturating_add(1);
        let window_end_ms = entry.window_start_ms.saturating_add(window_ms);
        let allowed = entry.count <= limit;
        RateDecision {
            allowed,
            limit,
            count: entry.count,
            remaining: limit.saturating_sub(entry.count),
            reset_secs: window_end_ms.div_ceil(1000),
            retry_after_secs: (!allowed)
                .then(|| window_end_ms.saturating_sub(now_ms).div_ceil(1000)),
        }
    }

    /// Drops entries whose window ended more than two widths before `now_ms`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        sweep_entries(&mut entries, self.config.window_ms, now_ms)
    }

    /// Returns the number of tracked identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true when no identities are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable window label for rejection bodies (e.g. `60s`).
    #[must_use]
    pub fn window_label(&self) -> String {
        let window_ms = self.config.window_ms;
        if window_ms % 1000 == 0 {
            format!("{}s", window_ms / 1000)
        } else {
            format!("{window_ms}ms")
        }
    }
}

/// Removes expired entries, returning how many were dropped.
fn sweep_entries(entries: &mut HashMap<String, RateLimitEntry>, window_ms: u64, now_ms: u64) -> usize {
    let before = entries.len();
    let horizon = window_ms.saturating_mul(2);
    entries.retain(|_, entry| now_ms.saturating_sub(entry.window_start_ms) <= horizon);
    before - entries.len()
}

/// Drops the entry whose window started earliest.
fn evict_oldest(entries: &mut HashMap<String, RateLimitEntry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.window_start_ms)
        .map(|(identity, _)| identity.clone());
    if let Some(identity) = oldest {
        entries.remove(&identity);
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Derives the rate-limit identity for an HTTP request.
///
/// Order: `x-api-key`, then the first `x-forwarded-for` hop when trusted, then
/// the peer address, then the shared unknown bucket.
#[must_use]
pub fn request_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if let Some(key) = header_str(headers, API_KEY_HEADER) {
        return key.to_string();
    }
    if trust_forwarded_for
        && let Some(chain) = header_str(headers, FORWARDED_FOR_HEADER)
        && let Some(first) = chain.split(',').map(str::trim).find(|hop| !hop.is_empty())
    {
        return first.to_string();
    }
    peer.map_or_else(|| UNKNOWN_IDENTITY.to_string(), |addr| addr.ip().to_string())
}

/// Returns a trimmed, non-empty header value.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::net::SocketAddr;

    use axum::http::HeaderMap;
    use axum::http::HeaderValue;
    use graph_gateway_config::RateLimitConfig;

    use super::RateLimiter;
    use super::UNKNOWN_IDENTITY;
    use super::request_identity;

    fn limiter(max_requests: u32, window_ms: u64, max_entries: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_ms,
            sweep_interval_ms: 1_000,
            max_entries,
        })
    }

    #[test]
    fn fourth_request_in_window_is_rejected_and_window_resets() {
        let limiter = limiter(3, 60_000, 16);
        let start = 1_700_000_000_000;
        let outcomes: Vec<bool> =
            [0, 2_000, 5_000, 10_000].iter().map(|at| limiter.admit("k", start + at).allowed).collect();
        assert_eq!(outcomes, vec![true, true, true, false]);

        let rejected = limiter.admit("k", start + 10_000);
        assert_eq!(rejected.retry_after_secs, Some(50));
        assert_eq!(rejected.remaining, 0);

        let fresh = limiter.admit("k", start + 60_000);
        assert!(fresh.allowed);
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.remaining, 2);
    }

    #[test]
    fn identities_have_independent_budgets() {
        let limiter = limiter(1, 60_000, 16);
        assert!(limiter.admit("a", 0).allowed);
        assert!(!limiter.admit("a", 1).allowed);
        assert!(limiter.admit("b", 1).allowed);
    }

    #[test]
    fn reset_is_reported_in_unix_seconds() {
        let limiter = limiter(5, 60_000, 16);
        let decision = limiter.admit("k", 1_000_500);
        assert_eq!(decision.reset_secs, 1_061);
        assert_eq!(decision.retry_after_secs, None);
    }

    #[test]
    fn sweep_drops_entries_older_than_two_windows() {
        let limiter = limiter(5, 1_000, 16);
        let _ = limiter.admit("old", 0);
        let _ = limiter.admit("recent", 1_500);
        assert_eq!(limiter.sweep(2_100), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn full_table_admits_new_identities_by_evicting_the_oldest_window() {
        let limiter = limiter(1, 60_000, 3);
        for (junk, at) in [("j1", 0), ("j2", 1), ("j3", 2)] {
            assert!(limiter.admit(junk, at).allowed);
        }
        let first = limiter.admit("legit-key", 1_000);
        assert!(first.allowed);
        assert_eq!(first.count, 1);
        assert_eq!(limiter.len(), 3);

        // j1 had the oldest window and lost its counter.
        assert!(limiter.admit("j1", 1_001).allowed);
        assert!(!limiter.admit("legit-key", 1_002).allowed);
    }

    #[test]
    fn flooded_table_never_rejects_a_first_request() {
        let limiter = limiter(2, 60_000, 64);
        for junk in 0..1_000u64 {
            let _ = limiter.admit(&format!("junk-{junk}"), junk);
        }
        let decision = limiter.admit("legit-key", 1_000);
        assert!(decision.allowed);
        assert_eq!(decision.retry_after_secs, None);
        assert!(limiter.len() <= 64);
    }

    #[test]
    fn window_label_prefers_seconds() {
        assert_eq!(limiter(1, 60_000, 1).window_label(), "60s");
        assert_eq!(limiter(1, 1_500, 1).window_label(), "1500ms");
    }

    #[test]
    fn identity_prefers_api_key_then_forwarded_then_peer() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(request_identity(&headers, None, true), UNKNOWN_IDENTITY);
        assert_eq!(request_identity(&headers, Some(peer), true), "10.0.0.9");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(request_identity(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(request_identity(&headers, Some(peer), false), "10.0.0.9");

        headers.insert("x-api-key", HeaderValue::from_static("sk-123"));
        assert_eq!(request_identity(&headers, Some(peer), true), "sk-123");
    }
}
