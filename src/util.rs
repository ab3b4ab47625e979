//! Shared utility functions.

use axum::http::HeaderMap;

const SECONDS_PER_DAY: i64 = 86_400;

/// Compute the updates-eligibility window end from a product's day count.
/// None means perpetual updates.
pub fn updates_window(updates_exp_days: Option<i64>, base_time: i64) -> Option<i64> {
    updates_exp_days.map(|days| base_time + days * SECONDS_PER_DAY)
}

/// Extract client IP and user-agent from request headers for logging.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Minimal sanity check for customer emails; real validation happens at the
/// mail provider.
pub fn looks_like_email(s: &str) -> bool {
    let s = s.trim();
    s.len() >= 3 && s.contains('@') && !s.starts_with('@') && !s.ends_with('@')
}
