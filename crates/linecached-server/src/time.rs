use linecached_proto::MAX_RELATIVE_EXPIRE;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Resolves a wire `expire` field into an absolute expiry instant (Unix
/// seconds), or `None` for "no TTL". Per §3: `0` means no TTL, `1..=2_592_000`
/// is relative to now, anything larger is itself an absolute timestamp
/// (possibly already in the past).
pub fn resolve_expire(expire: i64, now: u64) -> Option<u64> {
    if expire == 0 {
        return None;
    }
    if expire <= MAX_RELATIVE_EXPIRE {
        Some(now.saturating_add(expire.max(0) as u64))
    } else {
        Some(expire as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_no_ttl() {
        assert_eq!(resolve_expire(0, 1_000), None);
    }

    #[test]
    fn relative_expire_adds_to_now() {
        assert_eq!(resolve_expire(30, 1_000), Some(1_030));
    }

    #[test]
    fn boundary_at_max_relative_is_still_relative() {
        assert_eq!(
            resolve_expire(MAX_RELATIVE_EXPIRE, 1_000),
            Some(1_000 + MAX_RELATIVE_EXPIRE as u64)
        );
    }

    #[test]
    fn just_past_boundary_is_absolute() {
        let absolute = MAX_RELATIVE_EXPIRE + 1;
        assert_eq!(resolve_expire(absolute, 1_000), Some(absolute as u64));
    }

    #[test]
    fn absolute_timestamp_in_the_past_yields_past_expiry() {
        let absolute = MAX_RELATIVE_EXPIRE + 1;
        let expiry = resolve_expire(absolute, (absolute as u64) + 10_000).unwrap();
        assert!(expiry < (absolute as u64) + 10_000);
    }
}
