use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Read-time staleness rule. Entries are never evicted, only ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    ttl: Option<Duration>,
}

impl CachePolicy {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// `stored_at` and `now` are milliseconds since the Unix epoch.
    pub fn is_fresh(&self, stored_at: u64, now: u64) -> bool {
        match self.ttl {
            None => true,
            Some(ttl) => now.saturating_sub(stored_at) <= ttl.as_millis() as u64,
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::CachePolicy;

    #[test]
    fn no_ttl_never_expires() {
        assert!(CachePolicy::new(None).is_fresh(0, u64::MAX));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let policy = CachePolicy::new(Some(Duration::from_millis(1_000)));
        assert!(policy.is_fresh(10_000, 11_000));
        assert!(!policy.is_fresh(10_000, 11_001));
    }

    #[test]
    fn clock_going_backwards_keeps_entry_fresh() {
        let policy = CachePolicy::new(Some(Duration::from_millis(1)));
        assert!(policy.is_fresh(10_000, 5_000));
    }
}
