//! Pending checkout intents
//!
//! Webhook payloads carry no tenant id, and for some event shapes no
//! proof that this deployment should own them. This tracker records
//! "this email just opened checkout here" so the webhook handler can
//! accept events it would otherwise have to drop. Best-effort by
//! design: a missed entry only delays the update until the provider's
//! next redelivery, and a stale one expires after the TTL.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long an intent stays valid after checkout opens
pub const PENDING_INTENT_TTL: Duration = Duration::from_secs(5 * 60);

/// Clock abstraction so expiry is testable without sleeping
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock implementation used in production
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// In-memory, single-process intent map keyed by lower-cased email
///
/// The mutex is only held for map operations, never across an await.
/// Last-write-wins on concurrent marks is fine; entries expire lazily
/// on read, so no sweeper task is needed.
pub struct PendingIntents<C: Clock = SystemClock> {
    entries: Mutex<HashMap<String, Instant>>,
    clock: C,
    ttl: Duration,
}

impl PendingIntents<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for PendingIntents<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> PendingIntents<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            ttl: PENDING_INTENT_TTL,
        }
    }

    /// Record that this email just started a checkout, overwriting any
    /// prior entry
    pub fn mark(&self, email: &str) {
        let key = email.to_lowercase();
        let now = self.clock.now();
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, now);
        }
        tracing::debug!(email = %email, "Marked pending checkout intent");
    }

    /// True only if an entry exists and is younger than the TTL.
    /// Detecting an expired entry removes it.
    pub fn is_pending(&self, email: &str) -> bool {
        let key = email.to_lowercase();
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        match entries.get(&key) {
            Some(&marked_at) if now.duration_since(marked_at) < self.ttl => true,
            Some(_) => {
                entries.remove(&key);
                tracing::debug!(email = %email, "Expired pending checkout intent");
                false
            }
            None => false,
        }
    }

    /// Remove the entry unconditionally (called after a successful
    /// reconciliation)
    pub fn clear(&self, email: &str) {
        let key = email.to_lowercase();
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&key);
        }
        tracing::debug!(email = %email, "Cleared pending checkout intent");
    }

    /// Number of live (possibly expired-but-unswept) entries
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Test clock: a fixed origin plus an advanceable offset
    struct FakeClock {
        origin: Instant,
        offset_secs: AtomicU64,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset_secs: AtomicU64::new(0),
            }
        }

        fn advance_secs(&self, secs: u64) {
            self.offset_secs.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for &FakeClock {
        fn now(&self) -> Instant {
            self.origin + Duration::from_secs(self.offset_secs.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn test_mark_then_pending() {
        let clock = FakeClock::new();
        let intents = PendingIntents::with_clock(&clock);

        assert!(!intents.is_pending("b@x.com"));
        intents.mark("b@x.com");
        assert!(intents.is_pending("b@x.com"));
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let clock = FakeClock::new();
        let intents = PendingIntents::with_clock(&clock);

        intents.mark("User@X.com");
        assert!(intents.is_pending("user@x.com"));
        intents.clear("USER@x.COM");
        assert!(!intents.is_pending("user@x.com"));
    }

    #[test]
    fn test_expiry_after_ttl() {
        let clock = FakeClock::new();
        let intents = PendingIntents::with_clock(&clock);

        intents.mark("b@x.com");
        clock.advance_secs(4 * 60);
        assert!(intents.is_pending("b@x.com"));

        clock.advance_secs(2 * 60);
        assert!(!intents.is_pending("b@x.com"));
        // Lazy expiry removed the entry
        assert!(intents.is_empty());
    }

    #[test]
    fn test_clear_is_immediate() {
        let clock = FakeClock::new();
        let intents = PendingIntents::with_clock(&clock);

        intents.mark("b@x.com");
        intents.clear("b@x.com");
        assert!(!intents.is_pending("b@x.com"));
    }

    #[test]
    fn test_remark_resets_ttl() {
        let clock = FakeClock::new();
        let intents = PendingIntents::with_clock(&clock);

        intents.mark("b@x.com");
        clock.advance_secs(4 * 60);
        intents.mark("b@x.com");
        clock.advance_secs(4 * 60);
        // 8 minutes after the first mark, but only 4 after the second
        assert!(intents.is_pending("b@x.com"));
    }
}
