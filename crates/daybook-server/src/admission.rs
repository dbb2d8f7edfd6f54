//! Admission policies evaluated by the gate.
//!
//! Each policy maps a subject onto the [`CounterStore`] under its own
//! namespace and window. A counter-store failure is logged and the request is
//! allowed: availability wins over strict quota enforcement.
//!
//! Keys roll over at fixed window boundaries, so a client can squeeze up to
//! twice the limit into the span straddling two windows.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tracing::warn;

use daybook_shared::constants::{ENTRY_QUOTA_NAMESPACE, GLOBAL_RATE_NAMESPACE};
use daybook_shared::UserId;

use crate::counter_store::{CounterKey, CounterStore};

const MINUTE: Duration = Duration::from_secs(60);
const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Global per-client volume exceeded; retry shortly.
    TooManyRequests,
    /// Per-user creation quota exhausted; retry next week.
    WeeklyLimitReached,
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self {
            Denial::TooManyRequests => "Too many requests, please try again later.",
            Denial::WeeklyLimitReached => {
                "Weekly entry limit reached. Please try again next week."
            }
        }
    }

    /// Machine-readable code so clients can pick the right guidance.
    pub fn code(&self) -> &'static str {
        match self {
            Denial::TooManyRequests => "rate_limited",
            Denial::WeeklyLimitReached => "weekly_limit_reached",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// The policy does not apply to this request (e.g. no session).
    NotApplicable,
    Denied(Denial),
}

impl Decision {
    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Denied(_))
    }
}

/// A limit of `limit` hits per `window` within one namespace.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub namespace: &'static str,
    pub limit: u64,
    pub window: Duration,
    denial: Denial,
}

impl AdmissionPolicy {
    /// Per-client request volume per minute.
    pub fn global(requests_per_minute: u64) -> Self {
        Self {
            namespace: GLOBAL_RATE_NAMESPACE,
            limit: requests_per_minute,
            window: MINUTE,
            denial: Denial::TooManyRequests,
        }
    }

    /// Per-user entry creations per seven days.
    pub fn weekly_entries(limit: u64) -> Self {
        Self {
            namespace: ENTRY_QUOTA_NAMESPACE,
            limit,
            window: WEEK,
            denial: Denial::WeeklyLimitReached,
        }
    }
}

/// Both admission policies over one shared counter store.
#[derive(Clone)]
pub struct Admission {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock + Send + Sync>,
    global: AdmissionPolicy,
    entry_quota: AdmissionPolicy,
}

impl Admission {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock + Send + Sync>,
        global: AdmissionPolicy,
        entry_quota: AdmissionPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            global,
            entry_quota,
        }
    }

    /// Global volume policy for a client subject (address or `anonymous`).
    pub async fn check_global(&self, subject: &str) -> Decision {
        self.check(&self.global, subject).await
    }

    /// Weekly creation quota. Without an authenticated user the policy defers;
    /// authentication is enforced downstream.
    pub async fn check_entry_quota(&self, user: Option<&UserId>) -> Decision {
        match user {
            Some(user) => self.check(&self.entry_quota, &user.to_string()).await,
            None => Decision::NotApplicable,
        }
    }

    async fn check(&self, policy: &AdmissionPolicy, subject: &str) -> Decision {
        let key = CounterKey::for_window(policy.namespace, subject, policy.window, self.clock.utc());

        match self.store.increment(&key, policy.window).await {
            Ok(count) if count > policy.limit => Decision::Denied(policy.denial),
            Ok(_) => Decision::Allowed,
            Err(e) => {
                warn!(
                    namespace = policy.namespace,
                    subject,
                    error = %e,
                    "Counter store failed, admitting request"
                );
                Decision::Allowed
            }
        }
    }

    /// Drop expired counters from the backing store.
    pub async fn sweep(&self) -> usize {
        self.store.sweep().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_store::LocalCounterStore;
    use crate::test_support::{FailingCounterStore, MutableClock};

    fn admission(clock: &Arc<MutableClock>, global: u64, weekly: u64) -> Admission {
        Admission::new(
            Arc::new(LocalCounterStore::new(clock.clone())),
            clock.clone(),
            AdmissionPolicy::global(global),
            AdmissionPolicy::weekly_entries(weekly),
        )
    }

    #[tokio::test]
    async fn test_limit_plus_one_is_denied() {
        let clock = Arc::new(MutableClock::default());
        let admission = admission(&clock, 3, 5);

        for _ in 0..3 {
            assert_eq!(admission.check_global("1.2.3.4").await, Decision::Allowed);
        }
        assert_eq!(
            admission.check_global("1.2.3.4").await,
            Decision::Denied(Denial::TooManyRequests)
        );
        // Other subjects are unaffected.
        assert_eq!(admission.check_global("5.6.7.8").await, Decision::Allowed);
    }

    #[tokio::test]
    async fn test_exhausted_subject_recovers_next_window() {
        let clock = Arc::new(MutableClock::default());
        let admission = admission(&clock, 1, 5);

        assert_eq!(admission.check_global("1.2.3.4").await, Decision::Allowed);
        assert!(admission.check_global("1.2.3.4").await.is_denied());

        clock.advance(MINUTE);
        assert_eq!(admission.check_global("1.2.3.4").await, Decision::Allowed);
    }

    #[tokio::test]
    async fn test_weekly_quota_per_user() {
        let clock = Arc::new(MutableClock::default());
        let admission = admission(&clock, 100, 5);
        let alice = UserId::new();
        let bob = UserId::new();

        for _ in 0..5 {
            assert_eq!(admission.check_entry_quota(Some(&alice)).await, Decision::Allowed);
        }
        assert_eq!(
            admission.check_entry_quota(Some(&alice)).await,
            Decision::Denied(Denial::WeeklyLimitReached)
        );
        assert_eq!(admission.check_entry_quota(Some(&bob)).await, Decision::Allowed);

        clock.advance(WEEK);
        assert_eq!(admission.check_entry_quota(Some(&alice)).await, Decision::Allowed);
    }

    #[tokio::test]
    async fn test_quota_defers_without_user() {
        let clock = Arc::new(MutableClock::default());
        let admission = admission(&clock, 100, 0);
        assert_eq!(admission.check_entry_quota(None).await, Decision::NotApplicable);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let clock = Arc::new(MutableClock::default());
        let admission = Admission::new(
            Arc::new(FailingCounterStore),
            clock,
            AdmissionPolicy::global(0),
            AdmissionPolicy::weekly_entries(0),
        );

        assert_eq!(admission.check_global("1.2.3.4").await, Decision::Allowed);
        assert_eq!(
            admission.check_entry_quota(Some(&UserId::new())).await,
            Decision::Allowed
        );
    }

    #[test]
    fn test_denials_are_distinguishable() {
        assert_ne!(Denial::TooManyRequests.code(), Denial::WeeklyLimitReached.code());
        assert!(Denial::WeeklyLimitReached.message().contains("next week"));
    }
}
