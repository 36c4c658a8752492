// tests/retry_policy.rs

use std::time::Duration;

use proptest::prelude::*;

use orchestrator::engine::RetryPolicy;

#[test]
fn backoff_doubles_from_the_base() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff(1), Duration::from_millis(250));
    assert_eq!(policy.backoff(2), Duration::from_millis(500));
    assert_eq!(policy.backoff(3), Duration::from_millis(1000));
}

#[test]
fn backoff_is_capped() {
    let policy = RetryPolicy {
        max_backoff: Duration::from_secs(1),
        ..RetryPolicy::default()
    };
    assert_eq!(policy.backoff(10), Duration::from_secs(1));
    assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(1));
}

#[test]
fn job_limit_overrides_policy_limit() {
    let policy = RetryPolicy::default();
    assert!(policy.allows_retry(1, None));
    assert!(!policy.allows_retry(2, None));
    assert!(policy.allows_retry(4, Some(5)));
    assert!(!policy.allows_retry(0, Some(0)));
    assert!(!RetryPolicy::none().allows_retry(0, None));
}

proptest! {
    #[test]
    fn backoff_never_decreases_and_never_exceeds_cap(retry in 1u32..64, multiplier in 1.0f64..4.0) {
        let policy = RetryPolicy { multiplier, ..RetryPolicy::default() };
        let this = policy.backoff(retry);
        let next = policy.backoff(retry + 1);
        prop_assert!(this <= next);
        prop_assert!(next <= policy.max_backoff);
    }
}
