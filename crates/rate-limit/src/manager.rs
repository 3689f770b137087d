//! Rate limit manager implementation.

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use config::RateLimitConfig;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    clock::{Clock, SystemClock},
    error::{ParseRuleError, RateLimitError},
    request::RateLimitRequest,
    rule::Rule,
};

/// Which rule set a bucket belongs to. Equal rules in different sets count separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Scope {
    Default,
    Operation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    scope: Scope,
    rule: Rule,
    caller: String,
}

/// Admitted hits, oldest first.
type Bucket = VecDeque<Instant>;

/// Manager for sliding-window rate limits.
///
/// Every request is checked against the default rules and against the rules attached to its
/// operation. All of them must pass. A rejected request is not recorded in any bucket.
pub struct RateLimitManager<C: Clock = SystemClock> {
    enabled: bool,
    defaults: Vec<Rule>,
    operations: HashMap<String, Vec<Rule>>,
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
    clock: C,
}

impl RateLimitManager {
    /// Create a manager from configuration, parsing every rule up front.
    pub fn new(config: &RateLimitConfig) -> Result<Self, ParseRuleError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimitManager<C> {
    /// Create a manager from configuration, reading time from `clock`.
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> Result<Self, ParseRuleError> {
        let mut manager = Self {
            enabled: config.enabled,
            defaults: Vec::new(),
            operations: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
            clock,
        };

        for spec in &config.default {
            let rule: Rule = spec.parse()?;

            if !manager.defaults.contains(&rule) {
                manager.defaults.push(rule);
            }
        }

        for (operation, specs) in &config.operations {
            for spec in specs {
                manager.attach_limit(operation.as_str(), spec)?;
            }
        }

        Ok(manager)
    }

    /// Attach an additional rule such as `"5/minute"` to `operation`.
    ///
    /// An operation may carry several rules. Attaching a rule the operation already has is a
    /// no-op.
    pub fn attach_limit(&mut self, operation: impl Into<String>, spec: &str) -> Result<(), ParseRuleError> {
        let rule: Rule = spec.parse()?;
        let rules = self.operations.entry(operation.into()).or_default();

        if !rules.contains(&rule) {
            rules.push(rule);
        }

        Ok(())
    }

    /// Check all applicable rate limits for a request and record the hit if it is admitted.
    pub async fn check_request(&self, request: &RateLimitRequest) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }

        let caller = request.caller_key();

        let attached = request
            .operation
            .as_deref()
            .and_then(|operation| self.operations.get_key_value(operation));

        let keys: Vec<BucketKey> = self
            .defaults
            .iter()
            .map(|rule| (Scope::Default, *rule))
            .chain(attached.into_iter().flat_map(|(operation, rules)| {
                rules.iter().map(move |rule| (Scope::Operation(operation.clone()), *rule))
            }))
            .map(|(scope, rule)| BucketKey {
                scope,
                rule,
                caller: caller.to_string(),
            })
            .collect();

        let mut buckets = self.buckets.lock().await;
        let now = self.clock.now();

        for key in &keys {
            let Some(bucket) = buckets.get_mut(key) else {
                continue;
            };

            purge(bucket, now, key.rule.window());

            if bucket.len() < key.rule.count() as usize {
                continue;
            }

            let retry_after = bucket
                .front()
                .map(|oldest| key.rule.window().saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or_default();

            log::debug!(
                "Rate limit {} exceeded for caller {}, retry after {retry_after:?}",
                key.rule,
                key.caller
            );

            return Err(exceeded(&key.scope, retry_after));
        }

        for key in keys {
            buckets.entry(key).or_default().push_back(now);
        }

        Ok(())
    }

    /// Forget every recorded hit.
    pub async fn reset(&self) {
        self.buckets.lock().await.clear();
    }
}

/// Drop hits that are a full window old or older.
fn purge(bucket: &mut Bucket, now: Instant, window: Duration) {
    while let Some(oldest) = bucket.front() {
        if now.saturating_duration_since(*oldest) < window {
            break;
        }

        bucket.pop_front();
    }
}

fn exceeded(scope: &Scope, retry_after: Duration) -> RateLimitError {
    match scope {
        Scope::Default => RateLimitError::DefaultLimitExceeded { retry_after },
        Scope::Operation(operation) => RateLimitError::OperationLimitExceeded {
            operation: operation.clone(),
            retry_after,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use super::*;
    use crate::ManualClock;

    const LOGIN: &str = "/api/v1/auth/login";

    fn config(default: &[&str], operations: &[(&str, &[&str])]) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            default: default.iter().map(|spec| spec.to_string()).collect(),
            operations: operations
                .iter()
                .map(|(operation, specs)| (operation.to_string(), specs.iter().map(|s| s.to_string()).collect()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn limiter(default: &[&str], operations: &[(&str, &[&str])]) -> (ManualClock, RateLimitManager<ManualClock>) {
        let clock = ManualClock::new();
        let manager = RateLimitManager::with_clock(&config(default, operations), clock.clone()).unwrap();

        (clock, manager)
    }

    fn from(ip: &str) -> RateLimitRequest {
        RateLimitRequest::builder().peer_str(ip).unwrap().operation("/api/v1/revenue").build()
    }

    fn login_from(ip: &str) -> RateLimitRequest {
        RateLimitRequest::builder().peer_str(ip).unwrap().operation(LOGIN).build()
    }

    #[tokio::test]
    async fn sixth_request_in_a_minute_is_rejected() {
        let (clock, manager) = limiter(&["5/minute"], &[]);

        for _ in 0..5 {
            manager.check_request(&from("10.0.0.1")).await.unwrap();
            clock.advance(Duration::from_secs(1));
        }

        let error = manager.check_request(&from("10.0.0.1")).await.unwrap_err();

        // The first hit was five seconds ago.
        assert_eq!(
            error,
            RateLimitError::DefaultLimitExceeded {
                retry_after: Duration::from_secs(55)
            }
        );
        assert_eq!(error.retry_after_secs(), 55);
    }

    #[tokio::test]
    async fn caller_is_admitted_again_once_the_window_passes() {
        let (clock, manager) = limiter(&["5/minute"], &[]);

        for _ in 0..5 {
            manager.check_request(&from("10.0.0.1")).await.unwrap();
        }

        assert!(manager.check_request(&from("10.0.0.1")).await.is_err());

        clock.advance(Duration::from_secs(59));
        assert!(manager.check_request(&from("10.0.0.1")).await.is_err());

        clock.advance(Duration::from_secs(1));
        manager.check_request(&from("10.0.0.1")).await.unwrap();
    }

    #[tokio::test]
    async fn window_slides_hit_by_hit() {
        let (clock, manager) = limiter(&["2/minute"], &[]);

        manager.check_request(&from("10.0.0.1")).await.unwrap();
        clock.advance(Duration::from_secs(30));
        manager.check_request(&from("10.0.0.1")).await.unwrap();
        clock.advance(Duration::from_secs(30));

        // The first hit expired, the second one is still in the window.
        manager.check_request(&from("10.0.0.1")).await.unwrap();

        let error = manager.check_request(&from("10.0.0.1")).await.unwrap_err();
        assert_eq!(error.retry_after(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let (_, manager) = limiter(&["1/hour"], &[]);

        manager.check_request(&from("10.0.0.1")).await.unwrap();
        assert!(manager.check_request(&from("10.0.0.1")).await.is_err());

        manager.reset().await;

        manager.check_request(&from("10.0.0.1")).await.unwrap();
    }

    #[tokio::test]
    async fn callers_are_limited_separately() {
        let (_, manager) = limiter(&["1/minute"], &[]);

        manager.check_request(&from("10.0.0.1")).await.unwrap();
        manager.check_request(&from("10.0.0.2")).await.unwrap();

        let forwarded = RateLimitRequest::builder()
            .forwarded_for("203.0.113.7")
            .peer_str("10.0.0.1")
            .unwrap()
            .build();

        manager.check_request(&forwarded).await.unwrap();
        assert!(manager.check_request(&from("10.0.0.1")).await.is_err());
    }

    #[tokio::test]
    async fn operation_limit_applies_on_top_of_default() {
        let (_, manager) = limiter(&["100/minute"], &[(LOGIN, &["5/minute"])]);

        for _ in 0..5 {
            manager.check_request(&login_from("10.0.0.1")).await.unwrap();
        }

        let error = manager.check_request(&login_from("10.0.0.1")).await.unwrap_err();

        assert!(matches!(
            error,
            RateLimitError::OperationLimitExceeded { ref operation, .. } if operation == LOGIN
        ));

        // Other operations still have room under the default rule.
        manager.check_request(&from("10.0.0.1")).await.unwrap();
    }

    #[tokio::test]
    async fn default_limit_applies_to_operations_with_looser_rules() {
        let (_, manager) = limiter(&["3/minute"], &[(LOGIN, &["10/minute"])]);

        manager.check_request(&from("10.0.0.1")).await.unwrap();
        manager.check_request(&login_from("10.0.0.1")).await.unwrap();
        manager.check_request(&login_from("10.0.0.1")).await.unwrap();

        let error = manager.check_request(&login_from("10.0.0.1")).await.unwrap_err();

        assert!(matches!(error, RateLimitError::DefaultLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn rejected_requests_are_not_recorded() {
        let (clock, manager) = limiter(&["3/minute"], &[(LOGIN, &["1/minute"])]);

        manager.check_request(&login_from("10.0.0.1")).await.unwrap();

        for _ in 0..5 {
            assert!(manager.check_request(&login_from("10.0.0.1")).await.is_err());
        }

        // Only the admitted login counts against the default rule.
        manager.check_request(&from("10.0.0.1")).await.unwrap();
        manager.check_request(&from("10.0.0.1")).await.unwrap();
        assert!(manager.check_request(&from("10.0.0.1")).await.is_err());

        clock.advance(Duration::from_secs(60));
        manager.check_request(&login_from("10.0.0.1")).await.unwrap();
    }

    #[tokio::test]
    async fn operation_with_several_rules_needs_all_of_them() {
        let (clock, manager) = limiter(&[], &[(LOGIN, &["2/second", "3/minute"])]);

        manager.check_request(&login_from("10.0.0.1")).await.unwrap();
        manager.check_request(&login_from("10.0.0.1")).await.unwrap();
        assert!(manager.check_request(&login_from("10.0.0.1")).await.is_err());

        clock.advance(Duration::from_secs(1));
        manager.check_request(&login_from("10.0.0.1")).await.unwrap();

        clock.advance(Duration::from_secs(1));
        let error = manager.check_request(&login_from("10.0.0.1")).await.unwrap_err();
        assert_eq!(error.retry_after(), Duration::from_secs(58));
    }

    #[tokio::test]
    async fn attached_limits_accumulate() {
        let (_, mut manager) = limiter(&[], &[]);

        manager.attach_limit(LOGIN, "2/minute").unwrap();
        manager.attach_limit(LOGIN, "2/min").unwrap();
        manager.attach_limit(LOGIN, "1/hour").unwrap();

        manager.check_request(&login_from("10.0.0.1")).await.unwrap();
        assert!(manager.check_request(&login_from("10.0.0.1")).await.is_err());
    }

    #[tokio::test]
    async fn invalid_rules_fail_at_registration() {
        let (_, mut manager) = limiter(&[], &[]);

        let error = manager.attach_limit(LOGIN, "5/fortnight").unwrap_err();
        assert!(matches!(error, ParseRuleError::UnknownPeriod { .. }));

        let result = RateLimitManager::new(&config(&["100/minute"], &[(LOGIN, &["five/minute"])]));
        assert!(matches!(result, Err(ParseRuleError::InvalidCount(_))));
    }

    #[tokio::test]
    async fn disabled_manager_admits_everything() {
        let mut config = config(&["1/minute"], &[]);
        config.enabled = false;

        let manager = RateLimitManager::new(&config).unwrap();

        for _ in 0..10 {
            manager.check_request(&from("10.0.0.1")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn requests_without_operation_only_see_default_rules() {
        let (_, manager) = limiter(&["2/minute"], &[(LOGIN, &["1/minute"])]);
        let request = RateLimitRequest::builder().build();

        manager.check_request(&request).await.unwrap();
        manager.check_request(&request).await.unwrap();
        assert!(manager.check_request(&request).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checks_never_over_admit() {
        let (_, manager) = limiter(&["10/minute"], &[]);
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.check_request(&from("10.0.0.1")).await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 10);
    }
}
