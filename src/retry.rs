use std::time::Duration;

/// A fixed retry budget: how often to re-issue a request and how long to wait
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySetting {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetrySetting {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Budget for settings objects referencing a bucket; buckets provision slowly
/// and the settings API rejects scopes on buckets that are not ready yet.
pub const LONG_RETRY: RetrySetting = RetrySetting::new(6, Duration::from_secs(10));

/// Budget for settings objects referencing a classic web application, which
/// takes even longer to become visible to the settings API.
pub const VERY_LONG_RETRY: RetrySetting = RetrySetting::new(12, Duration::from_secs(10));

struct TimingRule {
    /// A rule fires when all needles of any pattern appear in the body.
    patterns: &'static [&'static [&'static str]],
    setting: RetrySetting,
}

/// Fingerprints of well-known eventual-consistency rejections. These 4xx
/// responses resolve themselves once the platform has propagated state, so
/// they get fixed retry budgets instead of being surfaced immediately.
static KNOWN_TIMING_RULES: &[TimingRule] = &[
    TimingRule {
        patterns: &[&["must have a unique name"]],
        setting: RetrySetting::new(3, Duration::from_secs(5)),
    },
    TimingRule {
        patterns: &[&["Metric selector for numerator is invalid"]],
        setting: RetrySetting::new(3, Duration::from_secs(5)),
    },
    TimingRule {
        patterns: &[
            &["Entity selector is invalid"],
            &["Management-Zone not found"],
            &["Unknown management zone"],
        ],
        setting: RetrySetting::new(3, Duration::from_secs(5)),
    },
    TimingRule {
        patterns: &[&["credential-vault", "was not available"]],
        setting: RetrySetting::new(3, Duration::from_secs(5)),
    },
    TimingRule {
        patterns: &[&["must specify a known request attribute"]],
        setting: RetrySetting::new(3, Duration::from_secs(10)),
    },
    TimingRule {
        patterns: &[&["Unknown application(s)"]],
        setting: RetrySetting::new(5, Duration::from_secs(15)),
    },
];

/// Look up the retry budget for a response body, if it matches a known
/// eventual-consistency fingerprint.
pub fn setting_for_body(body: &str) -> Option<RetrySetting> {
    for rule in KNOWN_TIMING_RULES {
        let fired = rule
            .patterns
            .iter()
            .any(|needles| needles.iter().all(|needle| body.contains(needle)));
        if fired {
            return Some(rule.setting);
        }
    }
    None
}

/// Cap on generic transient retries (5xx / 429 / connection resets).
pub const MAX_TRANSIENT_ATTEMPTS: u32 = 5;

/// Exponential backoff for transient failures, capped at ten seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    let millis = 400u64.saturating_mul(1 << attempt.min(8));
    Duration::from_millis(millis.min(10_000))
}

pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_name_fingerprint_gets_short_budget() {
        let setting = setting_for_body(
            "{\"error\": \"Config must have a unique name, 'x' already exists\"}",
        )
        .expect("fingerprint matches");
        assert_eq!(setting.max_attempts, 3);
        assert_eq!(setting.delay, Duration::from_secs(5));
    }

    #[test]
    fn unknown_applications_fingerprint_gets_long_budget() {
        let setting =
            setting_for_body("Unknown application(s): APPLICATION-1234").expect("fingerprint");
        assert_eq!(setting.max_attempts, 5);
        assert_eq!(setting.delay, Duration::from_secs(15));
    }

    #[test]
    fn credential_vault_requires_both_needles() {
        assert!(setting_for_body("credential-vault entry was not available").is_some());
        assert!(setting_for_body("credential-vault entry missing").is_none());
        assert!(setting_for_body("something was not available").is_none());
    }

    #[test]
    fn unrelated_bodies_do_not_match() {
        assert!(setting_for_body("{\"error\": \"constraint violation\"}").is_none());
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        assert!(backoff_delay(0) < backoff_delay(1));
        assert!(backoff_delay(1) < backoff_delay(3));
        assert_eq!(backoff_delay(20), Duration::from_millis(10_000));
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(429));
        assert!(is_transient_status(500));
        assert!(is_transient_status(503));
        assert!(!is_transient_status(400));
        assert!(!is_transient_status(404));
    }
}
