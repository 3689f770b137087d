use std::{fmt, str::FromStr, time::Duration};

use crate::ParseRuleError;

/// At most `count` hits per caller within any sliding `window`.
///
/// ```
/// use std::time::Duration;
/// use rate_limit::Rule;
///
/// let rule: Rule = "5/minute".parse().unwrap();
///
/// assert_eq!(rule.count(), 5);
/// assert_eq!(rule.window(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rule {
    count: u32,
    window: Duration,
}

impl Rule {
    /// Maximum number of hits in one window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl FromStr for Rule {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((count, period)) = s.split_once('/') else {
            return Err(ParseRuleError::InvalidFormat(s.to_string()));
        };

        let count = count
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|count| *count > 0)
            .ok_or_else(|| ParseRuleError::InvalidCount(s.to_string()))?;

        let window = period_seconds(period).ok_or_else(|| ParseRuleError::UnknownPeriod {
            rule: s.to_string(),
            period: period.trim().to_string(),
        })?;

        Ok(Self {
            count,
            window: Duration::from_secs(window),
        })
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.count, self.window)
    }
}

fn period_seconds(period: &str) -> Option<u64> {
    let seconds = match period.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 60 * 60,
        "d" | "day" | "days" => 24 * 60 * 60,
        _ => return None,
    };

    Some(seconds)
}
