//! Bounded retry policy
//!
//! A policy only describes the schedule. [`RetryPolicy::run`] drives an
//! attempt closure against any [`Clock`], so a manual clock makes the backoff
//! observable in tests without sleeping.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{IrError, IrResult};

/// Attempts, backoff and settle delay for one send path
///
/// Config sections go through [`protocol_section`] or [`raw_section`], so a
/// section that names only some fields keeps its own path's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,
    /// Delay between a failed attempt and the next one
    pub backoff_ms: u64,
    /// Delay before every attempt
    pub settle_ms: u64,
}

impl RetryPolicy {
    /// Protocol-encoder sends: 3 attempts, 200 ms apart
    pub const fn protocol() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 200,
            settle_ms: 0,
        }
    }

    /// Raw pulse-train sends: 2 attempts, 100 ms apart, 10 ms settle
    pub const fn raw() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 100,
            settle_ms: 10,
        }
    }

    /// Single attempt, no delays
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
            settle_ms: 0,
        }
    }

    pub fn validate(&self, section: &str) -> IrResult<()> {
        if self.max_attempts == 0 {
            return Err(IrError::Config(format!(
                "{}.max_attempts must be at least 1",
                section
            )));
        }
        Ok(())
    }

    /// Run `attempt` until it succeeds or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. On exhaustion the
    /// last error is returned together with the number of attempts made.
    /// An error that is not [recoverable](IrError::is_recoverable) ends the
    /// run at once.
    pub fn run<T, C, F>(&self, clock: &C, label: &str, mut attempt: F) -> Result<T, (IrError, u32)>
    where
        C: Clock + ?Sized,
        F: FnMut(u32) -> IrResult<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last = IrError::TransmitFailed { attempts: 0 };
        for n in 1..=attempts {
            if self.settle_ms > 0 {
                clock.delay_ms(self.settle_ms);
            }
            match attempt(n) {
                Ok(value) => {
                    debug!(path = label, attempt = n, "Attempt succeeded");
                    return Ok(value);
                }
                Err(e) if !e.is_recoverable() => {
                    warn!(path = label, attempt = n, "Attempt failed, not retrying: {}", e);
                    return Err((e, n));
                }
                Err(e) => {
                    warn!(path = label, attempt = n, of = attempts, "Attempt failed: {}", e);
                    last = e;
                }
            }
            if n < attempts && self.backoff_ms > 0 {
                clock.delay_ms(self.backoff_ms);
            }
        }
        Err((last, attempts))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::protocol()
    }
}

/// Fields given in a config section
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RetrySection {
    max_attempts: Option<u32>,
    backoff_ms: Option<u64>,
    settle_ms: Option<u64>,
}

impl RetrySection {
    fn over(self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            backoff_ms: self.backoff_ms.unwrap_or(base.backoff_ms),
            settle_ms: self.settle_ms.unwrap_or(base.settle_ms),
        }
    }
}

/// Deserialize a retry section, filling absent fields from [`RetryPolicy::protocol`]
pub fn protocol_section<'de, D: Deserializer<'de>>(d: D) -> Result<RetryPolicy, D::Error> {
    RetrySection::deserialize(d).map(|s| s.over(RetryPolicy::protocol()))
}

/// Deserialize a retry section, filling absent fields from [`RetryPolicy::raw`]
pub fn raw_section<'de, D: Deserializer<'de>>(d: D) -> Result<RetryPolicy, D::Error> {
    RetrySection::deserialize(d).map(|s| s.over(RetryPolicy::raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_first_try_success_no_delay() {
        let clock = ManualClock::new();
        let r = RetryPolicy::protocol().run(&clock, "test", |_| Ok::<_, IrError>(7));
        assert_eq!(r, Ok(7));
        assert_eq!(clock.now_millis(), 0);
    }

    #[test]
    fn test_backoff_between_failures() {
        let clock = ManualClock::new();
        let mut seen = Vec::new();
        let r = RetryPolicy::protocol().run(&clock, "test", |n| {
            seen.push((n, clock.now_millis()));
            if n < 3 {
                Err(IrError::Hardware("busy".into()))
            } else {
                Ok(())
            }
        });
        assert!(r.is_ok());
        assert_eq!(seen, vec![(1, 0), (2, 200), (3, 400)]);
    }

    #[test]
    fn test_exhaustion_reports_attempts() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let r: Result<(), _> = RetryPolicy::raw().run(&clock, "raw", |_| {
            calls += 1;
            Err(IrError::Hardware("no ack".into()))
        });
        let (err, attempts) = r.unwrap_err();
        assert_eq!(attempts, 2);
        assert_eq!(calls, 2);
        assert_eq!(err, IrError::Hardware("no ack".into()));
        // settle, attempt, backoff, settle, attempt
        assert_eq!(clock.now_millis(), 10 + 100 + 10);
    }

    #[test]
    fn test_unsupported_is_not_retried() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let r: Result<(), _> = RetryPolicy::protocol().run(&clock, "protocol", |_| {
            calls += 1;
            Err(IrError::Unsupported("no RC6 encoder".into()))
        });
        let (err, attempts) = r.unwrap_err();
        assert_eq!((calls, attempts), (1, 1));
        assert!(matches!(err, IrError::Unsupported(_)));
        assert_eq!(clock.now_millis(), 0);
    }

    #[derive(Debug, Deserialize)]
    struct Sections {
        #[serde(deserialize_with = "protocol_section")]
        protocol: RetryPolicy,
        #[serde(deserialize_with = "raw_section")]
        raw: RetryPolicy,
    }

    #[test]
    fn test_partial_sections_keep_path_defaults() {
        let yaml = "protocol:\n  backoff_ms: 250\nraw:\n  max_attempts: 4\n";
        let s: Sections = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            s.protocol,
            RetryPolicy {
                backoff_ms: 250,
                ..RetryPolicy::protocol()
            }
        );
        assert_eq!(
            s.raw,
            RetryPolicy {
                max_attempts: 4,
                backoff_ms: 100,
                settle_ms: 10,
            }
        );
        assert!(serde_yaml::from_str::<Sections>("protocol: {retries: 2}\nraw: {}\n").is_err());
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let clock = ManualClock::new();
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::once()
        };
        let mut calls = 0;
        let _ = policy.run(&clock, "x", |_| {
            calls += 1;
            Err::<(), _>(IrError::Hardware("x".into()))
        });
        assert_eq!(calls, 1);
        assert!(policy.validate("transmit.raw_retry").is_err());
    }
}
