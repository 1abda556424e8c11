//! Freshness arithmetic for stored credentials.
//!
//! Every check takes the current instant explicitly so it can be evaluated
//! against any clock. A missing or malformed credential is never usable and
//! always needs renewal.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::duration_secs;
use crate::models::Credential;

/// Minimum remaining lifetime for a credential to be handed out (5 minutes).
pub const DEFAULT_FRESH_WINDOW_SECS: u64 = 5 * 60;

/// Remaining lifetime at which proactive renewal kicks in (10 minutes).
pub const DEFAULT_RENEW_WINDOW_SECS: u64 = 10 * 60;

/// Background check cadence (5 minutes).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5 * 60;

/// Time windows governing credential freshness and the monitor cadence.
///
/// `renew_window` is normally wider than `fresh_window`, so a credential can be
/// usable and already due for renewal at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    #[serde(rename = "fresh_window_secs", with = "duration_secs")]
    pub fresh_window: std::time::Duration,
    #[serde(rename = "renew_window_secs", with = "duration_secs")]
    pub renew_window: std::time::Duration,
    #[serde(rename = "poll_interval_secs", with = "duration_secs")]
    pub poll_interval: std::time::Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fresh_window: std::time::Duration::from_secs(DEFAULT_FRESH_WINDOW_SECS),
            renew_window: std::time::Duration::from_secs(DEFAULT_RENEW_WINDOW_SECS),
            poll_interval: std::time::Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

/// Derived freshness of a credential at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Usable and not yet inside the renewal window.
    Valid,
    /// Not expired, but inside the renewal window.
    RenewDue,
    /// Absent, malformed, or past its expiry.
    Expired,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Freshness::Valid => "valid",
            Freshness::RenewDue => "renewal due",
            Freshness::Expired => "expired",
        })
    }
}

/// The instant `duration` before the credential expires.
fn before_expiry(credential: &Credential, duration: std::time::Duration) -> DateTime<Utc> {
    Duration::from_std(duration)
        .ok()
        .and_then(|d| credential.expires_at().checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn usable_credential(credential: Option<&Credential>) -> Option<&Credential> {
    credential.filter(|c| c.is_well_formed())
}

impl Thresholds {
    /// True iff `now < expires_at - fresh_window`.
    pub fn is_usable(&self, credential: Option<&Credential>, now: DateTime<Utc>) -> bool {
        match usable_credential(credential) {
            Some(c) => now < before_expiry(c, self.fresh_window),
            None => false,
        }
    }

    /// True iff the credential is absent or malformed, or `now >= expires_at - renew_window`.
    pub fn needs_renewal(&self, credential: Option<&Credential>, now: DateTime<Utc>) -> bool {
        match usable_credential(credential) {
            Some(c) => now >= before_expiry(c, self.renew_window),
            None => true,
        }
    }

    /// Classify using both checks independently.
    pub fn classify(&self, credential: Option<&Credential>, now: DateTime<Utc>) -> Freshness {
        if remaining(credential, now).is_zero() {
            Freshness::Expired
        } else if self.needs_renewal(credential, now) {
            Freshness::RenewDue
        } else {
            Freshness::Valid
        }
    }
}

/// Lifetime left at `now`, never negative. Zero for absent or malformed credentials.
pub fn remaining(credential: Option<&Credential>, now: DateTime<Utc>) -> Duration {
    match usable_credential(credential) {
        Some(c) => (c.expires_at() - now).max(Duration::zero()),
        None => Duration::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scope;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    /// Credential with `lifetime` seconds total and `left` seconds remaining at `now()`.
    fn credential(lifetime: i64, left: i64) -> Credential {
        let issued_at = now() - Duration::seconds(lifetime - left);
        Credential::new("token", issued_at, lifetime as u64, Scope::default())
    }

    #[test]
    fn test_ten_minutes_left_is_usable_and_renew_due() {
        let thresholds = Thresholds::default();
        let c = credential(3600, 600);

        assert_eq!(remaining(Some(&c), now()).num_milliseconds(), 600_000);
        assert!(thresholds.is_usable(Some(&c), now()));
        assert!(thresholds.needs_renewal(Some(&c), now()));
        assert_eq!(thresholds.classify(Some(&c), now()), Freshness::RenewDue);
    }

    #[test]
    fn test_usable_boundary_is_exclusive() {
        let thresholds = Thresholds::default();
        assert!(thresholds.is_usable(Some(&credential(3600, 301)), now()));
        assert!(!thresholds.is_usable(Some(&credential(3600, 300)), now()));
    }

    #[test]
    fn test_renewal_boundary_is_inclusive() {
        let thresholds = Thresholds::default();
        assert!(!thresholds.needs_renewal(Some(&credential(3600, 601)), now()));
        assert!(thresholds.needs_renewal(Some(&credential(3600, 600)), now()));
    }

    #[test]
    fn test_usable_whenever_more_than_fresh_window_left() {
        let thresholds = Thresholds::default();
        for left in [301, 450, 600, 900, 3599] {
            assert!(thresholds.is_usable(Some(&credential(3600, left)), now()), "left={}", left);
        }
    }

    #[test]
    fn test_renew_due_whenever_within_renew_window() {
        let thresholds = Thresholds::default();
        for left in [-60, 0, 1, 299, 300, 599, 600] {
            let c = credential(3600, left);
            assert!(thresholds.needs_renewal(Some(&c), now()), "left={}", left);
        }
    }

    #[test]
    fn test_absent_and_malformed_credentials() {
        let thresholds = Thresholds::default();
        let malformed = Credential::new("token", now(), 0, Scope::default());

        for c in [None, Some(&malformed)] {
            assert!(!thresholds.is_usable(c, now()));
            assert!(thresholds.needs_renewal(c, now()));
            assert_eq!(remaining(c, now()), Duration::zero());
            assert_eq!(thresholds.classify(c, now()), Freshness::Expired);
        }
    }

    #[test]
    fn test_remaining_is_clamped_at_zero() {
        let c = credential(3600, -120);
        assert_eq!(remaining(Some(&c), now()), Duration::zero());
        assert_eq!(Thresholds::default().classify(Some(&c), now()), Freshness::Expired);
    }

    #[test]
    fn test_classify_valid() {
        let c = credential(3600, 1800);
        assert_eq!(Thresholds::default().classify(Some(&c), now()), Freshness::Valid);
    }

    #[test]
    fn test_custom_windows() {
        let thresholds = Thresholds {
            fresh_window: std::time::Duration::from_secs(10),
            renew_window: std::time::Duration::from_secs(20),
            poll_interval: std::time::Duration::from_secs(5),
        };
        let c = credential(60, 15);
        assert!(thresholds.is_usable(Some(&c), now()));
        assert!(thresholds.needs_renewal(Some(&c), now()));
    }
}
