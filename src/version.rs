//! Bitemporal coordinates for resolution.
//!
//! Every lookup is parametrized by two instants:
//! - **Version as-of**: which version of the entity was current at this time?
//! - **Corrected to**: which corrections had been applied by this time?
//!
//! An open coordinate (`None`) means "latest".

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable (version-as-of, corrected-to) pair.
///
/// Used as a cache key everywhere, so equality and hashing are by value.
///
/// # Examples
///
/// ```
/// use lazytarget::VersionCorrection;
/// use chrono::Utc;
///
/// let latest = VersionCorrection::latest();
/// assert!(latest.contains_latest());
///
/// let fixed = latest.with_latest_fixed(Utc::now());
/// assert!(!fixed.contains_latest());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionCorrection {
    /// Instant at which the entity version is observed. None means latest.
    pub version_as_of: Option<DateTime<Utc>>,

    /// Instant up to which corrections are applied. None means latest.
    pub corrected_to: Option<DateTime<Utc>>,
}

impl VersionCorrection {
    /// Latest version, latest correction.
    #[must_use]
    pub const fn latest() -> Self {
        Self {
            version_as_of: None,
            corrected_to: None,
        }
    }

    #[must_use]
    pub const fn of(version_as_of: Option<DateTime<Utc>>, corrected_to: Option<DateTime<Utc>>) -> Self {
        Self {
            version_as_of,
            corrected_to,
        }
    }

    /// Fixed version, latest correction.
    #[must_use]
    pub const fn of_version(version_as_of: DateTime<Utc>) -> Self {
        Self {
            version_as_of: Some(version_as_of),
            corrected_to: None,
        }
    }

    /// Latest version, fixed correction.
    #[must_use]
    pub const fn of_correction(corrected_to: DateTime<Utc>) -> Self {
        Self {
            version_as_of: None,
            corrected_to: Some(corrected_to),
        }
    }

    /// True if either coordinate is still open.
    #[must_use]
    pub const fn contains_latest(&self) -> bool {
        self.version_as_of.is_none() || self.corrected_to.is_none()
    }

    /// Replaces any open coordinate with `now`.
    ///
    /// A resolution performed with the returned value is repeatable: later
    /// writes to the store cannot change its answer.
    #[must_use]
    pub fn with_latest_fixed(&self, now: DateTime<Utc>) -> Self {
        Self {
            version_as_of: Some(self.version_as_of.unwrap_or(now)),
            corrected_to: Some(self.corrected_to.unwrap_or(now)),
        }
    }

    /// Returns true if an entity version that became visible at `version_from`
    /// is visible at this coordinate.
    #[must_use]
    pub fn admits(&self, version_from: DateTime<Utc>) -> bool {
        self.version_as_of.map_or(true, |as_of| version_from <= as_of)
    }
}

impl fmt::Display for VersionCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version_as_of {
            Some(v) => write!(f, "V{}", v.to_rfc3339())?,
            None => f.write_str("VLATEST")?,
        }
        match self.corrected_to {
            Some(c) => write!(f, ".C{}", c.to_rfc3339()),
            None => f.write_str(".CLATEST"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_latest_is_default() {
        assert_eq!(VersionCorrection::default(), VersionCorrection::latest());
        assert!(VersionCorrection::latest().contains_latest());
    }

    #[test]
    fn test_with_latest_fixed_only_fills_open_coordinates() {
        let earlier = Utc::now() - Duration::hours(2);
        let now = Utc::now();
        let vc = VersionCorrection::of_version(earlier).with_latest_fixed(now);
        assert_eq!(vc.version_as_of, Some(earlier));
        assert_eq!(vc.corrected_to, Some(now));
        assert!(!vc.contains_latest());
    }

    #[test]
    fn test_partially_open_contains_latest() {
        let now = Utc::now();
        assert!(VersionCorrection::of_version(now).contains_latest());
        assert!(VersionCorrection::of_correction(now).contains_latest());
        assert!(!VersionCorrection::of(Some(now), Some(now)).contains_latest());
    }

    #[test]
    fn test_admits() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(5);
        let at_t0 = VersionCorrection::of_version(t0);

        assert!(at_t0.admits(t0));
        assert!(!at_t0.admits(t1));
        assert!(VersionCorrection::latest().admits(t1));
    }

    #[test]
    fn test_display() {
        assert_eq!(VersionCorrection::latest().to_string(), "VLATEST.CLATEST");
        let t = DateTime::UNIX_EPOCH;
        let vc = VersionCorrection::of_version(t);
        assert!(vc.to_string().starts_with("V1970-01-01"));
        assert!(vc.to_string().ends_with(".CLATEST"));
    }

    #[test]
    fn test_equal_values_hash_equal() {
        use std::collections::HashSet;
        let t = Utc::now();
        let mut set = HashSet::new();
        set.insert(VersionCorrection::of_version(t));
        assert!(set.contains(&VersionCorrection::of_version(t)));
    }
}
