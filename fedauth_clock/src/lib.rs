//! Utilities for telling time
//!
//! Token expiries in the sharing API are exchanged as milliseconds since the
//! Unix epoch, so [`UnixTime`] keeps that resolution. Clocks are abstracted
//! behind [`Clock`] so that expiry logic can be driven by a [`TestClock`].

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::{
    ops,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unix time
///
/// Unix time as represented by the number of milliseconds elapsed since the
/// beginning of the Unix epoch on 1970/01/01 at 00:00:00 UTC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct UnixTime(pub u64);

impl UnixTime {
    /// Milliseconds since the Unix epoch
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Constructs a time from a (possibly fractional) count of milliseconds
    ///
    /// Negative and non-finite values clamp to the epoch.
    pub fn from_millis_f64(millis: f64) -> Self {
        if millis.is_finite() && millis > 0.0 {
            Self(millis as u64)
        } else {
            Self(0)
        }
    }

    /// The time elapsed since `earlier`, or zero if `earlier` is later
    #[inline]
    pub fn saturating_duration_since(self, earlier: UnixTime) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl From<SystemTime> for UnixTime {
    #[inline]
    fn from(t: SystemTime) -> Self {
        let time = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        UnixTime(time)
    }
}

impl ops::Add<Duration> for UnixTime {
    type Output = UnixTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        UnixTime(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl ops::Sub<Duration> for UnixTime {
    type Output = UnixTime;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        UnixTime(self.0.saturating_sub(rhs.as_millis() as u64))
    }
}

#[cfg(any(feature = "serde", doc))]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
impl Serialize for UnixTime {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(any(feature = "serde", doc))]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
impl<'de> Deserialize<'de> for UnixTime {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Some servers report expiries as floating point numbers
        let s = f64::deserialize(deserializer)?;
        Ok(Self::from_millis_f64(s))
    }
}

/// Represents a clock, which can tell the current time
pub trait Clock {
    /// Gets the current time according to this clock
    fn now(&self) -> UnixTime;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now(&self) -> UnixTime {
        (**self).now()
    }
}

/// The system clock as provided by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime::from(SystemTime::now())
    }
}

/// A test clock which maintains the current time as internal state
///
/// Clones share the same underlying time, so a clock handed to a component
/// under test can still be advanced from the test body.
#[derive(Clone, Debug, Default)]
#[allow(missing_copy_implementations)]
pub struct TestClock(Arc<AtomicU64>);

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::Acquire))
    }
}

impl TestClock {
    /// Creates a new test clock with the specified time
    #[inline]
    pub fn new(time: UnixTime) -> Self {
        Self(Arc::new(AtomicU64::new(time.0)))
    }

    /// Updates the clock's current time to `val`
    pub fn set(&self, val: UnixTime) {
        self.0.store(val.0, Ordering::Release);
    }

    /// Advances the clock's current time by `inc`
    pub fn advance(&self, inc: Duration) {
        self.0
            .fetch_add(inc.as_millis() as u64, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_saturates_at_the_epoch() {
        let t = UnixTime(1_000);
        assert_eq!(t - Duration::from_secs(5), UnixTime(0));
        assert_eq!(t + Duration::from_millis(500), UnixTime(1_500));
    }

    #[test]
    fn test_clock_clones_share_time() {
        let clock = TestClock::new(UnixTime(10));
        let other = clock.clone();
        clock.advance(Duration::from_millis(90));
        assert_eq!(other.now(), UnixTime(100));
        other.set(UnixTime(5));
        assert_eq!(clock.now(), UnixTime(5));
    }

    #[test]
    fn fractional_millis_are_truncated() {
        assert_eq!(UnixTime::from_millis_f64(1_234.9), UnixTime(1_234));
        assert_eq!(UnixTime::from_millis_f64(-3.0), UnixTime(0));
    }
}
