//! The timer interval type and the duration/timeout conversions the
//! selector backends share.
//!
//! A naive epoll millisecond timeout computed as `sec * 1000 + nsec * 1000`
//! is off by a factor of a million on the nanosecond term. Every timeout
//! conversion routes through
//! [`duration_to_millis`] so that mistake has exactly one place it could
//! recur, and it doesn't.

use std::time::Duration;

/// A timer period, seconds plus nanoseconds, mirroring the granularity both
/// `kevent`'s `NOTE_NSECONDS` and `timerfd`'s `itimerspec` accept.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    pub sec: i64,
    pub nsec: u32,
}

impl Interval {
    pub const fn new(sec: i64, nsec: u32) -> Interval {
        Interval { sec, nsec }
    }

    pub fn from_duration(d: Duration) -> Interval {
        Interval {
            sec: d.as_secs() as i64,
            nsec: d.subsec_nanos(),
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::new(self.sec.max(0) as u64, self.nsec)
    }

    pub(crate) fn as_nanos(self) -> u64 {
        self.as_duration().as_nanos() as u64
    }

    pub(crate) fn is_zero(self) -> bool {
        self.sec == 0 && self.nsec == 0
    }
}

/// Converts a poll timeout to whole milliseconds, rounding up so a caller
/// asking for e.g. 1ns doesn't get an immediate non-blocking poll instead.
pub(crate) fn duration_to_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let millis = d
                .checked_add(Duration::from_nanos(999_999))
                .unwrap_or(d)
                .as_millis();
            millis.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}
