//! Platform selector backends.
//!
//! Both bodies implement the same narrow interface — `new`, `arm`, `disarm`,
//! `select`, plus a `drain` that turns one `select` call's raw results into
//! a portable [`RawReadiness`] list — so `reactor::State` never branches on
//! platform.

use crate::interest::Direction;

/// One readiness notification, normalized from whichever backend produced
/// it: the registering watcher's identity (its own address, recovered from
/// the kernel event's opaque payload), the direction it fired in, and
/// whether a hang-up/error/peer-close indication accompanied it.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RawReadiness {
    pub token: usize,
    pub direction: Direction,
    pub hup: bool,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) mod epoll;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use self::epoll::{Events, Selector};

#[cfg(any(
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "ios",
    target_os = "macos",
))]
pub(crate) mod kqueue;
#[cfg(any(
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "ios",
    target_os = "macos",
))]
pub(crate) use self::kqueue::{Events, Selector};

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "ios",
    target_os = "macos",
)))]
compile_error!("evreactor supports Linux/Android (epoll) and the BSD family/macOS/iOS (kqueue) only");
