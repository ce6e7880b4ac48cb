//! The per-registration watcher value.
//!
//! A [`Watch`] is caller-owned: its storage must outlive registration
//! because the kernel event slot carries a pointer back to it, and the
//! dispatcher recovers the watcher (and therefore the callback) from that
//! pointer. Moving a *registered* `Watch` is a bug — the kernel still holds
//! the old address. Registration state is modeled explicitly via
//! [`WatchState`] rather than overloading the callback pointer as an
//! idempotency marker; `unregister` still treats the transition out of
//! `Registered` as the idempotency boundary.

use std::ffi::c_void;
use std::os::unix::io::RawFd;

use crate::error::{ReactorError, Result};
use crate::interest::{Direction, Flags};
use crate::reactor::Loop;
use crate::timer::Interval;

/// Invoked by the dispatcher for every ready event. Never returns status;
/// a callback that wants to stop receiving events calls `unregister` on
/// itself.
pub type Callback = fn(&mut Loop<'_>, &Watch, Direction, bool);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum WatchState {
    Uninit,
    Ready,
    Registered,
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum Kind {
    Io { direction: Direction, edge: bool },
    Timer { interval: Interval },
}

/// A registration record: a descriptor (or timer identity), a direction,
/// an edge/level choice, a callback, and an opaque user pointer.
pub struct Watch {
    pub(crate) fd: RawFd,
    pub(crate) kind: Kind,
    pub(crate) state: WatchState,
    pub(crate) cb: Option<Callback>,
    pub(crate) udata: *mut c_void,
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub(crate) timer_fd: Option<RawFd>,
}

impl Watch {
    /// Initializes a watcher over an already-open, non-blocking descriptor.
    ///
    /// Preconditions: `fd > 0`, `callback` implied non-null by Rust's type
    /// system, `flags` encode exactly one of `READ`/`WRITE` optionally OR'd
    /// with `EDGE`.
    pub fn init_io(fd: RawFd, flags: Flags, callback: Callback, udata: *mut c_void) -> Result<Watch> {
        if fd <= 0 {
            return Err(ReactorError::Argument("descriptor must be > 0"));
        }
        let (direction, edge) = flags.validate()?;
        Ok(Watch {
            fd,
            kind: Kind::Io { direction, edge },
            state: WatchState::Ready,
            cb: Some(callback),
            udata,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            timer_fd: None,
        })
    }

    /// Initializes a timer watcher firing periodically every `interval`.
    ///
    /// On kqueue this watcher never owns a descriptor; its kernel identity
    /// is its own address. On epoll a `timerfd` is created here, in
    /// monotonic, non-blocking, close-on-exec mode, and armed at
    /// registration time.
    pub fn init_timer(interval: Interval, callback: Callback, udata: *mut c_void) -> Result<Watch> {
        if interval.is_zero() {
            return Err(ReactorError::Argument("timer interval must be non-zero"));
        }
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let timer_fd = crate::sys::epoll::create_timer_fd()?;
            Ok(Watch {
                fd: -1,
                kind: Kind::Timer { interval },
                state: WatchState::Ready,
                cb: Some(callback),
                udata,
                timer_fd: Some(timer_fd),
            })
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            Ok(Watch {
                fd: -1,
                kind: Kind::Timer { interval },
                state: WatchState::Ready,
                cb: Some(callback),
                udata,
            })
        }
    }

    /// Updates the stored interval. Takes effect on the next registration,
    /// or the next timer-arm if already registered.
    pub fn update_interval(&mut self, interval: Interval) -> Result<()> {
        match &mut self.kind {
            Kind::Timer { interval: slot } => {
                *slot = interval;
                Ok(())
            }
            Kind::Io { .. } => Err(ReactorError::Argument("not a timer watcher")),
        }
    }

    pub fn direction(&self) -> Direction {
        match self.kind {
            Kind::Io { direction, .. } => direction,
            Kind::Timer { .. } => Direction::Timer,
        }
    }

    pub fn is_edge(&self) -> bool {
        matches!(self.kind, Kind::Io { edge: true, .. })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn udata(&self) -> *mut c_void {
        self.udata
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.state == WatchState::Registered
    }

    /// This watcher's own address, recovered by the dispatcher from the
    /// kernel event to find its way back to the `Watch` and its callback.
    /// Selector backends additionally key their own add/delete bookkeeping
    /// by descriptor (epoll) or by this same address (kqueue timers); this
    /// value is what every backend stores as the recoverable identity.
    pub(crate) fn token(&self) -> usize {
        self as *const Watch as usize
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        debug_assert!(
            self.state != WatchState::Registered,
            "dropping a Watch while still registered races the kernel against a reused address"
        );
        #[cfg(any(target_os = "linux", target_os = "android"))]
        if let Some(fd) = self.timer_fd.take() {
            if self.state != WatchState::Registered {
                let _ = unsafe { libc::close(fd) };
            }
        }
    }
}
