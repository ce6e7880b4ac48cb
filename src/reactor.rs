//! The reactor: registration, deregistration, and the dispatch loop.
//!
//! `State` owns the kernel event handle and the received-event buffer;
//! `Loop` pairs a `State` with the `Sock` it was built for. Modeled on the
//! teacher's `Poll`/`Registry` split in `poll.rs`, collapsed into one type
//! since this crate has no cross-thread registration to separate out.

use std::ffi::c_void;
use std::time::Duration;

use crate::error::{ReactorError, Result};
use crate::sock::Sock;
use crate::sys;
use crate::watch::{Watch, WatchState};

/// Called once, after the kernel handle has been closed, when a `Loop` (or
/// rather its `State`) is torn down — the Rust analogue of the original
/// library's optional `afd_loop_dealloc` cleanup argument.
pub type Cleanup = fn(*mut c_void);

fn grow(capacity: usize, at_least: usize) -> usize {
    let mut capacity = capacity.max(1);
    while capacity < at_least {
        capacity *= 2;
    }
    capacity
}

pub(crate) struct State {
    selector: Option<sys::Selector>,
    events: sys::Events,
    registered: usize,
    capacity: usize,
    running: bool,
    cleanup: Option<(Cleanup, *mut c_void)>,
}

impl State {
    fn new(capacity: usize) -> Result<State> {
        if capacity == 0 {
            return Err(ReactorError::Argument("initial capacity must be > 0"));
        }
        Ok(State {
            selector: Some(sys::Selector::new()?),
            events: sys::Events::with_capacity(capacity),
            registered: 0,
            capacity,
            running: false,
            cleanup: None,
        })
    }

    fn selector(&self) -> &sys::Selector {
        self.selector.as_ref().expect("selector used after teardown")
    }

    fn selector_mut(&mut self) -> &mut sys::Selector {
        self.selector.as_mut().expect("selector used after teardown")
    }
}

impl Drop for State {
    fn drop(&mut self) {
        // Close the kernel handle before invoking the cleanup callback, per
        // the ordering the original library's `afd_loop_dealloc` documents.
        self.selector.take();
        if let Some((cleanup, udata)) = self.cleanup.take() {
            cleanup(udata);
        }
    }
}

/// A `Sock` paired with the `State` driving it. Borrows the socket;
/// destroying the `Loop` destroys the `State` but leaves the socket to the
/// caller.
pub struct Loop<'s> {
    sock: &'s Sock,
    state: State,
}

impl<'s> Loop<'s> {
    /// Builds a reactor over `sock` with `capacity` initial event slots.
    pub fn new(sock: &'s Sock, capacity: usize) -> Result<Loop<'s>> {
        Ok(Loop {
            sock,
            state: State::new(capacity)?,
        })
    }

    /// Like [`Loop::new`], additionally registering a `cleanup` callback
    /// invoked with `udata` once the kernel handle has been closed.
    pub fn with_cleanup(sock: &'s Sock, capacity: usize, cleanup: Cleanup, udata: *mut c_void) -> Result<Loop<'s>> {
        let mut state = State::new(capacity)?;
        state.cleanup = Some((cleanup, udata));
        Ok(Loop { sock, state })
    }

    pub fn sock(&self) -> &Sock {
        self.sock
    }

    pub fn registered(&self) -> usize {
        self.state.registered
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Submits an add operation for `w` to the kernel event handle. Read and
    /// write are independent registrations; the same descriptor may carry
    /// both, bound to two different `Watch` values.
    pub fn register(&mut self, w: &mut Watch) -> Result<()> {
        if w.is_registered() {
            return Err(ReactorError::Argument("watch is already registered"));
        }
        if w.cb.is_none() {
            return Err(ReactorError::Argument("watch has no callback"));
        }
        self.state.selector_mut().arm(w)?;
        w.state = WatchState::Registered;
        self.state.registered += 1;
        if self.state.registered > self.state.capacity {
            self.state.capacity = grow(self.state.capacity, self.state.registered);
        }
        trace!(
            "reactor: registered watch {:?} ({}/{})",
            w.token() as *const (),
            self.state.registered,
            self.state.capacity
        );
        Ok(())
    }

    /// Registers every watch in `ws`, stopping and returning an error on
    /// the first failure. Watches already registered before the failure
    /// remain registered; the caller is responsible for cleaning them up.
    pub fn register_many(&mut self, ws: &mut [&mut Watch]) -> Result<()> {
        for w in ws.iter_mut() {
            self.register(w)?;
        }
        Ok(())
    }

    /// Submits a delete operation for `w`. Repeated unregistration of an
    /// already-unregistered watch is a no-op that returns `Ok(())`.
    pub fn unregister(&mut self, close_fd: bool, w: &mut Watch) -> Result<()> {
        if !w.is_registered() {
            return Ok(());
        }
        self.state.selector_mut().disarm(w)?;
        if close_fd {
            close_watch_fd(w);
        }
        w.state = WatchState::Ready;
        self.state.registered = self.state.registered.saturating_sub(1);
        trace!(
            "reactor: unregistered watch {:?} ({}/{})",
            w.token() as *const (),
            self.state.registered,
            self.state.capacity
        );
        Ok(())
    }

    /// Unregisters every watch in `ws`, accumulating how many succeeded.
    pub fn unregister_many(&mut self, close_fd: bool, ws: &mut [&mut Watch]) -> Result<usize> {
        let mut count = 0;
        for w in ws.iter_mut() {
            self.unregister(close_fd, w)?;
            count += 1;
        }
        Ok(count)
    }

    /// Waits for ready events (or `timeout`) and invokes each watch's
    /// callback. Returns the number of events the kernel reported.
    ///
    /// Readiness is snapshotted into an owned list before any callback
    /// runs, so a callback that synchronously registers or unregisters —
    /// including unregistering itself — cannot invalidate the batch being
    /// delivered.
    pub fn dispatch_step(&mut self, timeout: Option<Duration>) -> Result<usize> {
        if self.state.registered > self.state.capacity {
            self.state.capacity = grow(self.state.capacity, self.state.registered);
        }
        let n = self
            .state
            .selector_mut()
            .select(&mut self.state.events, self.state.capacity, timeout)?;
        let ready = self.state.selector().drain(&self.state.events);

        for raw in ready {
            // SAFETY: `raw.token` is the address of a `Watch` the caller
            // still owns; registered watches must not move or be dropped
            // before their matching `unregister` call.
            let watch: &Watch = unsafe { &*(raw.token as *const Watch) };
            match watch.cb {
                Some(cb) => cb(self, watch, raw.direction, raw.hup),
                None => warn!("reactor: readiness for a watch with no callback, skipping"),
            }
        }
        Ok(n)
    }

    /// Drives `dispatch_step` in a loop, using a 1-second poll quantum,
    /// until `stop` is called (from inside a callback, typically). Fails
    /// with [`ReactorError::AlreadyRunning`] if already driving this loop.
    pub fn run_forever(&mut self) -> Result<usize> {
        if self.state.running {
            return Err(ReactorError::AlreadyRunning);
        }
        self.state.running = true;
        let quantum = Duration::from_secs(1);
        let mut last = 0;
        while self.state.running {
            last = match self.dispatch_step(Some(quantum)) {
                Ok(n) => n,
                Err(err) => {
                    self.state.running = false;
                    return Err(err);
                }
            };
        }
        Ok(last)
    }

    /// A single `dispatch_step`, guarded by the same already-running check
    /// as `run_forever`.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        if self.state.running {
            return Err(ReactorError::AlreadyRunning);
        }
        self.state.running = true;
        let result = self.dispatch_step(timeout);
        self.state.running = false;
        result
    }

    /// Clears the running flag; a live `run_forever` exits after its
    /// current `dispatch_step` returns.
    pub fn stop(&mut self) {
        self.state.running = false;
    }
}

fn close_watch_fd(w: &mut Watch) {
    let fd = match w.kind {
        crate::watch::Kind::Io { .. } => w.fd,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        crate::watch::Kind::Timer { .. } => w.timer_fd.take().unwrap_or(-1),
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        crate::watch::Kind::Timer { .. } => -1,
    };
    if fd > 0 {
        unsafe {
            libc::shutdown(fd, libc::SHUT_RDWR);
            libc::close(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_growth_is_monotone_and_covers_demand() {
        assert_eq!(grow(4, 1), 4);
        assert_eq!(grow(4, 4), 4);
        assert_eq!(grow(4, 5), 8);
        assert_eq!(grow(4, 10), 16);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(State::new(0).is_err());
    }
}
