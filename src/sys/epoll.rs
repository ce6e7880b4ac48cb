//! The epoll selector backend.
//!
//! Unlike kqueue, epoll has exactly one interest mask per descriptor, not
//! one per direction. Registering `READ` and `WRITE` watchers on the same
//! descriptor (explicitly required by the registration semantics) therefore
//! means combining both into a single `epoll_ctl` entry and recovering the
//! individual watcher token for whichever direction actually fired. `fds`
//! is that bookkeeping: one entry per registered descriptor, holding up to
//! one token per direction.
//!
//! Timers have no native epoll filter, so each timer watcher owns a
//! `timerfd` created at `Watch::init_timer` time and registered here like
//! any other readable descriptor, armed with an absolute first-fire time
//! computed from `CLOCK_MONOTONIC`.

use std::collections::HashMap;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::interest::Direction;
use crate::timer::{duration_to_millis, Interval};
use crate::watch::Watch;

use super::RawReadiness;

#[derive(Default)]
struct FdEntry {
    read: Option<usize>,
    write: Option<usize>,
    edge: bool,
    is_timer: bool,
}

impl FdEntry {
    fn events(&self) -> u32 {
        let mut events = 0;
        if self.read.is_some() {
            events |= libc::EPOLLIN as u32;
            if !self.is_timer {
                events |= libc::EPOLLRDHUP as u32;
            }
        }
        if self.write.is_some() {
            events |= libc::EPOLLOUT as u32;
        }
        if self.edge {
            events |= libc::EPOLLET as u32;
        }
        events
    }

    fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

pub(crate) struct Selector {
    ep: OwnedFd,
    fds: HashMap<RawFd, FdEntry>,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let ep = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
        trace!("epoll: created selector fd {ep}");
        Ok(Selector {
            ep: unsafe { OwnedFd::from_raw_fd(ep) },
            fds: HashMap::new(),
        })
    }

    pub fn arm(&mut self, watch: &Watch) -> io::Result<()> {
        match watch.kind {
            crate::watch::Kind::Io { direction, edge } => {
                self.arm_io(watch.fd, watch.token(), direction, edge)
            }
            crate::watch::Kind::Timer { interval } => {
                let fd = watch
                    .timer_fd
                    .expect("timer watcher must own a timerfd on the epoll backend");
                arm_timer_fd(fd, interval)?;
                self.arm_io(fd, watch.token(), Direction::Read, false)?;
                self.fds.get_mut(&fd).expect("just armed").is_timer = true;
                Ok(())
            }
        }
    }

    pub fn disarm(&mut self, watch: &Watch) -> io::Result<()> {
        match watch.kind {
            crate::watch::Kind::Io { direction, .. } => {
                self.disarm_io(watch.fd, watch.token(), direction)
            }
            crate::watch::Kind::Timer { .. } => {
                let fd = watch
                    .timer_fd
                    .expect("timer watcher must own a timerfd on the epoll backend");
                self.disarm_io(fd, watch.token(), Direction::Read)
            }
        }
    }

    fn arm_io(&mut self, fd: RawFd, token: usize, direction: Direction, edge: bool) -> io::Result<()> {
        let existed = self.fds.contains_key(&fd);
        let entry = self.fds.entry(fd).or_default();
        if !entry.is_empty() && entry.edge != edge {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "edge/level choice must be consistent across directions sharing a descriptor",
            ));
        }
        entry.edge = edge;
        match direction {
            Direction::Read => entry.read = Some(token),
            Direction::Write => entry.write = Some(token),
            Direction::Timer => unreachable!("timer arming goes through the timerfd path"),
        }
        let mut ev = libc::epoll_event {
            events: entry.events(),
            u64: fd as u64,
        };
        let op = if existed {
            libc::EPOLL_CTL_MOD
        } else {
            libc::EPOLL_CTL_ADD
        };
        syscall!(epoll_ctl(self.ep.as_raw_fd(), op, fd, &mut ev))?;
        trace!("epoll: armed fd {fd} for {direction} (edge={edge})");
        Ok(())
    }

    fn disarm_io(&mut self, fd: RawFd, token: usize, direction: Direction) -> io::Result<()> {
        let Some(entry) = self.fds.get_mut(&fd) else {
            return Ok(());
        };
        match direction {
            Direction::Read if entry.read == Some(token) => entry.read = None,
            Direction::Write if entry.write == Some(token) => entry.write = None,
            _ => return Ok(()),
        }
        if entry.is_empty() {
            self.fds.remove(&fd);
            match syscall!(epoll_ctl(
                self.ep.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut()
            )) {
                Ok(_) => {}
                Err(err) if err.raw_os_error() == Some(libc::ENOENT) => {}
                Err(err) => return Err(err),
            }
        } else {
            let mut ev = libc::epoll_event {
                events: entry.events(),
                u64: fd as u64,
            };
            syscall!(epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_MOD, fd, &mut ev))?;
        }
        trace!("epoll: disarmed fd {fd} for {direction}");
        Ok(())
    }

    pub fn select(&self, events: &mut Events, capacity: usize, timeout: Option<Duration>) -> io::Result<usize> {
        if events.storage.capacity() < capacity {
            events.storage.reserve(capacity - events.storage.capacity());
        }
        let timeout_ms = duration_to_millis(timeout);
        loop {
            let n = syscall!(epoll_wait(
                self.ep.as_raw_fd(),
                events.storage.as_mut_ptr(),
                events.storage.capacity() as i32,
                timeout_ms,
            ));
            match n {
                // SAFETY: `epoll_wait` has just initialized the first `n`
                // elements of the buffer.
                Ok(n) => {
                    unsafe { events.storage.set_len(n as usize) };
                    return Ok(n as usize);
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    pub fn drain(&self, events: &Events) -> Vec<RawReadiness> {
        let mut out = Vec::with_capacity(events.storage.len() * 2);
        for ev in &events.storage {
            let fd = ev.u64 as RawFd;
            let Some(entry) = self.fds.get(&fd) else {
                warn!("epoll: readiness for unregistered fd {fd}, skipping");
                continue;
            };
            if entry.is_timer {
                // Level-triggered: the counter must be drained or the next
                // `epoll_wait` reports this fd ready again immediately.
                let mut expirations: u64 = 0;
                let _ = unsafe {
                    libc::read(fd, &mut expirations as *mut u64 as *mut libc::c_void, 8)
                };
                if let Some(token) = entry.read {
                    out.push(RawReadiness { token, direction: Direction::Timer, hup: false });
                }
                continue;
            }
            let hup = ev.events
                & (libc::EPOLLHUP as u32 | libc::EPOLLERR as u32 | libc::EPOLLRDHUP as u32)
                != 0;
            if ev.events & (libc::EPOLLIN as u32) != 0 || hup {
                if let Some(token) = entry.read {
                    out.push(RawReadiness { token, direction: Direction::Read, hup });
                }
            }
            if ev.events & (libc::EPOLLOUT as u32) != 0 || hup {
                if let Some(token) = entry.write {
                    out.push(RawReadiness { token, direction: Direction::Write, hup });
                }
            }
        }
        out
    }
}

/// Creates a monotonic, non-blocking, close-on-exec `timerfd` for a timer
/// watcher. Not armed yet; `arm_timer_fd` does that at registration time.
pub(crate) fn create_timer_fd() -> io::Result<RawFd> {
    syscall!(timerfd_create(
        libc::CLOCK_MONOTONIC,
        libc::TFD_NONBLOCK | libc::TFD_CLOEXEC
    ))
}

fn arm_timer_fd(fd: RawFd, interval: Interval) -> io::Result<()> {
    let mut now = MaybeUninit::<libc::timespec>::uninit();
    syscall!(clock_gettime(libc::CLOCK_MONOTONIC, now.as_mut_ptr()))?;
    let now = unsafe { now.assume_init() };

    let period = interval.as_duration();
    let mut first = libc::timespec {
        tv_sec: now.tv_sec + period.as_secs() as libc::time_t,
        tv_nsec: now.tv_nsec + period.subsec_nanos() as libc::c_long,
    };
    if first.tv_nsec >= 1_000_000_000 {
        first.tv_sec += 1;
        first.tv_nsec -= 1_000_000_000;
    }

    let spec = libc::itimerspec {
        it_interval: libc::timespec {
            tv_sec: interval.sec,
            tv_nsec: interval.nsec as libc::c_long,
        },
        it_value: first,
    };
    syscall!(timerfd_settime(fd, libc::TFD_TIMER_ABSTIME, &spec, std::ptr::null_mut()))?;
    Ok(())
}

pub(crate) struct Events {
    storage: Vec<libc::epoll_event>,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Events {
        Events {
            storage: Vec::with_capacity(capacity.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }
}

impl Default for Events {
    fn default() -> Events {
        Events::with_capacity(0)
    }
}
