//! The kqueue selector backend.
//!
//! Read and write are independent filters on this backend, so — unlike
//! epoll — a descriptor carrying both a `READ` and a `WRITE` watcher needs
//! no bookkeeping: each filter keeps its own `udata` pointer. Timers are
//! native here (`EVFILT_TIMER`); a timer watcher never owns a descriptor,
//! its kernel identity is its own address, carried in `ident` rather than
//! `udata` since there is no descriptor to hang `udata` off of in the
//! read/write sense.

use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;
use std::time::Duration;

use crate::interest::Direction;
use crate::watch::{Kind, Watch};

use super::RawReadiness;

// Type of the `data` field in the `kevent` structure; varies by platform.
#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "ios",
    target_os = "macos"
))]
type Data = libc::intptr_t;
#[cfg(any(target_os = "netbsd", target_os = "openbsd"))]
type Data = i64;

#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
type Filter = libc::c_short;
#[cfg(any(target_os = "macos", target_os = "ios"))]
type Filter = i16;
#[cfg(target_os = "netbsd")]
type Filter = u32;

#[cfg(not(target_os = "netbsd"))]
type Count = libc::c_int;
#[cfg(target_os = "netbsd")]
type Count = libc::size_t;

macro_rules! kevent {
    ($id: expr, $filter: expr, $flags: expr, $udata: expr) => {
        libc::kevent {
            ident: $id as libc::uintptr_t,
            filter: $filter as Filter,
            flags: $flags,
            fflags: 0,
            data: 0,
            udata: $udata as *mut libc::c_void,
        }
    };
}

pub(crate) struct Selector {
    kq: RawFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let kq = syscall!(kqueue())?;
        syscall!(fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC))?;
        trace!("kqueue: created selector fd {kq}");
        Ok(Selector { kq })
    }

    pub fn arm(&mut self, watch: &Watch) -> io::Result<()> {
        let token = watch.token();
        match watch.kind {
            Kind::Io { direction, edge } => {
                let filter = match direction {
                    Direction::Read => libc::EVFILT_READ,
                    Direction::Write => libc::EVFILT_WRITE,
                    Direction::Timer => unreachable!(),
                };
                let mut flags = libc::EV_ADD | libc::EV_RECEIPT;
                if edge {
                    flags |= libc::EV_CLEAR;
                }
                let mut change = kevent!(watch.fd, filter, flags, token);
                kevent_register(self.kq, std::slice::from_mut(&mut change), &[libc::EPIPE as Data])?;
                trace!("kqueue: armed fd {} for {direction} (edge={edge})", watch.fd);
                Ok(())
            }
            Kind::Timer { interval } => {
                let mut change = kevent!(
                    token,
                    libc::EVFILT_TIMER,
                    libc::EV_ADD | libc::EV_CLEAR | libc::EV_RECEIPT,
                    0
                );
                change.fflags = libc::NOTE_NSECONDS as u32;
                change.data = interval.as_nanos() as Data;
                kevent_register(self.kq, std::slice::from_mut(&mut change), &[])?;
                trace!("kqueue: armed timer {token:#x}");
                Ok(())
            }
        }
    }

    pub fn disarm(&mut self, watch: &Watch) -> io::Result<()> {
        let token = watch.token();
        match watch.kind {
            Kind::Io { direction, .. } => {
                let filter = match direction {
                    Direction::Read => libc::EVFILT_READ,
                    Direction::Write => libc::EVFILT_WRITE,
                    Direction::Timer => unreachable!(),
                };
                let mut change = kevent!(watch.fd, filter, libc::EV_DELETE | libc::EV_RECEIPT, 0);
                kevent_register(self.kq, std::slice::from_mut(&mut change), &[libc::ENOENT as Data])?;
                trace!("kqueue: disarmed fd {} for {direction}", watch.fd);
                Ok(())
            }
            Kind::Timer { .. } => {
                let mut change = kevent!(
                    token,
                    libc::EVFILT_TIMER,
                    libc::EV_DELETE | libc::EV_RECEIPT,
                    0
                );
                kevent_register(self.kq, std::slice::from_mut(&mut change), &[libc::ENOENT as Data])?;
                trace!("kqueue: disarmed timer {token:#x}");
                Ok(())
            }
        }
    }

    pub fn select(&self, events: &mut Events, capacity: usize, timeout: Option<Duration>) -> io::Result<usize> {
        if events.storage.capacity() < capacity {
            events.storage.reserve(capacity - events.storage.capacity());
        }
        let timeout = timeout.map(|to| libc::timespec {
            tv_sec: to.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
        });
        let timeout_ptr = timeout
            .as_ref()
            .map(|s| s as *const _)
            .unwrap_or(ptr::null());

        loop {
            let n = syscall!(kevent(
                self.kq,
                ptr::null(),
                0,
                events.storage.as_mut_ptr(),
                events.storage.capacity() as Count,
                timeout_ptr,
            ));
            match n {
                // SAFETY: `kevent` has just initialized the first `n`
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
        let mut out = Vec::with_capacity(events.storage.len());
        for ev in &events.storage {
            let hup = ev.flags & libc::EV_EOF != 0;
            let (token, direction) = match ev.filter as i32 {
                f if f == libc::EVFILT_READ as i32 => (ev.udata as usize, Direction::Read),
                f if f == libc::EVFILT_WRITE as i32 => (ev.udata as usize, Direction::Write),
                f if f == libc::EVFILT_TIMER as i32 => (ev.ident as usize, Direction::Timer),
                other => {
                    warn!("kqueue: unrecognized filter {other}, skipping");
                    continue;
                }
            };
            out.push(RawReadiness { token, direction, hup });
        }
        out
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        if let Err(err) = syscall!(close(self.kq)) {
            error!("kqueue: failed to close selector fd {}: {err}", self.kq);
        }
    }
}

impl AsRawFd for Selector {
    fn as_raw_fd(&self) -> RawFd {
        self.kq
    }
}

/// Submits `changes` and checks every one of them for an error, per the
/// teacher's `EV_RECEIPT` convention (a change list doubles as its own
/// result list when every entry carries that flag).
fn kevent_register(kq: RawFd, changes: &mut [libc::kevent], ignored_errors: &[Data]) -> io::Result<()> {
    syscall!(kevent(
        kq,
        changes.as_ptr(),
        changes.len() as Count,
        changes.as_mut_ptr(),
        changes.len() as Count,
        ptr::null(),
    ))
    .map(|_| ())
    .or_else(|err| {
        if err.raw_os_error() == Some(libc::EINTR) {
            Ok(())
        } else {
            Err(err)
        }
    })
    .and_then(|()| check_errors(changes, ignored_errors))
}

fn check_errors(events: &[libc::kevent], ignored_errors: &[Data]) -> io::Result<()> {
    for event in events {
        let data = event.data;
        if (event.flags & libc::EV_ERROR != 0) && data != 0 && !ignored_errors.contains(&data) {
            return Err(io::Error::from_raw_os_error(data as i32));
        }
    }
    Ok(())
}

pub(crate) struct Events {
    storage: Vec<libc::kevent>,
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
