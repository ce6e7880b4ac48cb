#![allow(dead_code)]

use std::os::unix::io::RawFd;
use std::sync::Once;

/// Initializes `env_logger` once per test binary.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    })
}

/// A connected pair of non-blocking `AF_UNIX` stream descriptors, used by
/// the registration-bookkeeping tests that don't need a real network round
/// trip, only a descriptor the kernel will accept `EPOLL_CTL_ADD`/`EV_ADD`
/// on.
pub fn socketpair() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK,
            0,
            fds.as_mut_ptr(),
        )
    };
    assert_eq!(rc, 0, "socketpair failed: {}", std::io::Error::last_os_error());
    (fds[0], fds[1])
}

pub fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}
