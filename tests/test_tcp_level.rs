//! Level-triggered read plus peer hang-up delivery, and the
//! unregister-with-close contract: the kernel delete must happen before the
//! descriptor is closed, or a ready event can race a reused fd number.

use std::cell::Cell;
use std::ffi::c_void;
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{IntoRawFd, RawFd};
use std::time::Duration;

use evreactor::{Direction, Flags, Loop, Sock, SockType, Watch};

mod util;

struct Ctx {
    calls: Cell<usize>,
    last_hup: Cell<bool>,
}

fn on_read(_l: &mut Loop<'_>, w: &Watch, dir: Direction, hup: bool) {
    assert_eq!(dir, Direction::Read);
    let ctx = unsafe { &*(w.udata() as *const Ctx) };
    ctx.calls.set(ctx.calls.get() + 1);
    ctx.last_hup.set(hup);
}

#[test]
fn peer_close_delivers_hup_and_unregister_close_releases_the_fd() {
    util::init();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (accepted, _) = listener.accept().unwrap();
    accepted.set_nonblocking(true).unwrap();
    // Hand the descriptor to the watch; the reactor owns its lifecycle from
    // here, so the `TcpStream` must not close it a second time on drop.
    let fd: RawFd = accepted.into_raw_fd();

    let dummy = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream).unwrap();
    let mut lp = Loop::new(&dummy, 4).unwrap();

    let ctx = Ctx { calls: Cell::new(0), last_hup: Cell::new(false) };
    let ctx_ptr = &ctx as *const Ctx as *mut c_void;

    let mut watch = Watch::init_io(fd, Flags::READ, on_read, ctx_ptr).unwrap();
    lp.register(&mut watch).unwrap();

    drop(client);

    lp.run_once(Some(Duration::from_millis(500))).unwrap();
    assert_eq!(ctx.calls.get(), 1, "expected exactly one callback for the peer close");
    assert!(ctx.last_hup.get(), "peer close must be reported as a hang-up");

    lp.unregister(true, &mut watch).unwrap();

    // The descriptor was closed by `unregister`; any operation on it now
    // fails with EBADF.
    let rc = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    assert_eq!(rc, -1);
    assert_eq!(std::io::Error::last_os_error().raw_os_error(), Some(libc::EBADF));
}
