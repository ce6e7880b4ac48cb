//! Double-registration is rejected; double-unregistration is a no-op that
//! leaves `registered` unchanged.

use evreactor::{Direction, Flags, Loop, Sock, SockType, Watch};

mod util;

fn noop(_l: &mut Loop<'_>, _w: &Watch, _dir: Direction, _hup: bool) {}

#[test]
fn registering_an_already_registered_watch_is_rejected() {
    util::init();
    let sock = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream).unwrap();
    let mut lp = Loop::new(&sock, 4).unwrap();
    let (a, b) = util::socketpair();

    let mut w = Watch::init_io(a, Flags::READ, noop, std::ptr::null_mut()).unwrap();
    lp.register(&mut w).unwrap();
    assert!(lp.register(&mut w).is_err(), "double register must fail");
    assert_eq!(lp.registered(), 1, "the failed re-register must not double count");

    lp.unregister(false, &mut w).unwrap();
    util::close(a);
    util::close(b);
}

#[test]
fn double_unregister_is_a_no_op() {
    util::init();
    let sock = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream).unwrap();
    let mut lp = Loop::new(&sock, 4).unwrap();
    let (a, b) = util::socketpair();

    let mut w = Watch::init_io(a, Flags::READ, noop, std::ptr::null_mut()).unwrap();
    lp.register(&mut w).unwrap();
    assert_eq!(lp.registered(), 1);

    lp.unregister(false, &mut w).unwrap();
    assert_eq!(lp.registered(), 0);

    // Repeated unregistration of the same watch returns Ok and does not
    // change `registered` further.
    lp.unregister(false, &mut w).unwrap();
    assert_eq!(lp.registered(), 0);
    lp.unregister(false, &mut w).unwrap();
    assert_eq!(lp.registered(), 0);

    util::close(a);
    util::close(b);
}
