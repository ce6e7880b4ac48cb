//! Registration bookkeeping: round-trip idempotence and the
//! received-event buffer's monotone capacity growth.

use std::time::Duration;

use evreactor::{Direction, Flags, Loop, Sock, SockType, Watch};

mod util;

fn noop(_l: &mut Loop<'_>, _w: &Watch, _dir: Direction, _hup: bool) {}

#[test]
fn register_unregister_round_trip_restores_count() {
    util::init();
    let sock = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream).unwrap();
    let mut lp = Loop::new(&sock, 4).unwrap();
    let (a, b) = util::socketpair();

    let mut w = Watch::init_io(a, Flags::READ, noop, std::ptr::null_mut()).unwrap();
    assert_eq!(lp.registered(), 0);

    lp.register(&mut w).unwrap();
    assert_eq!(lp.registered(), 1);
    lp.unregister(false, &mut w).unwrap();
    assert_eq!(lp.registered(), 0);

    // Init -> register -> unregister -> register -> unregister: all status
    // codes Ok, *registered* back to its starting value.
    lp.register(&mut w).unwrap();
    assert_eq!(lp.registered(), 1);
    lp.unregister(false, &mut w).unwrap();
    assert_eq!(lp.registered(), 0);

    util::close(a);
    util::close(b);
}

#[test]
fn capacity_is_monotone_and_covers_ten_registrations_from_four() {
    util::init();
    let sock = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream).unwrap();
    let mut lp = Loop::new(&sock, 4).unwrap();
    assert_eq!(lp.capacity(), 4);

    let pairs: Vec<_> = (0..10).map(|_| util::socketpair()).collect();
    let mut watches: Vec<Watch> = pairs
        .iter()
        .map(|(a, _)| Watch::init_io(*a, Flags::READ, noop, std::ptr::null_mut()).unwrap())
        .collect();

    let mut last_capacity = lp.capacity();
    for w in watches.iter_mut() {
        lp.register(w).unwrap();
        assert!(lp.capacity() >= last_capacity, "capacity must never shrink");
        last_capacity = lp.capacity();
    }
    assert_eq!(lp.registered(), 10);
    assert!(lp.capacity() >= 10);

    // Make exactly one of the ten ready and confirm dispatch reports it.
    unsafe {
        libc::write(
            pairs[3].1,
            b"x".as_ptr() as *const libc::c_void,
            1,
        );
    }
    let n = lp.dispatch_step(Some(Duration::from_millis(500))).unwrap();
    assert!(n >= 1, "expected at least one ready event, got {n}");

    for w in watches.iter_mut() {
        lp.unregister(false, w).unwrap();
    }
    for (a, b) in pairs {
        util::close(a);
        util::close(b);
    }
}
