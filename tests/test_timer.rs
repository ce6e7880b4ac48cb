//! A periodic timer watch fires within the expected count over a fixed
//! wall-clock window.

use std::cell::Cell;
use std::ffi::c_void;
use std::time::{Duration, Instant};

use evreactor::{Direction, Interval, Loop, Sock, SockType, Watch};

mod util;

struct Ctx {
    fires: Cell<usize>,
}

fn on_timer_counting(_l: &mut Loop<'_>, w: &Watch, dir: Direction, hup: bool) {
    assert_eq!(dir, Direction::Timer);
    assert!(!hup);
    let ctx = unsafe { &*(w.udata() as *const Ctx) };
    ctx.fires.set(ctx.fires.get() + 1);
}

#[test]
fn periodic_timer_fires_three_to_five_times_in_220ms() {
    util::init();
    let sock = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream).unwrap();
    let mut lp = Loop::new(&sock, 4).unwrap();

    let ctx = Ctx { fires: Cell::new(0) };
    let ctx_ptr = &ctx as *const Ctx as *mut c_void;

    let mut timer = Watch::init_timer(Interval::new(0, 50_000_000), on_timer_counting, ctx_ptr).unwrap();
    lp.register(&mut timer).unwrap();

    let deadline = Instant::now() + Duration::from_millis(220);
    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let step = remaining.min(Duration::from_millis(60));
        lp.run_once(Some(step)).unwrap();
    }

    let fires = ctx.fires.get();
    assert!(
        (3..=5).contains(&fires),
        "expected 3..=5 timer callbacks in 220ms, got {fires}"
    );

    lp.unregister(true, &mut timer).unwrap();
}

#[test]
fn timer_update_interval_takes_effect_on_next_registration() {
    util::init();
    let ctx = Ctx { fires: Cell::new(0) };
    let ctx_ptr = &ctx as *const Ctx as *mut c_void;

    let mut timer = Watch::init_timer(Interval::new(1, 0), on_timer_counting, ctx_ptr).unwrap();
    timer.update_interval(Interval::new(0, 10_000_000)).unwrap();

    let sock = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream).unwrap();
    let mut lp = Loop::new(&sock, 4).unwrap();
    lp.register(&mut timer).unwrap();

    // A 10ms period (the updated interval, not the original 1s one) should
    // fire at least once within 200ms.
    lp.run_once(Some(Duration::from_millis(200))).unwrap();
    assert!(ctx.fires.get() >= 1, "timer_update_interval did not take effect before registration");

    lp.unregister(true, &mut timer).unwrap();
}
