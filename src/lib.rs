//! A portable `epoll`/`kqueue` readiness reactor with URI-style endpoint
//! sockets.
//!
//! `evreactor` unifies the two mainstream POSIX readiness-notification
//! mechanisms — the BSD-family kernel event queue (`kqueue`) and the
//! Linux-family `epoll` interface — behind a single [`Watch`] abstraction,
//! and pairs it with a [`Sock`] helper that builds a listening or connecting
//! socket from a URI-style endpoint string (`inet://host:port`,
//! `unix:///path`).
//!
//! # Example
//!
//! ```no_run
//! use evreactor::{Direction, Flags, Loop, Sock, SockType, Watch};
//!
//! fn on_accept(l: &mut Loop<'_>, _w: &Watch, _dir: Direction, _hup: bool) {
//!     if let Ok(fd) = l.sock().accept(true) {
//!         println!("accepted {fd}");
//!     }
//! }
//!
//! let sock = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream)?;
//! sock.listen(128)?;
//!
//! let mut lp = Loop::new(&sock, 16)?;
//! let mut listener = Watch::init_io(sock.as_raw_fd(), Flags::READ, on_accept, std::ptr::null_mut())?;
//! lp.register(&mut listener)?;
//! lp.run_once(Some(std::time::Duration::from_millis(0)))?;
//! # Ok::<(), evreactor::ReactorError>(())
//! ```
//!
//! # Design
//!
//! The crate is organized around one concern per module:
//!
//! - `sock` — the endpoint helper (`inet://`/`unix://` parsing, socket
//!   creation, accept/connect shims) behind [`Sock`].
//! - `watch` — the per-registration [`Watch`] value, caller-owned and
//!   pinned in place for the lifetime of its registration.
//! - `reactor` — [`Loop`], owning the kernel event handle and the
//!   received-event buffer, providing register/unregister and the dispatch
//!   step.
//! - `timer` — the [`Interval`] type shared by both selector backends.
//! - `sys` — the platform selector backends (`epoll` on Linux/Android,
//!   `kqueue` on the BSD family/macOS/iOS) behind one narrow interface.
//! - `error` — the [`ReactorError`] taxonomy.
//!
//! Scheduling is single-threaded and cooperative: a `Loop` is driven by
//! exactly one thread, callbacks run inline between kernel-wait calls, and
//! there is no cross-thread wakeup primitive.

#[macro_use]
mod macros;

mod error;
mod interest;
mod reactor;
mod sock;
mod sys;
mod timer;
mod watch;

pub use error::{ReactorError, Result};
pub use interest::{Direction, Flags};
pub use reactor::{Cleanup, Loop};
pub use sock::{Family, Sock, SockType};
pub use timer::Interval;
pub use watch::{Callback, Watch};
