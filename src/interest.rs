//! Registration flags and the direction a ready event fires in.
//!
//! A small bitset, adapted to this crate's stricter shape: an I/O watcher
//! carries exactly one of [`Flags::READ`]/[`Flags::WRITE`], optionally OR'd
//! with [`Flags::EDGE`]. `TIMER` is not constructible through the public
//! bitset at all — timers are a wholly separate watcher kind (see
//! `watch::Watch::init_timer`) — so a mask that silently omits `TIMER`
//! cannot recur here: there is no mask to get wrong, only an exhaustive
//! match.

use std::fmt;

use crate::error::{ReactorError, Result};

const READ: u8 = 0b0001;
const WRITE: u8 = 0b0010;
const EDGE: u8 = 0b0100;

/// A small bitset of registration flags: direction plus edge/level choice.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    /// Interested in readability (or incoming connections, for a listener).
    pub const READ: Flags = Flags(READ);
    /// Interested in writability.
    pub const WRITE: Flags = Flags(WRITE);
    /// Edge-triggered: the callback fires once per readiness transition and
    /// must drain to exhaustion. OR this onto `READ` or `WRITE`.
    pub const EDGE: Flags = Flags(EDGE);

    pub const fn is_read(self) -> bool {
        self.0 & READ != 0
    }

    pub const fn is_write(self) -> bool {
        self.0 & WRITE != 0
    }

    pub const fn is_edge(self) -> bool {
        self.0 & EDGE != 0
    }

    /// Splits the flags into a direction and the edge/level choice,
    /// rejecting anything that isn't exactly one of READ/WRITE optionally
    /// OR'd with EDGE.
    pub(crate) fn validate(self) -> Result<(Direction, bool)> {
        match self.0 {
            READ => Ok((Direction::Read, false)),
            WRITE => Ok((Direction::Write, false)),
            x if x == READ | EDGE => Ok((Direction::Read, true)),
            x if x == WRITE | EDGE => Ok((Direction::Write, true)),
            _ => Err(ReactorError::Argument(
                "flags must be exactly one of READ or WRITE, optionally OR'd with EDGE",
            )),
        }
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        let mut flag = |name: &str, set: bool, f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if set {
                if wrote {
                    write!(f, " | ")?;
                }
                write!(f, "{name}")?;
                wrote = true;
            }
            Ok(())
        };
        flag("READ", self.is_read(), f)?;
        flag("WRITE", self.is_write(), f)?;
        flag("EDGE", self.is_edge(), f)?;
        if !wrote {
            write!(f, "(empty)")?;
        }
        Ok(())
    }
}

/// The direction a ready event fires in, passed to every callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
    Timer,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
            Direction::Timer => write!(f, "timer"),
        }
    }
}
