//! Macros shared by the platform-specific selector backends.

/// Execute a system call that returns `-1` on failure and sets `errno`,
/// translating the result into an `io::Result`.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

// `log` is an optional dependency (see Cargo.toml); these wrap the real
// macros when the feature is on and compile away to nothing when it's off,
// so call sites never need their own `#[cfg(feature = "log")]`.

#[cfg(feature = "log")]
macro_rules! trace {
    ($($tt:tt)*) => { log::trace!($($tt)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($tt:tt)*) => { log::debug!($($tt)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($tt:tt)*) => { log::warn!($($tt)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! error {
    ($($tt:tt)*) => { log::error!($($tt)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($tt:tt)*) => {};
}
