//! URI-style endpoint sockets: `inet://host:port` and `unix://path`.
//!
//! Parses an address string, resolves it (passive `getaddrinfo` lookup for
//! `inet://`, a `sockaddr_un` for `unix://`), and creates a non-blocking,
//! close-on-exec socket bound to the result. The scheme grammar and length
//! limits follow `ASYNCSOCK_FQDN_LEN`, `ASYNCSOCK_PORT_LEN`, and
//! `ASYNCSOCK_INETPATH_MAX`.

use std::ffi::CString;
use std::mem::{self, MaybeUninit};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::{io, ptr};

use crate::error::{ReactorError, Result};

/// A host name or path may not exceed this many bytes (the original
/// library's `ASYNCSOCK_FQDN_LEN`).
const FQDN_LEN: usize = 256;
/// A decimal port string, including its terminator, may not exceed this
/// many bytes (`ASYNCSOCK_PORT_LEN`).
const PORT_LEN: usize = 6;
/// The combined `host:port` remainder of an `inet://` address may not
/// exceed this many bytes (`ASYNCSOCK_INETPATH_MAX`).
const INET_PATH_MAX: usize = 261;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Family {
    Inet,
    Unix,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SockType {
    Stream,
    Dgram,
    SeqPacket,
}

impl SockType {
    fn as_raw(self) -> libc::c_int {
        match self {
            SockType::Stream => libc::SOCK_STREAM,
            SockType::Dgram => libc::SOCK_DGRAM,
            SockType::SeqPacket => libc::SOCK_SEQPACKET,
        }
    }
}

enum AddrBlob {
    Inet {
        storage: libc::sockaddr_storage,
        len: libc::socklen_t,
    },
    Unix {
        sockaddr: libc::sockaddr_un,
        len: libc::socklen_t,
    },
}

impl AddrBlob {
    fn as_ptr_len(&self) -> (*const libc::sockaddr, libc::socklen_t) {
        match self {
            AddrBlob::Inet { storage, len } => (storage as *const _ as *const libc::sockaddr, *len),
            AddrBlob::Unix { sockaddr, len, .. } => (sockaddr as *const _ as *const libc::sockaddr, *len),
        }
    }
}

/// An endpoint descriptor: a resolved address plus the non-blocking,
/// close-on-exec socket bound to it.
pub struct Sock {
    fd: OwnedFd,
    family: Family,
    sock_type: SockType,
    addr: AddrBlob,
    path: Option<PathBuf>,
}

impl Sock {
    /// Parses `address` (`inet://host:port` or `unix://path`), resolves it,
    /// and returns a non-blocking, close-on-exec socket bound to the first
    /// candidate for which creation succeeds.
    pub fn parse_and_allocate(address: &str, sock_type: SockType) -> Result<Sock> {
        let (scheme, rest) = split_scheme(address)?;
        match scheme {
            "inet" => alloc_inet(rest, sock_type),
            "unix" => alloc_unix(rest, sock_type),
            _ => Err(ReactorError::Argument("unrecognized address scheme")),
        }
    }

    /// Binds to the stored address and marks the socket listening.
    pub fn listen(&self, backlog: libc::c_int) -> Result<()> {
        let (addr, len) = self.addr.as_ptr_len();
        syscall!(bind(self.fd.as_raw_fd(), addr, len))?;
        syscall!(listen(self.fd.as_raw_fd(), backlog))?;
        debug!("sock: listening, backlog={backlog}");
        Ok(())
    }

    /// Accepts a connection, returning a non-blocking, close-on-exec
    /// descriptor. Optionally disables Nagle's algorithm on the accepted
    /// socket (meaningful for `inet://` streams only).
    pub fn accept(&self, no_delay: bool) -> Result<RawFd> {
        let mut storage = MaybeUninit::<libc::sockaddr_storage>::zeroed();
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let raw = storage.as_mut_ptr() as *mut libc::sockaddr;

        #[cfg(not(any(target_os = "ios", target_os = "macos", target_os = "netbsd", target_os = "solaris")))]
        let accepted = syscall!(accept4(
            self.fd.as_raw_fd(),
            raw,
            &mut len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        ))?;

        #[cfg(any(target_os = "ios", target_os = "macos", target_os = "netbsd", target_os = "solaris"))]
        let accepted = {
            let fd = syscall!(accept(self.fd.as_raw_fd(), raw, &mut len))?;
            make_nonblocking_cloexec(fd).map_err(|err| {
                let _ = unsafe { libc::close(fd) };
                err
            })?;
            fd
        };

        if no_delay && self.family == Family::Inet {
            let _ = set_tcp_nodelay(accepted);
        }
        Ok(accepted)
    }

    /// A wrapper around `connect(2)` that classifies `EINPROGRESS` as
    /// success, since a non-blocking connect almost always reports it.
    pub fn connect(&self) -> Result<()> {
        let (addr, len) = self.addr.as_ptr_len();
        match syscall!(connect(self.fd.as_raw_fd(), addr, len)) {
            Ok(_) => Ok(()),
            Err(ref err) if err.raw_os_error() == Some(libc::EINPROGRESS) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// The port the kernel assigned, for `inet://` endpoints bound with
    /// port `0`. Narrowed to the port alone since callers already have the
    /// host they asked for.
    pub fn local_port(&self) -> Result<u16> {
        if self.family != Family::Inet {
            return Err(ReactorError::Argument("local_port is only meaningful for inet:// endpoints"));
        }
        let mut storage = MaybeUninit::<libc::sockaddr_storage>::zeroed();
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        syscall!(getsockname(
            self.fd.as_raw_fd(),
            storage.as_mut_ptr() as *mut libc::sockaddr,
            &mut len,
        ))?;
        let storage = unsafe { storage.assume_init() };
        let port = match storage.ss_family as libc::c_int {
            libc::AF_INET => {
                let sin = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in) };
                u16::from_be(sin.sin_port)
            }
            libc::AF_INET6 => {
                let sin6 = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in6) };
                u16::from_be(sin6.sin6_port)
            }
            _ => return Err(ReactorError::Argument("unexpected address family from getsockname")),
        };
        Ok(port)
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn sock_type(&self) -> SockType {
        self.sock_type
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Closes the descriptor and, for `unix://` endpoints, unlinks the
    /// socket file.
    pub fn destroy(self) {
        if let Some(path) = &self.path {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("sock: failed to unlink {}: {err}", path.display());
                }
            }
        }
        // `self.fd` (an `OwnedFd`) closes the descriptor on drop.
    }
}

fn split_scheme(address: &str) -> Result<(&str, &str)> {
    let Some(idx) = address.find("://") else {
        return Err(ReactorError::Argument("address is missing a scheme (expected scheme://...)"));
    };
    Ok((&address[..idx], &address[idx + 3..]))
}

fn alloc_inet(rest: &str, sock_type: SockType) -> Result<Sock> {
    if rest.len() >= INET_PATH_MAX {
        return Err(ReactorError::NameTooLong);
    }
    let (host, port) = match rest.rfind(':') {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };
    if host.len() >= FQDN_LEN {
        return Err(ReactorError::NameTooLong);
    }
    if let Some(port) = port {
        if port.len() >= PORT_LEN {
            return Err(ReactorError::NameTooLong);
        }
    }
    let wildcard = host == "*";
    if wildcard && port.is_none() {
        return Err(ReactorError::Argument("inet://* requires an explicit port"));
    }

    let node = if wildcard { None } else { Some(CString::new(host).map_err(|_| ReactorError::Argument("host contains a NUL byte"))?) };
    let service = port
        .map(|p| CString::new(p).map_err(|_| ReactorError::Argument("port contains a NUL byte")))
        .transpose()?;

    let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
    hints.ai_family = libc::AF_UNSPEC;
    hints.ai_socktype = sock_type.as_raw();
    hints.ai_flags = libc::AI_PASSIVE;

    let mut res: *mut libc::addrinfo = ptr::null_mut();
    let rc = unsafe {
        libc::getaddrinfo(
            node.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
            service.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
            &hints,
            &mut res,
        )
    };
    if rc != 0 {
        return Err(ReactorError::Argument("address resolution failed"));
    }
    let _guard = AddrInfoGuard(res);

    let mut candidate = res;
    while !candidate.is_null() {
        let ai = unsafe { &*candidate };
        match new_socket(ai.ai_family, ai.ai_socktype) {
            Ok(fd) => {
                let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
                let len = ai.ai_addrlen as usize;
                unsafe {
                    ptr::copy_nonoverlapping(
                        ai.ai_addr as *const u8,
                        &mut storage as *mut _ as *mut u8,
                        len,
                    );
                }
                return Ok(Sock {
                    fd: unsafe { OwnedFd::from_raw_fd(fd) },
                    family: Family::Inet,
                    sock_type,
                    addr: AddrBlob::Inet { storage, len: ai.ai_addrlen },
                    path: None,
                });
            }
            Err(_) => {
                candidate = ai.ai_next;
            }
        }
    }
    Err(ReactorError::Kernel(io::Error::new(
        io::ErrorKind::Other,
        "no candidate address accepted a socket",
    )))
}

struct AddrInfoGuard(*mut libc::addrinfo);

impl Drop for AddrInfoGuard {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { libc::freeaddrinfo(self.0) };
        }
    }
}

fn alloc_unix(rest: &str, sock_type: SockType) -> Result<Sock> {
    let path = Path::new(rest);
    let bytes = path.as_os_str().as_bytes();

    let mut sockaddr: libc::sockaddr_un = unsafe { mem::zeroed() };
    sockaddr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    if bytes.len() >= sockaddr.sun_path.len() {
        return Err(ReactorError::NameTooLong);
    }
    for (dst, src) in sockaddr.sun_path.iter_mut().zip(bytes.iter()) {
        *dst = *src as libc::c_char;
    }
    let offset = sun_path_offset();
    let len = (offset + bytes.len() + 1) as libc::socklen_t;

    let fd = new_socket(libc::AF_UNIX, sock_type.as_raw())?;
    Ok(Sock {
        fd: unsafe { OwnedFd::from_raw_fd(fd) },
        family: Family::Unix,
        sock_type,
        addr: AddrBlob::Unix { sockaddr, len },
        path: Some(path.to_path_buf()),
    })
}

fn sun_path_offset() -> usize {
    // A null base pointer avoids materializing an uninitialized
    // `sockaddr_un` value (UB even when only a field address is taken);
    // `addr_of!` through it never reads, so the pointer is never
    // dereferenced, only offset.
    let base = std::ptr::null::<libc::sockaddr_un>();
    let path = unsafe { std::ptr::addr_of!((*base).sun_path) };
    path as usize - base as usize
}

/// Creates a non-blocking, close-on-exec, address-reusable socket, with a
/// platform split between `socket(2)` flags and a `fcntl` fallback.
fn new_socket(domain: libc::c_int, socket_type: libc::c_int) -> Result<RawFd> {
    #[cfg(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    let socket_type = socket_type | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;

    let fd = syscall!(socket(domain, socket_type, 0))?;

    #[cfg(any(target_os = "ios", target_os = "macos", target_os = "solaris"))]
    make_nonblocking_cloexec(fd).map_err(|err| {
        let _ = unsafe { libc::close(fd) };
        err
    })?;

    if domain == libc::AF_INET || domain == libc::AF_INET6 {
        let _ = set_reuse_address(fd);
    }
    Ok(fd)
}

#[cfg(any(target_os = "ios", target_os = "macos", target_os = "solaris"))]
fn make_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    syscall!(fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK))?;
    syscall!(fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))?;
    Ok(())
}

fn set_reuse_address(fd: RawFd) -> io::Result<()> {
    let one: libc::c_int = 1;
    syscall!(setsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_REUSEADDR,
        &one as *const _ as *const libc::c_void,
        mem::size_of::<libc::c_int>() as libc::socklen_t,
    ))
    .map(|_| ())
}

fn set_tcp_nodelay(fd: RawFd) -> io::Result<()> {
    let one: libc::c_int = 1;
    syscall!(setsockopt(
        fd,
        libc::IPPROTO_TCP,
        libc::TCP_NODELAY,
        &one as *const _ as *const libc::c_void,
        mem::size_of::<libc::c_int>() as libc::socklen_t,
    ))
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_scheme() {
        assert!(split_scheme("127.0.0.1:8080").is_err());
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = Sock::parse_and_allocate("http://example.com", SockType::Stream);
        assert!(matches!(err, Err(ReactorError::Argument(_))));
    }

    #[test]
    fn wildcard_host_requires_port() {
        let err = Sock::parse_and_allocate("inet://*", SockType::Stream);
        assert!(matches!(err, Err(ReactorError::Argument(_))));
    }

    #[test]
    fn overlong_host_is_name_too_long() {
        let host = "a".repeat(FQDN_LEN);
        let addr = format!("inet://{host}:80");
        let err = Sock::parse_and_allocate(&addr, SockType::Stream);
        assert!(matches!(err, Err(ReactorError::NameTooLong)));
    }

    #[test]
    fn loopback_with_port_parses() {
        let sock = Sock::parse_and_allocate("inet://127.0.0.1:0", SockType::Stream)
            .expect("loopback resolution should succeed in any test sandbox");
        assert_eq!(sock.family(), Family::Inet);
    }

    #[test]
    fn unix_path_round_trips_and_unlinks() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("evreactor-test-{}.sock", std::process::id()));
        let addr = format!("unix://{}", path.display());
        let sock = Sock::parse_and_allocate(&addr, SockType::Stream).unwrap();
        sock.listen(16).unwrap();
        assert!(path.exists());
        sock.destroy();
        assert!(!path.exists());
    }
}
