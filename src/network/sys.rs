//! Thin libc wrappers for what std and mio do not expose: send without
//! SIGPIPE, kernel receive timestamps and interface address lookup.

use std::ffi::CStr;
use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;
use std::ptr;

use crate::util::time::{Nanos, NANOS_TO_MICROS, NANOS_TO_SECS};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL;

// Apple has no MSG_NOSIGNAL, SO_NOSIGPIPE is set at socket creation instead
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT;

/// Ancillary data buffer, aligned for `cmsghdr`.
#[repr(C, align(8))]
struct ControlBuffer([u8; 128]);

fn cvt(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

fn set_int_option(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
) -> io::Result<()> {
    // SAFETY: value outlives the call and the length matches its type
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Single non-blocking send with broken-pipe signals suppressed.
#[inline]
pub fn send_nosignal(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    // SAFETY: buf is valid for buf.len() bytes
    cvt(unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), SEND_FLAGS) })
}

/// Single non-blocking receive.
#[inline]
pub fn recv_nonblocking(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: buf is valid and writable for buf.len() bytes
    cvt(unsafe {
        libc::recv(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            libc::MSG_DONTWAIT,
        )
    })
}

/// Non-blocking receive that also returns the `SCM_TIMESTAMP` control
/// message, if the kernel attached one.
pub fn recv_with_timestamp(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Option<Nanos>)> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };
    let mut control = ControlBuffer([0u8; 128]);

    // SAFETY: msghdr is plain old data, all-zero is a valid empty header
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.0.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = control.0.len() as _;

    // SAFETY: msg points at live iovec and control buffers
    let n = cvt(unsafe { libc::recvmsg(fd, &mut msg, libc::MSG_DONTWAIT) })?;

    let mut timestamp = None;
    // SAFETY: the CMSG_* walk stays inside msg_controllen as set by the kernel
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_TIMESTAMP {
                let tv = ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::timeval);
                timestamp = Some(
                    tv.tv_sec as Nanos * NANOS_TO_SECS + tv.tv_usec as Nanos * NANOS_TO_MICROS,
                );
                break;
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    Ok((n, timestamp))
}

/// Ask the kernel to timestamp every received packet.
pub fn set_so_timestamp(fd: RawFd) -> io::Result<()> {
    set_int_option(fd, libc::SOL_SOCKET, libc::SO_TIMESTAMP, 1)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn set_no_sigpipe(fd: RawFd) -> io::Result<()> {
    set_int_option(fd, libc::SOL_SOCKET, libc::SO_NOSIGPIPE, 1)
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub fn set_no_sigpipe(_fd: RawFd) -> io::Result<()> {
    Ok(())
}

/// IPv4 address assigned to interface `iface`, e.g. `"lo"` or `"eth0"`.
pub fn interface_ipv4(iface: &str) -> io::Result<Option<Ipv4Addr>> {
    let mut ifaddr: *mut libc::ifaddrs = ptr::null_mut();
    // SAFETY: getifaddrs fills ifaddr with a list we free below
    if unsafe { libc::getifaddrs(&mut ifaddr) } == -1 {
        return Err(io::Error::last_os_error());
    }

    let mut found = None;
    let mut cur = ifaddr;
    while !cur.is_null() {
        // SAFETY: cur is a node of the list returned by getifaddrs
        let ifa = unsafe { &*cur };
        if !ifa.ifa_addr.is_null() {
            // SAFETY: ifa_addr is non-null and points at a sockaddr
            let family = unsafe { (*ifa.ifa_addr).sa_family } as libc::c_int;
            // SAFETY: ifa_name is a NUL-terminated string owned by the list
            let name = unsafe { CStr::from_ptr(ifa.ifa_name) };
            if family == libc::AF_INET && name.to_bytes() == iface.as_bytes() {
                // SAFETY: AF_INET entries carry a sockaddr_in
                let sin = unsafe { &*(ifa.ifa_addr as *const libc::sockaddr_in) };
                found = Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)));
                break;
            }
        }
        cur = ifa.ifa_next;
    }

    // SAFETY: ifaddr came from getifaddrs and is freed exactly once
    unsafe { libc::freeifaddrs(ifaddr) };
    Ok(found)
}
