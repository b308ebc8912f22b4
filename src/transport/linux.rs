/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! AF_PACKET transport for the AVTP stream.
//!
//! A `SOCK_DGRAM` packet socket bound to the AVTP EtherType: the kernel
//! prepends the Ethernet header from the `sockaddr_ll` destination, so frames
//! handed to [`FrameTransport::send`] are exactly the AVTP PDU. Stream-class
//! sends set `SO_PRIORITY` so a VLAN egress mapping (or mqprio/CBS qdisc) can
//! place them on the shaped hardware queue.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Mutex;

use tracing::debug;

use super::{FrameTransport, AVTP_ETHERTYPE, STREAM_DEST_MAC};
use crate::shaper::StreamClass;

/// Raw packet socket on one interface.
#[derive(Debug)]
pub struct PacketSocket {
    fd: RawFd,
    ifindex: libc::c_int,
    /// Last priority written to `SO_PRIORITY`; avoids a setsockopt per frame.
    current_priority: Mutex<Option<u8>>,
}

impl PacketSocket {
    /// Open a packet socket on `interface` (e.g. `"eth0"`).
    pub fn open(interface: &str) -> io::Result<Self> {
        let ifname = CString::new(interface)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name"))?;

        let ifindex = unsafe { libc::if_nametoindex(ifname.as_ptr()) };
        if ifindex == 0 {
            return Err(io::Error::last_os_error());
        }

        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_DGRAM,
                AVTP_ETHERTYPE.to_be() as libc::c_int,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        debug!(interface, ifindex, fd, "packet socket opened");
        Ok(Self {
            fd,
            ifindex: ifindex as libc::c_int,
            current_priority: Mutex::new(None),
        })
    }

    fn dest_addr(&self) -> libc::sockaddr_ll {
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = AVTP_ETHERTYPE.to_be();
        addr.sll_ifindex = self.ifindex;
        addr.sll_halen = STREAM_DEST_MAC.len() as u8;
        addr.sll_addr[..STREAM_DEST_MAC.len()].copy_from_slice(&STREAM_DEST_MAC);
        addr
    }

    fn set_priority(&self, priority: u8) -> io::Result<()> {
        let mut current = self.current_priority.lock().unwrap();
        if *current == Some(priority) {
            return Ok(());
        }
        let prio = priority as libc::c_int;
        let rc = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_PRIORITY,
                &prio as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        *current = Some(priority);
        Ok(())
    }
}

impl FrameTransport for PacketSocket {
    fn send(&self, frame: &[u8], class: Option<StreamClass>) -> io::Result<usize> {
        if let Some(class) = class {
            self.set_priority(class.vlan_priority())?;
        }

        let addr = self.dest_addr();
        let sent = unsafe {
            libc::sendto(
                self.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(sent as usize)
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let received = unsafe {
            libc::recv(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if received < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(err),
            };
        }
        Ok(Some(received as usize))
    }
}

impl Drop for PacketSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
