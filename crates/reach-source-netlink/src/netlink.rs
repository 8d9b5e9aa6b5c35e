//! rtnetlink plumbing
//!
//! Route lookups dump the link table (`RTM_GETLINK`) and the route table of
//! the target's family (`RTM_GETROUTE`) over a fresh request socket. Change
//! feeds bind a socket to the link and route multicast groups.

use crate::SOURCE_NAME;
use crate::routes::Route;
use crate::source::{ChangeFeed, RouteProvider};
use netlink_packet_core::{NLM_F_DUMP, NLM_F_REQUEST, NetlinkHeader, NetlinkMessage, NetlinkPayload};
use netlink_packet_route::nlas::link::Nla as LinkNla;
use netlink_packet_route::nlas::route::Nla as RouteNla;
use netlink_packet_route::{LinkMessage, RouteMessage, RtnlMessage};
use netlink_sys::protocols::NETLINK_ROUTE;
use netlink_sys::{Socket, SocketAddr};
use reach_core::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::trace;

static SEQUENCE: AtomicU32 = AtomicU32::new(1);

/// Route provider reading the kernel's main table over rtnetlink
#[derive(Debug, Default, Clone, Copy)]
pub struct NetlinkRoutes;

impl RouteProvider for NetlinkRoutes {
    fn routes(&self, addr: IpAddr) -> Result<Vec<Route>> {
        let links = link_names()?;

        let mut request = RouteMessage::default();
        request.header.address_family = family_of(addr);

        dump(RtnlMessage::GetRoute(request), |message| match message {
            RtnlMessage::NewRoute(route) => route_from_message(&route, &links),
            _ => None,
        })
    }

    fn watch(&self) -> Result<Box<dyn ChangeFeed>> {
        let events = NetlinkEvents::open()
            .map_err(|e| Error::subscription_failed(SOURCE_NAME, format!("cannot join rtnetlink groups: {}", e)))?;
        Ok(Box::new(events))
    }
}

fn family_of(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => libc::AF_INET as u8,
        IpAddr::V6(_) => libc::AF_INET6 as u8,
    }
}

/// Interface index to name
fn link_names() -> Result<HashMap<u32, String>> {
    let links = dump(RtnlMessage::GetLink(LinkMessage::default()), |message| match message {
        RtnlMessage::NewLink(link) => link_name(&link).map(|name| (link.header.index, name)),
        _ => None,
    })?;
    Ok(links.into_iter().collect())
}

fn link_name(link: &LinkMessage) -> Option<String> {
    link.nlas.iter().find_map(|nla| match nla {
        LinkNla::IfName(name) => Some(name.clone()),
        _ => None,
    })
}

/// Decode a route message into a [`Route`]
///
/// Only unicast routes of the main table with a known output interface are
/// kept; everything else (local, broadcast, policy tables, multipath) yields
/// `None`.
pub(crate) fn route_from_message(message: &RouteMessage, links: &HashMap<u32, String>) -> Option<Route> {
    let header = &message.header;
    if header.kind != libc::RTN_UNICAST as u8 {
        return None;
    }

    let mut table = u32::from(header.table);
    let mut destination = None;
    let mut gateway = None;
    let mut oif = None;
    let mut metric = 0;

    for nla in &message.nlas {
        match nla {
            RouteNla::Destination(bytes) => destination = Some(bytes.as_slice()),
            RouteNla::Gateway(bytes) => gateway = Some(bytes.as_slice()),
            RouteNla::Oif(index) => oif = Some(*index),
            RouteNla::Priority(priority) => metric = *priority,
            RouteNla::Table(id) => table = *id,
            _ => {}
        }
    }

    if table != u32::from(libc::RT_TABLE_MAIN as u8) {
        return None;
    }

    let destination = match destination {
        Some(bytes) => address(header.address_family, bytes)?,
        None => unspecified(header.address_family)?,
    };
    let gateway = match gateway {
        Some(bytes) => Some(address(header.address_family, bytes)?).filter(|gw| !gw.is_unspecified()),
        None => None,
    };

    Some(Route {
        iface: links.get(&oif?)?.clone(),
        destination,
        prefix_len: header.destination_prefix_length,
        gateway,
        metric,
    })
}

fn address(family: u8, bytes: &[u8]) -> Option<IpAddr> {
    match i32::from(family) {
        libc::AF_INET => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        libc::AF_INET6 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

fn unspecified(family: u8) -> Option<IpAddr> {
    match i32::from(family) {
        libc::AF_INET => Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        libc::AF_INET6 => Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        _ => None,
    }
}

fn fetch_error(context: &str, err: impl std::fmt::Display) -> Error {
    Error::fetch_failed(SOURCE_NAME, format!("{}: {}", context, err))
}

/// Send a dump request and collect what `pick` keeps from the reply
fn dump<T>(request: RtnlMessage, mut pick: impl FnMut(RtnlMessage) -> Option<T>) -> Result<Vec<T>> {
    let mut socket = Socket::new(NETLINK_ROUTE).map_err(|e| fetch_error("cannot open rtnetlink socket", e))?;
    socket.bind_auto().map_err(|e| fetch_error("cannot bind rtnetlink socket", e))?;
    socket
        .connect(&SocketAddr::new(0, 0))
        .map_err(|e| fetch_error("cannot connect rtnetlink socket", e))?;

    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST | NLM_F_DUMP;
    header.sequence_number = SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(request));
    packet.finalize();
    let mut buf = vec![0; packet.buffer_len()];
    packet.serialize(&mut buf[..]);

    socket.send(&buf, 0).map_err(|e| fetch_error("rtnetlink request failed", e))?;

    let mut kept = Vec::new();
    loop {
        let (bytes, _) = socket
            .recv_from_full()
            .map_err(|e| fetch_error("rtnetlink receive failed", e))?;

        for message in decode(&bytes)? {
            match message.payload {
                NetlinkPayload::Done(_) => return Ok(kept),
                NetlinkPayload::Error(err) => return Err(fetch_error("rtnetlink dump rejected", err.to_io())),
                NetlinkPayload::InnerMessage(inner) => kept.extend(pick(inner)),
                _ => {}
            }
        }
    }
}

/// Split one datagram into its netlink messages
fn decode(bytes: &[u8]) -> Result<Vec<NetlinkMessage<RtnlMessage>>> {
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let message = NetlinkMessage::<RtnlMessage>::deserialize(&bytes[offset..])
            .map_err(|e| fetch_error("malformed rtnetlink message", e))?;
        let len = message.header.length as usize;
        messages.push(message);
        if len == 0 {
            break;
        }
        offset += len;
    }

    Ok(messages)
}

/// Whether `message` reports a route or link change
fn is_change(message: &NetlinkMessage<RtnlMessage>) -> bool {
    matches!(
        message.payload,
        NetlinkPayload::InnerMessage(
            RtnlMessage::NewRoute(_) | RtnlMessage::DelRoute(_) | RtnlMessage::NewLink(_) | RtnlMessage::DelLink(_)
        )
    )
}

/// Multicast listener for `RTMGRP_LINK`, `RTMGRP_IPV4_ROUTE` and
/// `RTMGRP_IPV6_ROUTE`
pub struct NetlinkEvents {
    socket: Socket,
}

impl NetlinkEvents {
    pub fn open() -> io::Result<Self> {
        let mut socket = Socket::new(NETLINK_ROUTE)?;
        let groups = (libc::RTMGRP_LINK | libc::RTMGRP_IPV4_ROUTE | libc::RTMGRP_IPV6_ROUTE) as u32;
        socket.bind(&SocketAddr::new(0, groups))?;
        Ok(Self { socket })
    }

    fn set_recv_timeout(&self, timeout: Duration) -> io::Result<()> {
        // A zero timeval means "block forever".
        let timeout = timeout.max(Duration::from_millis(1));
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };

        // SAFETY: the fd is owned by `self.socket` and `tv` lives across the
        // call with the length passed alongside it.
        let rc = unsafe {
            libc::setsockopt(
                self.socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                (&tv as *const libc::timeval).cast::<libc::c_void>(),
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };

        if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }
}

impl ChangeFeed for NetlinkEvents {
    fn wait(&mut self, timeout: Duration) -> Result<bool> {
        self.set_recv_timeout(timeout)?;

        match self.socket.recv_from_full() {
            Ok((bytes, _)) => {
                let changed = decode(&bytes)?.iter().any(is_change);
                trace!(len = bytes.len(), changed, "rtnetlink event");
                Ok(changed)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                Ok(false)
            }
            // The receive queue overflowed and events were dropped.
            Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => Ok(true),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
