use std::fmt::Debug;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use futures::future::BoxFuture;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::packet::ipv4_header_len;

/// The endpoint shared by every host session of a [`crate::Prober`].
///
/// Implementations exchange bare ICMP messages: `send_to` receives a complete
/// echo request and `recv_from` yields whatever ICMP message arrived next,
/// with any IP header already removed.
pub trait Transport: Debug + Send + Sync + 'static {
    fn send_to<'a>(&'a self, packet: &'a [u8], target: Ipv4Addr) -> BoxFuture<'a, io::Result<()>>;

    fn recv_from<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<(usize, Ipv4Addr)>>;

    /// Whether the OS rewrites the echo identifier, so replies can't be filtered by it.
    fn assigns_identifier(&self) -> bool {
        false
    }
}

/// Flavour of ICMP socket used by [`IcmpSocket`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum SocketKind {
    /// Needs `CAP_NET_RAW`; sees every ICMP message delivered to the host.
    Raw,
    /// Unprivileged "ping socket" (see `net.ipv4.ping_group_range` on Linux).
    #[default]
    Dgram,
}

#[derive(Debug)]
pub struct IcmpSocket {
    socket: UdpSocket,
    kind: SocketKind,
}

impl IcmpSocket {
    /// Opens an ICMPv4 socket. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the OS refuses the socket, typically for lack of privilege.
    pub fn open(kind: SocketKind) -> io::Result<Self> {
        let ty = match kind {
            SocketKind::Raw => Type::RAW,
            SocketKind::Dgram => Type::DGRAM,
        };
        let socket = Socket::new(Domain::IPV4, ty, Some(Protocol::ICMPV4))?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std::net::UdpSocket::from(socket))?;
        Ok(Self { socket, kind })
    }
}

impl Transport for IcmpSocket {
    fn send_to<'a>(&'a self, packet: &'a [u8], target: Ipv4Addr) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.socket
                .send_to(packet, SocketAddrV4::new(target, 0))
                .await
                .map(|_| ())
        })
    }

    fn recv_from<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<(usize, Ipv4Addr)>> {
        Box::pin(async move {
            loop {
                let (read, from) = self.socket.recv_from(buf).await?;
                let SocketAddr::V4(from) = from else {
                    continue;
                };
                match self.kind {
                    SocketKind::Dgram => return Ok((read, *from.ip())),
                    SocketKind::Raw => {
                        let Some(header_len) = ipv4_header_len(&buf[..read]) else {
                            continue;
                        };
                        buf.copy_within(header_len..read, 0);
                        return Ok((read - header_len, *from.ip()));
                    }
                }
            }
        })
    }

    fn assigns_identifier(&self) -> bool {
        self.kind == SocketKind::Dgram
    }
}
