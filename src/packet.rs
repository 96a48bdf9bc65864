use std::net::Ipv4Addr;

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;

use crate::constants::ECHO_PAYLOAD;
use crate::error::{Error, Result};

/// An echo reply as seen by the listener, keyed by the host that sent it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) struct EchoReply {
    pub source: Ipv4Addr,
    pub identifier: u16,
    pub sequence: u16,
}

pub(crate) fn fill_echo_request(buf: &mut [u8], identifier: u16, sequence: u16) -> Result<()> {
    let mut packet = MutableEchoRequestPacket::new(buf)
        .ok_or(Error::Opaque("buffer too small for echo request".into()))?;
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(identifier);
    packet.set_sequence_number(sequence);
    packet.set_payload(&ECHO_PAYLOAD);
    packet.set_checksum(0);
    let checksum = pnet::util::checksum(packet.packet(), 1);
    packet.set_checksum(checksum);
    Ok(())
}

pub(crate) fn parse_echo_reply(bytes: &[u8], source: Ipv4Addr) -> Result<EchoReply> {
    let packet =
        EchoReplyPacket::new(bytes).ok_or(Error::Opaque("failed to parse ICMP message".into()))?;
    if packet.get_icmp_type() == IcmpTypes::EchoReply {
        Ok(EchoReply {
            source,
            identifier: packet.get_identifier(),
            sequence: packet.get_sequence_number(),
        })
    } else {
        Err(Error::Opaque("not an echo reply".into()))
    }
}

/// Length of the IPv4 header in front of a message read from a raw socket.
pub(crate) fn ipv4_header_len(bytes: &[u8]) -> Option<usize> {
    let header_len = usize::from(Ipv4Packet::new(bytes)?.get_header_length()) * 4;
    (header_len >= 20 && header_len <= bytes.len()).then_some(header_len)
}
