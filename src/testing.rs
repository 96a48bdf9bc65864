//! In-memory stand-ins for the network and the name service.

use std::{
    collections::HashMap,
    io,
    net::{IpAddr, Ipv4Addr},
    sync::Mutex,
    time::Duration,
};

use futures::future::BoxFuture;
use pnet::packet::icmp::echo_reply::MutableEchoReplyPacket;
use pnet::packet::icmp::echo_request::EchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes};
use pnet::packet::Packet;
use tokio::sync::mpsc;

use crate::constants::ECHO_PACK_LEN;
use crate::resolver::Resolve;
use crate::transport::Transport;

/// How a simulated host treats echo requests.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Behavior {
    Echo(Duration),
    /// Answers every request `copies` times.
    Flood { copies: usize, delay: Duration },
    /// Sends `noise` replies with unrelated sequence numbers right before
    /// the real one.
    Noisy { noise: usize, delay: Duration },
    Silent,
    RejectSend,
}

pub(crate) fn echo_reply_bytes(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buf = vec![0; ECHO_PACK_LEN];
    let mut packet = MutableEchoReplyPacket::new(&mut buf).unwrap();
    packet.set_icmp_type(IcmpTypes::EchoReply);
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(identifier);
    packet.set_sequence_number(sequence);
    let checksum = pnet::util::checksum(packet.packet(), 1);
    packet.set_checksum(checksum);
    buf
}

type Inbound = io::Result<(Vec<u8>, Ipv4Addr)>;

/// A transport whose peers answer according to their [`Behavior`].
/// Hosts without a behavior stay silent.
#[derive(Debug)]
pub(crate) struct EchoNetwork {
    hosts: HashMap<Ipv4Addr, Behavior>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    sent: Mutex<Vec<(Ipv4Addr, u16)>>,
}

impl EchoNetwork {
    pub(crate) fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            hosts: HashMap::new(),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_host(mut self, ip: Ipv4Addr, behavior: Behavior) -> Self {
        self.hosts.insert(ip, behavior);
        self
    }

    /// Delivers a raw message as if `source` had sent it.
    pub(crate) fn inject(&self, bytes: Vec<u8>, source: Ipv4Addr) {
        let _ = self.inbound_tx.send(Ok((bytes, source)));
    }

    /// Makes the next receive fail with `kind`.
    pub(crate) fn fail_receive(&self, kind: io::ErrorKind) {
        let _ = self.inbound_tx.send(Err(io::Error::new(kind, "receive failed")));
    }

    pub(crate) fn sequences_sent_to(&self, ip: Ipv4Addr) -> Vec<u16> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| *target == ip)
            .map(|(_, sequence)| *sequence)
            .collect()
    }

    /// Sends one reply per entry of `sequences` from `target`, all at once
    /// after `delay`.
    fn answer(&self, target: Ipv4Addr, identifier: u16, sequences: Vec<u16>, delay: Duration) {
        let inbound = self.inbound_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for sequence in sequences {
                let _ = inbound.send(Ok((echo_reply_bytes(identifier, sequence), target)));
            }
        });
    }
}

impl Transport for EchoNetwork {
    fn send_to<'a>(&'a self, packet: &'a [u8], target: Ipv4Addr) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let behavior = self.hosts.get(&target).copied().unwrap_or(Behavior::Silent);
            if let Behavior::RejectSend = behavior {
                return Err(io::Error::new(io::ErrorKind::Other, "network is unreachable"));
            }
            let request = EchoRequestPacket::new(packet)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "short packet"))?;
            let (identifier, sequence) = (request.get_identifier(), request.get_sequence_number());
            self.sent.lock().unwrap().push((target, sequence));
            match behavior {
                Behavior::Echo(delay) => self.answer(target, identifier, vec![sequence], delay),
                Behavior::Flood { copies, delay } => {
                    self.answer(target, identifier, vec![sequence; copies], delay)
                }
                Behavior::Noisy { noise, delay } => {
                    let mut sequences: Vec<u16> = (1..=noise as u16)
                        .map(|offset| sequence.wrapping_add(1000 + offset))
                        .collect();
                    sequences.push(sequence);
                    self.answer(target, identifier, sequences, delay)
                }
                Behavior::Silent | Behavior::RejectSend => {}
            }
            Ok(())
        })
    }

    fn recv_from<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<(usize, Ipv4Addr)>> {
        Box::pin(async move {
            let mut inbound = self.inbound_rx.lock().await;
            let (bytes, source) = inbound
                .recv()
                .await
                .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))??;
            let len = bytes.len().min(buf.len());
            buf[..len].copy_from_slice(&bytes[..len]);
            Ok((len, source))
        })
    }
}

/// Name service backed by a fixed table; unknown names fail.
#[derive(Debug, Default)]
pub(crate) struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    latency: Duration,
    lookups: Mutex<HashMap<String, usize>>,
}

impl StaticResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_host(mut self, name: &str, ips: &[IpAddr]) -> Self {
        self.hosts.insert(name.to_owned(), ips.to_vec());
        self
    }

    /// Delays every lookup by `latency`.
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn lookups(&self, name: &str) -> usize {
        self.lookups.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl Resolve for StaticResolver {
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        Box::pin(async move {
            *self
                .lookups
                .lock()
                .unwrap()
                .entry(host.to_owned())
                .or_default() += 1;
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.hosts
                .get(host)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"))
        })
    }
}
