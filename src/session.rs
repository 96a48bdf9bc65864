use std::{collections::HashMap, net::Ipv4Addr, sync::Arc, time::Duration};

use log::debug;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::constants::ECHO_PACK_LEN;
use crate::error::{Error, Result};
use crate::packet::{fill_echo_request, EchoReply};
use crate::probe::{ProbeConfig, ProbeResult};
use crate::registry::Registration;
use crate::transport::Transport;

/// What every session of a batch shares: where to send and how long to wait.
#[derive(Debug)]
pub(super) struct SessionLink {
    pub(super) transport: Arc<dyn Transport>,
    pub(super) identifier: u16,
    pub(super) response_timeout: Duration,
}

enum Wait {
    Matched(Duration),
    TimedOut,
    Canceled,
}

/// The probing loop of one host.
#[derive(Debug)]
pub(super) struct HostSession {
    address: String,
    ip: Ipv4Addr,
    replies: mpsc::Receiver<EchoReply>,
    next_sequence: u16,
    in_flight: HashMap<u16, Instant>,
    sent: usize,
    received: usize,
    total_round_trip: Duration,
    _registration: Registration,
}

impl HostSession {
    pub(super) fn new(
        address: String,
        ip: Ipv4Addr,
        replies: mpsc::Receiver<EchoReply>,
        registration: Registration,
        first_sequence: u16,
    ) -> Self {
        Self {
            address,
            ip,
            replies,
            next_sequence: first_sequence,
            in_flight: HashMap::new(),
            sent: 0,
            received: 0,
            total_round_trip: Duration::ZERO,
            _registration: registration,
        }
    }

    /// Sends `config.count` probes one after another and finalizes.
    ///
    /// Cancellation stops the loop early; probes never sent are not counted.
    /// The registration is released when the session is dropped.
    pub(super) async fn run(
        mut self,
        ctx: &CancellationToken,
        config: &ProbeConfig,
        link: &SessionLink,
    ) -> ProbeResult {
        for index in 0..config.count {
            if index > 0 && !config.delay.is_zero() {
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = tokio::time::sleep(config.delay) => {}
                }
            }
            if ctx.is_cancelled() {
                break;
            }

            let sequence = match self.send(link).await {
                Ok(sequence) => sequence,
                Err(err) => {
                    debug!("giving up on {} ({}): {}", self.address, self.ip, err);
                    return ProbeResult::failed(Some(self.ip), err.to_string());
                }
            };
            match self.await_reply(ctx, sequence, link.response_timeout).await {
                Wait::Matched(round_trip) => {
                    self.received += 1;
                    self.total_round_trip += round_trip;
                }
                Wait::TimedOut => debug!("{} seq={} timed out", self.ip, sequence),
                Wait::Canceled => break,
            }
        }

        debug!(
            "{} ({}): sent={} received={}",
            self.address, self.ip, self.sent, self.received
        );
        ProbeResult::finalized(self.ip, self.sent, self.received, self.total_round_trip)
    }

    async fn send(&mut self, link: &SessionLink) -> Result<u16> {
        let sequence = self.next_sequence;
        self.next_sequence = sequence.wrapping_add(1);

        let mut buf = [0; ECHO_PACK_LEN];
        fill_echo_request(&mut buf, link.identifier, sequence)?;
        self.in_flight.insert(sequence, Instant::now());
        if let Err(err) = link.transport.send_to(&buf, self.ip).await {
            self.in_flight.remove(&sequence);
            return Err(Error::TransportWrite(err));
        }
        self.sent += 1;
        Ok(sequence)
    }

    async fn await_reply(
        &mut self,
        ctx: &CancellationToken,
        sequence: u16,
        timeout: Duration,
    ) -> Wait {
        let deadline = Instant::now() + timeout;
        loop {
            let reply = tokio::select! {
                _ = ctx.cancelled() => {
                    self.in_flight.remove(&sequence);
                    return Wait::Canceled;
                }
                reply = tokio::time::timeout_at(deadline, self.replies.recv()) => reply,
            };
            match reply {
                Ok(Some(reply)) if reply.sequence == sequence => {
                    if let Some(sent_at) = self.in_flight.remove(&sequence) {
                        return Wait::Matched(sent_at.elapsed());
                    }
                }
                Ok(Some(reply)) => {
                    debug!(
                        "{} sent seq={} while seq={} is in flight, discarding",
                        self.ip, reply.sequence, sequence
                    );
                }
                Ok(None) | Err(_) => {
                    self.in_flight.remove(&sequence);
                    return Wait::TimedOut;
                }
            }
        }
    }
}
