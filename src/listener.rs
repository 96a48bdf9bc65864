use std::io::ErrorKind;
use std::sync::Arc;

use log::{debug, trace};

use crate::constants::RECV_BUF_LEN;
use crate::error::{Error, Result};
use crate::packet::parse_echo_reply;
use crate::registry::{Registry, Route};
use crate::transport::Transport;

/// Reads every message arriving on the shared transport and routes echo
/// replies to the host session waiting for them.
pub(super) struct Listener {
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    identifier: Option<u16>,
}

impl Listener {
    /// `identifier` filters replies to our own requests; `None` accepts any.
    pub(super) fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<Registry>,
        identifier: Option<u16>,
    ) -> Self {
        Self {
            transport,
            registry,
            identifier,
        }
    }

    pub(super) async fn listen(&mut self) -> Result<()> {
        let mut buf = [0; RECV_BUF_LEN];
        loop {
            let (read_bytes, source) = match self.transport.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) if is_transient(err.kind()) => {
                    debug!("ignoring transient receive error: {}", err);
                    continue;
                }
                Err(err) => {
                    return Err(Error::Opaque(
                        format!("error while reading echo replies, reason: {}", err).into(),
                    ))
                }
            };
            let Ok(reply) = parse_echo_reply(&buf[..read_bytes], source) else {
                continue;
            };
            if self.identifier.is_some_and(|id| id != reply.identifier) {
                continue;
            }
            match self.registry.route(reply) {
                Route::Delivered => {}
                Route::InboxFull => debug!(
                    "dropping reply seq={} from {}: inbox full",
                    reply.sequence, reply.source
                ),
                Route::UnknownHost => trace!(
                    "dropping reply seq={} from {}: no session",
                    reply.sequence, reply.source
                ),
            }
        }
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}
