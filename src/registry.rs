use std::{
    collections::HashMap,
    net::Ipv4Addr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::packet::EchoReply;

#[derive(Debug)]
struct Inbox {
    address: String,
    sender: mpsc::Sender<EchoReply>,
}

/// What happened to a reply handed to [`Registry::route`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(super) enum Route {
    Delivered,
    InboxFull,
    UnknownHost,
}

/// In-flight hosts keyed by IP, each with a bounded inbox for its replies.
///
/// The lock is only taken to insert, remove or look up an entry, never
/// across an await point.
#[derive(Debug)]
pub(super) struct Registry {
    inboxes: Mutex<HashMap<Ipv4Addr, Inbox>>,
    capacity: usize,
}

impl Registry {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            inboxes: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Registers `ip` on behalf of `address`.
    ///
    /// Fails with the address that already holds `ip`.
    pub(super) fn register(
        self: &Arc<Self>,
        ip: Ipv4Addr,
        address: &str,
    ) -> Result<(Registration, mpsc::Receiver<EchoReply>), String> {
        let mut inboxes = self.lock();
        if let Some(existing) = inboxes.get(&ip) {
            return Err(existing.address.clone());
        }
        let (sender, receiver) = mpsc::channel(self.capacity);
        inboxes.insert(
            ip,
            Inbox {
                address: address.to_owned(),
                sender,
            },
        );
        let registration = Registration {
            registry: Arc::clone(self),
            ip,
        };
        Ok((registration, receiver))
    }

    /// Hands a reply to the inbox of its source. Never waits: a full inbox
    /// or an unregistered source drops the reply.
    pub(super) fn route(&self, reply: EchoReply) -> Route {
        let inboxes = self.lock();
        let Some(inbox) = inboxes.get(&reply.source) else {
            return Route::UnknownHost;
        };
        match inbox.sender.try_send(reply) {
            Ok(()) => Route::Delivered,
            Err(TrySendError::Full(_)) => Route::InboxFull,
            Err(TrySendError::Closed(_)) => Route::UnknownHost,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.lock().len()
    }

    fn deregister(&self, ip: &Ipv4Addr) {
        self.lock().remove(ip);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Ipv4Addr, Inbox>> {
        self.inboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps an IP registered; dropping it removes the entry.
#[derive(Debug)]
pub(super) struct Registration {
    registry: Arc<Registry>,
    ip: Ipv4Addr,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(&self.ip);
    }
}
