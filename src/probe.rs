use std::{collections::HashMap, net::Ipv4Addr, time::Duration};

use serde::{Serialize, Serializer};

/// How many probes each host gets and how long to wait between them.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ProbeConfig {
    pub count: usize,
    pub delay: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            count: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Statistics gathered for a single host.
///
/// When `error` is set every counter is zero and there is no average.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProbeResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "is_zero")]
    pub packets_sent: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub packets_received: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub packets_lost: usize,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_round_trip"
    )]
    pub average_round_trip: Option<Duration>,
}

/// Results of one batch, keyed by the address as it was given.
pub type ResultSet = HashMap<String, ProbeResult>;

impl ProbeResult {
    pub(crate) fn failed(ip: Option<Ipv4Addr>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ip,
            ..Self::default()
        }
    }

    pub(crate) fn finalized(
        ip: Ipv4Addr,
        sent: usize,
        received: usize,
        total_round_trip: Duration,
    ) -> Self {
        let average_round_trip = u32::try_from(received)
            .ok()
            .filter(|received| *received > 0)
            .map(|received| total_round_trip / received);
        Self {
            error: None,
            ip: Some(ip),
            packets_sent: sent,
            packets_received: received,
            packets_lost: sent - received,
            average_round_trip,
        }
    }

    /// A host counts as reachable when it was probed without error and
    /// answered at least as many probes as it lost.
    pub fn is_reachable(&self) -> bool {
        self.error.is_none() && self.packets_lost <= self.packets_received
    }
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

fn serialize_round_trip<S: Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.collect_str(&format_args!("{:?}", duration)),
        None => serializer.serialize_none(),
    }
}
