//! In-memory state caches owned by the chain processor.
//!
//! Writes happen only from the processor loop. Path processors receive
//! cloned, client-filtered snapshots through
//! [`ChainProcessorCacheData`], never shared references.

use std::collections::{BTreeMap, HashMap};

use mithril_light_client::header::MithrilHeader;
use mithril_light_client::types::height::Height;

use crate::events::IbcEventWithHeight;
use crate::gateway::ChannelOrder;

/// Identity of a connection across both chains.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey {
    /// The connection identifier.
    pub connection_id: String,
    /// The client the connection belongs to.
    pub client_id: String,
    /// The counterparty connection identifier.
    pub counterparty_connection_id: String,
    /// The counterparty client identifier.
    pub counterparty_client_id: String,
}

/// Identity of a channel across both chains.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
    /// The channel identifier.
    pub channel_id: String,
    /// The port the channel is bound to.
    pub port_id: String,
    /// The counterparty channel identifier.
    pub counterparty_channel_id: String,
    /// The counterparty port identifier.
    pub counterparty_port_id: String,
}

/// Open state per known connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStateCache(BTreeMap<ConnectionKey, bool>);

impl ConnectionStateCache {
    /// Records the open state of a connection.
    pub fn set_open(&mut self, key: ConnectionKey, open: bool) {
        self.0.insert(key, open);
    }

    /// Whether a connection is known to be open.
    #[must_use]
    pub fn is_open(&self, key: &ConnectionKey) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    /// The number of cached connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A snapshot restricted to connections of `client_id`.
    #[must_use]
    pub fn filter_for_client(&self, client_id: &str) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| key.client_id == client_id)
                .map(|(key, open)| (key.clone(), *open))
                .collect(),
        )
    }
}

/// Open state and ordering per known channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelOpenState {
    /// Whether the channel is open.
    pub open: bool,
    /// The channel ordering.
    pub ordering: ChannelOrder,
}

/// Open state per known channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelStateCache(BTreeMap<ChannelKey, ChannelOpenState>);

impl ChannelStateCache {
    /// Records the open state of a channel.
    pub fn set_open(&mut self, key: ChannelKey, open: bool, ordering: ChannelOrder) {
        self.0.insert(key, ChannelOpenState { open, ordering });
    }

    /// Whether a channel is known to be open.
    #[must_use]
    pub fn is_open(&self, key: &ChannelKey) -> bool {
        self.0.get(key).is_some_and(|state| state.open)
    }

    /// The number of cached channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A snapshot restricted to channels whose connection belongs to
    /// `client_id`, resolved through the connection maps.
    #[must_use]
    pub fn filter_for_client(
        &self,
        client_id: &str,
        channel_connections: &HashMap<String, String>,
        connection_clients: &HashMap<String, String>,
    ) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| {
                    channel_connections
                        .get(&key.channel_id)
                        .and_then(|connection_id| connection_clients.get(connection_id))
                        .is_some_and(|owner| owner == client_id)
                })
                .map(|(key, state)| (key.clone(), *state))
                .collect(),
        )
    }
}

/// The ordered log of IBC events observed during a query cycle.
///
/// Order is `(height, tx index in block, event index in tx)`, which is the
/// order the processor ingests them in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IbcMessagesCache {
    /// The observed events, oldest first.
    pub events: Vec<IbcEventWithHeight>,
}

impl IbcMessagesCache {
    /// Appends an observed event.
    pub fn push(&mut self, event: IbcEventWithHeight) {
        self.events.push(event);
    }

    /// Whether any event was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Headers fetched during a query cycle, by height.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IbcHeaderCache(pub BTreeMap<u64, MithrilHeader>);

/// The latest block observed on the Cardano chain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LatestBlock {
    /// The block height.
    pub height: u64,
    /// The block time in nanoseconds since the Unix epoch.
    pub time_ns: u64,
}

/// Summary of the counterparty client tracked on this chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackedClientState {
    /// The client identifier.
    pub client_id: String,
    /// The latest consensus height of the client.
    pub consensus_height: Height,
    /// The trusting period of the client, in seconds.
    pub trusting_period_secs: u64,
}

/// The snapshot handed to a path processor after a query cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainProcessorCacheData {
    /// The latest observed block.
    pub latest_block: LatestBlock,
    /// The header fetched for the latest processed height.
    pub latest_header: Option<MithrilHeader>,
    /// The events observed during the cycle.
    pub ibc_messages_cache: IbcMessagesCache,
    /// Whether the processor is in sync with the chain tip.
    pub in_sync: bool,
    /// The client tracked for this path.
    pub client_state: TrackedClientState,
    /// Connection open state, filtered for the path's client.
    pub connection_state_cache: ConnectionStateCache,
    /// Channel open state, filtered for the path's client.
    pub channel_state_cache: ChannelStateCache,
    /// Headers fetched during the cycle.
    pub ibc_header_cache: IbcHeaderCache,
}

/// A path processor fed by the chain processor.
///
/// Implementations receive cloned snapshots and never share mutable state
/// with the processor loop.
pub trait PathProcessor: Send + Sync {
    /// The client id this path cares about on `chain_id`.
    fn relevant_client_id(&self, chain_id: &str) -> String;

    /// Hands the path processor a fresh data snapshot.
    fn handle_new_data(&self, chain_id: &str, data: ChainProcessorCacheData);

    /// Signals that the backlog can be processed; emitted once when the
    /// processor first reaches the chain tip.
    fn process_backlog_if_ready(&self);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{ChannelKey, ChannelStateCache, ConnectionKey, ConnectionStateCache};
    use crate::gateway::ChannelOrder;

    fn connection_key(connection_id: &str, client_id: &str) -> ConnectionKey {
        ConnectionKey {
            connection_id: connection_id.to_string(),
            client_id: client_id.to_string(),
            counterparty_connection_id: "connection-9".to_string(),
            counterparty_client_id: "07-tendermint-0".to_string(),
        }
    }

    #[test]
    fn test_connection_cache_filter_for_client() {
        let mut cache = ConnectionStateCache::default();
        cache.set_open(connection_key("connection-0", "ibc_client-0"), true);
        cache.set_open(connection_key("connection-1", "ibc_client-1"), true);

        let filtered = cache.filter_for_client("ibc_client-0");
        assert_eq!(filtered.len(), 1);
        assert!(filtered.is_open(&connection_key("connection-0", "ibc_client-0")));
    }

    #[test]
    fn test_channel_cache_filter_resolves_through_connections() {
        let mut cache = ChannelStateCache::default();
        let key = ChannelKey {
            channel_id: "channel-0".to_string(),
            port_id: "transfer".to_string(),
            counterparty_channel_id: "channel-14".to_string(),
            counterparty_port_id: "transfer".to_string(),
        };
        cache.set_open(key.clone(), true, ChannelOrder::Unordered);

        let channel_connections: HashMap<String, String> =
            [("channel-0".to_string(), "connection-0".to_string())].into();
        let connection_clients: HashMap<String, String> =
            [("connection-0".to_string(), "ibc_client-0".to_string())].into();

        let filtered =
            cache.filter_for_client("ibc_client-0", &channel_connections, &connection_clients);
        assert!(filtered.is_open(&key));

        let filtered =
            cache.filter_for_client("ibc_client-1", &channel_connections, &connection_clients);
        assert!(filtered.is_empty());
    }
}
