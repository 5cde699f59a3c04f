//! Capability traits for the chain processor's external collaborators.
//!
//! The Gateway is the query/transaction service in front of the Cardano
//! node; the counterparty is any IBC-compatible chain that can consume
//! Mithril headers. Both are pure request/response surfaces: no ambient
//! state, every call carries its own inputs.

use anyhow::Result;
use ibc_proto::google::protobuf::Any;
use serde::{Deserialize, Serialize};

use mithril_light_client::header::MithrilHeader;
use mithril_light_client::types::height::Height;

/// One key/value attribute of a block event.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct EventAttribute {
    /// The attribute key.
    pub key: String,
    /// The attribute value.
    pub value: String,
}

/// An ABCI-shaped event decoded from a Cardano transaction.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockEvent {
    /// The event type, e.g. `send_packet`.
    pub kind: String,
    /// The event attributes.
    pub attributes: Vec<EventAttribute>,
}

impl BlockEvent {
    /// The value of the given attribute key, if present.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.key == key)
            .map(|attribute| attribute.value.as_str())
    }
}

/// The result of one transaction in a block.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TxResult {
    /// The transaction result code; zero means success.
    pub code: u32,
    /// The events emitted by the transaction.
    pub events: Vec<BlockEvent>,
}

/// Decoded block results for one height.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockResults {
    /// The height of the block.
    pub height: u64,
    /// The per-transaction results, in block order.
    pub txs_results: Vec<TxResult>,
}

/// Connection handshake state.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No state recorded.
    #[default]
    Uninitialized,
    /// The handshake was initiated on this chain.
    Init,
    /// The handshake was acknowledged by the counterparty.
    TryOpen,
    /// The connection is open.
    Open,
}

/// A connection end with its identifier.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentifiedConnection {
    /// The connection identifier.
    pub id: String,
    /// The client the connection belongs to.
    pub client_id: String,
    /// The counterparty connection identifier.
    pub counterparty_connection_id: String,
    /// The counterparty client identifier.
    pub counterparty_client_id: String,
    /// The handshake state.
    pub state: ConnectionState,
}

/// Channel handshake state.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ChannelState {
    /// No state recorded.
    #[default]
    Uninitialized,
    /// The handshake was initiated on this chain.
    Init,
    /// The handshake was acknowledged by the counterparty.
    TryOpen,
    /// The channel is open.
    Open,
    /// The channel is closed.
    Closed,
}

/// Channel ordering.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Packets may be relayed in any order.
    #[default]
    Unordered,
    /// Packets must be relayed in send order.
    Ordered,
}

/// A channel end with its identifiers.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentifiedChannel {
    /// The channel identifier.
    pub channel_id: String,
    /// The port the channel is bound to.
    pub port_id: String,
    /// The counterparty channel identifier.
    pub counterparty_channel_id: String,
    /// The counterparty port identifier.
    pub counterparty_port_id: String,
    /// The connections the channel travels over; always a single hop.
    pub connection_hops: Vec<String>,
    /// The handshake state.
    pub state: ChannelState,
    /// The channel ordering.
    pub ordering: ChannelOrder,
}

/// A value together with its commitment proof.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryResponse {
    /// The queried value, proto encoded.
    pub value: Vec<u8>,
    /// The commitment proof for the value.
    pub proof: Vec<u8>,
    /// The height the proof was generated at.
    pub proof_height: Height,
}

/// Summary of a client stored on the Cardano chain.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientStateInfo {
    /// The client identifier.
    pub client_id: String,
    /// The latest consensus height of the client.
    pub consensus_height: Height,
    /// The trusting period of the client, in seconds.
    pub trusting_period_secs: u64,
}

/// An unsigned-transaction build request, one variant per supported message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnsignedTxRequest {
    /// Create a client on the Cardano chain.
    CreateClient {
        /// Proto-encoded counterparty client state.
        client_state: Vec<u8>,
        /// Proto-encoded counterparty consensus state.
        consensus_state: Vec<u8>,
    },
    /// Update a client on the Cardano chain.
    UpdateClient {
        /// The client to update.
        client_id: String,
        /// Proto-encoded counterparty header.
        header: Vec<u8>,
    },
    /// Start a connection handshake.
    ConnectionOpenInit {
        /// Proto-encoded `MsgConnectionOpenInit`.
        msg: Vec<u8>,
    },
    /// Respond to a connection handshake.
    ConnectionOpenTry {
        /// Proto-encoded `MsgConnectionOpenTry`.
        msg: Vec<u8>,
    },
    /// Acknowledge a connection handshake.
    ConnectionOpenAck {
        /// Proto-encoded `MsgConnectionOpenAck`.
        msg: Vec<u8>,
    },
    /// Confirm a connection handshake.
    ConnectionOpenConfirm {
        /// Proto-encoded `MsgConnectionOpenConfirm`.
        msg: Vec<u8>,
    },
    /// Start a channel handshake.
    ChannelOpenInit {
        /// Proto-encoded `MsgChannelOpenInit`.
        msg: Vec<u8>,
    },
    /// Respond to a channel handshake.
    ChannelOpenTry {
        /// Proto-encoded `MsgChannelOpenTry`.
        msg: Vec<u8>,
    },
    /// Acknowledge a channel handshake.
    ChannelOpenAck {
        /// Proto-encoded `MsgChannelOpenAck`.
        msg: Vec<u8>,
    },
    /// Confirm a channel handshake.
    ChannelOpenConfirm {
        /// Proto-encoded `MsgChannelOpenConfirm`.
        msg: Vec<u8>,
    },
    /// Receive a packet on the Cardano chain.
    RecvPacket {
        /// Proto-encoded `MsgRecvPacket`.
        msg: Vec<u8>,
    },
}

/// The Gateway capability in front of the Cardano chain.
#[async_trait::async_trait]
pub trait CardanoGateway: Send + Sync {
    /// The latest height of the Cardano chain.
    async fn query_latest_height(&self) -> Result<u64>;

    /// Decoded block results at `height`.
    async fn query_block_results(&self, height: u64) -> Result<BlockResults>;

    /// Block results matching a search query, paginated.
    async fn query_block_search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<BlockResults>>;

    /// Summary of the client stored under `client_id` at `height`.
    async fn query_client_state(&self, height: u64, client_id: &str) -> Result<ClientStateInfo>;

    /// The stored client state with its commitment proof.
    async fn query_client_state_proof(
        &self,
        height: u64,
        client_id: &str,
    ) -> Result<QueryResponse>;

    /// The stored consensus state with its commitment proof.
    async fn query_consensus_state_proof(
        &self,
        height: u64,
        client_id: &str,
        consensus_height: Height,
    ) -> Result<QueryResponse>;

    /// All connections on the chain, depaginated.
    async fn query_connections(&self) -> Result<Vec<IdentifiedConnection>>;

    /// A single connection end.
    async fn query_connection(&self, connection_id: &str) -> Result<IdentifiedConnection>;

    /// All channels on the chain, depaginated.
    async fn query_channels(&self) -> Result<Vec<IdentifiedChannel>>;

    /// A single channel end.
    async fn query_channel(&self, port_id: &str, channel_id: &str) -> Result<IdentifiedChannel>;

    /// Sequences of pending packet commitments on a channel.
    async fn query_packet_commitments(
        &self,
        port_id: &str,
        channel_id: &str,
    ) -> Result<Vec<u64>>;

    /// A packet commitment with its proof.
    async fn query_packet_commitment_proof(
        &self,
        port_id: &str,
        channel_id: &str,
        sequence: u64,
    ) -> Result<QueryResponse>;

    /// Sequences of written packet acknowledgements on a channel.
    async fn query_packet_acknowledgements(
        &self,
        port_id: &str,
        channel_id: &str,
    ) -> Result<Vec<u64>>;

    /// A packet acknowledgement with its proof.
    async fn query_packet_acknowledgement_proof(
        &self,
        port_id: &str,
        channel_id: &str,
        sequence: u64,
    ) -> Result<QueryResponse>;

    /// The subset of `sequences` not yet received on this chain.
    async fn query_unreceived_packets(
        &self,
        port_id: &str,
        channel_id: &str,
        sequences: Vec<u64>,
    ) -> Result<Vec<u64>>;

    /// The subset of `sequences` whose acknowledgements were not yet
    /// relayed.
    async fn query_unreceived_acknowledgements(
        &self,
        port_id: &str,
        channel_id: &str,
        sequences: Vec<u64>,
    ) -> Result<Vec<u64>>;

    /// The Mithril-anchored IBC header at `height`, assembled against the
    /// counterparty's stored client state.
    async fn query_ibc_header(
        &self,
        height: u64,
        counterparty_client_state: &CounterpartyClientState,
    ) -> Result<MithrilHeader>;

    /// Builds an unsigned Cardano transaction for the given message.
    async fn build_unsigned_tx(&self, request: UnsignedTxRequest) -> Result<Vec<u8>>;
}

/// The counterparty's view of the Mithril client it stores.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CounterpartyClientState {
    /// The proto-encoded client state as stored on the counterparty.
    pub raw: Vec<u8>,
    /// The latest height of the stored client.
    pub latest_height: Height,
    /// The epoch trusted by the stored client.
    pub current_epoch: u64,
}

/// The counterparty chain capability.
#[async_trait::async_trait]
pub trait CounterpartyChain: Send + Sync {
    /// The latest height of the counterparty chain.
    async fn query_latest_height(&self) -> Result<u64>;

    /// The Mithril client state stored under `client_id` at `height`.
    async fn query_client_state(
        &self,
        height: u64,
        client_id: &str,
    ) -> Result<CounterpartyClientState>;

    /// The proto-encoded consensus state of `client_id` at
    /// `consensus_height`.
    async fn query_client_consensus_state(
        &self,
        height: u64,
        client_id: &str,
        consensus_height: Height,
    ) -> Result<Vec<u8>>;

    /// Packs a Mithril header into a `MsgUpdateClient` for `client_id`.
    fn msg_update_client(&self, client_id: &str, header: &MithrilHeader) -> Result<Any>;

    /// Broadcasts a batch of messages in a single transaction.
    async fn send_messages(&self, msgs: Vec<Any>, memo: &str) -> Result<()>;
}
