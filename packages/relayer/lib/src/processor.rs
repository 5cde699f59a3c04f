//! The Cardano chain processor.
//!
//! A long-lived loop that discovers new heights, fetches block results and a
//! Mithril-anchored IBC header per height, ingests IBC events into the state
//! caches, and drives `MsgUpdateClient` submission toward the counterparty.
//!
//! Per-height processing is sequential, so event ordering matches block
//! ordering. Within one height the block-results query and the header query
//! run concurrently and join before events are processed; these are the only
//! suspension points inside a height. Cancellation is observed at height
//! boundaries only — a height is never half-processed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::watch;

use mithril_light_client::header::MithrilHeader;

use crate::cache::{
    ChainProcessorCacheData, ChannelKey, ChannelStateCache, ConnectionKey, ConnectionStateCache,
    IbcHeaderCache, IbcMessagesCache, LatestBlock, PathProcessor, TrackedClientState,
};
use crate::events::{parse_ibc_events_from_tx, CardanoIbcEvent, IbcEventWithHeight};
use crate::gateway::{
    CardanoGateway, ChannelOrder, ChannelState, ConnectionState, CounterpartyChain,
    IdentifiedChannel, IdentifiedConnection,
};

/// Timeout of individual queries.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout of block-results queries, which can be large.
pub const BLOCK_RESULTS_QUERY_TIMEOUT: Duration = Duration::from_secs(120);
/// Deadline of the outbound message batch.
pub const SEND_MESSAGES_TIMEOUT: Duration = Duration::from_secs(60);
/// Delay between latest-height query retries.
pub const LATEST_HEIGHT_QUERY_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Number of latest-height query attempts.
pub const LATEST_HEIGHT_QUERY_RETRIES: u32 = 5;
/// Initial backoff of the exponential retry used for cache initialization.
pub const RETRY_INITIAL_BACKOFF: Duration = Duration::from_millis(400);

/// Default tick period of the query loop.
pub const DEFAULT_MIN_QUERY_LOOP_DURATION: Duration = Duration::from_secs(1);
/// Default number of blocks the initial cursor looks back.
pub const DEFAULT_INITIAL_BLOCK_HISTORY: u64 = 15;
/// Distance to the chain tip below which the processor is in sync.
pub const IN_SYNC_NUM_BLOCKS_THRESHOLD: u64 = 2;

/// Error fragment marking a height the aggregator has no data for yet. Such
/// heights are skipped without failing the cycle.
pub const SKIP_MISSING_MITHRIL_HEIGHT: &str = "SkipImmutableFile: Missing mithril height";

/// Configuration of a [`ChainProcessor`].
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// The Gateway RPC address.
    pub rpc_addr: String,
    /// The Cardano chain id.
    pub chain_id: String,
    /// The client on the Cardano chain tracking the counterparty.
    pub client_id: String,
    /// The Mithril client on the counterparty chain.
    pub counterparty_client_id: String,
    /// Tick period of the query loop; zero selects the default.
    pub min_loop_duration: Duration,
    /// Number of blocks the initial cursor looks back.
    pub initial_block_history: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            rpc_addr: String::new(),
            chain_id: String::new(),
            client_id: String::new(),
            counterparty_client_id: String::new(),
            min_loop_duration: DEFAULT_MIN_QUERY_LOOP_DURATION,
            initial_block_history: DEFAULT_INITIAL_BLOCK_HISTORY,
        }
    }
}

struct QueryCyclePersistence {
    latest_height: u64,
    latest_queried_block: u64,
    min_query_loop_duration: Duration,
}

/// The Cardano → counterparty side of the relayer.
pub struct ChainProcessor<G, C> {
    config: ProcessorConfig,
    gateway: Arc<G>,
    counterparty: Arc<C>,
    path_processors: Vec<Arc<dyn PathProcessor>>,
    in_sync: bool,
    latest_block: LatestBlock,
    latest_client_state: HashMap<String, TrackedClientState>,
    connection_state_cache: ConnectionStateCache,
    channel_state_cache: ChannelStateCache,
    connection_clients: HashMap<String, String>,
    channel_connections: HashMap<String, String>,
}

async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| anyhow!("query timed out after {duration:?}"))?
}

async fn with_backoff_retry<T, F, Fut>(attempts: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = RETRY_INITIAL_BACKOFF;
    let mut last_error = None;
    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_error = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("retry attempts exhausted")))
}

impl<G, C> ChainProcessor<G, C>
where
    G: CardanoGateway,
    C: CounterpartyChain,
{
    /// Creates a new processor over the given collaborators.
    #[must_use]
    pub fn new(config: ProcessorConfig, gateway: Arc<G>, counterparty: Arc<C>) -> Self {
        Self {
            config,
            gateway,
            counterparty,
            path_processors: Vec::new(),
            in_sync: false,
            latest_block: LatestBlock::default(),
            latest_client_state: HashMap::new(),
            connection_state_cache: ConnectionStateCache::default(),
            channel_state_cache: ChannelStateCache::default(),
            connection_clients: HashMap::new(),
            channel_connections: HashMap::new(),
        }
    }

    /// Registers the path processors fed by this chain processor.
    pub fn set_path_processors(&mut self, path_processors: Vec<Arc<dyn PathProcessor>>) {
        self.path_processors = path_processors;
    }

    /// Runs the processor until `shutdown` fires.
    ///
    /// Queries the chain tip with bounded retry, initializes the connection
    /// and channel caches, then enters the ticker loop executing one query
    /// cycle per tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let min_query_loop_duration = if self.config.min_loop_duration.is_zero() {
            DEFAULT_MIN_QUERY_LOOP_DURATION
        } else {
            self.config.min_loop_duration
        };
        let mut persistence = QueryCyclePersistence {
            latest_height: 0,
            latest_queried_block: 0,
            min_query_loop_duration,
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                latest_height = self.latest_height_with_retry() => match latest_height {
                    Ok(latest_height) => {
                        persistence.latest_height = latest_height;
                        break;
                    }
                    Err(err) => {
                        tracing::error!(
                            attempts = LATEST_HEIGHT_QUERY_RETRIES,
                            %err,
                            "failed to query latest height after max attempts"
                        );
                    }
                }
            }
        }

        // The initial cursor looks back a bounded block history.
        persistence.latest_queried_block = persistence
            .latest_height
            .saturating_sub(self.config.initial_block_history);

        let gateway = self.gateway.clone();
        let (connections, channels) = tokio::try_join!(
            with_backoff_retry(LATEST_HEIGHT_QUERY_RETRIES, || {
                let gateway = gateway.clone();
                async move { with_timeout(QUERY_TIMEOUT, gateway.query_connections()).await }
            }),
            with_backoff_retry(LATEST_HEIGHT_QUERY_RETRIES, || {
                let gateway = gateway.clone();
                async move { with_timeout(QUERY_TIMEOUT, gateway.query_channels()).await }
            }),
        )?;
        self.apply_connections(connections);
        self.apply_channels(channels);

        tracing::debug!("entering main query loop");
        let mut ticker = tokio::time::interval(persistence.min_query_loop_duration);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                _ = ticker.tick() => {}
            }
            self.query_cycle(&shutdown, &mut persistence).await?;
        }
    }

    async fn latest_height_with_retry(&self) -> Result<u64> {
        let mut last_error = None;
        for attempt in 1..=LATEST_HEIGHT_QUERY_RETRIES {
            match with_timeout(QUERY_TIMEOUT, self.gateway.query_latest_height()).await {
                Ok(latest_height) => return Ok(latest_height),
                Err(err) => {
                    tracing::info!(
                        attempt,
                        max_attempts = LATEST_HEIGHT_QUERY_RETRIES,
                        %err,
                        "failed to query latest height"
                    );
                    last_error = Some(err);
                    if attempt < LATEST_HEIGHT_QUERY_RETRIES {
                        tokio::time::sleep(LATEST_HEIGHT_QUERY_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("latest height query failed")))
    }

    fn apply_connections(&mut self, connections: Vec<IdentifiedConnection>) {
        for connection in connections {
            self.connection_clients
                .insert(connection.id.clone(), connection.client_id.clone());
            self.connection_state_cache.set_open(
                ConnectionKey {
                    connection_id: connection.id,
                    client_id: connection.client_id,
                    counterparty_connection_id: connection.counterparty_connection_id,
                    counterparty_client_id: connection.counterparty_client_id,
                },
                connection.state == ConnectionState::Open,
            );
        }
    }

    fn apply_channels(&mut self, channels: Vec<IdentifiedChannel>) {
        for channel in channels {
            let [connection_id] = channel.connection_hops.as_slice() else {
                tracing::error!(
                    channel_id = %channel.channel_id,
                    port_id = %channel.port_id,
                    connection_hops = ?channel.connection_hops,
                    "found channel using multiple connection hops, not currently supported, ignoring"
                );
                continue;
            };
            self.channel_connections
                .insert(channel.channel_id.clone(), connection_id.clone());
            self.channel_state_cache.set_open(
                ChannelKey {
                    channel_id: channel.channel_id,
                    port_id: channel.port_id,
                    counterparty_channel_id: channel.counterparty_channel_id,
                    counterparty_port_id: channel.counterparty_port_id,
                },
                channel.state == ChannelState::Open,
                channel.ordering,
            );
        }
    }

    async fn query_ibc_header(
        &self,
        counterparty_height: u64,
        height: u64,
    ) -> Result<MithrilHeader> {
        // The header is assembled against the counterparty's stored client
        // state, which pins the trusted epoch and snapshot.
        let client_state = self
            .counterparty
            .query_client_state(counterparty_height, &self.config.counterparty_client_id)
            .await?;
        self.gateway.query_ibc_header(height, &client_state).await
    }

    fn handle_ibc_event(
        &mut self,
        event: &IbcEventWithHeight,
        ibc_messages_cache: &mut IbcMessagesCache,
    ) {
        match &event.event {
            CardanoIbcEvent::ConnectionOpenInit(connection)
            | CardanoIbcEvent::ConnectionOpenTry(connection)
            | CardanoIbcEvent::ConnectionOpenAck(connection)
            | CardanoIbcEvent::ConnectionOpenConfirm(connection) => {
                let open = matches!(
                    event.event,
                    CardanoIbcEvent::ConnectionOpenAck(_)
                        | CardanoIbcEvent::ConnectionOpenConfirm(_)
                );
                self.connection_clients.insert(
                    connection.connection_id.clone(),
                    connection.client_id.clone(),
                );
                self.connection_state_cache.set_open(
                    ConnectionKey {
                        connection_id: connection.connection_id.clone(),
                        client_id: connection.client_id.clone(),
                        counterparty_connection_id: connection
                            .counterparty_connection_id
                            .clone(),
                        counterparty_client_id: connection.counterparty_client_id.clone(),
                    },
                    open,
                );
            }
            CardanoIbcEvent::ChannelOpenInit(channel)
            | CardanoIbcEvent::ChannelOpenTry(channel)
            | CardanoIbcEvent::ChannelOpenAck(channel)
            | CardanoIbcEvent::ChannelOpenConfirm(channel) => {
                let open = matches!(
                    event.event,
                    CardanoIbcEvent::ChannelOpenAck(_) | CardanoIbcEvent::ChannelOpenConfirm(_)
                );
                self.channel_connections
                    .insert(channel.channel_id.clone(), channel.connection_id.clone());
                self.channel_state_cache.set_open(
                    ChannelKey {
                        channel_id: channel.channel_id.clone(),
                        port_id: channel.port_id.clone(),
                        counterparty_channel_id: channel.counterparty_channel_id.clone(),
                        counterparty_port_id: channel.counterparty_port_id.clone(),
                    },
                    open,
                    ChannelOrder::Unordered,
                );
            }
            CardanoIbcEvent::SendPacket(_)
            | CardanoIbcEvent::RecvPacket(_)
            | CardanoIbcEvent::WriteAcknowledgement(_) => {}
        }

        ibc_messages_cache.push(event.clone());
    }

    async fn tracked_client_state(&mut self, client_id: &str) -> Result<TrackedClientState> {
        if let Some(client_state) = self.latest_client_state.get(client_id) {
            if client_state.trusting_period_secs > 0 {
                return Ok(client_state.clone());
            }
        }

        let info = with_timeout(
            QUERY_TIMEOUT,
            self.gateway
                .query_client_state(self.latest_block.height, client_id),
        )
        .await?;
        let client_state = TrackedClientState {
            client_id: client_id.to_string(),
            consensus_height: info.consensus_height,
            trusting_period_secs: info.trusting_period_secs,
        };
        self.latest_client_state
            .insert(client_id.to_string(), client_state.clone());
        Ok(client_state)
    }

    async fn query_cycle(
        &mut self,
        shutdown: &watch::Receiver<bool>,
        persistence: &mut QueryCyclePersistence,
    ) -> Result<()> {
        persistence.latest_height = match self.latest_height_with_retry().await {
            Ok(latest_height) => latest_height,
            Err(err) => {
                tracing::error!(
                    attempts = LATEST_HEIGHT_QUERY_RETRIES,
                    %err,
                    "failed to query latest height after max attempts"
                );
                return Ok(());
            }
        };
        tracing::debug!(
            latest_height = persistence.latest_height,
            "queried latest height"
        );

        let mut first_time_in_sync = false;
        if !self.in_sync {
            if persistence
                .latest_height
                .saturating_sub(persistence.latest_queried_block)
                < IN_SYNC_NUM_BLOCKS_THRESHOLD
            {
                self.in_sync = true;
                first_time_in_sync = true;
                tracing::info!("chain is in sync");
            } else {
                tracing::info!(
                    latest_queried_block = persistence.latest_queried_block,
                    latest_height = persistence.latest_height,
                    "chain is not yet in sync"
                );
            }
        }

        let mut ibc_messages_cache = IbcMessagesCache::default();
        let mut ibc_header_cache = IbcHeaderCache::default();
        let mut latest_header: Option<MithrilHeader> = None;
        let mut new_latest_queried_block = persistence.latest_queried_block;
        let mut update_client_messages = Vec::new();

        let counterparty_height = self.counterparty.query_latest_height().await?;

        for height in (persistence.latest_queried_block + 1)..=persistence.latest_height {
            if *shutdown.borrow() {
                break;
            }

            let block_and_header = tokio::try_join!(
                with_timeout(
                    BLOCK_RESULTS_QUERY_TIMEOUT,
                    self.gateway.query_block_results(height),
                ),
                with_timeout(
                    QUERY_TIMEOUT,
                    self.query_ibc_header(counterparty_height, height),
                ),
            );

            let (block_results, header) = match block_and_header {
                Ok(results) => results,
                Err(err) if err.to_string().contains(SKIP_MISSING_MITHRIL_HEIGHT) => {
                    tracing::info!(height, "skipping block");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(%err, "error querying block data");
                    break;
                }
            };

            self.latest_block = LatestBlock {
                height,
                time_ns: header.timestamp_ns().unwrap_or_default(),
            };
            ibc_header_cache.0.insert(height, header.clone());

            let mut has_ibc_events = false;
            for tx in &block_results.txs_results {
                if tx.code != 0 {
                    // tx was not successful
                    continue;
                }
                let events = parse_ibc_events_from_tx(&tx.events, height);
                for event in &events {
                    self.handle_ibc_event(event, &mut ibc_messages_cache);
                }
                if !events.is_empty() {
                    has_ibc_events = true;
                }
            }

            if has_ibc_events {
                let msg_update_client = self
                    .counterparty
                    .msg_update_client(&self.config.counterparty_client_id, &header)?;
                update_client_messages.push(msg_update_client);
            }

            latest_header = Some(header);
            new_latest_queried_block = height;
        }

        if !update_client_messages.is_empty() {
            if let Err(err) = with_timeout(
                SEND_MESSAGES_TIMEOUT,
                self.counterparty.send_messages(update_client_messages, ""),
            )
            .await
            {
                tracing::warn!(%err, "failed to send update client messages");
            }
        }

        if new_latest_queried_block == persistence.latest_queried_block {
            if first_time_in_sync {
                for path_processor in &self.path_processors {
                    path_processor.process_backlog_if_ready();
                }
            }
            return Ok(());
        }

        let path_processors = self.path_processors.clone();
        for path_processor in &path_processors {
            let client_id = path_processor.relevant_client_id(&self.config.chain_id);
            let client_state = match self.tracked_client_state(&client_id).await {
                Ok(client_state) => client_state,
                Err(err) => {
                    tracing::error!(%client_id, %err, "error fetching client state");
                    continue;
                }
            };

            path_processor.handle_new_data(
                &self.config.chain_id,
                ChainProcessorCacheData {
                    latest_block: self.latest_block,
                    latest_header: latest_header.clone(),
                    ibc_messages_cache: ibc_messages_cache.clone(),
                    in_sync: self.in_sync,
                    client_state,
                    connection_state_cache: self
                        .connection_state_cache
                        .filter_for_client(&client_id),
                    channel_state_cache: self.channel_state_cache.filter_for_client(
                        &client_id,
                        &self.channel_connections,
                        &self.connection_clients,
                    ),
                    ibc_header_cache: ibc_header_cache.clone(),
                },
            );
        }

        persistence.latest_queried_block = new_latest_queried_block;
        Ok(())
    }
}
