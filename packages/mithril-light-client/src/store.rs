//! Client store abstraction, key scheme and typed accessors.
//!
//! The host passes the client a prefixed key/value sub-store. All persisted
//! records are JSON encoded; consensus states additionally maintain a
//! big-endian iteration index for efficient height-ordered traversal.

use crate::certificate::MithrilCertificate;
use crate::client_state::ClientState;
use crate::consensus_state::ConsensusState;
use crate::types::height::Height;

/// Store key of the client state.
pub const HOST_CLIENT_STATE_KEY: &str = "clientState";
/// Store key prefix of consensus states.
pub const HOST_CONSENSUS_STATES_KEY: &str = "consensusStates";
/// Store key prefix of the height-ordered consensus state iteration index.
pub const KEY_ITERATE_CONSENSUS_STATE_PREFIX: &str = "iterateConsensusStates";
/// Suffix appended to a consensus state key to store its processed time.
pub const KEY_PROCESSED_TIME: &str = "/processedTime";
/// Suffix appended to a consensus state key to store its processed height.
pub const KEY_PROCESSED_HEIGHT: &str = "/processedHeight";
/// Prefix of the first stake distribution certificate per epoch.
pub const KEY_FC_MSD_IN_EPOCH_PREFIX: &str = "fcMsdInEpoch";
/// Prefix of the first transaction snapshot certificate per epoch.
pub const KEY_FC_TS_IN_EPOCH_PREFIX: &str = "fcTsInEpoch";
/// Prefix of the latest stake distribution certificate per epoch.
pub const KEY_LC_MSD_IN_EPOCH_PREFIX: &str = "LcMsdInEpoch";
/// Prefix of the latest transaction snapshot certificate per epoch.
pub const KEY_LC_TS_IN_EPOCH_PREFIX: &str = "LcTsInEpoch";
/// Prefix of stake distribution certificates stored by hash.
pub const KEY_MSD_CERTIFICATE_HASH_PREFIX: &str = "MSDCertificateHash";

/// The key/value store backing one client.
///
/// The host guarantees single-writer access within a transaction and serial
/// execution across transactions, so implementations need no locking.
pub trait ClientStore {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    /// Stores `value` under `key`.
    fn set(&mut self, key: &[u8], value: &[u8]);
    /// Removes the value stored under `key`.
    fn remove(&mut self, key: &[u8]);
    /// Key/value pairs whose key starts with `prefix`, in ascending key
    /// order.
    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// `consensusStates/{height}`
#[must_use]
pub fn consensus_state_key(height: Height) -> Vec<u8> {
    format!("{HOST_CONSENSUS_STATES_KEY}/{height}").into_bytes()
}

/// `consensusStates/{height}/processedTime`
#[must_use]
pub fn processed_time_key(height: Height) -> Vec<u8> {
    let mut key = consensus_state_key(height);
    key.extend_from_slice(KEY_PROCESSED_TIME.as_bytes());
    key
}

/// `consensusStates/{height}/processedHeight`
#[must_use]
pub fn processed_height_key(height: Height) -> Vec<u8> {
    let mut key = consensus_state_key(height);
    key.extend_from_slice(KEY_PROCESSED_HEIGHT.as_bytes());
    key
}

/// `iterateConsensusStates` ‖ BE64(revision_number) ‖ BE64(revision_height)
#[must_use]
pub fn iteration_key(height: Height) -> Vec<u8> {
    let mut key = KEY_ITERATE_CONSENSUS_STATE_PREFIX.as_bytes().to_vec();
    key.extend_from_slice(&height.revision_number.to_be_bytes());
    key.extend_from_slice(&height.revision_height.to_be_bytes());
    key
}

/// Recovers the height referenced by an iteration key.
#[must_use]
pub fn height_from_iteration_key(key: &[u8]) -> Option<Height> {
    let suffix = key.strip_prefix(KEY_ITERATE_CONSENSUS_STATE_PREFIX.as_bytes())?;
    if suffix.len() != 16 {
        return None;
    }
    let revision_number = u64::from_be_bytes(suffix[0..8].try_into().ok()?);
    let revision_height = u64::from_be_bytes(suffix[8..16].try_into().ok()?);
    Some(Height {
        revision_number,
        revision_height,
    })
}

/// `fcMsdInEpoch/{epoch}`
#[must_use]
pub fn fc_msd_in_epoch_key(epoch: u64) -> Vec<u8> {
    format!("{KEY_FC_MSD_IN_EPOCH_PREFIX}/{epoch}").into_bytes()
}

/// `fcTsInEpoch/{epoch}`
#[must_use]
pub fn fc_ts_in_epoch_key(epoch: u64) -> Vec<u8> {
    format!("{KEY_FC_TS_IN_EPOCH_PREFIX}/{epoch}").into_bytes()
}

/// `LcMsdInEpoch/{epoch}`
#[must_use]
pub fn lc_msd_in_epoch_key(epoch: u64) -> Vec<u8> {
    format!("{KEY_LC_MSD_IN_EPOCH_PREFIX}/{epoch}").into_bytes()
}

/// `LcTsInEpoch/{epoch}`
#[must_use]
pub fn lc_ts_in_epoch_key(epoch: u64) -> Vec<u8> {
    format!("{KEY_LC_TS_IN_EPOCH_PREFIX}/{epoch}").into_bytes()
}

/// `MSDCertificateHash/{hash}`
#[must_use]
pub fn msd_certificate_hash_key(hash: &str) -> Vec<u8> {
    format!("{KEY_MSD_CERTIFICATE_HASH_PREFIX}/{hash}").into_bytes()
}

/// Stores the client state.
///
/// # Panics
/// Panics if the client state cannot be JSON encoded, which cannot happen
/// for well-formed states.
pub fn set_client_state(store: &mut dyn ClientStore, client_state: &ClientState) {
    let value = serde_json::to_vec(client_state).expect("client state is JSON encodable");
    store.set(HOST_CLIENT_STATE_KEY.as_bytes(), &value);
}

/// Returns the stored client state, if any.
#[must_use]
pub fn get_client_state(store: &dyn ClientStore) -> Option<ClientState> {
    let value = store.get(HOST_CLIENT_STATE_KEY.as_bytes())?;
    serde_json::from_slice(&value).ok()
}

/// Stores the consensus state at the given height.
///
/// # Panics
/// Panics if the consensus state cannot be JSON encoded, which cannot happen
/// for well-formed states.
pub fn set_consensus_state(
    store: &mut dyn ClientStore,
    consensus_state: &ConsensusState,
    height: Height,
) {
    let value = serde_json::to_vec(consensus_state).expect("consensus state is JSON encodable");
    store.set(&consensus_state_key(height), &value);
}

/// Returns the consensus state stored at the given height, if any.
#[must_use]
pub fn get_consensus_state(store: &dyn ClientStore, height: Height) -> Option<ConsensusState> {
    let value = store.get(&consensus_state_key(height))?;
    serde_json::from_slice(&value).ok()
}

/// Deletes the consensus state at the given height.
pub fn delete_consensus_state(store: &mut dyn ClientStore, height: Height) {
    store.remove(&consensus_state_key(height));
}

/// Stores the time at which the consensus state for `height` was processed,
/// in nanoseconds, big-endian.
pub fn set_processed_time(store: &mut dyn ClientStore, height: Height, time_ns: u64) {
    store.set(&processed_time_key(height), &time_ns.to_be_bytes());
}

/// Returns the processed time for `height` in nanoseconds, if stored.
#[must_use]
pub fn get_processed_time(store: &dyn ClientStore, height: Height) -> Option<u64> {
    let value = store.get(&processed_time_key(height))?;
    Some(u64::from_be_bytes(value.try_into().ok()?))
}

/// Stores the host height at which the consensus state for `height` was
/// processed, in its ASCII form.
pub fn set_processed_height(store: &mut dyn ClientStore, height: Height, processed_height: Height) {
    store.set(
        &processed_height_key(height),
        processed_height.to_string().as_bytes(),
    );
}

/// Returns the processed height for `height`, if stored.
#[must_use]
pub fn get_processed_height(store: &dyn ClientStore, height: Height) -> Option<Height> {
    let value = store.get(&processed_height_key(height))?;
    core::str::from_utf8(&value).ok()?.parse().ok()
}

/// Stores the iteration index entry pointing at the consensus state key.
pub fn set_iteration_key(store: &mut dyn ClientStore, height: Height) {
    store.set(&iteration_key(height), &consensus_state_key(height));
}

/// Deletes the processed-time, processed-height and iteration records of a
/// consensus state.
pub fn delete_consensus_metadata(store: &mut dyn ClientStore, height: Height) {
    store.remove(&processed_time_key(height));
    store.remove(&processed_height_key(height));
    store.remove(&iteration_key(height));
}

/// Consensus state heights in ascending order, via the iteration index.
#[must_use]
pub fn consensus_heights_ascending(store: &dyn ClientStore) -> Vec<Height> {
    store
        .prefix_scan(KEY_ITERATE_CONSENSUS_STATE_PREFIX.as_bytes())
        .into_iter()
        .filter_map(|(key, _)| height_from_iteration_key(&key))
        .collect()
}

fn set_certificate_record(store: &mut dyn ClientStore, key: &[u8], certificate: &MithrilCertificate) {
    let value = serde_json::to_vec(certificate).expect("certificate is JSON encodable");
    store.set(key, &value);
}

fn get_certificate_record(store: &dyn ClientStore, key: &[u8]) -> Option<MithrilCertificate> {
    let value = store.get(key)?;
    serde_json::from_slice(&value).ok()
}

/// Stores the first stake distribution certificate of an epoch.
pub fn set_fc_msd_in_epoch(
    store: &mut dyn ClientStore,
    certificate: &MithrilCertificate,
    epoch: u64,
) {
    set_certificate_record(store, &fc_msd_in_epoch_key(epoch), certificate);
}

/// Returns the first stake distribution certificate of an epoch, if stored.
#[must_use]
pub fn get_fc_msd_in_epoch(store: &dyn ClientStore, epoch: u64) -> Option<MithrilCertificate> {
    get_certificate_record(store, &fc_msd_in_epoch_key(epoch))
}

/// Stores the first transaction snapshot certificate of an epoch.
pub fn set_fc_ts_in_epoch(
    store: &mut dyn ClientStore,
    certificate: &MithrilCertificate,
    epoch: u64,
) {
    set_certificate_record(store, &fc_ts_in_epoch_key(epoch), certificate);
}

/// Returns the first transaction snapshot certificate of an epoch, if
/// stored.
#[must_use]
pub fn get_fc_ts_in_epoch(store: &dyn ClientStore, epoch: u64) -> Option<MithrilCertificate> {
    get_certificate_record(store, &fc_ts_in_epoch_key(epoch))
}

/// Stores the latest stake distribution certificate of an epoch.
pub fn set_lc_msd_in_epoch(
    store: &mut dyn ClientStore,
    certificate: &MithrilCertificate,
    epoch: u64,
) {
    set_certificate_record(store, &lc_msd_in_epoch_key(epoch), certificate);
}

/// Returns the latest stake distribution certificate of an epoch, if stored.
#[must_use]
pub fn get_lc_msd_in_epoch(store: &dyn ClientStore, epoch: u64) -> Option<MithrilCertificate> {
    get_certificate_record(store, &lc_msd_in_epoch_key(epoch))
}

/// Stores the latest transaction snapshot certificate of an epoch.
pub fn set_lc_ts_in_epoch(
    store: &mut dyn ClientStore,
    certificate: &MithrilCertificate,
    epoch: u64,
) {
    set_certificate_record(store, &lc_ts_in_epoch_key(epoch), certificate);
}

/// Returns the latest transaction snapshot certificate of an epoch, if
/// stored.
#[must_use]
pub fn get_lc_ts_in_epoch(store: &dyn ClientStore, epoch: u64) -> Option<MithrilCertificate> {
    get_certificate_record(store, &lc_ts_in_epoch_key(epoch))
}

/// Stores a stake distribution certificate under its hash, for chain
/// retrieval.
pub fn set_msd_certificate(store: &mut dyn ClientStore, certificate: &MithrilCertificate) {
    set_certificate_record(store, &msd_certificate_hash_key(&certificate.hash), certificate);
}

/// Returns the stake distribution certificate stored under `hash`, if any.
#[must_use]
pub fn get_msd_certificate(store: &dyn ClientStore, hash: &str) -> Option<MithrilCertificate> {
    get_certificate_record(store, &msd_certificate_hash_key(hash))
}

#[cfg(test)]
mod tests {
    use super::{
        consensus_heights_ascending, consensus_state_key, get_consensus_state,
        get_processed_height, get_processed_time, height_from_iteration_key, iteration_key,
        set_consensus_state, set_iteration_key, set_processed_height, set_processed_time,
    };
    use crate::consensus_state::ConsensusState;
    use crate::testing::MemStore;
    use crate::types::height::Height;

    #[test]
    fn test_consensus_state_round_trip() {
        let mut store = MemStore::default();
        let height = Height::new(303_388);
        let state = ConsensusState::new(
            1_707_122_694,
            hex::encode([0xaa; 32]),
            hex::encode([0xbb; 32]),
        );

        set_consensus_state(&mut store, &state, height);
        assert_eq!(get_consensus_state(&store, height), Some(state));
        assert_eq!(get_consensus_state(&store, Height::new(1)), None);
    }

    #[test]
    fn test_key_layout() {
        let height = Height::new(303_388);
        assert_eq!(
            consensus_state_key(height),
            b"consensusStates/0-303388".to_vec()
        );
        assert_eq!(
            height_from_iteration_key(&iteration_key(height)),
            Some(height)
        );
    }

    #[test]
    fn test_processed_metadata_round_trip() {
        let mut store = MemStore::default();
        let height = Height::new(42);

        set_processed_time(&mut store, height, 1_707_122_694_000_000_000);
        set_processed_height(&mut store, height, Height::new(7));

        assert_eq!(
            get_processed_time(&store, height),
            Some(1_707_122_694_000_000_000)
        );
        assert_eq!(get_processed_height(&store, height), Some(Height::new(7)));
    }

    #[test]
    fn test_iteration_index_is_height_ordered() {
        let mut store = MemStore::default();
        for height in [300u64, 2, 41] {
            set_iteration_key(&mut store, Height::new(height));
        }

        assert_eq!(
            consensus_heights_ascending(&store),
            vec![Height::new(2), Height::new(41), Height::new(300)]
        );
    }
}
