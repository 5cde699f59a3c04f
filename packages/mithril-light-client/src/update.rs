//! The ICS-02 client operations: initialization, client message
//! verification, misbehaviour detection and state updates.

use crate::certificate::{parse_certificate_time, Certificate, CertificateSignature, MithrilCertificate};
use crate::client_state::{ClientState, Status};
use crate::consensus_state::ConsensusState;
use crate::error::MithrilIBCError;
use crate::header::{MithrilHeader, NANOS_PER_SECOND};
use crate::misbehaviour::{Misbehaviour, FROZEN_HEIGHT};
use crate::store::{self, ClientStore};
use crate::types::height::Height;
use crate::types::protocol::ProtocolMessagePartKey;
use crate::types::signed_entity::SignedEntityType;
use crate::verify::{CertificateRetriever, CertificateVerifier, MithrilVerifier};

/// The client message, a closed discriminated union.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// A Mithril-anchored header.
    MithrilHeader(Box<MithrilHeader>),
    /// Misbehaviour evidence.
    Misbehaviour(Box<Misbehaviour>),
}

/// The host execution context of a client operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HostContext {
    /// The host block height.
    pub block_height: u64,
    /// The host block time in nanoseconds since the Unix epoch.
    pub block_time_ns: u64,
}

impl HostContext {
    /// The host block time in seconds since the Unix epoch.
    #[must_use]
    pub const fn block_time_secs(&self) -> u64 {
        self.block_time_ns / NANOS_PER_SECOND
    }
}

/// Validates the initial states and persists them under the client store,
/// seeding the epoch-indexed certificate records.
pub fn initialize(
    store: &mut dyn ClientStore,
    ctx: &HostContext,
    client_state: &ClientState,
    consensus_state: &ConsensusState,
) -> Result<(), MithrilIBCError> {
    client_state.validate()?;
    consensus_state.validate_basic()?;

    store::set_client_state(store, client_state);
    store::set_consensus_state(store, consensus_state, client_state.latest_height);
    set_consensus_metadata(store, ctx, client_state.latest_height);

    // The initial consensus state only carries certificate hashes; the full
    // certificates are stored as headers are observed.
    let first_msd = MithrilCertificate::from_hash(
        consensus_state
            .mithril_stake_distribution_certificate_hash
            .clone(),
    );
    let latest_ts = MithrilCertificate::from_hash(
        consensus_state.transaction_snapshot_certificate_hash.clone(),
    );
    store::set_fc_msd_in_epoch(store, &first_msd, client_state.current_epoch);
    store::set_lc_ts_in_epoch(store, &latest_ts, client_state.current_epoch);
    store::set_msd_certificate(store, &first_msd);

    Ok(())
}

/// The status of the client. Frozen has precedence over Expired.
#[must_use]
pub fn status(store: &dyn ClientStore, client_state: &ClientState, ctx: &HostContext) -> Status {
    if client_state.is_frozen() {
        return Status::Frozen;
    }

    // Without a consensus state at the latest height the client must be
    // treated as expired.
    let Some(consensus_state) = store::get_consensus_state(store, client_state.latest_height)
    else {
        return Status::Expired;
    };

    if client_state.is_expired(consensus_state.timestamp, ctx.block_time_secs()) {
        return Status::Expired;
    }

    Status::Active
}

/// The consensus timestamp at `height` in nanoseconds since the Unix epoch.
pub fn timestamp_at_height(
    store: &dyn ClientStore,
    height: Height,
) -> Result<u64, MithrilIBCError> {
    store::get_consensus_state(store, height)
        .map(|consensus_state| consensus_state.timestamp_ns())
        .ok_or(MithrilIBCError::ConsensusStateNotFound(height))
}

/// Verifies a client message against the trusted state in the store.
pub fn verify_client_message<V: MithrilVerifier>(
    store: &dyn ClientStore,
    client_state: &ClientState,
    verifier: &V,
    message: &ClientMessage,
) -> Result<(), MithrilIBCError> {
    match message {
        ClientMessage::MithrilHeader(header) => {
            verify_header(store, client_state, verifier, header)
        }
        ClientMessage::Misbehaviour(misbehaviour) => {
            verify_misbehaviour(store, client_state, verifier, misbehaviour)
        }
    }
}

/// Resolves trusted certificates out of the client store, with the header's
/// own stake distribution certificate overlaid while it is being verified.
struct StoreRetriever<'a> {
    store: &'a dyn ClientStore,
    pending: Option<&'a MithrilCertificate>,
}

impl CertificateRetriever for StoreRetriever<'_> {
    fn certificate(&self, hash: &str) -> Result<Certificate, MithrilIBCError> {
        if let Some(pending) = self.pending {
            if pending.hash.eq_ignore_ascii_case(hash) {
                return Certificate::try_from(pending);
            }
        }

        let message = store::get_msd_certificate(self.store, hash)
            .ok_or_else(|| MithrilIBCError::CertificateNotFound(hash.to_string()))?;
        if message.is_hash_only() {
            return Err(MithrilIBCError::CertificateNotFound(hash.to_string()));
        }
        Certificate::try_from(&message)
    }
}

/// Verifies `certificate_message` as an extension of the trusted chain.
///
/// A previous certificate known only by hash (the post-initialization state)
/// can attest linkage but not the AVK transition; in that case only the
/// multi-signature is checked, and chain walking resumes once the epoch's
/// certificates have been stored in full.
fn verify_certificate_against_chain<V: MithrilVerifier>(
    store: &dyn ClientStore,
    verifier: &V,
    pending_msd: Option<&MithrilCertificate>,
    certificate_message: &MithrilCertificate,
) -> Result<(), MithrilIBCError> {
    let certificate = Certificate::try_from(certificate_message)?;
    let retriever = StoreRetriever {
        store,
        pending: pending_msd,
    };
    let chain = CertificateVerifier::new(&retriever, verifier);

    match chain.verify_standard_certificate(&certificate) {
        Ok(_) => Ok(()),
        Err(MithrilIBCError::CertificateNotFound(_)) => {
            let CertificateSignature::Multi(multi_signature) = &certificate.signature else {
                return Err(MithrilIBCError::InvalidCertificate(
                    "standard certificate verification requires a multi-signature".to_string(),
                ));
            };
            chain.verify_multi_signature(&certificate, multi_signature)
        }
        Err(err) => Err(err),
    }
}

fn verify_header<V: MithrilVerifier>(
    store: &dyn ClientStore,
    client_state: &ClientState,
    verifier: &V,
    header: &MithrilHeader,
) -> Result<(), MithrilIBCError> {
    verify_header_certificates(store, verifier, header)?;

    let snapshot = header.snapshot()?;

    // Never accept a header older than the trusted state.
    if snapshot.epoch < client_state.current_epoch
        || snapshot.block_number < client_state.latest_height.revision_height
    {
        return Err(MithrilIBCError::InvalidCertificate(format!(
            "expected newer header: header epoch {}, trusted epoch {}, header block number {}, trusted height {}",
            snapshot.epoch,
            client_state.current_epoch,
            snapshot.block_number,
            client_state.latest_height.revision_height,
        )));
    }

    Ok(())
}

fn verify_header_certificates<V: MithrilVerifier>(
    store: &dyn ClientStore,
    verifier: &V,
    header: &MithrilHeader,
) -> Result<(), MithrilIBCError> {
    header.validate_basic()?;

    let stake_distribution = header.stake_distribution()?;
    let snapshot = header.snapshot()?;
    let msd_certificate = header.stake_distribution_certificate()?;
    let ts_certificate = header.transaction_snapshot_certificate()?;

    parse_certificate_time(&ts_certificate.metadata.sealed_at)?;

    let mut pending_msd: Option<&MithrilCertificate> = None;
    let expected_previous_for_ts = match store::get_fc_msd_in_epoch(store, stake_distribution.epoch)
    {
        Some(first_in_epoch) => {
            if !stake_distribution
                .certificate_hash
                .eq_ignore_ascii_case(&first_in_epoch.hash)
            {
                return Err(MithrilIBCError::InvalidCertificate(format!(
                    "invalid latest mithril stake distribution certificate: received {}, expected {}",
                    stake_distribution.certificate_hash, first_in_epoch.hash,
                )));
            }
            first_in_epoch
        }
        None => {
            // First header of a new epoch: the stake distribution certificate
            // must chain back to the previous epoch's first certificate.
            let previous_epoch = stake_distribution.epoch.checked_sub(1).ok_or_else(|| {
                MithrilIBCError::InvalidHeaderEpoch(
                    "stake distribution epoch cannot be zero".to_string(),
                )
            })?;
            let first_in_previous_epoch = store::get_fc_msd_in_epoch(store, previous_epoch)
                .ok_or_else(|| {
                    MithrilIBCError::InvalidCertificate(
                        "previous epoch did not store a first mithril stake distribution certificate"
                            .to_string(),
                    )
                })?;
            if !msd_certificate
                .previous_hash
                .eq_ignore_ascii_case(&first_in_previous_epoch.hash)
            {
                return Err(MithrilIBCError::InvalidCertificate(format!(
                    "invalid first mithril stake distribution certificate: received {}, expected {}",
                    msd_certificate.previous_hash, first_in_previous_epoch.hash,
                )));
            }
            verify_certificate_against_chain(store, verifier, None, msd_certificate).map_err(
                |err| {
                    MithrilIBCError::InvalidMithrilStakeDistributionCertificate(err.to_string())
                },
            )?;
            pending_msd = Some(msd_certificate);
            msd_certificate.clone()
        }
    };

    if !ts_certificate
        .previous_hash
        .eq_ignore_ascii_case(&expected_previous_for_ts.hash)
    {
        return Err(MithrilIBCError::InvalidCertificate(format!(
            "invalid transaction snapshot certificate previous hash: received {}, expected {}",
            ts_certificate.previous_hash, expected_previous_for_ts.hash,
        )));
    }

    verify_certificate_against_chain(store, verifier, pending_msd, ts_certificate)
        .map_err(|err| MithrilIBCError::InvalidTransactionSnapshotCertificate(err.to_string()))?;

    // The snapshot record and the sealing certificate must agree on the
    // certified merkle root, epoch and block number.
    let merkle_root = ts_certificate
        .protocol_message
        .get_message_part(ProtocolMessagePartKey::CardanoTransactionsMerkleRoot)
        .filter(|merkle_root| !merkle_root.is_empty())
        .ok_or_else(|| {
            MithrilIBCError::InvalidCertificate(
                "transaction snapshot certificate merkle root does not exist".to_string(),
            )
        })?;
    if merkle_root != snapshot.merkle_root {
        return Err(MithrilIBCError::InvalidCertificate(format!(
            "transaction snapshot certificate merkle root does not match: snapshot {}, certificate {}",
            snapshot.merkle_root, merkle_root,
        )));
    }

    let (beacon, block_number) = ts_certificate
        .signed_entity_type
        .as_ref()
        .and_then(SignedEntityType::as_cardano_transactions)
        .ok_or_else(|| {
            MithrilIBCError::InvalidCertificate(
                "transaction snapshot certificate is not sealed over cardano transactions"
                    .to_string(),
            )
        })?;
    if beacon.epoch != snapshot.epoch {
        return Err(MithrilIBCError::InvalidCertificate(format!(
            "transaction snapshot certificate epoch does not match: snapshot {}, certificate {}",
            snapshot.epoch, beacon.epoch,
        )));
    }
    if block_number != snapshot.block_number {
        return Err(MithrilIBCError::InvalidCertificate(format!(
            "transaction snapshot certificate block number does not match: snapshot {}, certificate {}",
            snapshot.block_number, block_number,
        )));
    }

    Ok(())
}

fn verify_misbehaviour<V: MithrilVerifier>(
    store: &dyn ClientStore,
    _client_state: &ClientState,
    verifier: &V,
    misbehaviour: &Misbehaviour,
) -> Result<(), MithrilIBCError> {
    misbehaviour.validate_basic()?;

    // Both headers must carry verifiable certificates. Freshness is not
    // enforced here: conflicting headers may sit at an already-trusted
    // height.
    verify_header_certificates(store, verifier, misbehaviour.header_1()?)?;
    verify_header_certificates(store, verifier, misbehaviour.header_2()?)?;

    Ok(())
}

fn certificate_hashes(header: &MithrilHeader) -> Option<(&str, &str)> {
    let msd_hash = header
        .mithril_stake_distribution_certificate
        .as_ref()
        .map(|certificate| certificate.hash.as_str())?;
    let ts_hash = header
        .transaction_snapshot_certificate
        .as_ref()
        .map(|certificate| certificate.hash.as_str())?;
    Some((msd_hash, ts_hash))
}

fn header_conflicts_with_store(store: &dyn ClientStore, header: &MithrilHeader) -> bool {
    let Some(existing) = store::get_consensus_state(store, header.height()) else {
        return false;
    };
    let Some((msd_hash, ts_hash)) = certificate_hashes(header) else {
        return false;
    };

    !existing
        .mithril_stake_distribution_certificate_hash
        .eq_ignore_ascii_case(msd_hash)
        || !existing
            .transaction_snapshot_certificate_hash
            .eq_ignore_ascii_case(ts_hash)
}

fn headers_conflict(header_1: &MithrilHeader, header_2: &MithrilHeader) -> bool {
    let epochs = (
        header_1
            .mithril_stake_distribution
            .as_ref()
            .map(|stake_distribution| stake_distribution.epoch),
        header_2
            .mithril_stake_distribution
            .as_ref()
            .map(|stake_distribution| stake_distribution.epoch),
    );
    if let (Some(first), Some(second)) = epochs {
        if first != second {
            return true;
        }
    }

    match (certificate_hashes(header_1), certificate_hashes(header_2)) {
        (Some((msd_1, ts_1)), Some((msd_2, ts_2))) => {
            !msd_1.eq_ignore_ascii_case(msd_2) || !ts_1.eq_ignore_ascii_case(ts_2)
        }
        _ => false,
    }
}

/// Whether the message evidences conflicting views of the chain.
///
/// True iff a paired evidence shares a height but disagrees on epochs or
/// certificate hashes, or a header disagrees with an already stored
/// consensus state at its height.
#[must_use]
pub fn check_for_misbehaviour(store: &dyn ClientStore, message: &ClientMessage) -> bool {
    match message {
        ClientMessage::MithrilHeader(header) => header_conflicts_with_store(store, header),
        ClientMessage::Misbehaviour(misbehaviour) => {
            let (Some(header_1), Some(header_2)) = (
                misbehaviour.mithril_header_1.as_ref(),
                misbehaviour.mithril_header_2.as_ref(),
            ) else {
                return false;
            };

            if header_1.height() == header_2.height() && headers_conflict(header_1, header_2) {
                return true;
            }

            header_conflicts_with_store(store, header_1)
                || header_conflicts_with_store(store, header_2)
        }
    }
}

/// Applies a verified header to the client state.
///
/// Returns the list of updated heights. Duplicate updates are a no-op that
/// still reports the header height.
///
/// # Panics
/// Panics when called with a [`ClientMessage::Misbehaviour`] or with a
/// header that did not pass [`verify_client_message`]; both violate the
/// caller contract.
pub fn update_state(
    store: &mut dyn ClientStore,
    ctx: &HostContext,
    client_state: &ClientState,
    message: &ClientMessage,
) -> Vec<Height> {
    let ClientMessage::MithrilHeader(header) = message else {
        panic!("expected a MithrilHeader client message");
    };

    prune_oldest_consensus_state(store, ctx, client_state);

    let height = header.height();
    if store::get_consensus_state(store, height).is_some() {
        // No-op on duplicate update.
        return vec![height];
    }

    let snapshot = header
        .snapshot()
        .expect("header was validated before update");
    let msd_certificate = header
        .stake_distribution_certificate()
        .expect("header was validated before update");
    let ts_certificate = header
        .transaction_snapshot_certificate()
        .expect("header was validated before update");
    let timestamp = header
        .timestamp_secs()
        .expect("header timestamp was validated before update");

    let mut updated_client_state = client_state.clone();
    if height > updated_client_state.latest_height {
        updated_client_state.latest_height = height;
    }
    if snapshot.epoch != updated_client_state.current_epoch {
        updated_client_state.current_epoch = snapshot.epoch;
        store::set_fc_msd_in_epoch(store, msd_certificate, snapshot.epoch);
        store::set_fc_ts_in_epoch(store, ts_certificate, snapshot.epoch);
    }
    store::set_lc_msd_in_epoch(store, msd_certificate, snapshot.epoch);
    store::set_lc_ts_in_epoch(store, ts_certificate, snapshot.epoch);
    store::set_msd_certificate(store, msd_certificate);

    let consensus_state = ConsensusState::new(
        timestamp,
        msd_certificate.hash.clone(),
        ts_certificate.hash.clone(),
    );

    store::set_client_state(store, &updated_client_state);
    store::set_consensus_state(store, &consensus_state, height);
    set_consensus_metadata(store, ctx, height);

    vec![height]
}

/// Freezes the client at the sentinel misbehaviour height.
///
/// No misbehaviour checks are performed here; callers decide via
/// [`check_for_misbehaviour`].
pub fn update_state_on_misbehaviour(
    store: &mut dyn ClientStore,
    client_state: &ClientState,
    _message: &ClientMessage,
) {
    let mut frozen_client_state = client_state.clone();
    frozen_client_state.frozen_height = FROZEN_HEIGHT;
    store::set_client_state(store, &frozen_client_state);
}

/// Membership verification is routed through
/// [`crate::membership::verify_ibc_state_membership`] once wired to the
/// proof-height HostState datum; the client surface is not implemented in
/// this revision.
pub fn verify_membership(
    _store: &dyn ClientStore,
    _height: Height,
    _proof: &[u8],
    _path: &[u8],
    _value: &[u8],
) -> Result<(), MithrilIBCError> {
    Err(MithrilIBCError::NotImplemented("verify_membership"))
}

/// Non-membership verification is routed through
/// [`crate::membership::verify_ibc_state_non_membership`] once wired; the
/// client surface is not implemented in this revision.
pub fn verify_non_membership(
    _store: &dyn ClientStore,
    _height: Height,
    _proof: &[u8],
    _path: &[u8],
) -> Result<(), MithrilIBCError> {
    Err(MithrilIBCError::NotImplemented("verify_non_membership"))
}

/// Client substitution is not supported by this client.
pub fn check_substitute_and_update_state(
    _subject_store: &dyn ClientStore,
    _substitute_store: &dyn ClientStore,
) -> Result<(), MithrilIBCError> {
    Err(MithrilIBCError::NotImplemented(
        "check_substitute_and_update_state",
    ))
}

/// Prunes the oldest consensus state and its metadata when it has left the
/// trusting period.
fn prune_oldest_consensus_state(
    store: &mut dyn ClientStore,
    ctx: &HostContext,
    client_state: &ClientState,
) {
    let Some(oldest) = store::consensus_heights_ascending(store).into_iter().next() else {
        return;
    };
    let Some(consensus_state) = store::get_consensus_state(store, oldest) else {
        return;
    };

    if client_state.is_expired(consensus_state.timestamp, ctx.block_time_secs()) {
        store::delete_consensus_state(store, oldest);
        store::delete_consensus_metadata(store, oldest);
    }
}

fn set_consensus_metadata(store: &mut dyn ClientStore, ctx: &HostContext, height: Height) {
    store::set_processed_time(store, height, ctx.block_time_ns);
    store::set_processed_height(store, height, Height::new(ctx.block_height));
    store::set_iteration_key(store, height);
}
