use crate::types::height::Height;

/// Errors returned by the Mithril light client.
///
/// The numeric codes returned by [`MithrilIBCError::code`] mirror the
/// client module's error registration on the host chain and are stable
/// across releases.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MithrilIBCError {
    #[error("invalid chain-id: {0}")]
    InvalidChainId(String),

    #[error("invalid trusting period: trusting period must be greater than zero")]
    InvalidTrustingPeriod,

    #[error("invalid mithril header height: transaction snapshot block number cannot be zero")]
    InvalidMithrilHeaderHeight,

    #[error("invalid mithril header: {0}")]
    InvalidMithrilHeader(String),

    #[error("invalid max clock drift")]
    InvalidMaxClockDrift,

    #[error("processed time not found for height {0}")]
    ProcessedTimeNotFound(Height),

    #[error("processed height not found for height {0}")]
    ProcessedHeightNotFound(Height),

    #[error("packet-specified delay period has not been reached")]
    DelayPeriodNotPassed,

    #[error("time since latest trusted state has passed the trusting period")]
    TrustingPeriodExpired,

    #[error("invalid current epoch: current epoch cannot be less than 2, got {0}")]
    InvalidCurrentEpoch(u64),

    #[error("invalid mithril stake distribution: {0}")]
    InvalidMithrilStakeDistribution(String),

    #[error("invalid cardano transaction snapshot: {0}")]
    InvalidTransactionSnapshot(String),

    #[error("invalid mithril stake distribution certificate: {0}")]
    InvalidMithrilStakeDistributionCertificate(String),

    #[error("invalid cardano transaction snapshot certificate: {0}")]
    InvalidTransactionSnapshotCertificate(String),

    #[error("invalid header epoch: {0}")]
    InvalidHeaderEpoch(String),

    #[error("invalid protocol parameters: {0}")]
    InvalidProtocolParameters(String),

    #[error("invalid number of required signatures (k) in protocol parameters")]
    InvalidNumberRequiredSignatures,

    #[error("invalid number of lotteries (m) in protocol parameters")]
    InvalidNumberLotteries,

    #[error("invalid chance of a signer to win a lottery (phi_f) in protocol parameters")]
    InvalidChanceWinLottery,

    #[error(transparent)]
    InvalidCardanoTransactionsProofs(#[from] TransactionsProofError),

    #[error(transparent)]
    StateProof(#[from] StateProofError),

    #[error(transparent)]
    HostStateDatum(#[from] DatumError),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("certificate not found for hash {0}")]
    CertificateNotFound(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid height: {0}")]
    InvalidHeight(String),

    #[error("consensus state not found for height {0}")]
    ConsensusStateNotFound(Height),

    #[error("invalid consensus state: {0}")]
    InvalidConsensus(String),

    #[error("invalid client message type")]
    InvalidClientMessageType,

    #[error("feature is not implemented: {0}")]
    NotImplemented(&'static str),
}

impl MithrilIBCError {
    /// The stable module error code registered for this error kind.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::InvalidChainId(_) => 2,
            Self::InvalidTrustingPeriod => 3,
            Self::InvalidMithrilHeaderHeight => 4,
            Self::InvalidMithrilHeader(_) => 5,
            Self::InvalidMaxClockDrift => 6,
            Self::ProcessedTimeNotFound(_) => 7,
            Self::ProcessedHeightNotFound(_) => 8,
            Self::DelayPeriodNotPassed => 9,
            Self::TrustingPeriodExpired => 10,
            Self::InvalidCurrentEpoch(_) => 11,
            Self::InvalidMithrilStakeDistribution(_) => 12,
            Self::InvalidTransactionSnapshot(_) => 13,
            Self::InvalidMithrilStakeDistributionCertificate(_) => 14,
            Self::InvalidTransactionSnapshotCertificate(_) => 15,
            Self::InvalidHeaderEpoch(_) => 16,
            Self::InvalidProtocolParameters(_) => 17,
            Self::InvalidNumberRequiredSignatures => 18,
            Self::InvalidNumberLotteries => 19,
            Self::InvalidChanceWinLottery => 20,
            Self::InvalidCardanoTransactionsProofs(_) => 21,
            Self::StateProof(_) => 22,
            Self::HostStateDatum(_) => 23,
            Self::InvalidCertificate(_) => 24,
            Self::CertificateNotFound(_) => 25,
            Self::InvalidTimestamp(_) => 26,
            Self::InvalidHeight(_) => 27,
            Self::ConsensusStateNotFound(_) => 28,
            Self::InvalidConsensus(_) => 29,
            Self::InvalidClientMessageType => 30,
            Self::NotImplemented(_) => 31,
        }
    }
}

/// Failure modes of the IBC-state proof verifier.
///
/// Each distinct shape violation of a proof maps to its own kind so callers
/// can tell a malformed proof from a proof that simply does not match the
/// root.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateProofError {
    #[error("unable to decode merkle proof bytes")]
    ProofDecode,

    #[error("empty merkle proof")]
    EmptyProof,

    #[error("expected existence proof")]
    ExpectedExistenceProof,

    #[error("expected non-existence proof")]
    ExpectedNonExistenceProof,

    #[error("unexpected proof path length: {0}")]
    UnexpectedPathLength(usize),

    #[error("invalid inner op prefix for left child")]
    InvalidLeftChildPrefix,

    #[error("invalid inner op suffix length for left child")]
    InvalidLeftChildSuffix,

    #[error("invalid inner op prefix for right child")]
    InvalidRightChildPrefix,

    #[error("invalid inner op suffix for right child")]
    InvalidRightChildSuffix,

    #[error("existence proof key mismatch")]
    KeyMismatch,

    #[error("existence proof value mismatch")]
    ValueMismatch,

    #[error("non-existence proof missing left existence proof")]
    MissingLeftProof,

    #[error("non-existence proof left value must be empty")]
    NonEmptyLeftValue,

    #[error("proof does not match ibc_state_root")]
    RootMismatch,
}

/// Failure modes of the certified transaction set proof pathway.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionsProofError {
    #[error("certified transaction set proofs do not share a single merkle root")]
    NonMatchingMerkleRoot,

    #[error("no certified transaction in proof message")]
    NoCertifiedTransaction,

    #[error("malformed cardano transactions proof: {0}")]
    MalformedData(String),

    #[error("invalid transaction set proof for hashes {0:?}")]
    InvalidSetProof(Vec<String>),
}

/// Failure modes of the HostState datum decoder.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DatumError {
    #[error("unable to decode host state datum CBOR")]
    Cbor,

    #[error("unknown constructor tag {0} in host state datum")]
    UnknownConstructorTag(u64),

    #[error("host state datum has unexpected shape: {0}")]
    Shape(&'static str),

    #[error("ibc_state_root must be 32 bytes, got {0}")]
    RootLength(usize),

    #[error("host state nft policy does not match the expected policy id")]
    NftPolicyMismatch,
}

#[cfg(test)]
mod tests {
    use super::MithrilIBCError;

    #[test]
    fn test_registered_error_codes_are_stable() {
        assert_eq!(MithrilIBCError::InvalidChainId(String::new()).code(), 2);
        assert_eq!(MithrilIBCError::InvalidTrustingPeriod.code(), 3);
        assert_eq!(MithrilIBCError::TrustingPeriodExpired.code(), 10);
        assert_eq!(MithrilIBCError::InvalidChanceWinLottery.code(), 20);
    }
}
