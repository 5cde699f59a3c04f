//! This module defines [`ConsensusState`].

use serde::{Deserialize, Serialize};

use crate::error::MithrilIBCError;
use crate::header::NANOS_PER_SECOND;

/// Per-height committed data of the Mithril client.
///
/// A consensus state pins the certificate hashes that sealed the chain view
/// at one height, plus the sealing time used for packet timeouts and client
/// expiry.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsensusState {
    /// Sealing time of the transaction snapshot certificate, in seconds
    /// since the Unix epoch.
    pub timestamp: u64,
    /// Hash of the stake distribution certificate trusted at this height.
    pub mithril_stake_distribution_certificate_hash: String,
    /// Hash of the transaction snapshot certificate trusted at this height.
    pub transaction_snapshot_certificate_hash: String,
}

impl ConsensusState {
    /// Creates a new consensus state.
    #[must_use]
    pub const fn new(
        timestamp: u64,
        mithril_stake_distribution_certificate_hash: String,
        transaction_snapshot_certificate_hash: String,
    ) -> Self {
        Self {
            timestamp,
            mithril_stake_distribution_certificate_hash,
            transaction_snapshot_certificate_hash,
        }
    }

    /// The timestamp in nanoseconds since the Unix epoch, as surfaced to
    /// IBC.
    #[must_use]
    pub const fn timestamp_ns(&self) -> u64 {
        self.timestamp * NANOS_PER_SECOND
    }

    /// Basic validation: both certificate hashes must be 32-byte hex values
    /// and the timestamp must be positive.
    pub fn validate_basic(&self) -> Result<(), MithrilIBCError> {
        validate_certificate_hash(
            &self.mithril_stake_distribution_certificate_hash,
            "mithril stake distribution certificate hash",
        )?;
        validate_certificate_hash(
            &self.transaction_snapshot_certificate_hash,
            "transaction snapshot certificate hash",
        )?;
        if self.timestamp == 0 {
            return Err(MithrilIBCError::InvalidConsensus(
                "timestamp must be a positive Unix time".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_certificate_hash(hash: &str, what: &str) -> Result<(), MithrilIBCError> {
    let bytes = hex::decode(hash)
        .map_err(|_| MithrilIBCError::InvalidConsensus(format!("{what} is not hex encoded")))?;
    if bytes.len() != 32 {
        return Err(MithrilIBCError::InvalidConsensus(format!(
            "{what} must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}
