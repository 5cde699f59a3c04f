//! Mithril protocol parameters and protocol messages.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MithrilIBCError;

/// A rational number, used for the lottery win chance `phi_f`.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Fraction {
    /// The numerator.
    pub numerator: u64,
    /// The denominator.
    pub denominator: u64,
}

/// Mithril STM protocol parameters.
///
/// `m` is the number of lotteries, `k` the required number of individual
/// signatures and `phi_f` the chance for a signer to win a lottery.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MithrilProtocolParameters {
    /// Quorum parameter.
    pub k: u64,
    /// Security parameter (number of lotteries).
    pub m: u64,
    /// `f` in `phi(w) = 1 - (1 - f)^w`, where `w` is the stake of a participant.
    pub phi_f: Fraction,
}

impl MithrilProtocolParameters {
    /// Validates the parameter ranges: `k > 0`, `m > 0` and
    /// `0 < phi_f <= 1`.
    pub fn validate(&self) -> Result<(), MithrilIBCError> {
        if self.k == 0 {
            return Err(MithrilIBCError::InvalidNumberRequiredSignatures);
        }
        if self.m == 0 {
            return Err(MithrilIBCError::InvalidNumberLotteries);
        }
        if self.phi_f.numerator == 0
            || self.phi_f.denominator == 0
            || self.phi_f.numerator > self.phi_f.denominator
        {
            return Err(MithrilIBCError::InvalidChanceWinLottery);
        }
        Ok(())
    }

    /// Fixed-point representation of `phi_f` used for hashing.
    ///
    /// The multiplier matches the precision of the aggregator-side encoding,
    /// so both sides hash identical bytes.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn phi_f_fixed(&self) -> u64 {
        let phi_f = self.phi_f.numerator as f64 / self.phi_f.denominator as f64;
        (phi_f * 1e6).round() as u64
    }

    /// Canonical content hash of the parameters, hex encoded.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.k.to_be_bytes());
        hasher.update(self.m.to_be_bytes());
        hasher.update(self.phi_f_fixed().to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Keys of the enumerated protocol message parts.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolMessagePartKey {
    /// Digest of the full Cardano database snapshot.
    SnapshotDigest,
    /// Merkle root of the certified transaction set.
    CardanoTransactionsMerkleRoot,
    /// Aggregate verification key that will sign in the next epoch.
    NextAggregateVerificationKey,
    /// Number of the latest certified immutable file.
    LatestImmutableFileNumber,
}

impl ProtocolMessagePartKey {
    /// The canonical string form used for hashing.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SnapshotDigest => "snapshot_digest",
            Self::CardanoTransactionsMerkleRoot => "cardano_transactions_merkle_root",
            Self::NextAggregateVerificationKey => "next_aggregate_verification_key",
            Self::LatestImmutableFileNumber => "latest_immutable_file_number",
        }
    }
}

/// A single `(key, value)` part of a protocol message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProtocolMessagePart {
    /// The part key.
    pub key: ProtocolMessagePartKey,
    /// The part value.
    pub value: String,
}

/// The ordered message signed by a Mithril certificate.
///
/// Part order is preserved: the hash commits to the parts in the order they
/// were inserted.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtocolMessage {
    /// The ordered message parts.
    pub message_parts: Vec<ProtocolMessagePart>,
}

impl ProtocolMessage {
    /// Sets a message part, replacing the value of an already present key.
    pub fn set_message_part(&mut self, key: ProtocolMessagePartKey, value: impl Into<String>) {
        let value = value.into();
        if let Some(part) = self.message_parts.iter_mut().find(|part| part.key == key) {
            part.value = value;
        } else {
            self.message_parts.push(ProtocolMessagePart { key, value });
        }
    }

    /// Returns the value of the given part key, if present.
    #[must_use]
    pub fn get_message_part(&self, key: ProtocolMessagePartKey) -> Option<&str> {
        self.message_parts
            .iter()
            .find(|part| part.key == key)
            .map(|part| part.value.as_str())
    }

    /// Canonical content hash of the message, hex encoded.
    ///
    /// The hash is the SHA-256 over the concatenation of each key's canonical
    /// string form followed by its value, in part order.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in &self.message_parts {
            hasher.update(part.key.as_str().as_bytes());
            hasher.update(part.value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
