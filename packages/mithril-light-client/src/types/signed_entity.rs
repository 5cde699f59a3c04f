//! Signed entity types sealed by Mithril certificates.

use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// The beacon a Cardano database entity was sealed at.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CardanoDbBeacon {
    /// The Cardano network name.
    pub network: String,
    /// The epoch of the beacon.
    pub epoch: u64,
    /// The number of the last immutable file covered by the beacon.
    pub immutable_file_number: u64,
}

/// The entity a multi-signed certificate seals.
///
/// Modelled as a closed discriminated union: unknown entity kinds are a
/// decoding error, not an extension point.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignedEntityType {
    /// A Mithril stake distribution for an epoch.
    MithrilStakeDistribution {
        /// The sealed epoch.
        epoch: u64,
    },
    /// A Cardano stake distribution for an epoch.
    CardanoStakeDistribution {
        /// The sealed epoch.
        epoch: u64,
    },
    /// A full Cardano database snapshot.
    CardanoImmutableFilesFull {
        /// The sealed beacon.
        beacon: CardanoDbBeacon,
    },
    /// A certified set of Cardano transactions.
    CardanoTransactions {
        /// The sealed beacon.
        beacon: CardanoDbBeacon,
        /// The Cardano block number the set is certified up to.
        block_number: u64,
    },
}

impl SignedEntityType {
    /// Feeds the entity's canonical bytes into a certificate hasher.
    pub fn feed_hash(&self, hasher: &mut Sha256) {
        use sha2::Digest;

        match self {
            Self::MithrilStakeDistribution { epoch } | Self::CardanoStakeDistribution { epoch } => {
                hasher.update(epoch.to_be_bytes());
            }
            Self::CardanoImmutableFilesFull { beacon }
            | Self::CardanoTransactions { beacon, .. } => {
                hasher.update(beacon.network.as_bytes());
                hasher.update(beacon.epoch.to_be_bytes());
                hasher.update(beacon.immutable_file_number.to_be_bytes());
            }
        }
    }

    /// The certified transaction beacon and block number, when this entity is
    /// a [`Self::CardanoTransactions`].
    #[must_use]
    pub const fn as_cardano_transactions(&self) -> Option<(&CardanoDbBeacon, u64)> {
        match self {
            Self::CardanoTransactions {
                beacon,
                block_number,
            } => Some((beacon, *block_number)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    use super::{CardanoDbBeacon, SignedEntityType};

    #[test]
    fn test_feed_hash_commits_to_beacon_fields() {
        let entity = SignedEntityType::CardanoTransactions {
            beacon: CardanoDbBeacon {
                network: "preview".to_string(),
                epoch: 6,
                immutable_file_number: 1_234,
            },
            block_number: 303_388,
        };

        let mut expected = Sha256::new();
        expected.update(b"preview");
        expected.update(6u64.to_be_bytes());
        expected.update(1_234u64.to_be_bytes());

        let mut actual = Sha256::new();
        entity.feed_hash(&mut actual);

        assert_eq!(actual.finalize(), expected.finalize());
    }

    #[test]
    fn test_stake_distribution_feeds_epoch_only() {
        let entity = SignedEntityType::MithrilStakeDistribution { epoch: 6 };

        let mut expected = Sha256::new();
        expected.update(6u64.to_be_bytes());

        let mut actual = Sha256::new();
        entity.feed_hash(&mut actual);

        assert_eq!(actual.finalize(), expected.finalize());
    }
}
