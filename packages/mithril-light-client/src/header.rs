//! The Mithril IBC client message: header records and validation.

use serde::{Deserialize, Serialize};

use crate::certificate::{parse_certificate_time, MithrilCertificate, SignerWithStake};
use crate::error::MithrilIBCError;
use crate::types::height::Height;
use crate::types::protocol::MithrilProtocolParameters;

/// Nanoseconds per second, for converting certificate times to IBC
/// timestamps.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// A Mithril stake distribution record.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MithrilStakeDistribution {
    /// The epoch of the distribution.
    pub epoch: u64,
    /// The registered signers and their stake.
    #[serde(default)]
    pub signers_with_stake: Vec<SignerWithStake>,
    /// Hash of the record.
    pub hash: String,
    /// Hash of the certificate sealing the record.
    pub certificate_hash: String,
    /// Creation time, seconds since the Unix epoch.
    #[serde(default)]
    pub created_at: u64,
    /// Protocol parameters of the distribution epoch.
    #[serde(default)]
    pub protocol_parameters: MithrilProtocolParameters,
}

/// A Cardano transaction snapshot record.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CardanoTransactionSnapshot {
    /// Hash of the snapshot.
    pub snapshot_hash: String,
    /// Merkle root of the certified transaction set.
    pub merkle_root: String,
    /// Hash of the certificate sealing the snapshot.
    pub certificate_hash: String,
    /// The epoch the snapshot was taken in.
    pub epoch: u64,
    /// The Cardano block number the snapshot is certified up to. Used as the
    /// IBC height of headers carrying the snapshot.
    pub block_number: u64,
}

/// The Mithril IBC header.
///
/// Carries a stake distribution and a transaction snapshot, each paired with
/// the certificate that seals it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MithrilHeader {
    /// The stake distribution of the header's epoch.
    pub mithril_stake_distribution: Option<MithrilStakeDistribution>,
    /// The certificate sealing the stake distribution.
    pub mithril_stake_distribution_certificate: Option<MithrilCertificate>,
    /// The transaction snapshot at the header's height.
    pub transaction_snapshot: Option<CardanoTransactionSnapshot>,
    /// The certificate sealing the transaction snapshot.
    pub transaction_snapshot_certificate: Option<MithrilCertificate>,
}

impl MithrilHeader {
    /// The IBC height of the header: the transaction snapshot's block
    /// number, or the zero sentinel when the snapshot is missing.
    #[must_use]
    pub fn height(&self) -> Height {
        self.transaction_snapshot
            .as_ref()
            .map_or(Height::ZERO, |snapshot| Height::new(snapshot.block_number))
    }

    /// The sealing time of the transaction snapshot certificate, in seconds
    /// since the Unix epoch.
    #[allow(clippy::cast_sign_loss)]
    pub fn timestamp_secs(&self) -> Result<u64, MithrilIBCError> {
        let certificate = self.transaction_snapshot_certificate()?;
        let sealed_at = parse_certificate_time(&certificate.metadata.sealed_at)?;
        Ok(sealed_at.unix_timestamp() as u64)
    }

    /// The sealing time in nanoseconds since the Unix epoch, as surfaced to
    /// IBC.
    pub fn timestamp_ns(&self) -> Result<u64, MithrilIBCError> {
        Ok(self.timestamp_secs()? * NANOS_PER_SECOND)
    }

    /// The stake distribution, or an error when missing.
    pub fn stake_distribution(&self) -> Result<&MithrilStakeDistribution, MithrilIBCError> {
        self.mithril_stake_distribution.as_ref().ok_or_else(|| {
            MithrilIBCError::InvalidMithrilStakeDistribution(
                "mithril stake distribution cannot be nil".to_string(),
            )
        })
    }

    /// The stake distribution certificate, or an error when missing.
    pub fn stake_distribution_certificate(&self) -> Result<&MithrilCertificate, MithrilIBCError> {
        self.mithril_stake_distribution_certificate
            .as_ref()
            .ok_or_else(|| {
                MithrilIBCError::InvalidMithrilStakeDistributionCertificate(
                    "mithril stake distribution certificate cannot be nil".to_string(),
                )
            })
    }

    /// The transaction snapshot, or an error when missing.
    pub fn snapshot(&self) -> Result<&CardanoTransactionSnapshot, MithrilIBCError> {
        self.transaction_snapshot.as_ref().ok_or_else(|| {
            MithrilIBCError::InvalidTransactionSnapshot(
                "transaction snapshot cannot be nil".to_string(),
            )
        })
    }

    /// The transaction snapshot certificate, or an error when missing.
    pub fn transaction_snapshot_certificate(
        &self,
    ) -> Result<&MithrilCertificate, MithrilIBCError> {
        self.transaction_snapshot_certificate
            .as_ref()
            .ok_or_else(|| {
                MithrilIBCError::InvalidTransactionSnapshotCertificate(
                    "transaction snapshot certificate cannot be nil".to_string(),
                )
            })
    }

    /// Basic stateless validation of the header.
    ///
    /// All four sub-objects must be present, the stake distribution and the
    /// snapshot must share their epoch, and each record's certificate hash
    /// must match its paired certificate (case-insensitive hex compare).
    pub fn validate_basic(&self) -> Result<(), MithrilIBCError> {
        let stake_distribution = self.stake_distribution()?;
        let snapshot = self.snapshot()?;
        let stake_distribution_certificate = self.stake_distribution_certificate()?;
        let snapshot_certificate = self.transaction_snapshot_certificate()?;

        if stake_distribution.epoch != snapshot.epoch {
            return Err(MithrilIBCError::InvalidMithrilHeader(
                "mithril stake distribution epoch does not match transaction snapshot epoch"
                    .to_string(),
            ));
        }
        if !stake_distribution
            .certificate_hash
            .eq_ignore_ascii_case(&stake_distribution_certificate.hash)
        {
            return Err(MithrilIBCError::InvalidMithrilHeader(
                "mithril stake distribution does not match mithril stake distribution certificate"
                    .to_string(),
            ));
        }
        if !snapshot
            .certificate_hash
            .eq_ignore_ascii_case(&snapshot_certificate.hash)
        {
            return Err(MithrilIBCError::InvalidMithrilHeader(
                "transaction snapshot does not match transaction snapshot certificate".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::NANOS_PER_SECOND;
    use crate::error::MithrilIBCError;
    use crate::testing::test_header;
    use crate::types::height::Height;

    #[test]
    fn test_validate_basic_accepts_consistent_header() {
        let header = test_header(2, 303_388);
        header.validate_basic().unwrap();
        assert_eq!(header.height(), Height::new(303_388));
    }

    #[test]
    fn test_epoch_mismatch_is_rejected() {
        let mut header = test_header(2, 303_388);
        header.transaction_snapshot.as_mut().unwrap().epoch = 3;

        assert!(matches!(
            header.validate_basic(),
            Err(MithrilIBCError::InvalidMithrilHeader(_))
        ));
    }

    #[test]
    fn test_missing_sub_object_is_rejected() {
        let mut header = test_header(2, 303_388);
        header.mithril_stake_distribution = None;
        assert!(matches!(
            header.validate_basic(),
            Err(MithrilIBCError::InvalidMithrilStakeDistribution(_))
        ));

        let mut header = test_header(2, 303_388);
        header.transaction_snapshot_certificate = None;
        assert!(matches!(
            header.validate_basic(),
            Err(MithrilIBCError::InvalidTransactionSnapshotCertificate(_))
        ));
    }

    #[test]
    fn test_certificate_hash_compare_is_case_insensitive() {
        let mut header = test_header(2, 303_388);
        let hash = header
            .transaction_snapshot
            .as_ref()
            .unwrap()
            .certificate_hash
            .clone();
        header.transaction_snapshot.as_mut().unwrap().certificate_hash = hash.to_uppercase();
        header.validate_basic().unwrap();

        header.transaction_snapshot.as_mut().unwrap().certificate_hash = "deadbeef".to_string();
        assert!(header.validate_basic().is_err());
    }

    #[test]
    fn test_timestamp_from_sealed_at() {
        let header = test_header(2, 303_388);
        let secs = header.timestamp_secs().unwrap();
        assert_eq!(header.timestamp_ns().unwrap(), secs * NANOS_PER_SECOND);
    }
}
