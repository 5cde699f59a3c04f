//! Certificate model and canonical hashing.
//!
//! Certificates arrive in their aggregator wire form ([`MithrilCertificate`],
//! all-string hex/JSON fields) and are converted into the validated
//! [`Certificate`] domain form before verification. The canonical content
//! hash links the chain: `previous_hash` of a certificate must equal the
//! computed hash of its predecessor.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::MithrilIBCError;
use crate::types::protocol::{MithrilProtocolParameters, ProtocolMessage};
use crate::types::signed_entity::SignedEntityType;
use crate::types::wrappers::{AggregateVerificationKey, GenesisSignature, StmAggregateSignature};

/// A certificate as served by the Mithril aggregator and carried in headers.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MithrilCertificate {
    /// Content-derived hash of the certificate, hex encoded.
    pub hash: String,
    /// Hash of the previous certificate in the chain.
    pub previous_hash: String,
    /// The epoch the certificate was produced in.
    pub epoch: u64,
    /// The entity sealed by the certificate signature.
    #[serde(default)]
    pub signed_entity_type: Option<SignedEntityType>,
    /// The certificate metadata.
    pub metadata: CertificateMetadataMessage,
    /// The signed protocol message.
    pub protocol_message: ProtocolMessage,
    /// Hash of the protocol message, hex encoded.
    pub signed_message: String,
    /// Hex-encoded JSON of the aggregate verification key.
    pub aggregate_verification_key: String,
    /// Hex-encoded JSON of the STM aggregate signature; empty for genesis
    /// certificates.
    #[serde(default)]
    pub multi_signature: String,
    /// Hex-encoded genesis signature; empty for standard certificates.
    #[serde(default)]
    pub genesis_signature: String,
}

impl MithrilCertificate {
    /// Whether this record carries only a certificate hash.
    ///
    /// Hash-only records are seeded into the epoch indexes at client
    /// initialization, before any full certificate has been observed.
    #[must_use]
    pub fn is_hash_only(&self) -> bool {
        !self.hash.is_empty()
            && self.signed_message.is_empty()
            && self.aggregate_verification_key.is_empty()
    }

    /// Creates a hash-only index record.
    #[must_use]
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Self::default()
        }
    }
}

/// Certificate metadata in aggregator wire form.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificateMetadataMessage {
    /// The Cardano network the certificate was produced for.
    #[serde(default)]
    pub network: String,
    /// The protocol version of the signing round.
    pub protocol_version: String,
    /// The protocol parameters of the signing round.
    pub protocol_parameters: MithrilProtocolParameters,
    /// Wall-clock start of the signing round, RFC 3339.
    pub initiated_at: String,
    /// Wall-clock sealing time of the certificate, RFC 3339 with nanosecond
    /// precision.
    pub sealed_at: String,
    /// The full signer set of the round.
    pub signers: Vec<SignerWithStake>,
}

/// A registered signer and its stake.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SignerWithStake {
    /// The signer party id.
    pub party_id: String,
    /// The signer stake.
    pub stake: u64,
}

impl SignerWithStake {
    /// Canonical content hash of the signer, hex encoded.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.party_id.as_bytes());
        hasher.update(self.stake.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Parses a certificate wall-clock timestamp.
///
/// The aggregator emits RFC 3339 with fractional-second precision
/// (`2024-02-05T09:24:54.000000000Z`); the layout is shared with the
/// counterparty and both the microsecond and nanosecond forms are accepted.
pub fn parse_certificate_time(value: &str) -> Result<OffsetDateTime, MithrilIBCError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| MithrilIBCError::InvalidTimestamp(format!("{value}: {err}")))
}

/// Validated certificate metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateMetadata {
    /// The Cardano network the certificate was produced for.
    pub network: String,
    /// The protocol version of the signing round.
    pub protocol_version: String,
    /// The validated protocol parameters of the signing round.
    pub protocol_parameters: MithrilProtocolParameters,
    /// Wall-clock start of the signing round.
    pub initiated_at: OffsetDateTime,
    /// Wall-clock sealing time of the certificate.
    pub sealed_at: OffsetDateTime,
    /// The full signer set of the round.
    pub signers: Vec<SignerWithStake>,
}

impl CertificateMetadata {
    /// Canonical content hash of the metadata, hex encoded.
    ///
    /// Commits to the protocol version, the parameter hash, both timestamps
    /// as big-endian Unix seconds, and the hash of each signer in set order.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.protocol_version.as_bytes());
        hasher.update(self.protocol_parameters.compute_hash().as_bytes());
        hasher.update((self.initiated_at.unix_timestamp() as u64).to_be_bytes());
        hasher.update((self.sealed_at.unix_timestamp() as u64).to_be_bytes());
        for signer in &self.signers {
            hasher.update(signer.compute_hash().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl TryFrom<&CertificateMetadataMessage> for CertificateMetadata {
    type Error = MithrilIBCError;

    fn try_from(message: &CertificateMetadataMessage) -> Result<Self, Self::Error> {
        message
            .protocol_parameters
            .validate()
            .map_err(|err| MithrilIBCError::InvalidProtocolParameters(err.to_string()))?;

        Ok(Self {
            network: message.network.clone(),
            protocol_version: message.protocol_version.clone(),
            protocol_parameters: message.protocol_parameters,
            initiated_at: parse_certificate_time(&message.initiated_at)?,
            sealed_at: parse_certificate_time(&message.sealed_at)?,
            signers: message.signers.clone(),
        })
    }
}

/// A multi-signature together with the entity it seals.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiSignature {
    /// The sealed entity.
    pub entity_type: SignedEntityType,
    /// The STM aggregate signature.
    pub signature: StmAggregateSignature,
}

/// The discriminated certificate signature.
#[derive(Clone, Debug, PartialEq)]
pub enum CertificateSignature {
    /// An ed25519 signature by the genesis key, carried only by the initial
    /// chain certificate.
    Genesis(GenesisSignature),
    /// An STM multi-signature over the signed message.
    Multi(MultiSignature),
}

/// A validated certificate, linked into the chain by `previous_hash`.
#[derive(Clone, Debug, PartialEq)]
pub struct Certificate {
    /// Content-derived hash, hex encoded.
    pub hash: String,
    /// Hash of the previous chain node.
    pub previous_hash: String,
    /// The epoch the certificate was produced in.
    pub epoch: u64,
    /// The validated metadata.
    pub metadata: CertificateMetadata,
    /// The signed protocol message.
    pub protocol_message: ProtocolMessage,
    /// Hash of the protocol message.
    pub signed_message: String,
    /// The aggregate verification key of the signing epoch.
    pub aggregate_verification_key: AggregateVerificationKey,
    /// The certificate signature.
    pub signature: CertificateSignature,
}

impl Certificate {
    /// Builds a new certificate, deriving `signed_message` and `hash` from
    /// its content.
    pub fn new(
        previous_hash: impl Into<String>,
        epoch: u64,
        metadata: CertificateMetadata,
        protocol_message: ProtocolMessage,
        aggregate_verification_key: AggregateVerificationKey,
        signature: CertificateSignature,
    ) -> Self {
        let signed_message = protocol_message.compute_hash();
        let mut certificate = Self {
            hash: String::new(),
            previous_hash: previous_hash.into(),
            epoch,
            metadata,
            protocol_message,
            signed_message,
            aggregate_verification_key,
            signature,
        };
        certificate.hash = certificate.compute_hash();
        certificate
    }

    /// Canonical content hash of the certificate, hex encoded.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.epoch.to_be_bytes());
        hasher.update(self.metadata.compute_hash().as_bytes());
        hasher.update(self.protocol_message.compute_hash().as_bytes());
        hasher.update(self.signed_message.as_bytes());
        hasher.update(self.aggregate_verification_key.as_json_hex().as_bytes());

        match &self.signature {
            CertificateSignature::Genesis(signature) => {
                hasher.update(signature.to_bytes_hex().as_bytes());
            }
            CertificateSignature::Multi(multi) => {
                multi.entity_type.feed_hash(&mut hasher);
                hasher.update(multi.signature.as_json_hex().as_bytes());
            }
        }

        hex::encode(hasher.finalize())
    }

    /// Whether the certificate is the genesis certificate of the chain.
    #[must_use]
    pub const fn is_genesis(&self) -> bool {
        matches!(self.signature, CertificateSignature::Genesis(_))
    }

    /// Whether the certificate chains to itself. Such certificates are
    /// rejected by the verifier.
    #[must_use]
    pub fn is_chaining_to_itself(&self) -> bool {
        self.hash == self.previous_hash
    }

    /// Whether `message` is the message sealed by this certificate.
    #[must_use]
    pub fn match_message(&self, message: &ProtocolMessage) -> bool {
        message.compute_hash() == self.signed_message
    }
}

impl TryFrom<&MithrilCertificate> for Certificate {
    type Error = MithrilIBCError;

    fn try_from(message: &MithrilCertificate) -> Result<Self, Self::Error> {
        let metadata = CertificateMetadata::try_from(&message.metadata)?;
        let aggregate_verification_key =
            AggregateVerificationKey::from_json_hex(&message.aggregate_verification_key)?;

        let signature = if message.multi_signature.is_empty() {
            if message.genesis_signature.is_empty() {
                return Err(MithrilIBCError::InvalidCertificate(
                    "certificate carries neither a multi-signature nor a genesis signature"
                        .to_string(),
                ));
            }
            CertificateSignature::Genesis(GenesisSignature::from_bytes_hex(
                &message.genesis_signature,
            )?)
        } else {
            let entity_type = message.signed_entity_type.clone().ok_or_else(|| {
                MithrilIBCError::InvalidCertificate(
                    "multi-signed certificate is missing its signed entity type".to_string(),
                )
            })?;
            CertificateSignature::Multi(MultiSignature {
                entity_type,
                signature: StmAggregateSignature::from_json_hex(&message.multi_signature)?,
            })
        };

        Ok(Self {
            hash: message.hash.clone(),
            previous_hash: message.previous_hash.clone(),
            epoch: message.epoch,
            metadata,
            protocol_message: message.protocol_message.clone(),
            signed_message: message.signed_message.clone(),
            aggregate_verification_key,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_certificate_time, Certificate, CertificateSignature};
    use crate::testing::{certificate_message, test_certificate, test_metadata};
    use crate::types::protocol::{ProtocolMessage, ProtocolMessagePartKey};

    #[test]
    fn test_canonical_hash_is_deterministic() {
        let certificate = test_certificate("genesis-hash", 5, "avk-5", |message| {
            message.set_message_part(ProtocolMessagePartKey::SnapshotDigest, "digest");
        });

        // Rebuild the identical certificate from scratch and re-hash.
        let rebuilt = Certificate::new(
            certificate.previous_hash.clone(),
            certificate.epoch,
            certificate.metadata.clone(),
            certificate.protocol_message.clone(),
            certificate.aggregate_verification_key.clone(),
            certificate.signature.clone(),
        );

        assert_eq!(certificate.hash, rebuilt.hash);
        assert_eq!(certificate.compute_hash(), rebuilt.compute_hash());
    }

    #[test]
    fn test_hash_commits_to_every_field() {
        let base = test_certificate("prev", 5, "avk-5", |_| {});

        let mut other = base.clone();
        other.epoch = 6;
        assert_ne!(base.compute_hash(), other.compute_hash());

        let mut other = base.clone();
        other.previous_hash = "different".to_string();
        assert_ne!(base.compute_hash(), other.compute_hash());

        let mut other = base.clone();
        other
            .protocol_message
            .set_message_part(ProtocolMessagePartKey::SnapshotDigest, "changed");
        assert_ne!(base.compute_hash(), other.compute_hash());
    }

    #[test]
    fn test_signed_message_is_protocol_message_hash() {
        let certificate = test_certificate("prev", 5, "avk-5", |message| {
            message.set_message_part(ProtocolMessagePartKey::SnapshotDigest, "digest");
        });

        assert_eq!(
            certificate.signed_message,
            certificate.protocol_message.compute_hash()
        );
        assert!(certificate.match_message(&certificate.protocol_message));
        assert!(!certificate.match_message(&ProtocolMessage::default()));
    }

    #[test]
    fn test_wire_conversion_validates_signature_variants() {
        let mut message = certificate_message("prev", 5, "avk-5");
        message.multi_signature = String::new();
        message.genesis_signature = String::new();
        assert!(Certificate::try_from(&message).is_err());

        let mut message = certificate_message("prev", 5, "avk-5");
        message.multi_signature = String::new();
        message.genesis_signature = hex::encode([7u8; 64]);
        let certificate = Certificate::try_from(&message).unwrap();
        assert!(certificate.is_genesis());
        assert!(matches!(
            certificate.signature,
            CertificateSignature::Genesis(_)
        ));
    }

    #[test]
    fn test_sealed_at_layout() {
        assert!(parse_certificate_time("2024-02-05T09:24:54.000000000Z").is_ok());
        assert!(parse_certificate_time("2024-02-05T09:24:54.123456Z").is_ok());
        assert!(parse_certificate_time("not-a-time").is_err());
    }

    #[test]
    fn test_metadata_hash_covers_signers() {
        let mut metadata = test_metadata();
        let base = metadata.compute_hash();
        metadata.signers[0].stake += 1;
        assert_ne!(base, metadata.compute_hash());
    }
}
