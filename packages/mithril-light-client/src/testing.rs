//! Test doubles and fixture builders shared across the crate's unit tests.

use std::collections::BTreeMap;

use time::format_description::well_known::Rfc3339;

use crate::certificate::{
    Certificate, CertificateMetadata, CertificateMetadataMessage, CertificateSignature,
    MithrilCertificate, MultiSignature, SignerWithStake,
};
use crate::client_state::ClientState;
use crate::error::{MithrilIBCError, TransactionsProofError};
use crate::header::{CardanoTransactionSnapshot, MithrilHeader, MithrilStakeDistribution};
use crate::store::ClientStore;
use crate::transactions_proof::MkMapProof;
use crate::types::height::Height;
use crate::types::protocol::{
    Fraction, MithrilProtocolParameters, ProtocolMessage, ProtocolMessagePartKey,
};
use crate::types::signed_entity::{CardanoDbBeacon, SignedEntityType};
use crate::types::wrappers::{AggregateVerificationKey, StmAggregateSignature};
use crate::verify::{CertificateRetriever, MithrilVerifier};

/// In-memory [`ClientStore`] over a sorted map.
#[derive(Default, Clone, Debug)]
pub struct MemStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl ClientStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.map.insert(key.to_vec(), value.to_vec());
    }

    fn remove(&mut self, key: &[u8]) {
        self.map.remove(key);
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.map
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// A [`MithrilVerifier`] double that accepts every signature and proof.
pub struct AcceptAllVerifier;

impl MithrilVerifier for AcceptAllVerifier {
    fn verify_multi_signature(
        &self,
        _message: &[u8],
        _signature: &StmAggregateSignature,
        _aggregate_verification_key: &AggregateVerificationKey,
        _protocol_parameters: &MithrilProtocolParameters,
    ) -> Result<(), MithrilIBCError> {
        Ok(())
    }

    fn verify_set_proof(&self, _proof: &MkMapProof) -> Result<(), TransactionsProofError> {
        Ok(())
    }
}

/// A [`CertificateRetriever`] over an in-memory map keyed by hash.
#[derive(Default)]
pub struct MapRetriever {
    certificates: BTreeMap<String, Certificate>,
}

impl MapRetriever {
    /// Builds a retriever holding the given certificates.
    pub fn with(certificates: Vec<Certificate>) -> Self {
        Self {
            certificates: certificates
                .into_iter()
                .map(|certificate| (certificate.hash.clone(), certificate))
                .collect(),
        }
    }
}

impl CertificateRetriever for MapRetriever {
    fn certificate(&self, hash: &str) -> Result<Certificate, MithrilIBCError> {
        self.certificates
            .get(hash)
            .cloned()
            .ok_or_else(|| MithrilIBCError::CertificateNotFound(hash.to_string()))
    }
}

/// Hex-encoded JSON of a distinct, labelled aggregate verification key.
pub fn avk_json_hex(label: &str) -> String {
    let key = serde_json::json!({
        "mt_commitment": { "root": label, "nr_leaves": 3 },
        "total_stake": 826,
    });
    hex::encode(key.to_string())
}

/// Hex-encoded JSON of a placeholder STM aggregate signature.
pub fn multi_signature_json_hex() -> String {
    let signature = serde_json::json!({
        "signatures": [],
        "batch_proof": { "values": [], "indices": [], "hasher": null },
    });
    hex::encode(signature.to_string())
}

/// The protocol parameters used throughout the tests.
pub fn test_params() -> MithrilProtocolParameters {
    MithrilProtocolParameters {
        k: 5,
        m: 100,
        phi_f: Fraction {
            numerator: 2,
            denominator: 10,
        },
    }
}

/// Validated metadata with a fixed signer set and sealing time.
pub fn test_metadata() -> CertificateMetadata {
    use crate::certificate::parse_certificate_time;

    CertificateMetadata {
        network: "preview".to_string(),
        protocol_version: "0.1.0".to_string(),
        protocol_parameters: test_params(),
        initiated_at: parse_certificate_time("2024-02-05T09:20:00.000000Z").unwrap(),
        sealed_at: parse_certificate_time("2024-02-05T09:24:54.000000000Z").unwrap(),
        signers: vec![SignerWithStake {
            party_id: "pool-1".to_string(),
            stake: 826,
        }],
    }
}

/// Builds a multi-signed certificate with a content-derived hash.
pub fn test_certificate(
    previous_hash: impl Into<String>,
    epoch: u64,
    avk_label: &str,
    configure: impl FnOnce(&mut ProtocolMessage),
) -> Certificate {
    test_certificate_with_entity(
        previous_hash,
        epoch,
        avk_label,
        SignedEntityType::CardanoTransactions {
            beacon: CardanoDbBeacon {
                network: "preview".to_string(),
                epoch,
                immutable_file_number: 100,
            },
            block_number: 303_388,
        },
        configure,
    )
}

/// Builds a multi-signed certificate sealing the given entity.
pub fn test_certificate_with_entity(
    previous_hash: impl Into<String>,
    epoch: u64,
    avk_label: &str,
    entity_type: SignedEntityType,
    configure: impl FnOnce(&mut ProtocolMessage),
) -> Certificate {
    let mut protocol_message = ProtocolMessage::default();
    protocol_message.set_message_part(
        ProtocolMessagePartKey::SnapshotDigest,
        format!("digest-{epoch}"),
    );
    configure(&mut protocol_message);

    let aggregate_verification_key =
        AggregateVerificationKey::from_json_hex(&avk_json_hex(avk_label)).unwrap();
    let signature = CertificateSignature::Multi(MultiSignature {
        entity_type,
        signature: StmAggregateSignature::from_json_hex(&multi_signature_json_hex()).unwrap(),
    });

    Certificate::new(
        previous_hash,
        epoch,
        test_metadata(),
        protocol_message,
        aggregate_verification_key,
        signature,
    )
}

/// Converts a domain certificate back to its wire form.
pub fn wire_certificate(certificate: &Certificate) -> MithrilCertificate {
    let (signed_entity_type, multi_signature, genesis_signature) = match &certificate.signature {
        CertificateSignature::Multi(multi) => (
            Some(multi.entity_type.clone()),
            multi.signature.as_json_hex().to_string(),
            String::new(),
        ),
        CertificateSignature::Genesis(genesis) => {
            (None, String::new(), genesis.to_bytes_hex())
        }
    };

    MithrilCertificate {
        hash: certificate.hash.clone(),
        previous_hash: certificate.previous_hash.clone(),
        epoch: certificate.epoch,
        signed_entity_type,
        metadata: CertificateMetadataMessage {
            network: certificate.metadata.network.clone(),
            protocol_version: certificate.metadata.protocol_version.clone(),
            protocol_parameters: certificate.metadata.protocol_parameters,
            initiated_at: certificate.metadata.initiated_at.format(&Rfc3339).unwrap(),
            sealed_at: certificate.metadata.sealed_at.format(&Rfc3339).unwrap(),
            signers: certificate.metadata.signers.clone(),
        },
        protocol_message: certificate.protocol_message.clone(),
        signed_message: certificate.signed_message.clone(),
        aggregate_verification_key: certificate.aggregate_verification_key.as_json_hex().to_string(),
        multi_signature,
        genesis_signature,
    }
}

/// A wire certificate built from [`test_certificate`].
pub fn certificate_message(
    previous_hash: impl Into<String>,
    epoch: u64,
    avk_label: &str,
) -> MithrilCertificate {
    wire_certificate(&test_certificate(previous_hash, epoch, avk_label, |_| {}))
}

/// A consistent header for `epoch` at `block_number`.
///
/// The stake distribution certificate declares the next epoch's key; the
/// snapshot certificate chains to it and seals the snapshot's merkle root,
/// epoch and block number.
pub fn test_header(epoch: u64, block_number: u64) -> MithrilHeader {
    test_header_chained(format!("anchor-{}", epoch - 1), epoch, block_number)
}

/// A consistent header whose stake distribution certificate chains to the
/// given previous certificate hash.
pub fn test_header_chained(
    previous_msd_hash: impl Into<String>,
    epoch: u64,
    block_number: u64,
) -> MithrilHeader {
    let merkle_root = format!("merkle-root-{epoch}-{block_number}");

    let msd_certificate = test_certificate_with_entity(
        previous_msd_hash,
        epoch,
        &format!("key-{epoch}"),
        SignedEntityType::MithrilStakeDistribution { epoch },
        |message| {
            message.set_message_part(
                ProtocolMessagePartKey::NextAggregateVerificationKey,
                avk_json_hex(&format!("key-{}", epoch + 1)),
            );
        },
    );

    let ts_certificate = test_certificate_with_entity(
        msd_certificate.hash.clone(),
        epoch,
        &format!("key-{epoch}"),
        SignedEntityType::CardanoTransactions {
            beacon: CardanoDbBeacon {
                network: "preview".to_string(),
                epoch,
                immutable_file_number: 100,
            },
            block_number,
        },
        |message| {
            message.set_message_part(
                ProtocolMessagePartKey::CardanoTransactionsMerkleRoot,
                merkle_root.clone(),
            );
        },
    );

    let stake_distribution = MithrilStakeDistribution {
        epoch,
        signers_with_stake: test_metadata().signers,
        hash: format!("msd-{epoch}"),
        certificate_hash: msd_certificate.hash.clone(),
        created_at: 1_707_122_400,
        protocol_parameters: test_params(),
    };
    let snapshot = CardanoTransactionSnapshot {
        snapshot_hash: format!("snapshot-{block_number}"),
        merkle_root,
        certificate_hash: ts_certificate.hash.clone(),
        epoch,
        block_number,
    };

    MithrilHeader {
        mithril_stake_distribution: Some(stake_distribution),
        mithril_stake_distribution_certificate: Some(wire_certificate(&msd_certificate)),
        transaction_snapshot: Some(snapshot),
        transaction_snapshot_certificate: Some(wire_certificate(&ts_certificate)),
    }
}

/// The client state used throughout the tests.
pub fn test_client_state() -> ClientState {
    ClientState::new(
        "42",
        Height::new(303_388),
        2,
        3_600,
        test_params(),
        vec![],
    )
}
