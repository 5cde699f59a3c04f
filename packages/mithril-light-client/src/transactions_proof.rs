//! Certified Cardano transaction set proofs.
//!
//! The aggregator proves that a set of transaction hashes is part of a
//! certified snapshot by attaching one Merkle map proof per set. All set
//! proofs of a message must share a single Merkle root, which callers then
//! compare against the transaction snapshot's root.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransactionsProofError;
use crate::verify::MithrilVerifier;

/// A Merkle map proof over a certified transaction set.
///
/// The proof body is the Mithril `MKMapProof` JSON structure. This crate
/// treats the body as opaque apart from the master root; cryptographic
/// verification is delegated to the [`MithrilVerifier`] capability.
#[derive(Clone, Debug, PartialEq)]
pub struct MkMapProof {
    master_root: Vec<u8>,
    body: Value,
}

impl MkMapProof {
    /// Decodes a proof from its hex-encoded JSON wire form.
    pub fn from_json_hex(hex_json: &str) -> Result<Self, TransactionsProofError> {
        let bytes = hex::decode(hex_json).map_err(|err| {
            TransactionsProofError::MalformedData(format!("proof is not hex encoded: {err}"))
        })?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|err| {
            TransactionsProofError::MalformedData(format!("proof is not valid JSON: {err}"))
        })?;

        let master_root = body
            .pointer("/master_proof/inner_root/hash")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                TransactionsProofError::MalformedData(
                    "proof is missing its master root".to_string(),
                )
            })?
            .iter()
            .map(|byte| {
                byte.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| {
                        TransactionsProofError::MalformedData(
                            "master root bytes are out of range".to_string(),
                        )
                    })
            })
            .collect::<Result<Vec<u8>, _>>()?;

        Ok(Self { master_root, body })
    }

    /// The hex-encoded Merkle root committed by the proof.
    #[must_use]
    pub fn merkle_root(&self) -> String {
        hex::encode(&self.master_root)
    }

    /// The opaque proof body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }
}

/// One certified transaction set and its proof, in wire form.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CardanoTransactionsSetProofMessagePart {
    /// The certified transaction hashes.
    pub transactions_hashes: Vec<String>,
    /// Hex-encoded JSON of the Merkle map proof.
    pub proof: String,
}

impl CardanoTransactionsSetProofMessagePart {
    fn to_set_proof(&self) -> Result<CardanoTransactionsSetProof, TransactionsProofError> {
        Ok(CardanoTransactionsSetProof {
            transactions_hashes: self.transactions_hashes.clone(),
            transactions_proof: MkMapProof::from_json_hex(&self.proof)?,
        })
    }
}

/// A decoded certified transaction set.
#[derive(Clone, Debug, PartialEq)]
pub struct CardanoTransactionsSetProof {
    /// The certified transaction hashes.
    pub transactions_hashes: Vec<String>,
    /// The proof covering the hashes.
    pub transactions_proof: MkMapProof,
}

/// The aggregator's proofs message for a set of queried transactions.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CardanoTransactionsProofsMessage {
    /// Hash of the certificate that certifies the sets.
    pub certificate_hash: String,
    /// The certified transaction sets.
    pub certified_transactions: Vec<CardanoTransactionsSetProofMessagePart>,
    /// Transactions the aggregator could not certify.
    #[serde(default)]
    pub non_certified_transactions: Vec<String>,
    /// Number of the latest certified immutable file.
    #[serde(default)]
    pub latest_immutable_file_number: u64,
}

/// The outcome of a successful proofs-message verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedCardanoTransactions {
    /// Hash of the certificate that certifies the sets.
    pub certificate_hash: String,
    /// The single Merkle root shared by all set proofs.
    pub merkle_root: String,
    /// All certified transaction hashes, flattened.
    pub certified_transactions: Vec<String>,
    /// Number of the latest certified immutable file.
    pub latest_immutable_file_number: u64,
}

impl CardanoTransactionsProofsMessage {
    /// Verifies every set proof and enforces a single shared Merkle root.
    ///
    /// Fails with [`TransactionsProofError::NoCertifiedTransaction`] when the
    /// certified set is empty.
    pub fn verify<V: MithrilVerifier>(
        &self,
        verifier: &V,
    ) -> Result<VerifiedCardanoTransactions, TransactionsProofError> {
        let mut merkle_root: Option<String> = None;

        for certified_transaction in &self.certified_transactions {
            let set_proof = certified_transaction.to_set_proof()?;

            verifier
                .verify_set_proof(&set_proof.transactions_proof)
                .map_err(|_| {
                    TransactionsProofError::InvalidSetProof(set_proof.transactions_hashes.clone())
                })?;

            let root = set_proof.transactions_proof.merkle_root();
            match &merkle_root {
                None => merkle_root = Some(root),
                Some(previous) if *previous != root => {
                    return Err(TransactionsProofError::NonMatchingMerkleRoot);
                }
                Some(_) => {}
            }
        }

        let merkle_root = merkle_root.ok_or(TransactionsProofError::NoCertifiedTransaction)?;

        Ok(VerifiedCardanoTransactions {
            certificate_hash: self.certificate_hash.clone(),
            merkle_root,
            certified_transactions: self
                .certified_transactions
                .iter()
                .flat_map(|part| part.transactions_hashes.iter().cloned())
                .collect(),
            latest_immutable_file_number: self.latest_immutable_file_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        CardanoTransactionsProofsMessage, CardanoTransactionsSetProofMessagePart, MkMapProof,
    };
    use crate::error::TransactionsProofError;
    use crate::testing::AcceptAllVerifier;

    fn proof_json_hex(root: &[u8]) -> String {
        let body = json!({
            "master_proof": {
                "inner_root": { "hash": root },
                "inner_leaves": [],
                "inner_proof_size": 0,
                "inner_proof_items": [],
            },
            "sub_proofs": [],
        });
        hex::encode(body.to_string())
    }

    fn part(hashes: &[&str], root: &[u8]) -> CardanoTransactionsSetProofMessagePart {
        CardanoTransactionsSetProofMessagePart {
            transactions_hashes: hashes.iter().map(ToString::to_string).collect(),
            proof: proof_json_hex(root),
        }
    }

    #[test]
    fn test_verify_certified_sets_share_root() {
        let message = CardanoTransactionsProofsMessage {
            certificate_hash: "cert".to_string(),
            certified_transactions: vec![part(&["tx1", "tx2"], &[1; 32]), part(&["tx3"], &[1; 32])],
            non_certified_transactions: vec![],
            latest_immutable_file_number: 42,
        };

        let verified = message.verify(&AcceptAllVerifier).unwrap();
        assert_eq!(verified.merkle_root, hex::encode([1u8; 32]));
        assert_eq!(verified.certified_transactions, vec!["tx1", "tx2", "tx3"]);
        assert_eq!(verified.latest_immutable_file_number, 42);
    }

    #[test]
    fn test_verify_rejects_diverging_roots() {
        let message = CardanoTransactionsProofsMessage {
            certificate_hash: "cert".to_string(),
            certified_transactions: vec![part(&["tx1"], &[1; 32]), part(&["tx2"], &[2; 32])],
            ..Default::default()
        };

        assert_eq!(
            message.verify(&AcceptAllVerifier),
            Err(TransactionsProofError::NonMatchingMerkleRoot)
        );
    }

    #[test]
    fn test_verify_rejects_empty_certified_set() {
        let message = CardanoTransactionsProofsMessage {
            certificate_hash: "cert".to_string(),
            ..Default::default()
        };

        assert_eq!(
            message.verify(&AcceptAllVerifier),
            Err(TransactionsProofError::NoCertifiedTransaction)
        );
    }

    #[test]
    fn test_malformed_proof_is_rejected() {
        let message = CardanoTransactionsProofsMessage {
            certificate_hash: "cert".to_string(),
            certified_transactions: vec![CardanoTransactionsSetProofMessagePart {
                transactions_hashes: vec!["tx1".to_string()],
                proof: "not-hex".to_string(),
            }],
            ..Default::default()
        };

        assert!(matches!(
            message.verify(&AcceptAllVerifier),
            Err(TransactionsProofError::MalformedData(_))
        ));
    }

    #[test]
    fn test_mk_map_proof_exposes_master_root() {
        let proof = MkMapProof::from_json_hex(&proof_json_hex(&[9; 32])).unwrap();
        assert_eq!(proof.merkle_root(), hex::encode([9u8; 32]));
    }
}
