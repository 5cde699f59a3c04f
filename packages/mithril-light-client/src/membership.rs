//! IBC-state proof verification against the `ibc_state_root`.
//!
//! The Cardano IBC host commits all IBC state into a fixed-depth 64-step
//! binary Merkle tree. The leaf position is derived deterministically from
//! the key (the first 8 bytes of `sha256(key)` as a big-endian index), and
//! the leaf hash commits only to the value; key binding is enforced by the
//! derivation, never by the proof path.
//!
//! Two proof envelopes are accepted: the standard protobuf `MerkleProof`
//! form, and a backward-compatible JSON form with hex-encoded fields.

use ibc_proto::ibc::core::commitment::v1::MerkleProof;
use prost::Message;
use serde::Deserialize;
use serde_with::serde_as;
use sha2::{Digest, Sha256};

use crate::error::StateProofError;

/// Number of path steps in every IBC-state proof.
pub const PROOF_PATH_LENGTH: usize = 64;

const EMPTY_HASH: [u8; 32] = [0; 32];

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn empty_value_hash() -> [u8; 32] {
    sha256(&[])
}

/// The leaf hash commits to the value only. An empty value collapses to the
/// all-zero hash, which is how absence is represented on-chain.
fn leaf_hash(value: &[u8]) -> [u8; 32] {
    let value_hash = sha256(value);
    if value_hash == empty_value_hash() {
        return EMPTY_HASH;
    }
    let mut preimage = Vec::with_capacity(1 + 32);
    preimage.push(0x00);
    preimage.extend_from_slice(&value_hash);
    sha256(&preimage)
}

fn inner_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    if *left == EMPTY_HASH && *right == EMPTY_HASH {
        return EMPTY_HASH;
    }
    let mut preimage = Vec::with_capacity(1 + 32 + 32);
    preimage.push(0x01);
    preimage.extend_from_slice(left);
    preimage.extend_from_slice(right);
    sha256(&preimage)
}

/// Extracts the sibling hash from an inner op, enforcing one of the two
/// canonical orientations:
///
/// - left child: `prefix = {0x01}`, `suffix = sibling` (32 bytes)
/// - right child: `prefix = {0x01} ‖ sibling` (33 bytes), `suffix = ""`
fn sibling_from_inner_op(
    direction: u64,
    op: &ics23::InnerOp,
) -> Result<[u8; 32], StateProofError> {
    if direction == 0 {
        if op.prefix.len() != 1 || op.prefix[0] != 0x01 {
            return Err(StateProofError::InvalidLeftChildPrefix);
        }
        let sibling: [u8; 32] = op
            .suffix
            .as_slice()
            .try_into()
            .map_err(|_| StateProofError::InvalidLeftChildSuffix)?;
        Ok(sibling)
    } else {
        if !op.suffix.is_empty() {
            return Err(StateProofError::InvalidRightChildSuffix);
        }
        if op.prefix.len() != 33 || op.prefix[0] != 0x01 {
            return Err(StateProofError::InvalidRightChildPrefix);
        }
        let sibling: [u8; 32] = op.prefix[1..]
            .try_into()
            .map_err(|_| StateProofError::InvalidRightChildPrefix)?;
        Ok(sibling)
    }
}

/// Recomputes the root for `(key, value)` along the given 64-step path.
pub fn compute_root_from_proof_path(
    key: &[u8],
    value: &[u8],
    path: &[ics23::InnerOp],
) -> Result<[u8; 32], StateProofError> {
    if path.len() != PROOF_PATH_LENGTH {
        return Err(StateProofError::UnexpectedPathLength(path.len()));
    }

    let mut current = leaf_hash(value);

    let key_hash = sha256(key);
    let index = u64::from_be_bytes(
        key_hash[0..8]
            .try_into()
            .expect("sha256 output has at least 8 bytes"),
    );

    for (depth, op) in path.iter().enumerate() {
        let direction = (index >> depth) & 1;
        let sibling = sibling_from_inner_op(direction, op)?;

        current = if direction == 0 {
            inner_hash(&current, &sibling)
        } else {
            inner_hash(&sibling, &current)
        };
    }

    Ok(current)
}

/// Verifies a proof that `key -> value` is part of the state committed by
/// `root`.
///
/// When the proof carries an explicit key or value, each must match the
/// queried one byte for byte.
pub fn verify_ibc_state_membership(
    root: &[u8],
    key: &[u8],
    value: &[u8],
    proof_bytes: &[u8],
) -> Result<(), StateProofError> {
    let exist = decode_existence_proof(proof_bytes)?;

    if !exist.key.is_empty() && exist.key != key {
        return Err(StateProofError::KeyMismatch);
    }
    if !exist.value.is_empty() && exist.value != value {
        return Err(StateProofError::ValueMismatch);
    }

    let computed = compute_root_from_proof_path(key, value, &exist.path)?;
    if computed.as_slice() != root {
        return Err(StateProofError::RootMismatch);
    }

    Ok(())
}

/// Verifies a proof that `key` is absent from the state committed by `root`.
///
/// Absence is represented by membership of the empty value: the proof must
/// carry a left existence sub-proof with an empty value whose path verifies
/// against the same root.
pub fn verify_ibc_state_non_membership(
    root: &[u8],
    key: &[u8],
    proof_bytes: &[u8],
) -> Result<(), StateProofError> {
    let nonexist = decode_non_existence_proof(proof_bytes)?;

    if !nonexist.key.is_empty() && nonexist.key != key {
        return Err(StateProofError::KeyMismatch);
    }

    let left = nonexist
        .left
        .as_ref()
        .ok_or(StateProofError::MissingLeftProof)?;

    if !left.value.is_empty() {
        return Err(StateProofError::NonEmptyLeftValue);
    }

    let computed = compute_root_from_proof_path(key, &[], &left.path)?;
    if computed.as_slice() != root {
        return Err(StateProofError::RootMismatch);
    }

    Ok(())
}

fn decode_commitment_proof(
    proof_bytes: &[u8],
) -> Result<Option<ics23::CommitmentProof>, StateProofError> {
    match MerkleProof::decode(proof_bytes) {
        Ok(mut merkle_proof) => {
            if merkle_proof.proofs.is_empty() {
                return Err(StateProofError::EmptyProof);
            }
            Ok(Some(merkle_proof.proofs.remove(0)))
        }
        Err(_) => Ok(None),
    }
}

fn decode_existence_proof(proof_bytes: &[u8]) -> Result<ics23::ExistenceProof, StateProofError> {
    // Preferred: standard protobuf MerkleProof bytes.
    if let Some(commitment_proof) = decode_commitment_proof(proof_bytes)? {
        return match commitment_proof.proof {
            Some(ics23::commitment_proof::Proof::Exist(exist)) => Ok(exist),
            _ => Err(StateProofError::ExpectedExistenceProof),
        };
    }

    // Backwards-compatible: hex-field JSON envelope.
    let json_proof: JsonMerkleProof =
        serde_json::from_slice(proof_bytes).map_err(|_| StateProofError::ProofDecode)?;
    json_proof
        .proofs
        .into_iter()
        .next()
        .and_then(|proof| proof.exist)
        .map(JsonExistenceProof::into_existence_proof)
        .ok_or(StateProofError::ExpectedExistenceProof)
}

fn decode_non_existence_proof(
    proof_bytes: &[u8],
) -> Result<ics23::NonExistenceProof, StateProofError> {
    if let Some(commitment_proof) = decode_commitment_proof(proof_bytes)? {
        return match commitment_proof.proof {
            Some(ics23::commitment_proof::Proof::Nonexist(nonexist)) => Ok(nonexist),
            _ => Err(StateProofError::ExpectedNonExistenceProof),
        };
    }

    let json_proof: JsonMerkleProof =
        serde_json::from_slice(proof_bytes).map_err(|_| StateProofError::ProofDecode)?;
    json_proof
        .proofs
        .into_iter()
        .next()
        .and_then(|proof| proof.nonexist)
        .map(JsonNonExistenceProof::into_non_existence_proof)
        .ok_or(StateProofError::ExpectedNonExistenceProof)
}

#[derive(Deserialize)]
struct JsonMerkleProof {
    proofs: Vec<JsonCommitmentProof>,
}

#[derive(Deserialize)]
struct JsonCommitmentProof {
    #[serde(default)]
    exist: Option<JsonExistenceProof>,
    #[serde(default)]
    nonexist: Option<JsonNonExistenceProof>,
}

#[serde_as]
#[derive(Deserialize)]
struct JsonExistenceProof {
    #[serde_as(as = "serde_with::hex::Hex")]
    #[serde(default)]
    key: Vec<u8>,
    #[serde_as(as = "serde_with::hex::Hex")]
    #[serde(default)]
    value: Vec<u8>,
    #[serde(default)]
    path: Vec<JsonInnerOp>,
}

impl JsonExistenceProof {
    fn into_existence_proof(self) -> ics23::ExistenceProof {
        ics23::ExistenceProof {
            key: self.key,
            value: self.value,
            leaf: None,
            path: self
                .path
                .into_iter()
                .map(JsonInnerOp::into_inner_op)
                .collect(),
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
struct JsonInnerOp {
    #[serde_as(as = "serde_with::hex::Hex")]
    #[serde(default)]
    prefix: Vec<u8>,
    #[serde_as(as = "serde_with::hex::Hex")]
    #[serde(default)]
    suffix: Vec<u8>,
}

impl JsonInnerOp {
    fn into_inner_op(self) -> ics23::InnerOp {
        ics23::InnerOp {
            hash: ics23::HashOp::Sha256.into(),
            prefix: self.prefix,
            suffix: self.suffix,
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
struct JsonNonExistenceProof {
    #[serde_as(as = "serde_with::hex::Hex")]
    #[serde(default)]
    key: Vec<u8>,
    #[serde(default)]
    left: Option<JsonExistenceProof>,
    #[serde(default)]
    right: Option<JsonExistenceProof>,
}

impl JsonNonExistenceProof {
    fn into_non_existence_proof(self) -> ics23::NonExistenceProof {
        ics23::NonExistenceProof {
            key: self.key,
            left: self.left.map(JsonExistenceProof::into_existence_proof),
            right: self.right.map(JsonExistenceProof::into_existence_proof),
        }
    }
}

#[cfg(test)]
mod tests {
    use ibc_proto::ibc::core::commitment::v1::MerkleProof;
    use prost::Message;
    use sha2::{Digest, Sha256};

    use super::{
        compute_root_from_proof_path, verify_ibc_state_membership,
        verify_ibc_state_non_membership, PROOF_PATH_LENGTH,
    };
    use crate::error::StateProofError;

    fn sha256(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn path_index(key: &[u8]) -> u64 {
        u64::from_be_bytes(sha256(key)[0..8].try_into().unwrap())
    }

    /// Synthesizes a full 64-step path for `key` with deterministic sibling
    /// hashes, returning the inner ops and the resulting root.
    fn synthesize_path(key: &[u8], value: &[u8]) -> (Vec<ics23::InnerOp>, [u8; 32]) {
        let index = path_index(key);
        let mut current = super::leaf_hash(value);
        let mut path = Vec::with_capacity(PROOF_PATH_LENGTH);

        for depth in 0..PROOF_PATH_LENGTH {
            let sibling = sha256(format!("sib-{depth}").as_bytes());
            let direction = (index >> depth) & 1;
            let op = if direction == 0 {
                current = super::inner_hash(&current, &sibling);
                ics23::InnerOp {
                    hash: ics23::HashOp::Sha256.into(),
                    prefix: vec![0x01],
                    suffix: sibling.to_vec(),
                }
            } else {
                current = super::inner_hash(&sibling, &current);
                let mut prefix = vec![0x01];
                prefix.extend_from_slice(&sibling);
                ics23::InnerOp {
                    hash: ics23::HashOp::Sha256.into(),
                    prefix,
                    suffix: vec![],
                }
            };
            path.push(op);
        }

        (path, current)
    }

    fn existence_proof_bytes(key: &[u8], value: &[u8], path: Vec<ics23::InnerOp>) -> Vec<u8> {
        MerkleProof {
            proofs: vec![ics23::CommitmentProof {
                proof: Some(ics23::commitment_proof::Proof::Exist(
                    ics23::ExistenceProof {
                        key: key.to_vec(),
                        value: value.to_vec(),
                        leaf: None,
                        path,
                    },
                )),
            }],
        }
        .encode_to_vec()
    }

    fn non_existence_proof_bytes(key: &[u8], path: Vec<ics23::InnerOp>) -> Vec<u8> {
        MerkleProof {
            proofs: vec![ics23::CommitmentProof {
                proof: Some(ics23::commitment_proof::Proof::Nonexist(
                    ics23::NonExistenceProof {
                        key: key.to_vec(),
                        left: Some(ics23::ExistenceProof {
                            key: key.to_vec(),
                            value: vec![],
                            leaf: None,
                            path,
                        }),
                        right: None,
                    },
                )),
            }],
        }
        .encode_to_vec()
    }

    #[test]
    fn test_round_trip_membership() {
        let key = b"clients/2000-cardano-mithril-0/clientState";
        let value = vec![0x01, 0x02, 0x03];
        let (path, root) = synthesize_path(key, &value);

        assert_eq!(
            compute_root_from_proof_path(key, &value, &path).unwrap(),
            root
        );

        let proof = existence_proof_bytes(key, &value, path);
        verify_ibc_state_membership(&root, key, &value, &proof).unwrap();
    }

    #[test]
    fn test_value_binding() {
        let key = b"connections/connection-0";
        let value = vec![0x01, 0x02, 0x03];
        let (path, root) = synthesize_path(key, &value);

        // Flipping any byte of the value invalidates the proof.
        for index in 0..value.len() {
            let mut tampered = value.clone();
            tampered[index] ^= 0xff;
            let proof = existence_proof_bytes(key, &tampered, path.clone());
            assert!(verify_ibc_state_membership(&root, key, &tampered, &proof).is_err());
        }
    }

    #[test]
    fn test_key_binding() {
        let key = b"channelEnds/ports/transfer/channels/channel-0";
        let value = vec![0xaa, 0xbb];
        let (path, root) = synthesize_path(key, &value);

        let other_key = b"channelEnds/ports/transfer/channels/channel-1";
        let proof = existence_proof_bytes(other_key, &value, path);
        assert!(verify_ibc_state_membership(&root, other_key, &value, &proof).is_err());
    }

    #[test]
    fn test_orientation_rigidity() {
        let key = b"some/key";
        let value = vec![0x42];
        let (path, root) = synthesize_path(key, &value);
        let index = path_index(key);

        // Re-encode each step in the opposite orientation and expect failure.
        for depth in 0..PROOF_PATH_LENGTH {
            let mut tampered = path.clone();
            let direction = (index >> depth) & 1;
            tampered[depth] = if direction == 0 {
                // Expected left-child form; supply the right-child form.
                let mut prefix = vec![0x01];
                prefix.extend_from_slice(&path[depth].suffix);
                ics23::InnerOp {
                    hash: ics23::HashOp::Sha256.into(),
                    prefix,
                    suffix: vec![],
                }
            } else {
                ics23::InnerOp {
                    hash: ics23::HashOp::Sha256.into(),
                    prefix: vec![0x01],
                    suffix: path[depth].prefix[1..].to_vec(),
                }
            };
            let proof = existence_proof_bytes(key, &value, tampered);
            assert!(
                verify_ibc_state_membership(&root, key, &value, &proof).is_err(),
                "swapped orientation at depth {depth} must fail"
            );
        }
    }

    #[test]
    fn test_absence_as_empty_left_value() {
        let key = b"commitments/ports/transfer/channels/channel-0/sequences/9";
        let (path, root) = synthesize_path(key, &[]);

        let proof = non_existence_proof_bytes(key, path.clone());
        verify_ibc_state_non_membership(&root, key, &proof).unwrap();

        // The same path does not prove absence of a different key.
        let other_key = b"commitments/ports/transfer/channels/channel-0/sequences/10";
        let proof = non_existence_proof_bytes(other_key, path);
        assert!(verify_ibc_state_non_membership(&root, other_key, &proof).is_err());
    }

    #[test]
    fn test_non_empty_left_value_is_rejected() {
        let key = b"acks/ports/transfer/channels/channel-0/sequences/1";
        let (path, root) = synthesize_path(key, &[]);

        let proof = MerkleProof {
            proofs: vec![ics23::CommitmentProof {
                proof: Some(ics23::commitment_proof::Proof::Nonexist(
                    ics23::NonExistenceProof {
                        key: key.to_vec(),
                        left: Some(ics23::ExistenceProof {
                            key: key.to_vec(),
                            value: vec![0x01],
                            leaf: None,
                            path,
                        }),
                        right: None,
                    },
                )),
            }],
        }
        .encode_to_vec();

        assert_eq!(
            verify_ibc_state_non_membership(&root, key, &proof),
            Err(StateProofError::NonEmptyLeftValue)
        );
    }

    #[test]
    fn test_wrong_path_length_is_rejected() {
        let key = b"key";
        let value = b"value";
        let (mut path, root) = synthesize_path(key, value);
        path.pop();

        let proof = existence_proof_bytes(key, value, path);
        assert_eq!(
            verify_ibc_state_membership(&root, key, value, &proof),
            Err(StateProofError::UnexpectedPathLength(63))
        );
    }

    #[test]
    fn test_json_envelope_round_trip() {
        let key = b"clients/2000-cardano-mithril-0/clientState";
        let value = vec![0x01, 0x02, 0x03];
        let (path, root) = synthesize_path(key, &value);

        let json_path: Vec<serde_json::Value> = path
            .iter()
            .map(|op| {
                serde_json::json!({
                    "prefix": hex::encode(&op.prefix),
                    "suffix": hex::encode(&op.suffix),
                })
            })
            .collect();
        let proof = serde_json::json!({
            "proofs": [{
                "exist": {
                    "key": hex::encode(key),
                    "value": hex::encode(&value),
                    "path": json_path,
                }
            }]
        });

        verify_ibc_state_membership(&root, key, &value, proof.to_string().as_bytes()).unwrap();
    }

    #[test]
    fn test_membership_and_non_membership_against_one_root() {
        // Scenario: an existence proof for (key, 0x010203) and a
        // non-existence proof for a different key verify against their
        // respective synthesized roots, and cross-checks fail.
        let key = b"present/key";
        let value = vec![0x01, 0x02, 0x03];
        let (path, root) = synthesize_path(key, &value);
        let proof = existence_proof_bytes(key, &value, path);
        verify_ibc_state_membership(&root, key, &value, &proof).unwrap();

        let absent_key = b"absent/key";
        let (absent_path, absent_root) = synthesize_path(absent_key, &[]);
        let absence = non_existence_proof_bytes(absent_key, absent_path);
        verify_ibc_state_non_membership(&absent_root, absent_key, &absence).unwrap();

        // An absence proof only matches the idx-bit pattern of its own key.
        assert!(verify_ibc_state_non_membership(&root, absent_key, &absence).is_err());
    }

    #[test]
    fn test_explicit_key_value_must_match_query() {
        let key = b"some/path";
        let value = vec![0x11];
        let (path, root) = synthesize_path(key, &value);

        let proof = existence_proof_bytes(b"other/path", &value, path.clone());
        assert_eq!(
            verify_ibc_state_membership(&root, key, &value, &proof),
            Err(StateProofError::KeyMismatch)
        );

        let proof = existence_proof_bytes(key, &[0x22], path);
        assert_eq!(
            verify_ibc_state_membership(&root, key, &value, &proof),
            Err(StateProofError::ValueMismatch)
        );
    }
}
