//! HostState UTxO datum decoding.
//!
//! The Cardano IBC host keeps its authenticated state in the inline datum of
//! a single "HostState" UTxO, identified by an NFT. The datum is Plutus data:
//! a two-field constructor holding the host state record and the NFT policy
//! id. Sum-type variants are encoded with CBOR constructor tags (`121 + n`);
//! unknown tags fail fast.

use serde_cbor::Value;

use crate::error::DatumError;

/// Base CBOR tag for Plutus constructor indexes 0 through 6.
const PLUTUS_CONSTR_TAG_BASE: u64 = 121;

/// The authenticated host state record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostState {
    /// Datum schema version.
    pub version: u64,
    /// The 32-byte commitment root of all IBC state.
    pub ibc_state_root: Vec<u8>,
    /// Next client sequence number.
    pub next_client_sequence: u64,
    /// Next connection sequence number.
    pub next_connection_sequence: u64,
    /// Next channel sequence number.
    pub next_channel_sequence: u64,
    /// Port numbers bound on the host.
    pub bound_ports: Vec<u64>,
    /// Milliseconds since the Unix epoch of the last host state update.
    pub last_update_time: u64,
}

/// The decoded HostState datum.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostStateDatum {
    /// The host state record.
    pub state: HostState,
    /// The policy id of the HostState NFT.
    pub nft_policy: Vec<u8>,
}

/// Unwraps a Plutus constructor into its field list.
///
/// Only constructor index 0 (tag 121) is valid for the HostState datum and
/// its inner record. A bare array is accepted for the untagged canonical
/// form.
fn constructor_fields(value: Value) -> Result<Vec<Value>, DatumError> {
    match value {
        Value::Tag(tag, inner) => {
            if tag != PLUTUS_CONSTR_TAG_BASE {
                return Err(DatumError::UnknownConstructorTag(tag));
            }
            match *inner {
                Value::Array(fields) => Ok(fields),
                _ => Err(DatumError::Shape("constructor body is not an array")),
            }
        }
        Value::Array(fields) => Ok(fields),
        _ => Err(DatumError::Shape("expected a constructor or array")),
    }
}

fn as_u64(value: Value, what: &'static str) -> Result<u64, DatumError> {
    match value {
        Value::Integer(integer) => u64::try_from(integer).map_err(|_| DatumError::Shape(what)),
        _ => Err(DatumError::Shape(what)),
    }
}

fn as_bytes(value: Value, what: &'static str) -> Result<Vec<u8>, DatumError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        _ => Err(DatumError::Shape(what)),
    }
}

/// Decodes a CBOR-encoded HostState datum.
pub fn decode_host_state_datum(datum_cbor: &[u8]) -> Result<HostStateDatum, DatumError> {
    let value: Value = serde_cbor::from_slice(datum_cbor).map_err(|_| DatumError::Cbor)?;

    let mut fields = constructor_fields(value)?.into_iter();
    let (Some(state), Some(nft_policy), None) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(DatumError::Shape("datum must have exactly two fields"));
    };

    let mut state_fields = constructor_fields(state)?.into_iter();
    let (
        Some(version),
        Some(ibc_state_root),
        Some(next_client_sequence),
        Some(next_connection_sequence),
        Some(next_channel_sequence),
        Some(bound_ports),
        Some(last_update_time),
        None,
    ) = (
        state_fields.next(),
        state_fields.next(),
        state_fields.next(),
        state_fields.next(),
        state_fields.next(),
        state_fields.next(),
        state_fields.next(),
        state_fields.next(),
    )
    else {
        return Err(DatumError::Shape("host state must have exactly seven fields"));
    };

    let bound_ports = match bound_ports {
        Value::Array(ports) => ports
            .into_iter()
            .map(|port| as_u64(port, "bound port is not an integer"))
            .collect::<Result<Vec<u64>, DatumError>>()?,
        _ => return Err(DatumError::Shape("bound ports is not an array")),
    };

    Ok(HostStateDatum {
        state: HostState {
            version: as_u64(version, "version is not an integer")?,
            ibc_state_root: as_bytes(ibc_state_root, "ibc_state_root is not bytes")?,
            next_client_sequence: as_u64(
                next_client_sequence,
                "next client sequence is not an integer",
            )?,
            next_connection_sequence: as_u64(
                next_connection_sequence,
                "next connection sequence is not an integer",
            )?,
            next_channel_sequence: as_u64(
                next_channel_sequence,
                "next channel sequence is not an integer",
            )?,
            bound_ports,
            last_update_time: as_u64(last_update_time, "last update time is not an integer")?,
        },
        nft_policy: as_bytes(nft_policy, "nft policy is not bytes")?,
    })
}

/// Extracts the authenticated `ibc_state_root` from a HostState datum.
///
/// When `expected_nft_policy` is non-empty, the datum's policy id must match
/// it byte for byte. The root must be exactly 32 bytes. No other datum field
/// affects acceptance.
pub fn extract_ibc_state_root(
    datum_cbor: &[u8],
    expected_nft_policy: &[u8],
) -> Result<[u8; 32], DatumError> {
    let datum = decode_host_state_datum(datum_cbor)?;

    if !expected_nft_policy.is_empty() && datum.nft_policy != expected_nft_policy {
        return Err(DatumError::NftPolicyMismatch);
    }

    let root_len = datum.state.ibc_state_root.len();
    datum
        .state
        .ibc_state_root
        .try_into()
        .map_err(|_| DatumError::RootLength(root_len))
}

#[cfg(test)]
mod tests {
    use serde_cbor::Value;

    use super::{decode_host_state_datum, extract_ibc_state_root};
    use crate::error::DatumError;

    fn constr(fields: Vec<Value>) -> Value {
        Value::Tag(121, Box::new(Value::Array(fields)))
    }

    fn host_state_datum(root: &[u8], nft_policy: &[u8]) -> Vec<u8> {
        let state = constr(vec![
            Value::Integer(1),
            Value::Bytes(root.to_vec()),
            Value::Integer(4),
            Value::Integer(2),
            Value::Integer(3),
            Value::Array(vec![Value::Integer(100), Value::Integer(101)]),
            Value::Integer(1_707_122_694_000),
        ]);
        let datum = constr(vec![state, Value::Bytes(nft_policy.to_vec())]);
        serde_cbor::to_vec(&datum).unwrap()
    }

    #[test]
    fn test_decode_full_datum() {
        let datum = host_state_datum(&[7; 32], &[0xab; 28]);
        let decoded = decode_host_state_datum(&datum).unwrap();

        assert_eq!(decoded.state.version, 1);
        assert_eq!(decoded.state.ibc_state_root, vec![7; 32]);
        assert_eq!(decoded.state.next_client_sequence, 4);
        assert_eq!(decoded.state.next_connection_sequence, 2);
        assert_eq!(decoded.state.next_channel_sequence, 3);
        assert_eq!(decoded.state.bound_ports, vec![100, 101]);
        assert_eq!(decoded.state.last_update_time, 1_707_122_694_000);
        assert_eq!(decoded.nft_policy, vec![0xab; 28]);
    }

    #[test]
    fn test_extract_root_with_matching_policy() {
        let datum = host_state_datum(&[7; 32], &[0xab; 28]);
        let root = extract_ibc_state_root(&datum, &[0xab; 28]).unwrap();
        assert_eq!(root, [7; 32]);

        // An empty expected policy skips the check.
        let root = extract_ibc_state_root(&datum, &[]).unwrap();
        assert_eq!(root, [7; 32]);
    }

    #[test]
    fn test_extract_root_rejects_policy_mismatch() {
        let datum = host_state_datum(&[7; 32], &[0xab; 28]);
        assert_eq!(
            extract_ibc_state_root(&datum, &[0xcd; 28]),
            Err(DatumError::NftPolicyMismatch)
        );
    }

    #[test]
    fn test_extract_root_enforces_length() {
        let datum = host_state_datum(&[7; 16], &[0xab; 28]);
        assert_eq!(
            extract_ibc_state_root(&datum, &[]),
            Err(DatumError::RootLength(16))
        );
    }

    #[test]
    fn test_unknown_constructor_tag_fails_fast() {
        let datum = Value::Tag(
            122,
            Box::new(Value::Array(vec![Value::Bytes(vec![0xab; 28])])),
        );
        let bytes = serde_cbor::to_vec(&datum).unwrap();
        assert_eq!(
            decode_host_state_datum(&bytes),
            Err(DatumError::UnknownConstructorTag(122))
        );
    }

    #[test]
    fn test_malformed_cbor_is_rejected() {
        assert_eq!(
            decode_host_state_datum(&[0xff, 0x00, 0x01]),
            Err(DatumError::Cbor)
        );
    }
}
