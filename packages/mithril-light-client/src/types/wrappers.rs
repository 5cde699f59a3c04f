//! Wrappers around the opaque Mithril STM structures.
//!
//! The STM aggregate verification key and aggregate signature are large JSON
//! structures produced by the Mithril crates. The light client never inspects
//! them: it canonicalizes them for hashing and comparison, and hands them to
//! the [`crate::verify::MithrilVerifier`] capability for the actual
//! cryptography.
//!
//! Canonical form is pinned on both sides of every comparison: `serde_json`
//! with sorted object keys and no whitespace, hex encoded. Diverging encoders
//! would produce different certificate hashes and fracture the chain.

use serde_json::Value;

use crate::error::MithrilIBCError;

fn canonical_json_hex(value: &Value) -> Result<String, MithrilIBCError> {
    let json = serde_json::to_string(value)
        .map_err(|err| MithrilIBCError::InvalidCertificate(err.to_string()))?;
    Ok(hex::encode(json))
}

fn value_from_json_hex(hex_json: &str, what: &str) -> Result<Value, MithrilIBCError> {
    let bytes = hex::decode(hex_json).map_err(|err| {
        MithrilIBCError::InvalidCertificate(format!("{what} is not hex encoded: {err}"))
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        MithrilIBCError::InvalidCertificate(format!("{what} is not valid JSON: {err}"))
    })
}

/// The public aggregate of the signers' keys for an epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateVerificationKey {
    value: Value,
    canonical_hex: String,
}

impl AggregateVerificationKey {
    /// Decodes a key from its hex-encoded JSON wire form.
    pub fn from_json_hex(hex_json: &str) -> Result<Self, MithrilIBCError> {
        let value = value_from_json_hex(hex_json, "aggregate verification key")?;
        let canonical_hex = canonical_json_hex(&value)?;
        Ok(Self {
            value,
            canonical_hex,
        })
    }

    /// The canonical hex-encoded JSON form of the key.
    #[must_use]
    pub fn as_json_hex(&self) -> &str {
        &self.canonical_hex
    }

    /// The decoded JSON body of the key.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.value
    }
}

/// An STM aggregate signature.
#[derive(Clone, Debug, PartialEq)]
pub struct StmAggregateSignature {
    value: Value,
    canonical_hex: String,
}

impl StmAggregateSignature {
    /// Decodes a signature from its hex-encoded JSON wire form.
    pub fn from_json_hex(hex_json: &str) -> Result<Self, MithrilIBCError> {
        let value = value_from_json_hex(hex_json, "multi signature")?;
        let canonical_hex = canonical_json_hex(&value)?;
        Ok(Self {
            value,
            canonical_hex,
        })
    }

    /// The canonical hex-encoded JSON form of the signature.
    #[must_use]
    pub fn as_json_hex(&self) -> &str {
        &self.canonical_hex
    }

    /// The decoded JSON body of the signature.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.value
    }
}

/// An ed25519 genesis signature, carried by the initial chain certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisSignature {
    raw: Vec<u8>,
}

impl GenesisSignature {
    /// Decodes a genesis signature from its hex wire form.
    pub fn from_bytes_hex(hex_bytes: &str) -> Result<Self, MithrilIBCError> {
        let raw = hex::decode(hex_bytes).map_err(|err| {
            MithrilIBCError::InvalidCertificate(format!(
                "genesis signature is not hex encoded: {err}"
            ))
        })?;
        Ok(Self { raw })
    }

    /// The hex form of the raw signature bytes.
    #[must_use]
    pub fn to_bytes_hex(&self) -> String {
        hex::encode(&self.raw)
    }

    /// The raw signature bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::AggregateVerificationKey;

    #[test]
    fn test_canonical_hex_is_stable_across_key_order() {
        // Same JSON object, different member order on the wire.
        let first = hex::encode(r#"{"a":1,"b":2}"#);
        let second = hex::encode(r#"{"b":2,"a":1}"#);

        let first = AggregateVerificationKey::from_json_hex(&first).unwrap();
        let second = AggregateVerificationKey::from_json_hex(&second).unwrap();

        assert_eq!(first.as_json_hex(), second.as_json_hex());
    }

    #[test]
    fn test_rejects_non_hex_and_non_json() {
        assert!(AggregateVerificationKey::from_json_hex("zz").is_err());
        assert!(AggregateVerificationKey::from_json_hex(&hex::encode("not json")).is_err());
    }
}
