//! Certificate chain verification.
//!
//! The verifier walks the certificate chain *backwards*: verifying a
//! candidate yields its previous certificate, so a caller can iterate toward
//! a known trust anchor (typically the genesis certificate).

use crate::certificate::{Certificate, CertificateSignature, MultiSignature};
use crate::error::{MithrilIBCError, TransactionsProofError};
use crate::transactions_proof::MkMapProof;
use crate::types::protocol::{MithrilProtocolParameters, ProtocolMessagePartKey};
use crate::types::wrappers::{AggregateVerificationKey, StmAggregateSignature};

/// The Mithril cryptographic capability.
///
/// STM primitives (lotteries, aggregate keys, batch proofs) are outside this
/// crate; implementations delegate to the Mithril crates, and tests inject
/// doubles.
pub trait MithrilVerifier {
    /// Verifies an STM aggregate signature over `message` against the
    /// aggregate verification key under the declared protocol parameters.
    fn verify_multi_signature(
        &self,
        message: &[u8],
        signature: &StmAggregateSignature,
        aggregate_verification_key: &AggregateVerificationKey,
        protocol_parameters: &MithrilProtocolParameters,
    ) -> Result<(), MithrilIBCError>;

    /// Verifies a certified transaction set proof.
    fn verify_set_proof(&self, proof: &MkMapProof) -> Result<(), TransactionsProofError>;
}

/// Source of previously trusted certificates, looked up by hash.
pub trait CertificateRetriever {
    /// Fetches a certificate by its hash.
    fn certificate(&self, hash: &str) -> Result<Certificate, MithrilIBCError>;
}

/// Verifies candidate certificates as extensions of the trusted chain.
pub struct CertificateVerifier<'a, R, V> {
    retriever: &'a R,
    verifier: &'a V,
}

impl<'a, R, V> CertificateVerifier<'a, R, V>
where
    R: CertificateRetriever,
    V: MithrilVerifier,
{
    /// Creates a new verifier over the given retriever and crypto capability.
    pub const fn new(retriever: &'a R, verifier: &'a V) -> Self {
        Self {
            retriever,
            verifier,
        }
    }

    /// Verifies the multi-signature of `certificate` against its own
    /// aggregate verification key and protocol parameters.
    pub fn verify_multi_signature(
        &self,
        certificate: &Certificate,
        multi_signature: &MultiSignature,
    ) -> Result<(), MithrilIBCError> {
        self.verifier.verify_multi_signature(
            certificate.signed_message.as_bytes(),
            &multi_signature.signature,
            &certificate.aggregate_verification_key,
            &certificate.metadata.protocol_parameters,
        )
    }

    /// Verifies a standard (non-genesis) certificate and returns its
    /// previous chain node.
    ///
    /// The candidate is accepted iff its multi-signature verifies and either
    /// of the chaining rules holds against the previous certificate:
    ///
    /// - **Epoch transition**: the previous certificate's declared
    ///   `next_aggregate_verification_key` equals the candidate's key and the
    ///   epoch advances.
    /// - **Same epoch**: both certificates share their aggregate verification
    ///   key and their epoch.
    pub fn verify_standard_certificate(
        &self,
        certificate: &Certificate,
    ) -> Result<Certificate, MithrilIBCError> {
        let CertificateSignature::Multi(multi_signature) = &certificate.signature else {
            return Err(MithrilIBCError::InvalidCertificate(
                "standard certificate verification requires a multi-signature".to_string(),
            ));
        };

        if certificate.is_chaining_to_itself() {
            return Err(MithrilIBCError::InvalidCertificate(format!(
                "certificate {} chains to itself",
                certificate.hash
            )));
        }

        self.verify_multi_signature(certificate, multi_signature)?;

        let previous = self.retriever.certificate(&certificate.previous_hash)?;
        if previous.hash != certificate.previous_hash {
            return Err(MithrilIBCError::InvalidCertificate(
                "certificate chain previous hash unmatch".to_string(),
            ));
        }

        let current_avk = certificate.aggregate_verification_key.as_json_hex();
        let previous_avk = previous.aggregate_verification_key.as_json_hex();

        let next_avk = previous
            .protocol_message
            .get_message_part(ProtocolMessagePartKey::NextAggregateVerificationKey)
            .ok_or_else(|| {
                MithrilIBCError::InvalidCertificate(
                    "can not get next avk from previous certificate".to_string(),
                )
            })?;
        // Re-canonicalize the declared next key before comparing.
        let next_avk = AggregateVerificationKey::from_json_hex(next_avk)?;

        let valid_epoch_transition =
            next_avk.as_json_hex() == current_avk && previous.epoch != certificate.epoch;
        let valid_same_epoch =
            previous_avk == current_avk && previous.epoch == certificate.epoch;

        if valid_epoch_transition || valid_same_epoch {
            Ok(previous)
        } else {
            Err(MithrilIBCError::InvalidCertificate(
                "currentAvk and nextAvk are not match".to_string(),
            ))
        }
    }
}
