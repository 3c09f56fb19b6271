//! CRL verification verdicts.
//!
//! Verification never throws on a bad signature: the outcome is a
//! [`CrlValidity`] value whose flags and reason string record what was
//! checked and why it failed. Only structural problems (an undecodable CRL,
//! an unreadable document) surface as errors.

use std::time::SystemTime;

use log::warn;
use num_bigint::BigUint;
use x509_cert::time::Time;

use super::parser::{extract_metadata, extract_signed_range, find_revocation_entry};
use super::{CrlMetadata, RevocationEntry};
use crate::algorithms::{resolve_signature_algorithm, verify_signature, DigestWriter, SignatureScheme};
use crate::cert::CertificateToken;
use crate::document::Document;
use crate::errors::Result;

/// The outcome of verifying a CRL against a candidate issuer certificate.
///
/// Holds a handle to the CRL document so revocation lookups can reopen it
/// later without the caller keeping track of the source bytes.
#[derive(Clone, Debug)]
pub struct CrlValidity {
    document: Document,
    metadata: CrlMetadata,
    signature_scheme: Option<SignatureScheme>,
    signature_intact: bool,
    signature_invalidity_reason: Option<String>,
    issuer_matches: bool,
    crl_sign_key_usage: bool,
}

impl CrlValidity {
    /// The CRL document this verdict was computed from.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Parsed CRL metadata.
    pub fn metadata(&self) -> &CrlMetadata {
        &self.metadata
    }

    /// `thisUpdate`.
    pub fn this_update(&self) -> Time {
        self.metadata.this_update
    }

    /// `nextUpdate`, if the CRL carries one.
    pub fn next_update(&self) -> Option<Time> {
        self.metadata.next_update
    }

    /// The resolved signature scheme, when the algorithm is supported.
    pub fn signature_scheme(&self) -> Option<SignatureScheme> {
        self.signature_scheme
    }

    /// Whether the signature verified against the issuer's public key.
    pub fn is_signature_intact(&self) -> bool {
        self.signature_intact
    }

    /// Why the signature did not verify, when it didn't.
    pub fn signature_invalidity_reason(&self) -> Option<&str> {
        self.signature_invalidity_reason.as_deref()
    }

    /// Whether the CRL issuer name byte-matches the certificate subject.
    pub fn is_issuer_match(&self) -> bool {
        self.issuer_matches
    }

    /// Whether the issuer certificate carries the `cRLSign` key usage.
    pub fn has_crl_sign_key_usage(&self) -> bool {
        self.crl_sign_key_usage
    }

    /// Signature intact, issuer matched and `cRLSign` present.
    pub fn is_valid(&self) -> bool {
        self.signature_intact && self.issuer_matches && self.crl_sign_key_usage
    }

    /// Whether `nextUpdate` lies in the past at `at`. `None` when the CRL
    /// does not state a `nextUpdate`.
    pub fn is_expired(&self, at: SystemTime) -> Option<bool> {
        self.metadata
            .next_update
            .map(|next| next.to_system_time() < at)
    }
}

/// Verifies a CRL document against a candidate issuer certificate.
///
/// Two passes over the document: a metadata pass and a digest pass over the
/// signed range, so memory stays bounded regardless of CRL size. A signature
/// that fails to verify, a non-matching issuer or a missing `cRLSign` bit
/// all produce a populated verdict, never an error.
pub fn build_crl_validity(document: &Document, issuer: &CertificateToken) -> Result<CrlValidity> {
    let metadata = extract_metadata(document.open()?)?;

    if metadata.signature_algorithm.oid != metadata.outer_signature_algorithm_oid {
        warn!(
            "TBSCertList.signature ({}) differs from CertificateList.signatureAlgorithm ({})",
            metadata.signature_algorithm.oid, metadata.outer_signature_algorithm_oid
        );
    }

    let issuer_matches = metadata.issuer_der == issuer.subject_der()?;
    let crl_sign_key_usage = issuer.has_crl_sign_key_usage();
    if !crl_sign_key_usage {
        // recorded on the verdict; does not by itself invalidate the signature
        warn!("issuer certificate does not carry the cRLSign key usage");
    }

    let mut signature_scheme = None;
    let mut signature_intact = false;
    let mut signature_invalidity_reason = None;

    match resolve_signature_algorithm(&metadata.signature_algorithm) {
        Ok(scheme) => {
            signature_scheme = Some(scheme);
            match check_signature(document, issuer, scheme, &metadata) {
                Ok(()) => signature_intact = true,
                Err(err) => {
                    signature_invalidity_reason =
                        Some(format!("signature verification failed: {}", err));
                }
            }
        }
        Err(err) => {
            signature_invalidity_reason =
                Some(format!("unsupported signature algorithm: {}", err));
        }
    }

    Ok(CrlValidity {
        document: document.clone(),
        metadata,
        signature_scheme,
        signature_intact,
        signature_invalidity_reason,
        issuer_matches,
        crl_sign_key_usage,
    })
}

fn check_signature(
    document: &Document,
    issuer: &CertificateToken,
    scheme: SignatureScheme,
    metadata: &CrlMetadata,
) -> Result<()> {
    let writer = DigestWriter::new(scheme.digest_algorithm());
    let writer = extract_signed_range(document.open()?, writer)?;
    let tbs_digest = writer.finish();
    verify_signature(
        scheme,
        &issuer.spki_der()?,
        &tbs_digest,
        &metadata.signature_value,
    )
}

/// Looks up `serial` in the verdict's CRL.
///
/// Fail-open by policy: a CRL that cannot be traversed at this point is
/// logged and treated as not listing the certificate.
pub fn get_revocation_info(validity: &CrlValidity, serial: &BigUint) -> Option<RevocationEntry> {
    let reader = match validity.document.open() {
        Ok(reader) => reader,
        Err(err) => {
            warn!("cannot reopen CRL document for revocation lookup: {}", err);
            return None;
        }
    };
    match find_revocation_entry(reader, serial) {
        Ok(entry) => entry,
        Err(err) => {
            warn!("revocation lookup failed: {}", err);
            None
        }
    }
}
