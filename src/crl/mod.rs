//! Streaming X.509 CRL parsing and verification (RFC 5280 § 5).
//!
//! ```text
//! CertificateList  ::=  SEQUENCE  {
//!      tbsCertList          TBSCertList,
//!      signatureAlgorithm   AlgorithmIdentifier,
//!      signatureValue       BIT STRING  }
//!
//! TBSCertList  ::=  SEQUENCE  {
//!      version                 Version OPTIONAL,
//!      signature               AlgorithmIdentifier,
//!      issuer                  Name,
//!      thisUpdate              Time,
//!      nextUpdate              Time OPTIONAL,
//!      revokedCertificates     SEQUENCE OF SEQUENCE  {
//!           userCertificate         CertificateSerialNumber,
//!           revocationDate          Time,
//!           crlEntryExtensions      Extensions OPTIONAL }  OPTIONAL,
//!      crlExtensions           [0]  EXPLICIT Extensions OPTIONAL }
//! ```
//!
//! The parser walks this grammar with the raw TLV codec so that CRLs too
//! large to buffer can still be digested, verified and queried for a single
//! serial number in bounded memory.

mod parser;
mod validity;

pub use parser::{extract_metadata, extract_signed_range, find_revocation_entry, signed_range};
pub use validity::{build_crl_validity, get_revocation_info, CrlValidity};

use std::collections::BTreeMap;

use const_oid::db::rfc5912::{ID_CE_CRL_NUMBER, ID_CE_CRL_REASONS};
use der::asn1::ObjectIdentifier;
use der::Decode;
use num_bigint::BigUint;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::CrlReason;
use x509_cert::name::Name;
use x509_cert::time::Time;

/// Extension map: extension OID → raw DER of the extension value (the
/// contents of the `extnValue` OCTET STRING).
pub type ExtensionMap = BTreeMap<ObjectIdentifier, Vec<u8>>;

/// CRL fields extracted without parsing the revoked-certificate list.
///
/// Produced by [`extract_metadata`]; the `revokedCertificates` sequence is
/// skipped via its declared length, so this stays cheap for CRLs of any
/// size.
#[derive(Clone, Debug)]
pub struct CrlMetadata {
    /// CRL version (`2` for v2), when the optional field is present.
    pub version: Option<u32>,

    /// `TBSCertList.signature`: the algorithm the CRL claims it was signed
    /// with, parameters included (this is where RSASSA-PSS carries its
    /// digest and salt length).
    pub signature_algorithm: AlgorithmIdentifierOwned,

    /// Issuer distinguished name.
    pub issuer: Name,

    /// Raw DER encoding of the issuer name, kept for byte comparison
    /// against a candidate issuer certificate's subject.
    pub issuer_der: Vec<u8>,

    /// `thisUpdate`, always present.
    pub this_update: Time,

    /// `nextUpdate`, if present.
    pub next_update: Option<Time>,

    /// OID of the outer `CertificateList.signatureAlgorithm`.
    pub outer_signature_algorithm_oid: ObjectIdentifier,

    /// Raw signature bytes (BIT STRING contents, unused-bits octet
    /// stripped).
    pub signature_value: Vec<u8>,

    /// Critical `crlExtensions` entries.
    pub critical_extensions: ExtensionMap,

    /// Non-critical `crlExtensions` entries.
    pub non_critical_extensions: ExtensionMap,
}

impl CrlMetadata {
    /// Looks up an extension value in either criticality map.
    pub fn extension(&self, oid: &ObjectIdentifier) -> Option<&[u8]> {
        self.critical_extensions
            .get(oid)
            .or_else(|| self.non_critical_extensions.get(oid))
            .map(Vec::as_slice)
    }

    /// Decodes the `cRLNumber` extension when present.
    pub fn crl_number(&self) -> Option<BigUint> {
        let raw = self.extension(&ID_CE_CRL_NUMBER)?;
        let value = der::asn1::Uint::from_der(raw).ok()?;
        Some(BigUint::from_bytes_be(value.as_bytes()))
    }
}

/// One revoked-certificate entry, materialized only for the serial number a
/// lookup asked about.
#[derive(Clone, Debug)]
pub struct RevocationEntry {
    /// Serial number of the revoked certificate.
    pub serial_number: BigUint,

    /// When the certificate was revoked.
    pub revocation_date: Time,

    /// Critical `crlEntryExtensions`.
    pub critical_extensions: ExtensionMap,

    /// Non-critical `crlEntryExtensions`.
    pub non_critical_extensions: ExtensionMap,
}

impl RevocationEntry {
    /// Decodes the `reasonCode` entry extension when present.
    pub fn reason_code(&self) -> Option<CrlReason> {
        let raw = self
            .critical_extensions
            .get(&ID_CE_CRL_REASONS)
            .or_else(|| self.non_critical_extensions.get(&ID_CE_CRL_REASONS))?;
        CrlReason::from_der(raw).ok()
    }
}
