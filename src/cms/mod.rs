//! Streaming CMS `SignedData` parsing and generation (RFC 5652).
//!
//! ```text
//! ContentInfo ::= SEQUENCE {
//!      contentType   ContentType,
//!      content       [0] EXPLICIT ANY DEFINED BY contentType }
//!
//! SignedData ::= SEQUENCE {
//!      version           CMSVersion,
//!      digestAlgorithms  DigestAlgorithmIdentifiers,
//!      encapContentInfo  EncapsulatedContentInfo,
//!      certificates      [0] IMPLICIT CertificateSet OPTIONAL,
//!      crls              [1] IMPLICIT RevocationInfoChoices OPTIONAL,
//!      signerInfos       SignerInfos }
//! ```
//!
//! The encapsulated content is the one unbounded field; the parser streams
//! it through every candidate digest in a single pass and the builder
//! streams it back out in chunks, so neither direction buffers the payload.

mod builder;
mod parser;

pub use builder::write_cms;
pub use parser::{parse_cms, CmsStreamParser};

use std::collections::BTreeMap;

use cms::signed_data::SignerInfo;
use der::asn1::ObjectIdentifier;
use der::Encode;
use spki::AlgorithmIdentifierOwned;
use x509_cert::crl::CertificateList;
use x509_cert::Certificate;

use crate::document::Document;
use crate::errors::Result;

/// `id-ri-ocsp-response` (RFC 5940): an OCSPResponse carried in the CMS
/// `crls` field.
pub const ID_RI_OCSP_RESPONSE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.16.2");

/// `id-pkix-ocsp-basic` (RFC 6960): a bare BasicOCSPResponse in the same
/// position, as some generators emit.
pub const ID_PKIX_OCSP_BASIC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");

/// Structured view of a CMS `SignedData`.
///
/// Produced by [`parse_cms`] and consumed by [`write_cms`]. The signed
/// content is a re-openable [`Document`] handle rather than a buffer;
/// `signed_content` is `None` exactly when the signature is detached.
#[derive(Clone, Debug, Default)]
pub struct Cms {
    /// `SignedData.version`.
    pub version: u32,

    /// Declared digest algorithms, unique by full encoding.
    pub digest_algorithm_ids: Vec<AlgorithmIdentifierOwned>,

    /// `encapContentInfo.eContentType`.
    pub signed_content_type: Option<ObjectIdentifier>,

    /// The encapsulated content; `None` for a detached signature.
    pub signed_content: Option<Document>,

    /// Whether `eContent` was absent.
    pub detached: bool,

    /// X.509 certificates from the `certificates` field.
    pub certificates: Vec<Certificate>,

    /// Raw DER attribute certificates (`v2AttrCert` choice), kept opaque.
    pub attribute_certificates: Vec<Vec<u8>>,

    /// CRLs from the `crls` field.
    pub crls: Vec<CertificateList>,

    /// Raw DER `OCSPResponse` structures from `crls` (`other` choice with
    /// format [`ID_RI_OCSP_RESPONSE`]).
    pub ocsp_responses: Vec<Vec<u8>>,

    /// Raw DER `BasicOCSPResponse` structures from `crls` (`other` choice
    /// with format [`ID_PKIX_OCSP_BASIC`]).
    pub ocsp_basic_responses: Vec<Vec<u8>>,

    /// Signer infos.
    pub signer_infos: Vec<SignerInfo>,

    /// Digest of the signed content per declared digest OID, computed in
    /// the parse pass. Empty when the signature is detached and no detached
    /// content was supplied.
    pub content_digests: BTreeMap<ObjectIdentifier, Vec<u8>>,
}

impl Cms {
    /// Adds a digest algorithm, keeping the set unique by encoding.
    pub fn add_digest_algorithm(&mut self, id: AlgorithmIdentifierOwned) -> Result<()> {
        let encoded = id.to_der()?;
        for existing in &self.digest_algorithm_ids {
            if existing.to_der()? == encoded {
                return Ok(());
            }
        }
        self.digest_algorithm_ids.push(id);
        Ok(())
    }

    /// The computed content digest for a digest OID, when available.
    pub fn content_digest(&self, oid: &ObjectIdentifier) -> Option<&[u8]> {
        self.content_digests.get(oid).map(Vec::as_slice)
    }
}
