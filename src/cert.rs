//! Issuer certificate wrapper.

use const_oid::db::rfc5912::ID_CE_KEY_USAGE;
use der::{Decode, Encode};
use x509_cert::ext::pkix::{KeyUsage, KeyUsages};
use x509_cert::Certificate;

use crate::errors::Result;

/// An X.509 certificate plus the handful of views this crate needs from it:
/// the DER subject name, the DER `SubjectPublicKeyInfo` and the `crlSign`
/// key-usage bit.
///
/// Borrowed by the CRL validator; it never takes ownership of the caller's
/// certificate store.
#[derive(Clone, Debug)]
pub struct CertificateToken {
    certificate: Certificate,
}

impl CertificateToken {
    /// Wraps an already decoded certificate.
    pub fn new(certificate: Certificate) -> Self {
        CertificateToken { certificate }
    }

    /// Decodes a DER certificate.
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        Ok(CertificateToken {
            certificate: Certificate::from_der(bytes)?,
        })
    }

    /// The wrapped certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// DER encoding of the subject name, for byte comparison against a CRL
    /// issuer.
    pub fn subject_der(&self) -> Result<Vec<u8>> {
        Ok(self.certificate.tbs_certificate.subject.to_der()?)
    }

    /// DER encoding of the subject public key info.
    pub fn spki_der(&self) -> Result<Vec<u8>> {
        Ok(self
            .certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()?)
    }

    /// Whether the key usage extension is present with the `cRLSign` bit
    /// set. Absence of the extension yields `false`.
    pub fn has_crl_sign_key_usage(&self) -> bool {
        let extensions = match &self.certificate.tbs_certificate.extensions {
            Some(extensions) => extensions,
            None => return false,
        };
        extensions
            .iter()
            .find(|ext| ext.extn_id == ID_CE_KEY_USAGE)
            .and_then(|ext| KeyUsage::from_der(ext.extn_value.as_bytes()).ok())
            .map(|usage| usage.0.contains(KeyUsages::CRLSign))
            .unwrap_or(false)
    }
}

impl From<Certificate> for CertificateToken {
    fn from(certificate: Certificate) -> Self {
        CertificateToken::new(certificate)
    }
}
