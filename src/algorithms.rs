//! Digest and signature algorithm resolution and streaming verification.
//!
//! Signature algorithms are resolved from `AlgorithmIdentifier` OIDs into a
//! tagged [`SignatureScheme`] so that unsupported algorithms surface as data
//! (a verdict reason) rather than as runtime type errors. RSASSA-PSS is the
//! one parameterized algorithm given a structured decode
//! ([`pkcs1::RsaPssParams`]); parameters on any other algorithm are logged
//! and ignored rather than failing the whole check.
//!
//! Verification is prehash-based ([`signature::hazmat::PrehashVerifier`]):
//! callers stream the signed byte range through a digest and only the final
//! hash reaches the verifier, so arbitrarily large TBS ranges never have to
//! be buffered.

use core::fmt;
use std::collections::BTreeMap;
use std::io::{self, Write};

use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_224, ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512,
    ID_RSASSA_PSS, ID_SHA_1, ID_SHA_224, ID_SHA_256, ID_SHA_384, ID_SHA_512, SECP_256_R_1,
    SECP_384_R_1, SHA_1_WITH_RSA_ENCRYPTION, SHA_224_WITH_RSA_ENCRYPTION,
    SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::AssociatedOid;
use der::asn1::ObjectIdentifier;
use der::{Decode, Encode};
use digest::{Digest, DynDigest, FixedOutputReset};
use log::warn;
use rsa::pkcs8::DecodePublicKey;
use signature::hazmat::PrehashVerifier;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::errors::{Error, Result};

/// Digest algorithms this crate can compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// SHA-1 (legacy, still common in older CRLs).
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Resolves a digest OID.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match *oid {
            ID_SHA_1 => Some(DigestAlgorithm::Sha1),
            ID_SHA_224 => Some(DigestAlgorithm::Sha224),
            ID_SHA_256 => Some(DigestAlgorithm::Sha256),
            ID_SHA_384 => Some(DigestAlgorithm::Sha384),
            ID_SHA_512 => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    /// The digest's own OID.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => ID_SHA_1,
            DigestAlgorithm::Sha224 => ID_SHA_224,
            DigestAlgorithm::Sha256 => ID_SHA_256,
            DigestAlgorithm::Sha384 => ID_SHA_384,
            DigestAlgorithm::Sha512 => ID_SHA_512,
        }
    }

    /// Digest output size in bytes.
    pub fn output_size(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha224 => 28,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Fresh hasher instance.
    pub fn new_digest(self) -> Box<dyn DynDigest> {
        match self {
            DigestAlgorithm::Sha1 => Box::new(sha1::Sha1::new()),
            DigestAlgorithm::Sha224 => Box::new(sha2::Sha224::new()),
            DigestAlgorithm::Sha256 => Box::new(sha2::Sha256::new()),
            DigestAlgorithm::Sha384 => Box::new(sha2::Sha384::new()),
            DigestAlgorithm::Sha512 => Box::new(sha2::Sha512::new()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha224 => "SHA-224",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        })
    }
}

/// A resolved signature algorithm.
///
/// A tagged variant instead of downcast-and-throw dispatch: callers match on
/// the scheme, and an OID outside this set is an
/// [`Error::UnsupportedAlgorithm`] at resolution time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    /// RSASSA-PKCS1-v1_5 with the given digest.
    RsaPkcs1(DigestAlgorithm),
    /// RSASSA-PSS.
    RsaPss {
        /// Digest named in the PSS parameters.
        digest: DigestAlgorithm,
        /// Salt length named in the PSS parameters.
        salt_len: usize,
    },
    /// ECDSA (P-256 or P-384 keys) with the given digest.
    Ecdsa(DigestAlgorithm),
}

impl SignatureScheme {
    /// The digest the signer hashed the signed range with.
    pub fn digest_algorithm(self) -> DigestAlgorithm {
        match self {
            SignatureScheme::RsaPkcs1(d) => d,
            SignatureScheme::RsaPss { digest, .. } => digest,
            SignatureScheme::Ecdsa(d) => d,
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureScheme::RsaPkcs1(d) => write!(f, "RSASSA-PKCS1-v1_5 with {}", d),
            SignatureScheme::RsaPss { digest, .. } => write!(f, "RSASSA-PSS with {}", digest),
            SignatureScheme::Ecdsa(d) => write!(f, "ECDSA with {}", d),
        }
    }
}

/// Resolves an `AlgorithmIdentifier` into a [`SignatureScheme`].
///
/// RSASSA-PSS parameters are decoded for the digest and salt length
/// (defaults per RFC 4055 when absent). Parameters on any other algorithm
/// are not verified: they are logged and skipped, matching the tolerant
/// policy for oddball-but-decodable CRLs.
pub fn resolve_signature_algorithm(id: &AlgorithmIdentifierOwned) -> Result<SignatureScheme> {
    let scheme = match id.oid {
        SHA_1_WITH_RSA_ENCRYPTION => SignatureScheme::RsaPkcs1(DigestAlgorithm::Sha1),
        SHA_224_WITH_RSA_ENCRYPTION => SignatureScheme::RsaPkcs1(DigestAlgorithm::Sha224),
        SHA_256_WITH_RSA_ENCRYPTION => SignatureScheme::RsaPkcs1(DigestAlgorithm::Sha256),
        SHA_384_WITH_RSA_ENCRYPTION => SignatureScheme::RsaPkcs1(DigestAlgorithm::Sha384),
        SHA_512_WITH_RSA_ENCRYPTION => SignatureScheme::RsaPkcs1(DigestAlgorithm::Sha512),
        ECDSA_WITH_SHA_224 => SignatureScheme::Ecdsa(DigestAlgorithm::Sha224),
        ECDSA_WITH_SHA_256 => SignatureScheme::Ecdsa(DigestAlgorithm::Sha256),
        ECDSA_WITH_SHA_384 => SignatureScheme::Ecdsa(DigestAlgorithm::Sha384),
        ECDSA_WITH_SHA_512 => SignatureScheme::Ecdsa(DigestAlgorithm::Sha512),
        ID_RSASSA_PSS => return resolve_pss(id),
        _ => return Err(Error::UnsupportedAlgorithm(id.oid)),
    };

    if id.parameters.as_ref().is_some_and(|p| !p.is_null()) {
        warn!(
            "unexpected parameters on algorithm {}; parameter verification skipped",
            id.oid
        );
    }
    Ok(scheme)
}

fn resolve_pss(id: &AlgorithmIdentifierOwned) -> Result<SignatureScheme> {
    let encoded = match &id.parameters {
        Some(any) => Some(any.to_der()?),
        None => None,
    };
    let params = match &encoded {
        Some(encoded) => pkcs1::RsaPssParams::from_der(encoded)?,
        // RFC 4055 defaults: SHA-1, MGF1/SHA-1, salt length 20
        None => pkcs1::RsaPssParams::default(),
    };

    let digest = DigestAlgorithm::from_oid(&params.hash.oid)
        .ok_or(Error::UnsupportedAlgorithm(params.hash.oid))?;
    if params.mask_gen.parameters.map(|p| p.oid) != Some(params.hash.oid) {
        warn!("RSASSA-PSS mask generation digest differs from hash digest; using hash digest");
    }
    Ok(SignatureScheme::RsaPss {
        digest,
        salt_len: usize::from(params.salt_len),
    })
}

/// Computes every candidate digest over one streamed pass.
///
/// A CMS `digestAlgorithms` set names every digest any signer may have used,
/// and which one actually applies is unknown until the signer infos are read
/// — after the content has streamed past. So all candidates are hashed
/// simultaneously in the single pass.
#[derive(Default)]
pub struct MultiDigester {
    entries: Vec<(ObjectIdentifier, Box<dyn DynDigest>)>,
}

impl MultiDigester {
    /// Builds a digester for the given algorithm identifiers.
    ///
    /// Unknown digest OIDs are logged and skipped; duplicates collapse to
    /// one hasher.
    pub fn for_algorithms(algorithms: &[AlgorithmIdentifierOwned]) -> Self {
        let mut entries: Vec<(ObjectIdentifier, Box<dyn DynDigest>)> = Vec::new();
        for id in algorithms {
            if entries.iter().any(|(oid, _)| *oid == id.oid) {
                continue;
            }
            match DigestAlgorithm::from_oid(&id.oid) {
                Some(alg) => entries.push((id.oid, alg.new_digest())),
                None => warn!("unknown digest algorithm {} skipped", id.oid),
            }
        }
        MultiDigester { entries }
    }

    /// Returns `true` when no candidate digest could be constructed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Feeds content into every candidate.
    pub fn update(&mut self, data: &[u8]) {
        for (_, digest) in &mut self.entries {
            digest.update(data);
        }
    }

    /// Finalizes all candidates into a digest-OID → digest-value map.
    pub fn finish(self) -> BTreeMap<ObjectIdentifier, Vec<u8>> {
        self.entries
            .into_iter()
            .map(|(oid, digest)| (oid, digest.finalize().to_vec()))
            .collect()
    }
}

impl Write for MultiDigester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Single-digest writer for streaming a signed byte range into a hash.
pub struct DigestWriter {
    digest: Box<dyn DynDigest>,
}

impl DigestWriter {
    /// Fresh writer hashing with `algorithm`.
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        DigestWriter {
            digest: algorithm.new_digest(),
        }
    }

    /// Finalizes the hash.
    pub fn finish(self) -> Vec<u8> {
        self.digest.finalize().to_vec()
    }
}

impl Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.digest.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Verifies `signature` over a prehashed byte range.
///
/// `spki_der` is the issuer's DER `SubjectPublicKeyInfo`; `tbs_digest` is
/// the output of hashing the signed range with
/// [`SignatureScheme::digest_algorithm`].
pub fn verify_signature(
    scheme: SignatureScheme,
    spki_der: &[u8],
    tbs_digest: &[u8],
    signature: &[u8],
) -> Result<()> {
    match scheme {
        SignatureScheme::RsaPkcs1(digest) => {
            let key = rsa::RsaPublicKey::from_public_key_der(spki_der)
                .map_err(|_| Error::InvalidPublicKey)?;
            match digest {
                DigestAlgorithm::Sha1 => verify_rsa_pkcs1::<sha1::Sha1>(key, tbs_digest, signature),
                DigestAlgorithm::Sha224 => {
                    verify_rsa_pkcs1::<sha2::Sha224>(key, tbs_digest, signature)
                }
                DigestAlgorithm::Sha256 => {
                    verify_rsa_pkcs1::<sha2::Sha256>(key, tbs_digest, signature)
                }
                DigestAlgorithm::Sha384 => {
                    verify_rsa_pkcs1::<sha2::Sha384>(key, tbs_digest, signature)
                }
                DigestAlgorithm::Sha512 => {
                    verify_rsa_pkcs1::<sha2::Sha512>(key, tbs_digest, signature)
                }
            }
        }
        SignatureScheme::RsaPss { digest, salt_len } => {
            let key = rsa::RsaPublicKey::from_public_key_der(spki_der)
                .map_err(|_| Error::InvalidPublicKey)?;
            match digest {
                DigestAlgorithm::Sha1 => {
                    verify_rsa_pss::<sha1::Sha1>(key, tbs_digest, signature, salt_len)
                }
                DigestAlgorithm::Sha224 => {
                    verify_rsa_pss::<sha2::Sha224>(key, tbs_digest, signature, salt_len)
                }
                DigestAlgorithm::Sha256 => {
                    verify_rsa_pss::<sha2::Sha256>(key, tbs_digest, signature, salt_len)
                }
                DigestAlgorithm::Sha384 => {
                    verify_rsa_pss::<sha2::Sha384>(key, tbs_digest, signature, salt_len)
                }
                DigestAlgorithm::Sha512 => {
                    verify_rsa_pss::<sha2::Sha512>(key, tbs_digest, signature, salt_len)
                }
            }
        }
        SignatureScheme::Ecdsa(_) => verify_ecdsa(spki_der, tbs_digest, signature),
    }
}

fn verify_rsa_pkcs1<D>(key: rsa::RsaPublicKey, prehash: &[u8], signature: &[u8]) -> Result<()>
where
    D: Digest + AssociatedOid,
{
    let signature = rsa::pkcs1v15::Signature::try_from(signature)?;
    rsa::pkcs1v15::VerifyingKey::<D>::new(key).verify_prehash(prehash, &signature)?;
    Ok(())
}

fn verify_rsa_pss<D>(
    key: rsa::RsaPublicKey,
    prehash: &[u8],
    signature: &[u8],
    salt_len: usize,
) -> Result<()>
where
    D: Digest + FixedOutputReset,
{
    let signature = rsa::pss::Signature::try_from(signature)?;
    rsa::pss::VerifyingKey::<D>::new_with_salt_len(key, salt_len)
        .verify_prehash(prehash, &signature)?;
    Ok(())
}

fn verify_ecdsa(spki_der: &[u8], prehash: &[u8], signature: &[u8]) -> Result<()> {
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der)?;
    let curve: Option<ObjectIdentifier> = spki
        .algorithm
        .parameters
        .as_ref()
        .and_then(|p| p.decode_as().ok());

    match curve {
        Some(SECP_256_R_1) => {
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|_| Error::InvalidPublicKey)?;
            let signature = ecdsa::Signature::from_der(signature)?;
            key.verify_prehash(prehash, &signature)?;
            Ok(())
        }
        Some(SECP_384_R_1) => {
            let key = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|_| Error::InvalidPublicKey)?;
            let signature = ecdsa::Signature::from_der(signature)?;
            key.verify_prehash(prehash, &signature)?;
            Ok(())
        }
        Some(other) => Err(Error::UnsupportedAlgorithm(other)),
        None => Err(Error::InvalidPublicKey),
    }
}
