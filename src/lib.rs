#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # Usage
//!
//! ## CMS round trip
//!
//! ```
//! use sigstream::{parse_cms, write_cms, Cms, Document, InMemoryResourcesHandlerBuilder};
//!
//! # fn main() -> sigstream::Result<()> {
//! let mut model = Cms {
//!     version: 1,
//!     ..Cms::default()
//! };
//! model.signed_content = Some(Document::from_bytes(b"signed payload".to_vec()));
//!
//! let document = write_cms(&model, &InMemoryResourcesHandlerBuilder)?;
//! let reparsed = parse_cms(&document)?;
//!
//! assert!(!reparsed.detached);
//! assert_eq!(
//!     reparsed.signed_content.as_ref().unwrap().to_vec()?,
//!     b"signed payload"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## CRL verification
//!
//! ```no_run
//! use sigstream::{build_crl_validity, get_revocation_info, BigUint, CertificateToken, Document};
//!
//! # fn main() -> sigstream::Result<()> {
//! let crl = Document::from_path("revocations.crl");
//! let issuer = CertificateToken::from_der(&std::fs::read("issuer.der")?)?;
//!
//! let validity = build_crl_validity(&crl, &issuer)?;
//! if validity.is_signature_intact() {
//!     let entry = get_revocation_info(&validity, &BigUint::from(123456u32));
//!     println!("revoked: {}", entry.is_some());
//! }
//! # Ok(())
//! # }
//! ```

pub mod algorithms;
pub mod cert;
pub mod cms;
pub mod crl;
pub mod document;
mod errors;
pub mod tee;
pub mod tlv;

pub use crate::{
    cert::CertificateToken,
    cms::{parse_cms, write_cms, Cms, CmsStreamParser},
    crl::{
        build_crl_validity, get_revocation_info, CrlMetadata, CrlValidity, RevocationEntry,
    },
    document::{
        Document, InMemoryResourcesHandlerBuilder, ResourcesHandler, ResourcesHandlerBuilder,
        TempFileResourcesHandlerBuilder,
    },
    errors::{Error, Result},
};

pub use num_bigint::BigUint;
