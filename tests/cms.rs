//! CMS parsing, digest computation and round-trip generation against
//! generated fixtures.
//!
//! `cms_attached.der` carries the content with two signers (RSA/SHA-256 and
//! ECDSA/SHA-512); `cms_detached.der` omits the content, which lives in
//! `cms_content.bin`.

use const_oid::db::rfc5912::{ID_SHA_256, ID_SHA_512};
use digest::Digest;
use sigstream::{
    parse_cms, write_cms, CmsStreamParser, Document, InMemoryResourcesHandlerBuilder,
    TempFileResourcesHandlerBuilder,
};

const CMS_ATTACHED: &[u8] = include_bytes!("data/cms_attached.der");
const CMS_DETACHED: &[u8] = include_bytes!("data/cms_detached.der");
const CONTENT: &[u8] = include_bytes!("data/cms_content.bin");

#[test]
fn attached_document_digests_every_declared_algorithm() {
    let cms = parse_cms(&Document::from_bytes(CMS_ATTACHED.to_vec())).unwrap();

    assert_eq!(cms.version, 1);
    assert!(!cms.detached);
    assert_eq!(cms.digest_algorithm_ids.len(), 2);
    assert_eq!(cms.signer_infos.len(), 2);
    assert_eq!(cms.certificates.len(), 2);

    assert_eq!(
        cms.signed_content.as_ref().unwrap().to_vec().unwrap(),
        CONTENT
    );
    assert_eq!(cms.content_digests.len(), 2);
    assert_eq!(
        cms.content_digests[&ID_SHA_256],
        sha2::Sha256::digest(CONTENT).to_vec()
    );
    assert_eq!(
        cms.content_digests[&ID_SHA_512],
        sha2::Sha512::digest(CONTENT).to_vec()
    );
}

#[test]
fn detached_document_has_no_content_and_no_digests() {
    let cms = parse_cms(&Document::from_bytes(CMS_DETACHED.to_vec())).unwrap();

    assert!(cms.detached);
    assert!(cms.signed_content.is_none());
    assert!(cms.content_digests.is_empty());
    assert_eq!(cms.signer_infos.len(), 1);
}

#[test]
fn detached_document_with_supplied_content_is_digested() {
    let cms = CmsStreamParser::new(InMemoryResourcesHandlerBuilder)
        .with_detached_content(Document::from_bytes(CONTENT.to_vec()))
        .parse(&Document::from_bytes(CMS_DETACHED.to_vec()))
        .unwrap();

    assert!(cms.detached);
    assert_eq!(
        cms.content_digests[&ID_SHA_256],
        sha2::Sha256::digest(CONTENT).to_vec()
    );
}

#[test]
fn parse_into_temp_file_handler_matches_memory_parse() {
    let document = Document::from_bytes(CMS_ATTACHED.to_vec());
    let in_file = CmsStreamParser::new(TempFileResourcesHandlerBuilder)
        .parse(&document)
        .unwrap();
    assert_eq!(
        in_file.signed_content.as_ref().unwrap().to_vec().unwrap(),
        CONTENT
    );
}

#[test]
fn rebuild_roundtrip_preserves_the_model() {
    let original = parse_cms(&Document::from_bytes(CMS_ATTACHED.to_vec())).unwrap();
    let written = write_cms(&original, &InMemoryResourcesHandlerBuilder).unwrap();
    let reparsed = parse_cms(&written).unwrap();

    assert_eq!(reparsed.version, original.version);
    assert_eq!(reparsed.detached, original.detached);
    assert_eq!(
        reparsed.digest_algorithm_ids.len(),
        original.digest_algorithm_ids.len()
    );
    assert_eq!(reparsed.signer_infos.len(), original.signer_infos.len());
    assert_eq!(reparsed.certificates.len(), original.certificates.len());
    assert_eq!(
        reparsed.signed_content.as_ref().unwrap().to_vec().unwrap(),
        CONTENT
    );
    assert_eq!(reparsed.content_digests, original.content_digests);
}

#[test]
fn detached_rebuild_roundtrip() {
    let original = parse_cms(&Document::from_bytes(CMS_DETACHED.to_vec())).unwrap();
    let written = write_cms(&original, &InMemoryResourcesHandlerBuilder).unwrap();
    let reparsed = parse_cms(&written).unwrap();

    assert!(reparsed.detached);
    assert!(reparsed.signed_content.is_none());
    assert_eq!(reparsed.signer_infos.len(), original.signer_infos.len());
}

#[test]
fn truncated_document_is_a_parse_error() {
    assert!(parse_cms(&Document::from_bytes(CMS_ATTACHED[..60].to_vec())).is_err());
}
