//! CRL parsing and verification against generated fixtures.
//!
//! The CAs under `tests/data/` share one RSA key between `ca_rsa.der` and
//! `ca_rsa_nocrlsign.der` (same subject, different key usage), so the latter
//! verifies the CRL signature but fails the `cRLSign` check in isolation.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sigstream::crl::signed_range;
use sigstream::{
    build_crl_validity, get_revocation_info, BigUint, CertificateToken, Document,
};
use x509_cert::ext::pkix::CrlReason;

const CA_RSA: &[u8] = include_bytes!("data/ca_rsa.der");
const CA_RSA_NO_CRL_SIGN: &[u8] = include_bytes!("data/ca_rsa_nocrlsign.der");
const CA_EC: &[u8] = include_bytes!("data/ca_ec.der");
const CA_OTHER: &[u8] = include_bytes!("data/ca_other.der");
const CRL_RSA: &[u8] = include_bytes!("data/crl_rsa.der");
const CRL_EMPTY: &[u8] = include_bytes!("data/crl_empty.der");
const CRL_PSS: &[u8] = include_bytes!("data/crl_pss.der");
const CRL_EC: &[u8] = include_bytes!("data/crl_ec.der");

// 2020-01-01T00:00:00Z and 2020-02-01T00:00:00Z
const THIS_UPDATE: u64 = 1_577_836_800;
const NEXT_UPDATE: u64 = 1_580_515_200;

fn issuer(der: &[u8]) -> CertificateToken {
    CertificateToken::from_der(der).expect("issuer certificate decodes")
}

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

#[test]
fn genuine_rsa_crl_verifies() {
    let crl = Document::from_bytes(CRL_RSA.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_RSA)).unwrap();

    assert!(validity.is_signature_intact());
    assert!(validity.signature_invalidity_reason().is_none());
    assert!(validity.is_issuer_match());
    assert!(validity.has_crl_sign_key_usage());
    assert!(validity.is_valid());

    assert_eq!(validity.this_update().to_system_time(), at(THIS_UPDATE));
    assert_eq!(
        validity.next_update().map(|t| t.to_system_time()),
        Some(at(NEXT_UPDATE))
    );
    assert_eq!(validity.is_expired(at(NEXT_UPDATE + 1)), Some(true));
    assert_eq!(validity.is_expired(at(THIS_UPDATE + 1)), Some(false));
}

#[test]
fn tampered_signature_is_reported_not_thrown() {
    let mut bytes = CRL_RSA.to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let validity = build_crl_validity(&Document::from_bytes(bytes), &issuer(CA_RSA)).unwrap();
    assert!(!validity.is_signature_intact());
    let reason = validity.signature_invalidity_reason().unwrap();
    assert!(!reason.is_empty());
    // structural fields are still populated
    assert!(validity.is_issuer_match());
    assert_eq!(validity.this_update().to_system_time(), at(THIS_UPDATE));
}

#[test]
fn unrelated_issuer_fails_both_checks() {
    let crl = Document::from_bytes(CRL_RSA.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_OTHER)).unwrap();
    assert!(!validity.is_signature_intact());
    assert!(!validity.is_issuer_match());
    assert!(!validity.is_valid());
}

#[test]
fn missing_crl_sign_key_usage_does_not_break_the_signature() {
    let crl = Document::from_bytes(CRL_RSA.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_RSA_NO_CRL_SIGN)).unwrap();
    assert!(validity.is_signature_intact());
    assert!(validity.is_issuer_match());
    assert!(!validity.has_crl_sign_key_usage());
    assert!(!validity.is_valid());
}

#[test]
fn pss_signed_crl_verifies() {
    let crl = Document::from_bytes(CRL_PSS.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_RSA)).unwrap();
    assert!(validity.is_signature_intact(), "{:?}", validity.signature_invalidity_reason());
}

#[test]
fn ecdsa_signed_crl_verifies() {
    let crl = Document::from_bytes(CRL_EC.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_EC)).unwrap();
    assert!(validity.is_signature_intact(), "{:?}", validity.signature_invalidity_reason());
    assert!(validity.is_valid());
}

#[test]
fn revocation_lookup_finds_listed_serials() {
    let crl = Document::from_bytes(CRL_RSA.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_RSA)).unwrap();

    let entry = get_revocation_info(&validity, &BigUint::from(4097u32)).unwrap();
    assert_eq!(entry.serial_number, BigUint::from(4097u32));
    assert_eq!(entry.revocation_date.to_system_time(), at(1_578_182_400));
    assert_eq!(entry.reason_code(), Some(CrlReason::KeyCompromise));

    let entry = get_revocation_info(&validity, &BigUint::from(5000u32)).unwrap();
    assert_eq!(entry.reason_code(), None);

    // serial wider than any machine word
    let wide = (BigUint::from(1u8) << 72) + BigUint::from(11u8);
    let entry = get_revocation_info(&validity, &wide).unwrap();
    assert_eq!(entry.serial_number, wide);
    assert_eq!(entry.reason_code(), Some(CrlReason::CessationOfOperation));
}

#[test]
fn revocation_lookup_misses_unlisted_serial() {
    let crl = Document::from_bytes(CRL_RSA.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_RSA)).unwrap();
    assert!(get_revocation_info(&validity, &BigUint::from(4098u32)).is_none());
}

#[test]
fn empty_crl_yields_dates_and_no_entries() {
    let crl = Document::from_bytes(CRL_EMPTY.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_RSA)).unwrap();

    assert!(validity.is_signature_intact());
    assert_eq!(validity.this_update().to_system_time(), at(THIS_UPDATE));
    assert_eq!(
        validity.next_update().map(|t| t.to_system_time()),
        Some(at(NEXT_UPDATE))
    );
    for serial in [0u32, 1, 4097, u32::MAX] {
        assert!(get_revocation_info(&validity, &BigUint::from(serial)).is_none());
    }
}

#[test]
fn signed_range_extraction_is_idempotent() {
    let first = signed_range(CRL_RSA).unwrap();
    let second = signed_range(CRL_RSA).unwrap();
    assert_eq!(first, second);
    // range is the TBSCertList TLV: starts with a SEQUENCE tag and is a
    // strict prefix region of the document after the outer header
    assert_eq!(first[0], 0x30);
    assert!(first.len() < CRL_RSA.len());
}

#[test]
fn crl_number_extension_is_exposed() {
    let crl = Document::from_bytes(CRL_RSA.to_vec());
    let validity = build_crl_validity(&crl, &issuer(CA_RSA)).unwrap();
    assert_eq!(validity.metadata().crl_number(), Some(BigUint::from(7u32)));
}

#[test]
fn one_undecodable_extension_does_not_abort_metadata() {
    // corrupt the cRLNumber extension value: retag its OCTET STRING so the
    // extension no longer parses, without disturbing any lengths
    let oid = [0x06u8, 0x03, 0x55, 0x1d, 0x14];
    let mut bytes = CRL_EMPTY.to_vec();
    let pos = bytes
        .windows(oid.len())
        .position(|w| w == oid)
        .expect("cRLNumber extension present");
    assert_eq!(bytes[pos + oid.len()], 0x04);
    bytes[pos + oid.len()] = 0x0c;

    let validity =
        build_crl_validity(&Document::from_bytes(bytes), &issuer(CA_RSA)).unwrap();
    assert_eq!(validity.metadata().crl_number(), None);
    assert!(validity.metadata().critical_extensions.is_empty());
    assert!(validity.metadata().non_critical_extensions.is_empty());
    // everything else still came through
    assert_eq!(validity.this_update().to_system_time(), at(THIS_UPDATE));
    // the corrupted byte sits inside the signed range, so the signature no
    // longer verifies, as a reason rather than an error
    assert!(!validity.is_signature_intact());
}
