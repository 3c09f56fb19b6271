//! Linear-pass CRL traversal.
//!
//! Three independent entry points share the TLV primitives: signed-range
//! extraction for signature checks, metadata extraction that skips the
//! revoked-certificate list, and a point lookup that materializes at most
//! one revocation entry regardless of CRL size.

use std::io::{Read, Write};

use der::asn1::ObjectIdentifier;
use der::Decode;
use log::{debug, warn};
use num_bigint::BigUint;
use spki::AlgorithmIdentifierOwned;
use x509_cert::name::Name;
use x509_cert::time::Time;

use super::{CrlMetadata, ExtensionMap, RevocationEntry};
use crate::errors::{Error, Result};
use crate::tee::TeeReader;
use crate::tlv::{self, PeekReader};

/// Streams the byte range covered by the CRL signature into `sink`.
///
/// The outer `CertificateList` header is consumed without mirroring; the
/// complete TBSCertList TLV — header included, exactly as RFC 5280 defines
/// the signed range — is then mirrored byte-for-byte. No re-encoding takes
/// place, so the sink sees the original bytes even for BER oddities.
///
/// Returns the sink, which is typically a digest writer.
pub fn extract_signed_range<R: Read, W: Write>(reader: R, sink: W) -> Result<W> {
    let mut tee = TeeReader::new(reader, sink);

    let outer = tlv::read_header(&mut tee)?;
    if !outer.is_sequence() {
        return Err(Error::UnexpectedTag {
            expected: "CertificateList SEQUENCE",
            found: outer.tag,
        });
    }

    tee.set_mirroring(true);
    let tbs = tlv::read_header(&mut tee)?;
    if !tbs.is_sequence() {
        return Err(Error::UnexpectedTag {
            expected: "TBSCertList SEQUENCE",
            found: tbs.tag,
        });
    }
    tlv::skip_fully(&mut tee, tbs.length)?;
    tee.set_mirroring(false);

    let (_, sink) = tee.into_parts();
    Ok(sink)
}

/// Convenience wrapper collecting the signed range into memory.
pub fn signed_range<R: Read>(reader: R) -> Result<Vec<u8>> {
    extract_signed_range(reader, Vec::new())
}

/// Extracts CRL metadata, skipping the revoked-certificate list via its
/// declared length.
pub fn extract_metadata<R: Read>(reader: R) -> Result<CrlMetadata> {
    let mut reader = PeekReader::new(reader);

    expect_sequence(&mut reader, "CertificateList SEQUENCE")?;
    expect_sequence(&mut reader, "TBSCertList SEQUENCE")?;

    let mut header = tlv::read_header(&mut reader)?;

    // TBSCertList -> version (optional); encoded value 1 means v2
    let mut version = None;
    if header.tag & 0xc0 == 0 && header.number == tlv::INTEGER {
        let value = tlv::read_value(&mut reader, header.length)?;
        version = Some(be_u32(&value) + 1);
        debug!("TBSCertList -> version: {:?}", version);
        header = tlv::read_header(&mut reader)?;
    }

    // TBSCertList -> signature
    if !header.is_sequence() {
        return Err(Error::UnexpectedTag {
            expected: "TBSCertList.signature AlgorithmIdentifier",
            found: header.tag,
        });
    }
    let value = tlv::read_value(&mut reader, header.length)?;
    let signature_algorithm =
        AlgorithmIdentifierOwned::from_der(&tlv::rebuild_tlv(tlv::TAG_SEQUENCE, &value))?;
    debug!(
        "TBSCertList -> signature: {}",
        signature_algorithm.oid
    );
    header = tlv::read_header(&mut reader)?;

    // TBSCertList -> issuer
    if !header.is_sequence() {
        return Err(Error::UnexpectedTag {
            expected: "TBSCertList.issuer Name",
            found: header.tag,
        });
    }
    let value = tlv::read_value(&mut reader, header.length)?;
    let issuer_der = tlv::rebuild_tlv(tlv::TAG_SEQUENCE, &value);
    let issuer = Name::from_der(&issuer_der)?;
    header = tlv::read_header(&mut reader)?;

    // TBSCertList -> thisUpdate
    if !header.is_time() {
        return Err(Error::UnexpectedTag {
            expected: "TBSCertList.thisUpdate Time",
            found: header.tag,
        });
    }
    let value = tlv::read_value(&mut reader, header.length)?;
    let this_update = Time::from_der(&tlv::rebuild_tlv(header.tag, &value))?;
    header = tlv::read_header(&mut reader)?;

    // TBSCertList -> nextUpdate (optional)
    let mut next_update = None;
    if header.is_time() {
        let value = tlv::read_value(&mut reader, header.length)?;
        next_update = Some(Time::from_der(&tlv::rebuild_tlv(header.tag, &value))?);
        header = tlv::read_header(&mut reader)?;
    }

    // TBSCertList -> revokedCertificates (optional). Both this list and the
    // outer signatureAlgorithm are SEQUENCEs; one byte of lookahead
    // disambiguates (entries are SEQUENCEs, an AlgorithmIdentifier starts
    // with an OID).
    if header.is_sequence() {
        if header.length > 0 {
            if reader.peek()? == Some(tlv::TAG_SEQUENCE) {
                debug!(
                    "TBSCertList -> revokedCertificates: skipped (length={})",
                    header.length
                );
                tlv::skip_fully(&mut reader, header.length)?;
                header = tlv::read_header(&mut reader)?;
            }
        } else {
            debug!("TBSCertList -> revokedCertificates: empty sequence");
            header = tlv::read_header(&mut reader)?;
        }
    }

    // TBSCertList -> crlExtensions [0] EXPLICIT
    let mut critical_extensions = ExtensionMap::new();
    let mut non_critical_extensions = ExtensionMap::new();
    if tlv::is_context_specific(header.tag) {
        let value = tlv::read_value(&mut reader, header.length)?;
        let mut cursor = &value[..];
        match tlv::read_header_opt(&mut cursor) {
            Ok(Some(h)) if h.is_sequence() => {
                parse_extension_items(cursor, &mut critical_extensions, &mut non_critical_extensions)
            }
            _ => warn!("crlExtensions does not contain an Extensions SEQUENCE"),
        }
        header = tlv::read_header(&mut reader)?;
    }

    // CertificateList -> signatureAlgorithm
    if !header.is_sequence() {
        return Err(Error::UnexpectedTag {
            expected: "CertificateList.signatureAlgorithm AlgorithmIdentifier",
            found: header.tag,
        });
    }
    let value = tlv::read_value(&mut reader, header.length)?;
    let outer_algorithm =
        AlgorithmIdentifierOwned::from_der(&tlv::rebuild_tlv(tlv::TAG_SEQUENCE, &value))?;
    header = tlv::read_header(&mut reader)?;

    // CertificateList -> signatureValue
    if header.tag & 0xc0 != 0 || header.number != tlv::BIT_STRING {
        return Err(Error::UnexpectedTag {
            expected: "CertificateList.signatureValue BIT STRING",
            found: header.tag,
        });
    }
    let value = tlv::read_value(&mut reader, header.length)?;
    let signature_value = match value.split_first() {
        Some((&unused, bits)) => {
            if unused != 0 {
                warn!("signatureValue BIT STRING declares {} unused bits", unused);
            }
            bits.to_vec()
        }
        None => return Err(Error::Corrupt("empty signatureValue BIT STRING")),
    };

    Ok(CrlMetadata {
        version,
        signature_algorithm,
        issuer,
        issuer_der,
        this_update,
        next_update,
        outer_signature_algorithm_oid: outer_algorithm.oid,
        signature_value,
        critical_extensions,
        non_critical_extensions,
    })
}

/// Scans the revoked-certificate list for `serial`.
///
/// Every entry's serial number is compared *before* the entry is parsed;
/// non-matching entries are byte-skipped, so memory stays bounded by a
/// single entry however large the CRL is. Returns `None` when the list ends
/// (or is absent) without a match.
pub fn find_revocation_entry<R: Read>(
    reader: R,
    serial: &BigUint,
) -> Result<Option<RevocationEntry>> {
    let mut reader = PeekReader::new(reader);

    expect_sequence(&mut reader, "CertificateList SEQUENCE")?;
    expect_sequence(&mut reader, "TBSCertList SEQUENCE")?;

    // Skip everything up to and including thisUpdate.
    loop {
        let header = tlv::read_header(&mut reader)?;
        tlv::skip_fully(&mut reader, header.length)?;
        if header.is_time() {
            break;
        }
    }

    let mut header = match tlv::read_header_opt(&mut reader)? {
        Some(header) => header,
        None => return Ok(None),
    };

    // nextUpdate (optional)
    if header.is_time() {
        tlv::skip_fully(&mut reader, header.length)?;
        header = match tlv::read_header_opt(&mut reader)? {
            Some(header) => header,
            None => return Ok(None),
        };
    }

    // revokedCertificates, or the outer signatureAlgorithm when the list is
    // absent; only SEQUENCE-of-SEQUENCE qualifies.
    if !header.is_sequence() || header.length == 0 {
        return Ok(None);
    }
    if reader.peek()? != Some(tlv::TAG_SEQUENCE) {
        return Ok(None);
    }

    let mut region = (&mut reader).take(header.length as u64);
    while let Some(entry_header) = tlv::read_header_opt(&mut region)? {
        if !entry_header.is_sequence() {
            debug!(
                "revokedCertificates should only contain SEQUENCEs: tag {:#04x} ignored",
                entry_header.tag
            );
            tlv::skip_fully(&mut region, entry_header.length)?;
            continue;
        }

        let entry = tlv::read_value(&mut region, entry_header.length)?;
        let mut cursor = &entry[..];

        let serial_header = tlv::read_header(&mut cursor)?;
        if serial_header.tag & 0xc0 != 0 || serial_header.number != tlv::INTEGER {
            debug!("CRL entry without leading serial number ignored");
            continue;
        }
        let serial_bytes = tlv::read_value(&mut cursor, serial_header.length)?;
        if BigUint::from_bytes_be(&serial_bytes) != *serial {
            continue;
        }

        return parse_entry(BigUint::from_bytes_be(&serial_bytes), cursor).map(Some);
    }

    Ok(None)
}

fn parse_entry(serial_number: BigUint, mut cursor: &[u8]) -> Result<RevocationEntry> {
    let date_header = tlv::read_header(&mut cursor)?;
    if !date_header.is_time() {
        return Err(Error::UnexpectedTag {
            expected: "CRL entry revocationDate Time",
            found: date_header.tag,
        });
    }
    let value = tlv::read_value(&mut cursor, date_header.length)?;
    let revocation_date = Time::from_der(&tlv::rebuild_tlv(date_header.tag, &value))?;

    let mut critical_extensions = ExtensionMap::new();
    let mut non_critical_extensions = ExtensionMap::new();
    if let Some(ext_header) = tlv::read_header_opt(&mut cursor)? {
        if ext_header.is_sequence() {
            // crlEntryExtensions is a bare Extensions SEQUENCE
            parse_extension_items(
                cursor,
                &mut critical_extensions,
                &mut non_critical_extensions,
            );
        }
    }

    Ok(RevocationEntry {
        serial_number,
        revocation_date,
        critical_extensions,
        non_critical_extensions,
    })
}

/// Parses a run of `Extension` TLVs tolerantly: one malformed extension is
/// logged and skipped without aborting the others.
pub(crate) fn parse_extension_items(
    mut items: &[u8],
    critical: &mut ExtensionMap,
    non_critical: &mut ExtensionMap,
) {
    loop {
        let header = match tlv::read_header_opt(&mut items) {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(err) => {
                warn!("cannot read extension header: {}", err);
                break;
            }
        };
        let value = match tlv::read_value(&mut items, header.length) {
            Ok(value) => value,
            Err(err) => {
                warn!("cannot read extension content: {}", err);
                break;
            }
        };
        if !header.is_sequence() {
            warn!("extension with unexpected tag {:#04x} ignored", header.tag);
            continue;
        }
        if let Err(err) = parse_one_extension(&value, critical, non_critical) {
            warn!("cannot parse extension: {}", err);
        }
    }
}

/// `Extension ::= SEQUENCE { extnID, critical BOOLEAN DEFAULT FALSE,
/// extnValue OCTET STRING }` — a two-element sequence is non-critical.
fn parse_one_extension(
    mut cursor: &[u8],
    critical: &mut ExtensionMap,
    non_critical: &mut ExtensionMap,
) -> Result<()> {
    let oid_header = tlv::read_header(&mut cursor)?;
    if oid_header.tag & 0xc0 != 0 || oid_header.number != tlv::OBJECT_IDENTIFIER {
        return Err(Error::UnexpectedTag {
            expected: "extension OID",
            found: oid_header.tag,
        });
    }
    let oid_bytes = tlv::read_value(&mut cursor, oid_header.length)?;
    let oid = ObjectIdentifier::from_der(&tlv::rebuild_tlv(0x06, &oid_bytes))?;

    let mut header = tlv::read_header(&mut cursor)?;
    let mut is_critical = false;
    if header.tag & 0xc0 == 0 && header.number == tlv::BOOLEAN {
        let value = tlv::read_value(&mut cursor, header.length)?;
        is_critical = value.first().copied().unwrap_or(0) != 0;
        header = tlv::read_header(&mut cursor)?;
    }

    if header.tag & 0xc0 != 0 || header.number != tlv::OCTET_STRING {
        return Err(Error::UnexpectedTag {
            expected: "extension value OCTET STRING",
            found: header.tag,
        });
    }
    let content = tlv::read_value(&mut cursor, header.length)?;

    if is_critical {
        critical.insert(oid, content);
    } else {
        non_critical.insert(oid, content);
    }
    Ok(())
}

fn expect_sequence<R: Read>(reader: &mut R, expected: &'static str) -> Result<()> {
    let header = tlv::read_header(reader)?;
    if !header.is_sequence() {
        return Err(Error::UnexpectedTag {
            expected,
            found: header.tag,
        });
    }
    Ok(())
}

fn be_u32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_shl(8) | u32::from(b))
}
