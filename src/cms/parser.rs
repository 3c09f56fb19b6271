//! Single-pass CMS `SignedData` reader.

use std::io::{self, Read, Write};

use cms::signed_data::SignerInfo;
use const_oid::db::rfc5911::ID_SIGNED_DATA;
use der::asn1::ObjectIdentifier;
use der::Decode;
use log::warn;
use spki::AlgorithmIdentifierOwned;
use x509_cert::crl::CertificateList;
use x509_cert::Certificate;

use super::{Cms, ID_PKIX_OCSP_BASIC, ID_RI_OCSP_RESPONSE};
use crate::algorithms::MultiDigester;
use crate::document::{Document, InMemoryResourcesHandlerBuilder, ResourcesHandlerBuilder};
use crate::errors::{Error, Result};
use crate::tlv;

/// Parses a CMS document into a [`Cms`], capturing the encapsulated content
/// in memory.
pub fn parse_cms(document: &Document) -> Result<Cms> {
    CmsStreamParser::new(InMemoryResourcesHandlerBuilder).parse(document)
}

/// Streaming `SignedData` parser.
///
/// The encapsulated content streams through every digest named in
/// `digestAlgorithms` and into a fresh [`ResourcesHandler`] in one pass;
/// which digest the signer actually used is only known once the signer infos
/// are read, after the content has already gone by, so all candidates are
/// hashed together. Everything else in the structure is bounded metadata and
/// is captured then decoded with [`der`].
///
/// [`ResourcesHandler`]: crate::document::ResourcesHandler
pub struct CmsStreamParser<B> {
    handler_builder: B,
    detached_content: Option<Document>,
}

impl<B: ResourcesHandlerBuilder> CmsStreamParser<B> {
    /// Creates a parser whose captured content lands in handlers made by
    /// `handler_builder`.
    pub fn new(handler_builder: B) -> Self {
        CmsStreamParser {
            handler_builder,
            detached_content: None,
        }
    }

    /// Supplies the out-of-band content of a detached signature, so its
    /// digests can be computed during the parse.
    pub fn with_detached_content(mut self, content: Document) -> Self {
        self.detached_content = Some(content);
        self
    }

    /// Parses `document`.
    pub fn parse(&self, document: &Document) -> Result<Cms> {
        let mut reader = document.open()?;
        self.parse_stream(&mut *reader)
    }

    fn parse_stream(&self, reader: &mut dyn Read) -> Result<Cms> {
        // ContentInfo
        expect_sequence(reader, "ContentInfo SEQUENCE")?;
        let content_type = read_oid(reader)?;
        if content_type != ID_SIGNED_DATA {
            return Err(Error::Corrupt("contentType is not id-signedData"));
        }
        let wrapper = tlv::read_header(reader)?;
        if wrapper.tag != 0xa0 {
            return Err(Error::UnexpectedTag {
                expected: "ContentInfo.content [0]",
                found: wrapper.tag,
            });
        }
        expect_sequence(reader, "SignedData SEQUENCE")?;

        let mut cms = Cms::default();

        // version
        let header = tlv::read_header(reader)?;
        if header.tag & 0xc0 != 0 || header.number != tlv::INTEGER {
            return Err(Error::UnexpectedTag {
                expected: "SignedData.version INTEGER",
                found: header.tag,
            });
        }
        let value = tlv::read_value(reader, header.length)?;
        cms.version = be_u32(&value);

        // digestAlgorithms
        let header = tlv::read_header(reader)?;
        if header.tag != tlv::TAG_SET {
            return Err(Error::UnexpectedTag {
                expected: "SignedData.digestAlgorithms SET",
                found: header.tag,
            });
        }
        let value = tlv::read_value(reader, header.length)?;
        let mut cursor = &value[..];
        while let Some(h) = tlv::read_header_opt(&mut cursor)? {
            if !h.is_sequence() {
                return Err(Error::UnexpectedTag {
                    expected: "AlgorithmIdentifier SEQUENCE",
                    found: h.tag,
                });
            }
            let v = tlv::read_value(&mut cursor, h.length)?;
            let id =
                AlgorithmIdentifierOwned::from_der(&tlv::rebuild_tlv(tlv::TAG_SEQUENCE, &v))?;
            cms.add_digest_algorithm(id)?;
        }
        let mut digester = MultiDigester::for_algorithms(&cms.digest_algorithm_ids);

        // encapContentInfo
        let encap_header = tlv::read_header(reader)?;
        if !encap_header.is_sequence() {
            return Err(Error::UnexpectedTag {
                expected: "EncapsulatedContentInfo SEQUENCE",
                found: encap_header.tag,
            });
        }
        let mut encap = (&mut *reader).take(encap_header.length as u64);
        cms.signed_content_type = Some(read_oid(&mut encap)?);

        match tlv::read_header_opt(&mut encap)? {
            None => {
                cms.detached = true;
                if let Some(content) = &self.detached_content {
                    let mut stream = content.open()?;
                    io::copy(&mut stream, &mut digester)?;
                    cms.content_digests = digester.finish();
                }
                // no detached content supplied: nothing to hash, the map
                // stays empty
            }
            Some(h) if h.tag == 0xa0 => {
                if self.detached_content.is_some() {
                    warn!("eContent is present; supplied detached content ignored");
                }
                if digester.is_empty() {
                    warn!("no usable digest algorithm declared; content captured unhashed");
                }
                let mut handler = self.handler_builder.create_handler()?;
                let mut region = (&mut encap).take(h.length as u64);
                stream_octet_string(&mut region, &mut digester, handler.as_mut())?;
                handler.flush()?;
                cms.signed_content = Some(handler.into_document()?);
                cms.content_digests = digester.finish();
            }
            Some(h) => {
                return Err(Error::UnexpectedTag {
                    expected: "eContent [0]",
                    found: h.tag,
                });
            }
        }

        // certificates [0], crls [1], signerInfos
        while let Some(header) = tlv::read_header_opt(reader)? {
            match header.tag {
                0xa0 => {
                    let value = tlv::read_value(reader, header.length)?;
                    parse_certificates(&value, &mut cms)?;
                }
                0xa1 => {
                    let value = tlv::read_value(reader, header.length)?;
                    parse_revocation_infos(&value, &mut cms)?;
                }
                tlv::TAG_SET => {
                    let value = tlv::read_value(reader, header.length)?;
                    let mut cursor = &value[..];
                    while let Some(h) = tlv::read_header_opt(&mut cursor)? {
                        if !h.is_sequence() {
                            return Err(Error::UnexpectedTag {
                                expected: "SignerInfo SEQUENCE",
                                found: h.tag,
                            });
                        }
                        let v = tlv::read_value(&mut cursor, h.length)?;
                        cms.signer_infos
                            .push(SignerInfo::from_der(&tlv::rebuild_tlv(tlv::TAG_SEQUENCE, &v))?);
                    }
                }
                other => {
                    warn!("unexpected SignedData element with tag {:#04x} skipped", other);
                    tlv::skip_fully(reader, header.length)?;
                }
            }
        }

        Ok(cms)
    }
}

/// `CertificateSet` contents: plain certificates (SEQUENCE) and `v2AttrCert`
/// ([2] IMPLICIT) are kept, other choices are logged and skipped.
fn parse_certificates(value: &[u8], cms: &mut Cms) -> Result<()> {
    let mut cursor = value;
    while let Some(header) = tlv::read_header_opt(&mut cursor)? {
        let v = tlv::read_value(&mut cursor, header.length)?;
        match header.tag {
            tlv::TAG_SEQUENCE => {
                cms.certificates
                    .push(Certificate::from_der(&tlv::rebuild_tlv(tlv::TAG_SEQUENCE, &v))?);
            }
            0xa2 => {
                // IMPLICIT tagging replaced the AttributeCertificate
                // SEQUENCE tag; restore it so the bytes stand alone
                cms.attribute_certificates
                    .push(tlv::rebuild_tlv(tlv::TAG_SEQUENCE, &v));
            }
            other => warn!("certificate choice with tag {:#04x} skipped", other),
        }
    }
    Ok(())
}

/// `RevocationInfoChoices` contents: CRLs, plus `other` ([1]) entries whose
/// format OID marks them as OCSP material.
fn parse_revocation_infos(value: &[u8], cms: &mut Cms) -> Result<()> {
    let mut cursor = value;
    while let Some(header) = tlv::read_header_opt(&mut cursor)? {
        let v = tlv::read_value(&mut cursor, header.length)?;
        match header.tag {
            tlv::TAG_SEQUENCE => {
                cms.crls
                    .push(CertificateList::from_der(&tlv::rebuild_tlv(tlv::TAG_SEQUENCE, &v))?);
            }
            0xa1 => {
                let mut inner = &v[..];
                let format = read_oid(&mut inner)?;
                let info_header = tlv::read_header(&mut inner)?;
                let info = tlv::read_value(&mut inner, info_header.length)?;
                let raw = tlv::rebuild_tlv(info_header.tag, &info);
                match format {
                    ID_RI_OCSP_RESPONSE => cms.ocsp_responses.push(raw),
                    ID_PKIX_OCSP_BASIC => cms.ocsp_basic_responses.push(raw),
                    other => warn!("revocation info format {} skipped", other),
                }
            }
            other => warn!("revocation info choice with tag {:#04x} skipped", other),
        }
    }
    Ok(())
}

/// Streams the chunks of a primitive or constructed OCTET STRING into the
/// digester and the capture sink.
fn stream_octet_string<W: Write + ?Sized>(
    reader: &mut dyn Read,
    digester: &mut MultiDigester,
    out: &mut W,
) -> Result<()> {
    while let Some(header) = tlv::read_header_opt(reader)? {
        if header.tag & 0xc0 != 0 || header.number != tlv::OCTET_STRING {
            return Err(Error::UnexpectedTag {
                expected: "eContent OCTET STRING",
                found: header.tag,
            });
        }
        if header.tag & tlv::CONSTRUCTED != 0 {
            let mut region = (&mut *reader).take(header.length as u64);
            stream_octet_string(&mut region, digester, out)?;
        } else {
            copy_chunk(reader, header.length, digester, out)?;
        }
    }
    Ok(())
}

fn copy_chunk<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    mut remaining: usize,
    digester: &mut MultiDigester,
    out: &mut W,
) -> Result<()> {
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            return Err(Error::Eof);
        }
        digester.update(&buf[..n]);
        out.write_all(&buf[..n])?;
        remaining -= n;
    }
    Ok(())
}

fn read_oid<R: Read + ?Sized>(reader: &mut R) -> Result<ObjectIdentifier> {
    let header = tlv::read_header(reader)?;
    if header.tag & 0xc0 != 0 || header.number != tlv::OBJECT_IDENTIFIER {
        return Err(Error::UnexpectedTag {
            expected: "OBJECT IDENTIFIER",
            found: header.tag,
        });
    }
    let value = tlv::read_value(reader, header.length)?;
    Ok(ObjectIdentifier::from_der(&tlv::rebuild_tlv(0x06, &value))?)
}

fn expect_sequence<R: Read + ?Sized>(reader: &mut R, expected: &'static str) -> Result<()> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use cms::content_info::{CmsVersion, ContentInfo};
    use cms::signed_data::{EncapsulatedContentInfo, SignedData, SignerInfos};
    use const_oid::db::rfc5911::ID_DATA;
    use const_oid::db::rfc5912::{ID_SHA_256, ID_SHA_512};
    use der::{Any, Encode, Tag};
    use digest::Digest;
    use spki::AlgorithmIdentifierOwned;

    fn digest_ids(oids: &[ObjectIdentifier]) -> Vec<AlgorithmIdentifierOwned> {
        oids.iter()
            .map(|&oid| AlgorithmIdentifierOwned {
                oid,
                parameters: None,
            })
            .collect()
    }

    fn sample_signed_data(content: Option<&[u8]>, oids: &[ObjectIdentifier]) -> Vec<u8> {
        let econtent = content.map(|bytes| Any::new(Tag::OctetString, bytes).unwrap());
        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: digest_ids(oids).try_into().unwrap(),
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_DATA,
                econtent,
            },
            certificates: None,
            crls: None,
            signer_infos: SignerInfos(Default::default()),
        };
        let content_info = ContentInfo {
            content_type: ID_SIGNED_DATA,
            content: Any::encode_from(&signed_data).unwrap(),
        };
        content_info.to_der().unwrap()
    }

    #[test]
    fn attached_content_hashes_every_candidate() {
        let payload = b"streaming signed payload";
        let der = sample_signed_data(Some(payload), &[ID_SHA_256, ID_SHA_512]);
        let cms = parse_cms(&Document::from_bytes(der)).unwrap();

        assert_eq!(cms.version, 1);
        assert!(!cms.detached);
        assert_eq!(cms.signed_content_type, Some(ID_DATA));
        assert_eq!(cms.digest_algorithm_ids.len(), 2);
        assert_eq!(
            cms.signed_content.as_ref().unwrap().to_vec().unwrap(),
            payload
        );
        assert_eq!(cms.content_digests.len(), 2);
        assert_eq!(
            cms.content_digests[&ID_SHA_256],
            sha2::Sha256::digest(payload).to_vec()
        );
        assert_eq!(
            cms.content_digests[&ID_SHA_512],
            sha2::Sha512::digest(payload).to_vec()
        );
    }

    #[test]
    fn absent_econtent_means_detached_and_no_digests() {
        let der = sample_signed_data(None, &[ID_SHA_256]);
        let cms = parse_cms(&Document::from_bytes(der)).unwrap();

        assert!(cms.detached);
        assert!(cms.signed_content.is_none());
        assert!(cms.content_digests.is_empty());
    }

    #[test]
    fn detached_content_supplied_out_of_band_is_digested() {
        let payload = b"the content travels separately";
        let der = sample_signed_data(None, &[ID_SHA_256]);
        let cms = CmsStreamParser::new(InMemoryResourcesHandlerBuilder)
            .with_detached_content(Document::from_bytes(payload.to_vec()))
            .parse(&Document::from_bytes(der))
            .unwrap();

        assert!(cms.detached);
        assert!(cms.signed_content.is_none());
        assert_eq!(
            cms.content_digests[&ID_SHA_256],
            sha2::Sha256::digest(payload).to_vec()
        );
    }

    #[test]
    fn empty_digest_algorithm_set_still_captures_content() {
        let payload = b"nothing to hash with";
        let der = sample_signed_data(Some(payload), &[]);
        let cms = parse_cms(&Document::from_bytes(der)).unwrap();

        assert!(cms.content_digests.is_empty());
        assert_eq!(
            cms.signed_content.as_ref().unwrap().to_vec().unwrap(),
            payload
        );
    }

    #[test]
    fn wrong_content_type_is_rejected() {
        let mut signed = sample_signed_data(Some(b"x"), &[ID_SHA_256]);
        // splice the contentType OID into id-data
        let target = ID_SIGNED_DATA.to_der().unwrap();
        let replacement = ID_DATA.to_der().unwrap();
        let pos = signed
            .windows(target.len())
            .position(|w| w == target)
            .unwrap();
        signed.splice(pos..pos + target.len(), replacement);
        // splicing shifts lengths, so only assert the early rejection
        assert!(parse_cms(&Document::from_bytes(signed)).is_err());
    }
}
