//! Streaming CMS `SignedData` writer.
//!
//! Every bounded field is pre-encoded with [`der`] and the definite lengths
//! of the enclosing constructions are computed arithmetically, so the
//! encapsulated content can be streamed straight from its [`Document`] into
//! the output without ever being buffered.
//!
//! Known limitation: streaming generation cannot guarantee DER for the
//! outer structure (SET element order follows the model, not canonical
//! sorting). Callers that need strict DER, e.g. for embedding in a
//! timestamp token, must re-encode the produced bytes as a separate step.

use std::io::{Read, Write};

use const_oid::db::rfc5911::{ID_DATA, ID_SIGNED_DATA};
use der::Encode;
use log::warn;

use super::{Cms, ID_PKIX_OCSP_BASIC, ID_RI_OCSP_RESPONSE};
use crate::document::{Document, ResourcesHandlerBuilder};
use crate::errors::{Error, Result};
use crate::tlv;

/// Serializes `model` as a CMS `ContentInfo`, streaming the signed content
/// into a handler obtained from `handler_builder`.
pub fn write_cms(model: &Cms, handler_builder: &dyn ResourcesHandlerBuilder) -> Result<Document> {
    let content = match (&model.signed_content, model.detached) {
        (Some(content), false) => Some(content),
        (None, true) => None,
        (Some(content), true) => {
            warn!("model marked detached but carries content; writing it attached");
            Some(content)
        }
        (None, false) => {
            warn!("model marked attached but has no content; writing a detached structure");
            None
        }
    };

    // bounded fields, pre-encoded
    let version = u64::from(model.version).to_der()?;

    let mut digest_set = Vec::new();
    for id in &model.digest_algorithm_ids {
        digest_set.extend_from_slice(&id.to_der()?);
    }

    let econtent_type = model.signed_content_type.unwrap_or(ID_DATA).to_der()?;
    let content_len = match content {
        Some(content) => Some(usize::try_from(content.len()?).map_err(|_| {
            Error::Corrupt("signed content too large for this platform")
        })?),
        None => None,
    };
    let encap_len = econtent_type.len()
        + content_len.map_or(0, |len| tlv::encoded_len(tlv::encoded_len(len)));

    let mut certificates = Vec::new();
    for certificate in &model.certificates {
        certificates.extend_from_slice(&certificate.to_der()?);
    }
    for attribute_certificate in &model.attribute_certificates {
        // v2AttrCert is IMPLICIT [2]: the stored SEQUENCE tag is replaced
        let mut retagged = attribute_certificate.clone();
        match retagged.first_mut() {
            Some(tag) if *tag == tlv::TAG_SEQUENCE => *tag = 0xa2,
            _ => return Err(Error::Corrupt("attribute certificate is not a SEQUENCE")),
        }
        certificates.extend_from_slice(&retagged);
    }

    let mut revocation_infos = Vec::new();
    for crl in &model.crls {
        revocation_infos.extend_from_slice(&crl.to_der()?);
    }
    for (format, infos) in [
        (ID_RI_OCSP_RESPONSE, &model.ocsp_responses),
        (ID_PKIX_OCSP_BASIC, &model.ocsp_basic_responses),
    ] {
        let format_der = format.to_der()?;
        for info in infos {
            // other [1] OtherRevocationInfoFormat { format OID, info ANY }
            write_header(&mut revocation_infos, 0xa1, format_der.len() + info.len())?;
            revocation_infos.extend_from_slice(&format_der);
            revocation_infos.extend_from_slice(info);
        }
    }

    let mut signer_infos = Vec::new();
    for signer_info in &model.signer_infos {
        signer_infos.extend_from_slice(&signer_info.to_der()?);
    }

    let mut signed_data_len = version.len()
        + tlv::encoded_len(digest_set.len())
        + tlv::encoded_len(encap_len)
        + tlv::encoded_len(signer_infos.len());
    if !certificates.is_empty() {
        signed_data_len += tlv::encoded_len(certificates.len());
    }
    if !revocation_infos.is_empty() {
        signed_data_len += tlv::encoded_len(revocation_infos.len());
    }

    let content_type = ID_SIGNED_DATA.to_der()?;
    let explicit_len = tlv::encoded_len(signed_data_len);
    let content_info_len = content_type.len() + tlv::encoded_len(explicit_len);

    let mut handler = handler_builder.create_handler()?;
    let out = handler.as_mut();

    write_header(out, tlv::TAG_SEQUENCE, content_info_len)?;
    out.write_all(&content_type)?;
    write_header(out, 0xa0, explicit_len)?;
    write_header(out, tlv::TAG_SEQUENCE, signed_data_len)?;

    out.write_all(&version)?;
    write_header(out, tlv::TAG_SET, digest_set.len())?;
    out.write_all(&digest_set)?;

    write_header(out, tlv::TAG_SEQUENCE, encap_len)?;
    out.write_all(&econtent_type)?;
    if let (Some(content), Some(len)) = (content, content_len) {
        write_header(out, 0xa0, tlv::encoded_len(len))?;
        write_header(out, tlv::OCTET_STRING as u8, len)?;
        stream_content(content, len, out)?;
    }

    if !certificates.is_empty() {
        write_header(out, 0xa0, certificates.len())?;
        out.write_all(&certificates)?;
    }
    if !revocation_infos.is_empty() {
        write_header(out, 0xa1, revocation_infos.len())?;
        out.write_all(&revocation_infos)?;
    }

    write_header(out, tlv::TAG_SET, signer_infos.len())?;
    out.write_all(&signer_infos)?;
    out.flush()?;

    handler.into_document()
}

fn write_header<W: Write + ?Sized>(out: &mut W, tag: u8, length: usize) -> Result<()> {
    out.write_all(&[tag])?;
    tlv::write_length(out, length)
}

/// Copies exactly `len` bytes of content in chunks; the document changing
/// size between the length pass and the copy pass is an error, since the
/// headers already committed to a length.
fn stream_content<W: Write + ?Sized>(content: &Document, len: usize, out: &mut W) -> Result<()> {
    let mut reader = content.open()?;
    let mut buf = [0u8; 4096];
    let mut copied = 0usize;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        copied += n;
        if copied > len {
            return Err(Error::Corrupt("signed content grew while being written"));
        }
        out.write_all(&buf[..n])?;
    }
    if copied != len {
        return Err(Error::Corrupt("signed content shrank while being written"));
    }
    Ok(())
}
