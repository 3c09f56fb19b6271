//! BER/DER tag-length-value primitives over [`std::io`] streams.
//!
//! These are the hand-rolled codec routines used on the performance-critical
//! traversal paths; bounded substructures are re-decoded with the [`der`]
//! crate once their exact byte range is known. Only definite-length
//! encodings are supported (see [`Error::IndefiniteLength`]).
//!
//! Tag and length forms follow [X.690 § 8.1].
//!
//! [X.690 § 8.1]: https://www.itu.int/rec/T-REC-X.690

use std::io::{Read, Write};

use log::warn;

use crate::errors::{Error, Result};

/// Universal tag number of BOOLEAN.
pub const BOOLEAN: u32 = 0x01;
/// Universal tag number of INTEGER.
pub const INTEGER: u32 = 0x02;
/// Universal tag number of BIT STRING.
pub const BIT_STRING: u32 = 0x03;
/// Universal tag number of OCTET STRING.
pub const OCTET_STRING: u32 = 0x04;
/// Universal tag number of OBJECT IDENTIFIER.
pub const OBJECT_IDENTIFIER: u32 = 0x06;
/// Universal tag number of ENUMERATED.
pub const ENUMERATED: u32 = 0x0a;
/// Universal tag number of SEQUENCE.
pub const SEQUENCE: u32 = 0x10;
/// Universal tag number of SET.
pub const SET: u32 = 0x11;
/// Universal tag number of UTCTime.
pub const UTC_TIME: u32 = 0x17;
/// Universal tag number of GeneralizedTime.
pub const GENERALIZED_TIME: u32 = 0x18;

/// Constructed-encoding bit of a tag octet.
pub const CONSTRUCTED: u8 = 0x20;

/// Tag octet of a constructed SEQUENCE.
pub const TAG_SEQUENCE: u8 = 0x30;
/// Tag octet of a constructed SET.
pub const TAG_SET: u8 = 0x31;

/// Returns `true` for a context-specific tag octet (`[n]` in ASN.1 syntax).
pub fn is_context_specific(tag: u8) -> bool {
    tag & 0xc0 == 0x80
}

/// Reads a single octet, mapping clean end-of-stream to `None`.
fn read_byte<R: Read + ?Sized>(reader: &mut R) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Reads the next tag octet.
pub fn read_tag<R: Read + ?Sized>(reader: &mut R) -> Result<u8> {
    read_tag_opt(reader)?.ok_or(Error::Eof)
}

/// Reads the next tag octet, returning `None` on a clean end of stream.
pub fn read_tag_opt<R: Read + ?Sized>(reader: &mut R) -> Result<Option<u8>> {
    read_byte(reader)
}

/// Reads the tag number for `tag`, consuming high-tag-number octets when the
/// five low bits are all set ([X.690 § 8.1.2.4]).
///
/// An all-zero first subsequent octet is rejected as corrupt: it would be a
/// non-minimal encoding of a low tag number.
///
/// [X.690 § 8.1.2.4]: https://www.itu.int/rec/T-REC-X.690
pub fn read_tag_number<R: Read + ?Sized>(reader: &mut R, tag: u8) -> Result<u32> {
    let mut tag_no = u32::from(tag & 0x1f);

    if tag_no == 0x1f {
        tag_no = 0;
        let mut b = read_byte(reader)?.ok_or(Error::Eof)?;
        if b & 0x7f == 0 {
            return Err(Error::Corrupt("invalid high tag number found"));
        }
        while b & 0x80 != 0 {
            tag_no |= u32::from(b & 0x7f);
            tag_no = tag_no
                .checked_shl(7)
                .ok_or(Error::Corrupt("tag number overflow"))?;
            b = read_byte(reader)?.ok_or(Error::Eof)?;
        }
        tag_no |= u32::from(b & 0x7f);
    }

    Ok(tag_no)
}

/// Reads a definite length (short or long form, [X.690 § 8.1.3]).
///
/// The indefinite form (`0x80`) yields [`Error::IndefiniteLength`].
///
/// [X.690 § 8.1.3]: https://www.itu.int/rec/T-REC-X.690
pub fn read_length<R: Read + ?Sized>(reader: &mut R) -> Result<usize> {
    let first = read_byte(reader)?.ok_or(Error::Eof)?;

    if first == 0x80 {
        return Err(Error::IndefiniteLength);
    }
    if first < 0x80 {
        return Ok(usize::from(first));
    }

    let count = usize::from(first & 0x7f);
    if count > core::mem::size_of::<usize>() {
        return Err(Error::Corrupt("length out of range"));
    }
    let mut length = 0usize;
    for _ in 0..count {
        let b = read_byte(reader)?.ok_or(Error::Eof)?;
        length = (length << 8) | usize::from(b);
    }
    Ok(length)
}

/// Writes `length` in the shortest definite form.
pub fn write_length<W: Write + ?Sized>(writer: &mut W, length: usize) -> Result<()> {
    if length < 0x80 {
        writer.write_all(&[length as u8])?;
        return Ok(());
    }
    let count = (usize::BITS / 8 - length.leading_zeros() / 8) as usize;
    writer.write_all(&[0x80 | count as u8])?;
    for i in (0..count).rev() {
        writer.write_all(&[(length >> (8 * i)) as u8])?;
    }
    Ok(())
}

/// Number of octets [`write_length`] emits for `length`.
pub fn length_of_length(length: usize) -> usize {
    if length < 0x80 {
        1
    } else {
        1 + (usize::BITS / 8 - length.leading_zeros() / 8) as usize
    }
}

/// Total encoded size of a TLV with a single-octet tag and `value_len` bytes
/// of content.
pub fn encoded_len(value_len: usize) -> usize {
    1 + length_of_length(value_len) + value_len
}

/// A parsed tag-length header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Raw tag octet.
    pub tag: u8,
    /// Decoded tag number.
    pub number: u32,
    /// Declared content length.
    pub length: usize,
}

impl Header {
    /// Returns `true` when the tag is a constructed universal SEQUENCE.
    pub fn is_sequence(&self) -> bool {
        self.tag & 0xc0 == 0 && self.number == SEQUENCE
    }

    /// Returns `true` for UTCTime or GeneralizedTime, the two `Time` CHOICE
    /// alternatives of RFC 5280.
    pub fn is_time(&self) -> bool {
        self.tag & 0xc0 == 0 && (self.number == UTC_TIME || self.number == GENERALIZED_TIME)
    }
}

/// Reads the next tag-length header.
pub fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<Header> {
    read_header_opt(reader)?.ok_or(Error::Eof)
}

/// Reads the next tag-length header, returning `None` on a clean end of
/// stream before the tag octet.
pub fn read_header_opt<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Header>> {
    let tag = match read_tag_opt(reader)? {
        Some(tag) => tag,
        None => return Ok(None),
    };
    let number = read_tag_number(reader, tag)?;
    let length = read_length(reader)?;
    Ok(Some(Header {
        tag,
        number,
        length,
    }))
}

/// Reads exactly `length` bytes of content, best effort.
///
/// A short read is logged and the truncated content returned; callers for
/// which the element is mandatory fail on the follow-up parse instead.
pub fn read_value<R: Read + ?Sized>(reader: &mut R, length: usize) -> Result<Vec<u8>> {
    let mut value = vec![0u8; length];
    let mut filled = 0;
    while filled < length {
        match reader.read(&mut value[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled != length {
        warn!(
            "cannot read expected length (wanted {} bytes, got {})",
            length, filled
        );
        value.truncate(filled);
    }
    Ok(value)
}

/// Consumes `length` bytes by reading through the stream, best effort.
///
/// Reads rather than seeks so that wrapping streams (e.g. a mirroring
/// [`TeeReader`](crate::tee::TeeReader)) observe every byte. A premature end
/// of stream is logged, mirroring [`read_value`].
pub fn skip_fully<R: Read + ?Sized>(reader: &mut R, length: usize) -> Result<()> {
    let mut scratch = [0u8; 4096];
    let mut remaining = length;
    while remaining > 0 {
        let chunk = remaining.min(scratch.len());
        match reader.read(&mut scratch[..chunk]) {
            Ok(0) => {
                warn!(
                    "cannot skip expected length ({} of {} bytes missing)",
                    remaining, length
                );
                break;
            }
            Ok(n) => remaining -= n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Rebuilds a full TLV encoding from a tag octet and raw content bytes.
///
/// Used to hand captured byte ranges to the structured [`der`] decoders.
pub fn rebuild_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value.len()));
    out.push(tag);
    // infallible: Vec<u8> as Write
    let _ = write_length(&mut out, value.len());
    out.extend_from_slice(value);
    out
}

/// One-byte lookahead reader.
///
/// Replaces the `mark()`/`reset()` peeking of buffered Java streams: the CRL
/// grammar only ever needs the next tag octet to disambiguate elements.
#[derive(Debug)]
pub struct PeekReader<R> {
    inner: R,
    peeked: Option<u8>,
}

impl<R: Read> PeekReader<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        PeekReader {
            inner,
            peeked: None,
        }
    }

    /// Returns the next byte without consuming it, or `None` at end of
    /// stream.
    pub fn peek(&mut self) -> Result<Option<u8>> {
        if self.peeked.is_none() {
            self.peeked = read_byte(&mut self.inner)?;
        }
        Ok(self.peeked)
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if let Some(b) = self.peeked.take() {
            if buf.is_empty() {
                self.peeked = Some(b);
                return Ok(0);
            }
            buf[0] = b;
            return Ok(1);
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn short_form_length() {
        let mut cursor = &hex!("7f")[..];
        assert_eq!(read_length(&mut cursor).unwrap(), 127);
    }

    #[test]
    fn long_form_length() {
        let mut cursor = &hex!("820400")[..];
        assert_eq!(read_length(&mut cursor).unwrap(), 1024);
        let mut cursor = &hex!("81 80")[..];
        assert_eq!(read_length(&mut cursor).unwrap(), 128);
    }

    #[test]
    fn indefinite_length_rejected() {
        let mut cursor = &hex!("80")[..];
        assert!(matches!(
            read_length(&mut cursor),
            Err(Error::IndefiniteLength)
        ));
    }

    #[test]
    fn length_roundtrip() {
        for len in [0usize, 1, 127, 128, 255, 256, 65535, 65536, 1 << 24] {
            let mut buf = Vec::new();
            write_length(&mut buf, len).unwrap();
            assert_eq!(buf.len(), length_of_length(len));
            let mut cursor = &buf[..];
            assert_eq!(read_length(&mut cursor).unwrap(), len);
        }
    }

    #[test]
    fn low_tag_number() {
        let mut cursor = &[][..];
        assert_eq!(read_tag_number(&mut cursor, TAG_SEQUENCE).unwrap(), SEQUENCE);
    }

    #[test]
    fn high_tag_number() {
        // [100] in context class: 0x9f tag octet then one subsequent octet
        let mut cursor = &hex!("64")[..];
        assert_eq!(read_tag_number(&mut cursor, 0x9f).unwrap(), 100);
        // two subsequent octets: 0x81 0x48 -> (1 << 7) | 0x48 = 200
        let mut cursor = &hex!("81 48")[..];
        assert_eq!(read_tag_number(&mut cursor, 0x9f).unwrap(), 200);
    }

    #[test]
    fn zero_continuation_octet_is_corrupt() {
        let mut cursor = &hex!("00 05")[..];
        assert!(matches!(
            read_tag_number(&mut cursor, 0x9f),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn header_of_empty_sequence() {
        let mut cursor = &hex!("30 00")[..];
        let header = read_header(&mut cursor).unwrap();
        assert!(header.is_sequence());
        assert_eq!(header.length, 0);
    }

    #[test]
    fn truncated_value_is_best_effort() {
        let mut cursor = &hex!("01 02 03")[..];
        let value = read_value(&mut cursor, 8).unwrap();
        assert_eq!(value, hex!("01 02 03"));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut reader = PeekReader::new(&hex!("30 03 0a 01 00")[..]);
        assert_eq!(reader.peek().unwrap(), Some(0x30));
        assert_eq!(reader.peek().unwrap(), Some(0x30));
        let header = read_header(&mut reader).unwrap();
        assert!(header.is_sequence());
        assert_eq!(header.length, 3);
    }

    #[test]
    fn rebuild_tlv_matches_original() {
        let original = hex!("02 01 2a");
        let rebuilt = rebuild_tlv(0x02, &original[2..]);
        assert_eq!(rebuilt, original);
    }
}
