//! Error types.

use core::fmt;
use std::io;

/// Alias for [`core::result::Result`] with the `sigstream` [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

/// Error variants.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The stream ended before a complete tag-length-value could be read.
    Eof,

    /// The encoding violates X.690 in a way that cannot be recovered from.
    Corrupt(&'static str),

    /// An indefinite-length encoding was encountered.
    ///
    /// Only definite-length BER/DER is supported; this is a documented
    /// restriction rather than a silent mis-parse.
    IndefiniteLength,

    /// A mandatory element carried an unexpected tag.
    UnexpectedTag {
        /// Description of the expected element.
        expected: &'static str,
        /// Tag octet actually read.
        found: u8,
    },

    /// A signature or digest algorithm is not supported.
    UnsupportedAlgorithm(der::asn1::ObjectIdentifier),

    /// The issuer public key could not be decoded for the resolved scheme.
    InvalidPublicKey,

    /// Cryptographic signature verification failed.
    Verification,

    /// Structured ASN.1 decoding of a bounded element failed.
    Asn1(der::Error),

    /// Underlying I/O failure.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Eof => write!(f, "unexpected end of stream"),
            Error::Corrupt(what) => write!(f, "corrupt encoding: {}", what),
            Error::IndefiniteLength => {
                write!(f, "indefinite-length encodings are not supported")
            }
            Error::UnexpectedTag { expected, found } => {
                write!(f, "expected {}, found tag {:#04x}", expected, found)
            }
            Error::UnsupportedAlgorithm(oid) => {
                write!(f, "unsupported algorithm: {}", oid)
            }
            Error::InvalidPublicKey => write!(f, "invalid issuer public key"),
            Error::Verification => write!(f, "signature verification failed"),
            Error::Asn1(err) => write!(f, "ASN.1 error: {}", err),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Asn1(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::Asn1(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Eof
        } else {
            Error::Io(err)
        }
    }
}

impl From<spki::Error> for Error {
    fn from(err: spki::Error) -> Self {
        match err {
            spki::Error::Asn1(err) => Error::Asn1(err),
            _ => Error::InvalidPublicKey,
        }
    }
}

impl From<signature::Error> for Error {
    fn from(_: signature::Error) -> Self {
        Error::Verification
    }
}
