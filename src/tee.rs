//! Pass-through reader that can mirror consumed bytes to a sink.

use std::io::{Read, Result, Write};

/// Reader adapter mirroring everything it reads into a writer while the
/// mirroring flag is on.
///
/// Toggling the flag selects exact byte ranges out of a single linear pass:
/// the CRL parser switches it on for precisely the TBSCertList TLV, so the
/// sink receives the bytes the signature covers without any re-encoding.
/// Byte-exactness is the point — re-serializing parsed fields could produce
/// a subtly different encoding and break signature verification.
///
/// The wrapper owns both the source and the sink; dropping it releases each
/// exactly once.
#[derive(Debug)]
pub struct TeeReader<R, W> {
    inner: R,
    sink: W,
    mirroring: bool,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    /// Wraps `inner`, mirroring into `sink`. Mirroring starts disabled.
    pub fn new(inner: R, sink: W) -> Self {
        TeeReader {
            inner,
            sink,
            mirroring: false,
        }
    }

    /// Turns mirroring on or off.
    pub fn set_mirroring(&mut self, on: bool) {
        self.mirroring = on;
    }

    /// Returns `true` while consumed bytes are being mirrored.
    pub fn is_mirroring(&self) -> bool {
        self.mirroring
    }

    /// Consumes the adapter, returning the source and the sink.
    pub fn into_parts(self) -> (R, W) {
        (self.inner, self.sink)
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        if self.mirroring && n > 0 {
            self.sink.write_all(&buf[..n])?;
        }
        Ok(n)
    }
}
