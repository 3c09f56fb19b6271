//! Re-openable byte sources and pluggable output resources.
//!
//! A [`Document`] is a handle to signed bytes that can be opened as a fresh
//! stream any number of times — the revocation lookup and the signed-range
//! pass each reopen the same CRL rather than buffering it. A
//! [`ResourcesHandler`] is where generated output lands; the in-memory and
//! temp-file implementations let callers choose whether large outputs stay
//! memory-resident.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::errors::Result;

/// A re-openable, immutable byte source.
///
/// Cloning is cheap: memory-backed contents are shared, file-backed variants
/// clone only the handle.
#[derive(Clone, Debug)]
pub enum Document {
    /// Bytes held in memory.
    Memory(Arc<Vec<u8>>),
    /// Bytes stored in a named file.
    File(PathBuf),
    /// Bytes stored in a temporary file that lives as long as any clone of
    /// this document.
    Temp(Arc<NamedTempFile>),
}

impl Document {
    /// Creates an in-memory document.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Document::Memory(Arc::new(bytes.into()))
    }

    /// Creates a file-backed document.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Document::File(path.into())
    }

    /// Opens a fresh read stream over the full content.
    pub fn open(&self) -> Result<Box<dyn Read>> {
        match self {
            Document::Memory(bytes) => Ok(Box::new(SharedCursor {
                bytes: bytes.clone(),
                pos: 0,
            })),
            Document::File(path) => Ok(Box::new(File::open(path)?)),
            Document::Temp(file) => Ok(Box::new(File::open(file.path())?)),
        }
    }

    /// Content length in bytes.
    pub fn len(&self) -> Result<u64> {
        match self {
            Document::Memory(bytes) => Ok(bytes.len() as u64),
            Document::File(path) => Ok(std::fs::metadata(path)?.len()),
            Document::Temp(file) => Ok(file.as_file().metadata()?.len()),
        }
    }

    /// Returns `true` when the content is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the full content into memory.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.open()?.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl From<Vec<u8>> for Document {
    fn from(bytes: Vec<u8>) -> Self {
        Document::from_bytes(bytes)
    }
}

/// Cursor over shared bytes, so opened streams don't copy the content.
struct SharedCursor {
    bytes: Arc<Vec<u8>>,
    pos: usize,
}

impl Read for SharedCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.bytes[self.pos.min(self.bytes.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Output sink that is turned into a [`Document`] once writing finishes.
pub trait ResourcesHandler: Write {
    /// Finalizes the handler and exposes what was written as a document.
    fn into_document(self: Box<Self>) -> Result<Document>;
}

/// Factory for [`ResourcesHandler`]s.
///
/// Passed by callers that control where generated output must live; each
/// generation acquires a fresh handler.
pub trait ResourcesHandlerBuilder {
    /// Creates a fresh handler.
    fn create_handler(&self) -> Result<Box<dyn ResourcesHandler>>;
}

/// Memory-backed [`ResourcesHandler`].
#[derive(Debug, Default)]
pub struct InMemoryResourcesHandler {
    buffer: Vec<u8>,
}

impl Write for InMemoryResourcesHandler {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResourcesHandler for InMemoryResourcesHandler {
    fn into_document(self: Box<Self>) -> Result<Document> {
        Ok(Document::from_bytes(self.buffer))
    }
}

/// Builder producing [`InMemoryResourcesHandler`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct InMemoryResourcesHandlerBuilder;

impl ResourcesHandlerBuilder for InMemoryResourcesHandlerBuilder {
    fn create_handler(&self) -> Result<Box<dyn ResourcesHandler>> {
        Ok(Box::new(InMemoryResourcesHandler::default()))
    }
}

/// Temp-file backed [`ResourcesHandler`] for outputs that should not be
/// memory-resident.
#[derive(Debug)]
pub struct TempFileResourcesHandler {
    file: NamedTempFile,
}

impl Write for TempFileResourcesHandler {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl ResourcesHandler for TempFileResourcesHandler {
    fn into_document(mut self: Box<Self>) -> Result<Document> {
        self.file.flush()?;
        Ok(Document::Temp(Arc::new(self.file)))
    }
}

/// Builder producing [`TempFileResourcesHandler`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct TempFileResourcesHandlerBuilder;

impl ResourcesHandlerBuilder for TempFileResourcesHandlerBuilder {
    fn create_handler(&self) -> Result<Box<dyn ResourcesHandler>> {
        Ok(Box::new(TempFileResourcesHandler {
            file: NamedTempFile::new()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_document_reopens_identically() {
        let doc = Document::from_bytes(b"hello crl".to_vec());
        assert_eq!(doc.to_vec().unwrap(), b"hello crl");
        assert_eq!(doc.to_vec().unwrap(), b"hello crl");
        assert_eq!(doc.len().unwrap(), 9);
    }

    #[test]
    fn in_memory_handler_roundtrip() {
        let builder = InMemoryResourcesHandlerBuilder;
        let mut handler = builder.create_handler().unwrap();
        handler.write_all(b"payload").unwrap();
        let doc = handler.into_document().unwrap();
        assert_eq!(doc.to_vec().unwrap(), b"payload");
    }

    #[test]
    fn temp_file_handler_roundtrip() {
        let builder = TempFileResourcesHandlerBuilder;
        let mut handler = builder.create_handler().unwrap();
        handler.write_all(b"payload").unwrap();
        let doc = handler.into_document().unwrap();
        assert_eq!(doc.to_vec().unwrap(), b"payload");
        // clones keep the backing file alive
        let clone = doc.clone();
        drop(doc);
        assert_eq!(clone.to_vec().unwrap(), b"payload");
    }
}
