//! Incremental SHA-1 hashing of objects
//!
//! [`Hasher`] is the raw feed/finalize engine. [`ObjectHasher`] layers the
//! object header on top and checks that exactly the declared number of
//! content bytes went through it.

use crate::model::{Header, ObjectId, ObjectKind};
use crate::{Error, Result};
use std::io;

/// Incremental SHA-1 state
///
/// Feeding the same bytes in any chunking yields the same digest.
#[derive(Clone)]
pub struct Hasher {
    inner: sha1_smol::Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Hasher {
            inner: sha1_smol::Sha1::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn finalize(self) -> ObjectId {
        ObjectId::from_bytes(self.inner.digest().bytes())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hashes `header ++ content` for an object whose length is known up front
pub struct ObjectHasher {
    hasher: Hasher,
    declared: u64,
    seen: u64,
}

impl ObjectHasher {
    pub fn new(kind: ObjectKind, len: u64) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&Header::new(kind, len).encode());
        ObjectHasher {
            hasher,
            declared: len,
            seen: 0,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.seen += bytes.len() as u64;
        self.hasher.update(bytes);
    }

    /// Fails if the content fed differs in length from the header
    pub fn finalize(self) -> Result<ObjectId> {
        if self.seen != self.declared {
            return Err(Error::Encoding(format!(
                "header declares {} bytes but {} were hashed",
                self.declared, self.seen
            )));
        }
        Ok(self.hasher.finalize())
    }
}

impl io::Write for ObjectHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Content address of `kind` with the given content
pub fn object_id(kind: ObjectKind, content: &[u8]) -> ObjectId {
    let mut hasher = Hasher::new();
    hasher.update(&Header::new(kind, content.len() as u64).encode());
    hasher.update(content);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let mut hasher = Hasher::new();
        hasher.update(b"blob 6\0hello\n");
        assert_eq!(
            hasher.finalize().to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        assert_eq!(
            object_id(ObjectKind::Blob, b"hello\n").to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn test_plain_sha1() {
        let mut hasher = Hasher::new();
        hasher.update(b"abc");
        assert_eq!(
            hasher.finalize().to_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_chunking_does_not_matter() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let whole = object_id(ObjectKind::Blob, &data);

        for size in [1, 7, 16384] {
            let mut hasher = ObjectHasher::new(ObjectKind::Blob, data.len() as u64);
            for chunk in data.chunks(size) {
                hasher.update(chunk);
            }
            assert_eq!(hasher.finalize().unwrap(), whole, "chunk size {}", size);
        }
    }

    #[test]
    fn test_declared_length_enforced() {
        let mut hasher = ObjectHasher::new(ObjectKind::Blob, 10);
        hasher.update(b"short");
        assert!(matches!(hasher.finalize(), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_io_copy_into_hasher() {
        let mut hasher = ObjectHasher::new(ObjectKind::Blob, 6);
        io::copy(&mut &b"hello\n"[..], &mut hasher).unwrap();
        assert_eq!(
            hasher.finalize().unwrap().to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }
}
