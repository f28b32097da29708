//! Object kinds, headers, and in-memory objects

use crate::digest::Hasher;
use crate::model::ObjectId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest header we accept: "commit " + 20 digits + NUL
pub const MAX_HEADER_LEN: usize = 32;

/// Type tag for objects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Opaque file content
    Blob,
    /// A directory listing
    Tree,
    /// A commit (stored and loaded opaquely)
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            other => Err(Error::Corrupt(format!("unknown object type: {:?}", other))),
        }
    }
}

/// The `"<kind> <len>\0"` prefix hashed and stored in front of the content
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub kind: ObjectKind,
    pub len: u64,
}

impl Header {
    pub fn new(kind: ObjectKind, len: u64) -> Self {
        Header { kind, len }
    }

    /// Wire form, including the trailing NUL
    pub fn encode(&self) -> Vec<u8> {
        format!("{} {}\0", self.kind, self.len).into_bytes()
    }

    /// Parse the header bytes preceding the NUL (the NUL itself excluded)
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::Corrupt("object header is not ASCII".into()))?;
        let (kind, len) = text
            .split_once(' ')
            .ok_or_else(|| Error::Corrupt(format!("malformed object header: {:?}", text)))?;
        let kind = kind.parse()?;
        if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Corrupt(format!("malformed object length: {:?}", len)));
        }
        let len = len
            .parse()
            .map_err(|_| Error::Corrupt(format!("object length out of range: {}", len)))?;
        Ok(Header { kind, len })
    }
}

/// A typed object held fully in memory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    /// Type of content
    pub kind: ObjectKind,
    /// Raw data (uncompressed, header excluded)
    pub data: Vec<u8>,
}

impl Object {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Object { kind, data }
    }

    pub fn blob(data: impl Into<Vec<u8>>) -> Self {
        Object::new(ObjectKind::Blob, data.into())
    }

    pub fn header(&self) -> Header {
        Header::new(self.kind, self.data.len() as u64)
    }

    /// Compute the content address
    pub fn id(&self) -> ObjectId {
        let mut hasher = Hasher::new();
        hasher.update(&self.header().encode());
        hasher.update(&self.data);
        hasher.finalize()
    }

    /// Get the size of the content
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
