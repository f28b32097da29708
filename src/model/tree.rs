//! Tree entries and the tree wire format
//!
//! A tree's content is a bare concatenation of entries:
//! ```text
//! <mode ascii octal> SP <name> NUL <20-byte raw id>
//! ```
//! with no count prefix and no terminator.

use crate::model::{ObjectId, ObjectKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mode of a subdirectory entry
pub const MODE_TREE: &str = "40000";
/// Mode of a submodule (gitlink) entry
pub const MODE_COMMIT: &str = "160000";
/// Mode of a regular file
pub const MODE_FILE: &str = "100644";
/// Mode of an executable file
pub const MODE_EXECUTABLE: &str = "100755";
/// Mode of a symbolic link
pub const MODE_SYMLINK: &str = "120000";

/// One {mode, name, id} record of a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: String,
    pub name: String,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: impl Into<String>, name: impl Into<String>, id: ObjectId) -> Self {
        TreeEntry {
            mode: mode.into(),
            name: name.into(),
            id,
        }
    }

    /// Kind of object the entry points at, derived from its mode
    pub fn kind(&self) -> ObjectKind {
        match self.mode.as_str() {
            MODE_TREE => ObjectKind::Tree,
            MODE_COMMIT => ObjectKind::Commit,
            _ => ObjectKind::Blob,
        }
    }

    /// Append the wire form of this entry
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        out.extend_from_slice(self.id.as_bytes());
    }
}

/// Formats like `git ls-tree`: `<mode> <kind> <id>\t<name>`
impl fmt::Display for TreeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0>6} {} {}\t{}",
            self.mode,
            self.kind(),
            self.id,
            self.name
        )
    }
}

/// Serialize entries in the order given (callers own any sorting)
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        entry.encode_into(&mut out);
    }
    out
}
