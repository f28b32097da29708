//! Content-addressed object store
//!
//! Objects are stored by the SHA-1 of their header and content, one
//! zlib-compressed file per object, in git's loose-object layout.

mod loose;
mod tree_parser;

pub use loose::{hash_file, ObjectReader, ObjectStore, StoreConfig, DEFAULT_COMPRESSION};
pub use tree_parser::{parse_tree, TreeEntries, TreeParser, TreeSink, MAX_MODE_LEN};

use crate::model::ObjectKind;
use tracing::warn;

/// Compare a header's declared length with what was actually decompressed
///
/// A mismatch is logged, never raised. Returns true when they agree.
pub(crate) fn check_length(kind: ObjectKind, declared: u64, actual: u64) -> bool {
    if declared != actual {
        warn!(%kind, declared, actual, "object length differs from its header");
        return false;
    }
    true
}
