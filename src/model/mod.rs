//! Data model for the object store

mod hash;
mod object;
mod tree;

pub use hash::{ObjectId, HEX_LEN, ID_LEN};
pub use object::{Header, Object, ObjectKind, MAX_HEADER_LEN};
pub use tree::{
    encode_tree, TreeEntry, MODE_COMMIT, MODE_EXECUTABLE, MODE_FILE, MODE_SYMLINK, MODE_TREE,
};
