//! # gitobj
//!
//! A content-addressed object store compatible with git's loose objects.
//!
//! Every object is the bytes `"<kind> <len>\0" ++ content`, addressed by
//! their SHA-1 and stored zlib-compressed at `<root>/<2 hex>/<38 hex>`.
//!
//! ## Core Concepts
//!
//! - **Blobs**: opaque file content
//! - **Trees**: `<mode> <name>\0<20-byte id>` entries, parsed incrementally
//! - **Streaming**: compression, decompression and tree parsing all run in
//!   fixed-size chunks
//!
//! ## Example
//!
//! ```no_run
//! use gitobj::{ObjectKind, ObjectStore};
//!
//! let store = ObjectStore::open(".git/objects");
//! let id = store.store(ObjectKind::Blob, &b"hello\n"[..])?;
//! assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
//! let object = store.read(&id)?;
//! assert_eq!(object.data, b"hello\n");
//! # Ok::<(), gitobj::Error>(())
//! ```

pub mod codec;
pub mod digest;
pub mod model;
pub mod store;

mod error;

pub use codec::{inflate, Deflater, InflateSink, Inflater, CHUNK_SIZE};
pub use digest::{object_id, Hasher, ObjectHasher};
pub use error::{Error, Result};
pub use model::{encode_tree, Header, Object, ObjectId, ObjectKind, TreeEntry};
pub use store::{
    hash_file, parse_tree, ObjectReader, ObjectStore, StoreConfig, TreeEntries, TreeParser,
};
