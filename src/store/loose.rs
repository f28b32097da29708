//! Loose object store: one zlib file per object
//!
//! Layout:
//! ```text
//! <root>/
//!   ce/
//!     013625030ba8dba906f756967f9e9ca394464a   zlib("blob 6\0hello\n")
//! ```
//!
//! Files are created with exclusive create and never rewritten. There is no
//! temp-file-and-rename step, so a crash mid-write can leave a partial file;
//! a failed write in-process removes its own partial file before reporting.

use crate::codec::{inflate, Deflater, InflateSink, Inflater, CHUNK_SIZE};
use crate::digest::{object_id, ObjectHasher};
use crate::model::{encode_tree, Header, Object, ObjectId, ObjectKind, TreeEntry, MAX_HEADER_LEN};
use crate::store::check_length;
use crate::store::tree_parser::{parse_tree, TreeEntries, TreeSink};
use crate::{Error, Result};
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// zlib level used when none is configured (matches git's default)
pub const DEFAULT_COMPRESSION: u32 = 6;

/// Store settings
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding the fan-out subdirectories; must already exist
    pub root: PathBuf,
    /// zlib level, 0..=9
    pub compression: u32,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StoreConfig {
            root: root.into(),
            compression: DEFAULT_COMPRESSION,
        }
    }

    pub fn compression(mut self, level: u32) -> Self {
        self.compression = level;
        self
    }
}

/// A content-addressed object store backed by a directory tree
#[derive(Clone, Debug)]
pub struct ObjectStore {
    root: PathBuf,
    compression: Compression,
}

impl ObjectStore {
    /// Use `root` as the object directory; nothing is created or checked
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::with_config(StoreConfig::new(root))
    }

    pub fn with_config(config: StoreConfig) -> Self {
        ObjectStore {
            root: config.root,
            compression: Compression::new(config.compression.min(9)),
        }
    }

    /// Where the object with this id lives
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.fan_out();
        self.root.join(dir).join(file)
    }

    /// Check if an object exists
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    // === Write path ===

    /// Store everything `content` yields as an object of type `kind`
    ///
    /// The content is read fully first: the header needs its length before
    /// hashing starts. Read failures happen before any file is touched.
    pub fn store<R: Read>(&self, kind: ObjectKind, mut content: R) -> Result<ObjectId> {
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;
        self.store_bytes(kind, &data)
    }

    /// Store an in-memory byte slice
    pub fn store_bytes(&self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId> {
        let id = object_id(kind, data);
        let header = Header::new(kind, data.len() as u64);
        self.write_object(&id, header, |deflater| {
            for chunk in data.chunks(CHUNK_SIZE) {
                deflater.write_chunk(chunk, true)?;
            }
            Ok(())
        })?;
        Ok(id)
    }

    /// Store an [`Object`]
    pub fn store_object(&self, object: &Object) -> Result<ObjectId> {
        self.store_bytes(object.kind, &object.data)
    }

    /// Encode `entries` in the given order and store them as a tree
    pub fn store_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId> {
        self.store_bytes(ObjectKind::Tree, &encode_tree(entries))
    }

    /// Store a file without holding it in memory
    ///
    /// The length comes from the file's metadata; the file is read once to
    /// hash and once more to compress. A file that changes size in between
    /// fails with [`Error::Encoding`].
    pub fn store_file(&self, kind: ObjectKind, path: impl AsRef<Path>) -> Result<ObjectId> {
        let mut file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        let id = hash_stream(kind, len, &mut file)?;

        file.seek(SeekFrom::Start(0))?;
        let header = Header::new(kind, len);
        self.write_object(&id, header, |deflater| {
            deflate_exact(deflater, header, &mut file).map_err(|err| match err {
                Error::Encoding(msg) => {
                    Error::Encoding(format!("{}: {}", path.as_ref().display(), msg))
                }
                other => other,
            })
        })?;
        Ok(id)
    }

    fn write_object<F>(&self, id: &ObjectId, header: Header, write_content: F) -> Result<()>
    where
        F: FnOnce(&mut Deflater<File>) -> Result<()>,
    {
        let (dir, file_name) = id.fan_out();
        let dir = self.root.join(dir);
        match fs::create_dir(&dir) {
            Ok(()) => debug!(dir = %dir.display(), "created object directory"),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let path = dir.join(file_name);
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(%id, "object already stored");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let result = compress_object(file, self.compression, header, write_content);
        if let Err(err) = result {
            if let Err(rm) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %rm, "could not remove partial object");
            }
            return Err(err);
        }
        debug!(%id, kind = %header.kind, len = header.len, "object written");
        Ok(())
    }

    // === Read path ===

    /// Open an object and read its header; the reader yields the content
    pub fn load(&self, id: &ObjectId) -> Result<ObjectReader<File>> {
        ObjectReader::new(self.open_object(id)?)
    }

    /// Read only as far as the header
    pub fn header(&self, id: &ObjectId) -> Result<Header> {
        Ok(self.load(id)?.header())
    }

    /// Decompress a whole object into memory
    pub fn read(&self, id: &ObjectId) -> Result<Object> {
        let mut buffer = ObjectBuffer::default();
        inflate(self.open_object(id)?, &mut buffer)?;
        buffer.into_object()
    }

    /// Lazily parse a tree's entries as its content is decompressed
    pub fn tree_entries(&self, id: &ObjectId) -> Result<TreeEntries<ObjectReader<File>>> {
        let reader = self.load(id)?;
        if reader.kind() != ObjectKind::Tree {
            return Err(Error::UnexpectedKind {
                expected: ObjectKind::Tree,
                found: reader.kind(),
            });
        }
        Ok(parse_tree(reader))
    }

    /// Stream a tree's entries to `emit` in on-disk order
    pub fn scan_tree<F: FnMut(TreeEntry)>(&self, id: &ObjectId, emit: F) -> Result<()> {
        inflate(self.open_object(id)?, &mut TreeSink::new(emit))
    }

    /// Collect a tree's entries
    pub fn read_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>> {
        let mut entries = Vec::new();
        self.scan_tree(id, |entry| entries.push(entry))?;
        Ok(entries)
    }

    fn open_object(&self, id: &ObjectId) -> Result<File> {
        let path = self.object_path(id);
        File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(id.to_hex()),
            _ => Error::Io(e),
        })
    }
}

/// Hash a file the same way [`ObjectStore::store_file`] would, without writing
pub fn hash_file(kind: ObjectKind, path: impl AsRef<Path>) -> Result<ObjectId> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    hash_stream(kind, len, &mut file)
}

fn hash_stream<R: Read>(kind: ObjectKind, len: u64, source: &mut R) -> Result<ObjectId> {
    let mut hasher = ObjectHasher::new(kind, len);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = read_some(source, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    hasher.finalize()
}

fn read_some<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match source.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Compress everything `source` yields, failing if it is not exactly
/// `header.len` bytes
fn deflate_exact<R: Read>(
    deflater: &mut Deflater<File>,
    header: Header,
    source: &mut R,
) -> Result<()> {
    let start = deflater.total_in();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = read_some(source, &mut buf)?;
        if n == 0 {
            break;
        }
        deflater.write_chunk(&buf[..n], true)?;
    }
    let written = deflater.total_in() - start;
    if written != header.len {
        return Err(Error::Encoding(format!(
            "header declares {} bytes but the source yielded {}",
            header.len, written
        )));
    }
    Ok(())
}

fn compress_object<F>(file: File, level: Compression, header: Header, write_content: F) -> Result<()>
where
    F: FnOnce(&mut Deflater<File>) -> Result<()>,
{
    let mut deflater = Deflater::new(file, level);
    deflater.write_chunk(&header.encode(), true)?;
    write_content(&mut deflater)?;
    deflater.finish()?;
    Ok(())
}

/// Content stream of a loaded object
///
/// Reading past the end checks the byte count against the header. A
/// mismatch is logged and exposed through [`ObjectReader::length_mismatch`],
/// not raised.
pub struct ObjectReader<R: Read> {
    inflater: Inflater<R>,
    header: Header,
    read: u64,
    mismatch: Option<(u64, u64)>,
    at_end: bool,
}

impl<R: Read> ObjectReader<R> {
    /// Start decompressing `source` and consume the object header
    pub fn new(source: R) -> Result<Self> {
        let mut inflater = Inflater::new(source);
        let header = read_header(&mut inflater)?;
        Ok(ObjectReader {
            inflater,
            header,
            read: 0,
            mismatch: None,
            at_end: false,
        })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn kind(&self) -> ObjectKind {
        self.header.kind
    }

    /// `(declared, actual)` once the stream ended with the wrong length
    pub fn length_mismatch(&self) -> Option<(u64, u64)> {
        self.mismatch
    }

    /// Read the remaining content into memory
    pub fn into_object(mut self) -> Result<Object> {
        let mut data = Vec::new();
        self.read_to_end(&mut data)?;
        Ok(Object::new(self.header.kind, data))
    }
}

impl<R: Read> Read for ObjectReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inflater.read(buf)?;
        self.read += n as u64;
        if n == 0 && !buf.is_empty() && !self.at_end {
            self.at_end = true;
            if !check_length(self.header.kind, self.header.len, self.read) {
                self.mismatch = Some((self.header.len, self.read));
            }
        }
        Ok(n)
    }
}

fn read_header<R: Read>(inflater: &mut Inflater<R>) -> Result<Header> {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if inflater.read(&mut byte)? == 0 {
            return Err(Error::Corrupt("object header has no NUL terminator".into()));
        }
        if byte[0] == 0 {
            return Header::parse(&raw);
        }
        if raw.len() >= MAX_HEADER_LEN {
            return Err(Error::Corrupt("object header too long".into()));
        }
        raw.push(byte[0]);
    }
}

/// Push-path sink that splits off the header and buffers the content
#[derive(Default)]
struct ObjectBuffer {
    raw_header: Vec<u8>,
    header: Option<Header>,
    data: Vec<u8>,
}

impl ObjectBuffer {
    fn into_object(self) -> Result<Object> {
        let header = self
            .header
            .ok_or_else(|| Error::Corrupt("object header has no NUL terminator".into()))?;
        Ok(Object::new(header.kind, self.data))
    }
}

impl InflateSink for ObjectBuffer {
    fn chunk(&mut self, mut bytes: &[u8]) -> Result<()> {
        if self.header.is_none() {
            let end = bytes.iter().position(|&b| b == 0);
            let (head, rest) = match end {
                Some(i) => (&bytes[..i], &bytes[i + 1..]),
                None => (bytes, &bytes[bytes.len()..]),
            };
            self.raw_header.extend_from_slice(head);
            if self.raw_header.len() > MAX_HEADER_LEN {
                return Err(Error::Corrupt("object header too long".into()));
            }
            if end.is_none() {
                return Ok(());
            }
            self.header = Some(Header::parse(&self.raw_header)?);
            bytes = rest;
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self.header {
            Some(header) => {
                check_length(header.kind, header.len, self.data.len() as u64);
                Ok(())
            }
            None => Err(Error::Corrupt("object header has no NUL terminator".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MODE_FILE, MODE_TREE};
    use std::io::Write;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> ObjectStore {
        ObjectStore::open(dir)
    }

    #[test]
    fn test_known_blob_layout() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let id = store.store(ObjectKind::Blob, &b"hello\n"[..]).unwrap();
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");

        let path = dir
            .path()
            .join("ce")
            .join("013625030ba8dba906f756967f9e9ca394464a");
        assert!(path.is_file());

        let mut decoder = flate2::read::ZlibDecoder::new(File::open(path).unwrap());
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).unwrap();
        assert_eq!(raw, b"blob 6\0hello\n");
    }

    #[test]
    fn test_roundtrip_through_load() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 97) as u8).collect();

        let id = store.store_bytes(ObjectKind::Blob, &data).unwrap();
        let mut reader = store.load(&id).unwrap();
        assert_eq!(reader.header(), Header::new(ObjectKind::Blob, data.len() as u64));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.length_mismatch(), None);
    }

    #[test]
    fn test_roundtrip_through_read() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let object = Object::new(ObjectKind::Commit, b"tree 4b82\nauthor x\n".to_vec());

        let id = store.store_object(&object).unwrap();
        assert_eq!(id, object.id());
        assert_eq!(store.read(&id).unwrap(), object);
    }

    #[test]
    fn test_empty_blob() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let id = store.store_bytes(ObjectKind::Blob, b"").unwrap();
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert!(store.read(&id).unwrap().data.is_empty());
    }

    #[test]
    fn test_deduplication() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let id1 = store.store_bytes(ObjectKind::Blob, b"duplicate data").unwrap();
        let modified = fs::metadata(store.object_path(&id1)).unwrap().modified().unwrap();
        let id2 = store.store_bytes(ObjectKind::Blob, b"duplicate data").unwrap();

        assert_eq!(id1, id2);
        assert_eq!(
            fs::metadata(store.object_path(&id2)).unwrap().modified().unwrap(),
            modified
        );
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let id = ObjectId::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();

        assert!(!store.contains(&id));
        assert!(matches!(store.load(&id), Err(Error::NotFound(_))));
        assert!(matches!(store.read(&id), Err(Error::NotFound(_))));
        assert!(matches!(store.read_tree(&id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let data: Vec<u8> = (0..5_000u32).map(|i| (i * 7) as u8).collect();
        let id = store.store_bytes(ObjectKind::Blob, &data).unwrap();

        let path = store.object_path(&id);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 6]).unwrap();

        assert!(matches!(store.read(&id), Err(Error::Truncated)));
        let mut reader = store.load(&id).unwrap();
        let mut out = Vec::new();
        let err: Error = reader.read_to_end(&mut out).unwrap_err().into();
        assert!(matches!(err, Error::Truncated), "{:?}", err);
    }

    #[test]
    fn test_length_mismatch_is_a_warning() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        // Hand-craft an object whose header lies about its length.
        let id = ObjectId::from_bytes([0x42; 20]);
        let (sub, name) = id.fan_out();
        fs::create_dir(dir.path().join(&sub)).unwrap();
        let mut encoder = flate2::write::ZlibEncoder::new(
            File::create(dir.path().join(&sub).join(name)).unwrap(),
            Compression::default(),
        );
        encoder.write_all(b"blob 10\0short").unwrap();
        encoder.finish().unwrap();

        let mut reader = store.load(&id).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"short");
        assert_eq!(reader.length_mismatch(), Some((10, 5)));

        assert_eq!(store.read(&id).unwrap().data, b"short");
    }

    #[test]
    fn test_tree_roundtrip() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let blob = store.store_bytes(ObjectKind::Blob, b"hello\n").unwrap();
        let sub = store.store_tree(&[]).unwrap();
        let entries = vec![
            TreeEntry::new(MODE_FILE, "hello.txt", blob),
            TreeEntry::new(MODE_TREE, "empty", sub),
        ];
        let tree = store.store_tree(&entries).unwrap();

        assert_eq!(store.header(&tree).unwrap().kind, ObjectKind::Tree);
        assert_eq!(store.read_tree(&tree).unwrap(), entries);
        let lazy: Vec<TreeEntry> = store
            .tree_entries(&tree)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lazy, entries);
    }

    #[test]
    fn test_tree_entries_of_blob_rejected() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let blob = store.store_bytes(ObjectKind::Blob, b"not a tree").unwrap();

        assert!(matches!(
            store.tree_entries(&blob),
            Err(Error::UnexpectedKind { .. })
        ));
        assert!(matches!(
            store.read_tree(&blob),
            Err(Error::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn test_store_file_matches_store_bytes() {
        let dir = tempdir().unwrap();
        let objects = dir.path().join("objects");
        fs::create_dir(&objects).unwrap();
        let store = store_in(&objects);

        let data: Vec<u8> = (0..(3 * CHUNK_SIZE as u32 + 17)).map(|i| (i % 13) as u8).collect();
        let file_path = dir.path().join("input.bin");
        fs::write(&file_path, &data).unwrap();

        let from_file = store.store_file(ObjectKind::Blob, &file_path).unwrap();
        assert_eq!(from_file, object_id(ObjectKind::Blob, &data));
        assert_eq!(hash_file(ObjectKind::Blob, &file_path).unwrap(), from_file);
        assert_eq!(store.read(&from_file).unwrap().data, data);
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir.path().join("does-not-exist"));
        let err = store.store_bytes(ObjectKind::Blob, b"x").unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{:?}", err);
    }

    #[test]
    fn test_unreadable_source_writes_nothing() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "boom"))
            }
        }

        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(matches!(store.store(ObjectKind::Blob, Broken), Err(Error::Io(_))));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_write_removes_partial_file() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
        let id = object_id(ObjectKind::Blob, &data);
        let header = Header::new(ObjectKind::Blob, data.len() as u64);

        let err = store
            .write_object(&id, header, |deflater| {
                for chunk in data.chunks(CHUNK_SIZE) {
                    deflater.write_chunk(chunk, true)?;
                }
                Err(Error::Encoding("interrupted".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, Error::Encoding(ref msg) if msg == "interrupted"));
        assert!(!store.object_path(&id).exists());
        assert!(!store.contains(&id));
    }

    #[test]
    fn test_short_source_fails_and_leaves_nothing() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let header = Header::new(ObjectKind::Blob, 10);
        let id = object_id(ObjectKind::Blob, b"0123456789");

        let err = store
            .write_object(&id, header, |deflater| {
                deflate_exact(deflater, header, &mut &b"short"[..])
            })
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)), "{:?}", err);
        assert!(!store.object_path(&id).exists());
    }

    #[test]
    fn test_long_source_fails_and_leaves_nothing() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let header = Header::new(ObjectKind::Blob, 3);
        let id = object_id(ObjectKind::Blob, b"abc");

        let err = store
            .write_object(&id, header, |deflater| {
                deflate_exact(deflater, header, &mut &b"abcdef"[..])
            })
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)), "{:?}", err);
        assert!(!store.object_path(&id).exists());
    }

    #[test]
    fn test_hash_stream_checks_declared_length() {
        let err = hash_stream(ObjectKind::Blob, 10, &mut &b"short"[..]).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)), "{:?}", err);
        assert!(hash_stream(ObjectKind::Blob, 6, &mut &b"hello\n"[..]).is_ok());
    }

    #[test]
    fn test_compression_level_is_configurable() {
        let dir = tempdir().unwrap();
        let fast = ObjectStore::with_config(StoreConfig::new(dir.path()).compression(0));
        let data = vec![b'a'; 10_000];
        let id = fast.store_bytes(ObjectKind::Blob, &data).unwrap();

        // Level 0 stores the data uncompressed.
        assert!(fs::metadata(fast.object_path(&id)).unwrap().len() > 10_000);
        assert_eq!(fast.read(&id).unwrap().data, data);
    }
}
