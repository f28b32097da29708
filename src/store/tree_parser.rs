//! Incremental tree parser
//!
//! [`TreeParser`] consumes a tree's decompressed bytes one at a time and
//! keeps all partial state between calls, so entries may straddle chunk
//! boundaries anywhere (mid-mode, mid-name, mid-id).

use crate::codec::{InflateSink, CHUNK_SIZE};
use crate::model::{Header, ObjectId, ObjectKind, TreeEntry, ID_LEN, MAX_HEADER_LEN};
use crate::store::check_length;
use crate::{Error, Result};
use std::collections::VecDeque;
use std::io::{self, Read};

/// Longest mode token accepted ("100644" plus slack)
pub const MAX_MODE_LEN: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Skipping the `"tree <len>"` object header up to its NUL
    AwaitHeaderEnd,
    ReadMode,
    ReadName,
    ReadHash,
}

/// Byte-at-a-time tree entry state machine
#[derive(Debug)]
pub struct TreeParser {
    state: State,
    header: Vec<u8>,
    declared_len: Option<u64>,
    content_len: u64,
    mode: Vec<u8>,
    name: Vec<u8>,
    id: [u8; ID_LEN],
    id_len: usize,
}

impl TreeParser {
    /// Parser for a full decompressed object, header included
    pub fn new() -> Self {
        Self::starting_at(State::AwaitHeaderEnd)
    }

    /// Parser for tree content whose header was already consumed
    pub fn for_content() -> Self {
        Self::starting_at(State::ReadMode)
    }

    fn starting_at(state: State) -> Self {
        TreeParser {
            state,
            header: Vec::new(),
            declared_len: None,
            content_len: 0,
            mode: Vec::new(),
            name: Vec::new(),
            id: [0u8; ID_LEN],
            id_len: 0,
        }
    }

    /// Feed the next chunk, calling `emit` for every entry it completes
    pub fn feed<F: FnMut(TreeEntry)>(&mut self, bytes: &[u8], mut emit: F) -> Result<()> {
        for &byte in bytes {
            if let Some(entry) = self.step(byte)? {
                emit(entry);
            }
        }
        Ok(())
    }

    fn step(&mut self, byte: u8) -> Result<Option<TreeEntry>> {
        if self.state != State::AwaitHeaderEnd {
            self.content_len += 1;
        }
        match self.state {
            State::AwaitHeaderEnd => {
                if byte == 0 {
                    let header = Header::parse(&self.header)?;
                    if header.kind != ObjectKind::Tree {
                        return Err(Error::UnexpectedKind {
                            expected: ObjectKind::Tree,
                            found: header.kind,
                        });
                    }
                    self.declared_len = Some(header.len);
                    self.state = State::ReadMode;
                } else if self.header.len() >= MAX_HEADER_LEN {
                    return Err(Error::Corrupt("object header too long".into()));
                } else {
                    self.header.push(byte);
                }
            }
            State::ReadMode => {
                if byte == b' ' {
                    if self.mode.is_empty() {
                        return Err(self.corrupt("empty entry mode"));
                    }
                    self.state = State::ReadName;
                } else if !(b'0'..=b'7').contains(&byte) {
                    return Err(self.corrupt("entry mode is not octal"));
                } else if self.mode.len() == MAX_MODE_LEN {
                    return Err(self.corrupt("entry mode too long"));
                } else {
                    self.mode.push(byte);
                }
            }
            State::ReadName => {
                if byte == 0 {
                    if self.name.is_empty() {
                        return Err(self.corrupt("empty entry name"));
                    }
                    self.id_len = 0;
                    self.state = State::ReadHash;
                } else {
                    self.name.push(byte);
                }
            }
            State::ReadHash => {
                self.id[self.id_len] = byte;
                self.id_len += 1;
                if self.id_len == ID_LEN {
                    self.state = State::ReadMode;
                    return self.take_entry().map(Some);
                }
            }
        }
        Ok(None)
    }

    fn take_entry(&mut self) -> Result<TreeEntry> {
        let mode = String::from_utf8(std::mem::take(&mut self.mode))
            .map_err(|_| self.corrupt("entry mode is not ASCII"))?;
        let name = String::from_utf8(std::mem::take(&mut self.name))
            .map_err(|_| self.corrupt("entry name is not UTF-8"))?;
        Ok(TreeEntry::new(mode, name, ObjectId::from_bytes(self.id)))
    }

    fn corrupt(&self, what: &str) -> Error {
        Error::Corrupt(format!("{} at tree byte {}", what, self.content_len))
    }

    /// Check that the input ended on an entry boundary
    pub fn finish(&self) -> Result<()> {
        match self.state {
            State::ReadMode if self.mode.is_empty() => {
                if let Some(declared) = self.declared_len {
                    check_length(ObjectKind::Tree, declared, self.content_len);
                }
                Ok(())
            }
            State::AwaitHeaderEnd => Err(Error::Corrupt(
                "object header has no NUL terminator".into(),
            )),
            _ => Err(self.corrupt("tree ended mid-entry")),
        }
    }
}

impl Default for TreeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Push-path adapter: runs a [`TreeParser`] over inflated chunks
pub struct TreeSink<F: FnMut(TreeEntry)> {
    parser: TreeParser,
    emit: F,
}

impl<F: FnMut(TreeEntry)> TreeSink<F> {
    /// Expects the whole decompressed object, header included
    pub fn new(emit: F) -> Self {
        TreeSink {
            parser: TreeParser::new(),
            emit,
        }
    }
}

impl<F: FnMut(TreeEntry)> InflateSink for TreeSink<F> {
    fn chunk(&mut self, bytes: &[u8]) -> Result<()> {
        self.parser.feed(bytes, &mut self.emit)
    }

    fn finish(&mut self) -> Result<()> {
        self.parser.finish()
    }
}

/// Lazy iterator over the entries of a tree content stream
pub struct TreeEntries<R: Read> {
    reader: R,
    parser: TreeParser,
    pending: VecDeque<TreeEntry>,
    buf: Box<[u8]>,
    done: bool,
}

/// Parse tree content (header already stripped) as it is read
pub fn parse_tree<R: Read>(content: R) -> TreeEntries<R> {
    TreeEntries {
        reader: content,
        parser: TreeParser::for_content(),
        pending: VecDeque::new(),
        buf: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
        done: false,
    }
}

impl<R: Read> Iterator for TreeEntries<R> {
    type Item = Result<TreeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }

            let n = match self.reader.read(&mut self.buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            if n == 0 {
                self.done = true;
                if let Err(e) = self.parser.finish() {
                    return Some(Err(e));
                }
                continue;
            }

            let pending = &mut self.pending;
            if let Err(e) = self
                .parser
                .feed(&self.buf[..n], |entry| pending.push_back(entry))
            {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
