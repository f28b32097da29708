//! Streaming zlib codec with fixed-size scratch buffers
//!
//! Both directions work in [`CHUNK_SIZE`] pieces, so memory use does not
//! grow with object size.
//!
//! - [`Deflater`] compresses caller-supplied chunks straight into a writer.
//! - [`Inflater`] pulls compressed bytes from a reader and hands out
//!   decompressed chunks. It only reports end of data once the zlib stream's
//!   end marker has been seen; running out of input first is [`Error::Truncated`].
//! - [`inflate`] drives an [`Inflater`] into an [`InflateSink`].

use crate::{Error, Result};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::io::{self, Read, Write};
use tracing::{debug, warn};

/// Size of every scratch buffer used by the codec
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Compressing writer
///
/// Feed chunks with [`Deflater::write_chunk`], then call [`Deflater::finish`]
/// to emit the end of the stream.
pub struct Deflater<W: Write> {
    sink: W,
    compress: Compress,
    output: Box<[u8]>,
    finished: bool,
}

impl<W: Write> Deflater<W> {
    pub fn new(sink: W, level: Compression) -> Self {
        Deflater {
            sink,
            compress: Compress::new(level, true),
            output: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            finished: false,
        }
    }

    /// Compress one chunk; `more` is false for the final chunk
    ///
    /// Every byte of compressed output produced is written to the sink before
    /// this returns. Sink errors abort immediately.
    pub fn write_chunk(&mut self, mut input: &[u8], more: bool) -> Result<()> {
        if self.finished {
            return Err(Error::Encoding(
                "write after the compressed stream was finished".into(),
            ));
        }
        let flush = if more {
            FlushCompress::None
        } else {
            FlushCompress::Finish
        };

        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            let status = self
                .compress
                .compress(input, &mut self.output, flush)
                .map_err(|e| Error::Encoding(e.to_string()))?;
            let consumed = (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;

            input = &input[consumed..];
            if produced > 0 {
                self.sink.write_all(&self.output[..produced])?;
            }

            if status == Status::StreamEnd {
                self.finished = true;
                return Ok(());
            }
            // A full output buffer may hide more pending output.
            if produced == self.output.len() {
                continue;
            }
            if more && input.is_empty() {
                return Ok(());
            }
            if consumed == 0 && produced == 0 {
                return Err(Error::Encoding("compressor made no progress".into()));
            }
        }
    }

    /// Drain the compressor, flush the sink, and hand it back
    pub fn finish(mut self) -> Result<W> {
        if !self.finished {
            self.write_chunk(&[], false)?;
        }
        self.sink.flush()?;
        debug!(
            raw = self.compress.total_in(),
            compressed = self.compress.total_out(),
            "deflate stream finished"
        );
        Ok(self.sink)
    }

    /// Uncompressed bytes consumed so far
    pub fn total_in(&self) -> u64 {
        self.compress.total_in()
    }
}

/// Decompressing reader
pub struct Inflater<R: Read> {
    source: R,
    decompress: Decompress,
    input: Box<[u8]>,
    in_pos: usize,
    in_len: usize,
    output: Box<[u8]>,
    out_pos: usize,
    out_len: usize,
    eof: bool,
    done: bool,
}

impl<R: Read> Inflater<R> {
    pub fn new(source: R) -> Self {
        Inflater {
            source,
            decompress: Decompress::new(true),
            input: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            in_pos: 0,
            in_len: 0,
            output: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            out_pos: 0,
            out_len: 0,
            eof: false,
            done: false,
        }
    }

    /// Next chunk of decompressed bytes, or `None` at the end marker
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        if !self.fill_output()? {
            return Ok(None);
        }
        let (start, end) = (self.out_pos, self.out_len);
        self.out_pos = end;
        Ok(Some(&self.output[start..end]))
    }

    /// True once the end marker has been seen and all output handed out
    pub fn is_finished(&self) -> bool {
        self.done && self.out_pos == self.out_len
    }

    /// Make sure undelivered output is buffered; false at end of stream
    fn fill_output(&mut self) -> Result<bool> {
        while self.out_pos == self.out_len {
            if self.done {
                return Ok(false);
            }
            if self.in_pos == self.in_len && !self.eof {
                self.fill_input()?;
            }

            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status = self
                .decompress
                .decompress(
                    &self.input[self.in_pos..self.in_len],
                    &mut self.output,
                    FlushDecompress::None,
                )
                .map_err(|e| Error::Decompress(e.to_string()))?;
            let consumed = (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;

            self.in_pos += consumed;
            self.out_pos = 0;
            self.out_len = produced;

            if status == Status::StreamEnd {
                self.done = true;
                if self.in_pos < self.in_len {
                    warn!(
                        trailing = self.in_len - self.in_pos,
                        "ignoring bytes after the end of the compressed stream"
                    );
                }
                continue;
            }
            if consumed == 0 && produced == 0 {
                if self.eof {
                    return Err(Error::Truncated);
                }
                if self.in_pos < self.in_len {
                    return Err(Error::Decompress("decompressor made no progress".into()));
                }
            }
        }
        Ok(true)
    }

    fn fill_input(&mut self) -> Result<()> {
        let n = loop {
            match self.source.read(&mut self.input) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        self.in_pos = 0;
        self.in_len = n;
        self.eof = n == 0;
        Ok(())
    }
}

impl<R: Read> Read for Inflater<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || !self.fill_output()? {
            return Ok(0);
        }
        let n = buf.len().min(self.out_len - self.out_pos);
        buf[..n].copy_from_slice(&self.output[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        Ok(n)
    }
}

/// Receiver for the push-style read path
pub trait InflateSink {
    /// Called once per decompressed chunk, in stream order
    fn chunk(&mut self, bytes: &[u8]) -> Result<()>;

    /// Called after the end marker, never after an error
    fn finish(&mut self) -> Result<()>;
}

impl InflateSink for Vec<u8> {
    fn chunk(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Decompress all of `source` into `sink`
pub fn inflate<R: Read, S: InflateSink + ?Sized>(source: R, sink: &mut S) -> Result<()> {
    let mut inflater = Inflater::new(source);
    while let Some(chunk) = inflater.next_chunk()? {
        sink.chunk(chunk)?;
    }
    sink.finish()
}
