//! Input splitter.

use std::fs;
use std::io::prelude::*;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log;

use crate::chunk::{buf_reader, chunk_path, ChunkFile, ChunkWriter};
use crate::sort::{check_interrupted, SortError, Stage};

/// Splits a record stream into a sequence of unsorted chunk files holding at most `max_lines` records each.
#[derive(Clone)]
pub struct Splitter {
    /// Maximum number of records per chunk.
    max_lines: usize,
    /// Input and chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Cancellation signal.
    interrupt: Option<Arc<AtomicBool>>,
}

impl Splitter {
    /// Creates a new splitter.
    ///
    /// # Arguments
    /// * `max_lines` - Maximum number of records per chunk, must be positive
    /// * `rw_buf_size` - Input and chunk files read/write buffer size
    /// * `interrupt` - Cancellation signal checked for every record
    pub fn new(max_lines: usize, rw_buf_size: Option<usize>, interrupt: Option<Arc<AtomicBool>>) -> Self {
        Splitter {
            max_lines,
            rw_buf_size,
            interrupt,
        }
    }

    /// Splits the file at `input` into chunks named `<prefix>-part-<N>`.
    pub fn split_file(&self, input: &Path, prefix: &Path) -> Result<Vec<ChunkFile>, SortError> {
        let file = fs::File::open(input).map_err(|err| SortError::io(Stage::Split, input, err))?;

        self.split(buf_reader(file, self.rw_buf_size), input, prefix)
    }

    /// Splits records read from `reader` into chunks named `<prefix>-part-<N>`.
    /// Chunks are numbered from 0 in creation order; every chunk but the last holds exactly `max_lines` records.
    ///
    /// On failure chunks that have already been written are left on disk.
    ///
    /// # Arguments
    /// * `reader` - Input record stream
    /// * `source` - Input path, used in error reports
    /// * `prefix` - Chunk file path prefix
    pub fn split<R: BufRead>(&self, reader: R, source: &Path, prefix: &Path) -> Result<Vec<ChunkFile>, SortError> {
        let mut chunks = Vec::new();
        let mut writer: Option<ChunkWriter> = None;

        for line in reader.lines() {
            check_interrupted(&self.interrupt, Stage::Split)?;
            let line = line.map_err(|err| SortError::io(Stage::Split, source, err))?;

            if writer.as_ref().map_or(true, |w| w.len() >= self.max_lines) {
                if let Some(full) = writer.take() {
                    chunks.push(self.finish_chunk(full)?);
                }
                writer = Some(self.create_chunk(prefix, chunks.len())?);
            }

            if let Some(ref mut writer) = writer {
                writer
                    .write_line(&line)
                    .map_err(|err| SortError::io(Stage::Split, writer.path(), err))?;
            }
        }

        if let Some(last) = writer.take() {
            chunks.push(self.finish_chunk(last)?);
        }

        log::info!("{} split into {} chunk(s)", source.display(), chunks.len());

        return Ok(chunks);
    }

    fn create_chunk(&self, prefix: &Path, index: usize) -> Result<ChunkWriter, SortError> {
        let path = chunk_path(prefix, index);
        log::debug!("creating chunk {}", path.display());

        ChunkWriter::create(path.clone(), index, self.rw_buf_size).map_err(|err| SortError::io(Stage::Split, &path, err))
    }

    fn finish_chunk(&self, writer: ChunkWriter) -> Result<ChunkFile, SortError> {
        let path = writer.path().to_path_buf();

        writer.finish().map_err(|err| SortError::io(Stage::Split, &path, err))
    }
}
