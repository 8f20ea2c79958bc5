//! Chunk files and the chunk sorter.
//!
//! A chunk is a newline-delimited text file holding at most `max_lines` records. Chunks are created by the
//! [`Splitter`](crate::Splitter), sorted in place by the [`ChunkSorter`] and read exactly once by the merger.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log;
use tempfile;

use crate::sort::{check_interrupted, SortError, Stage};

/// Returns the path of the chunk with the provided index: `<prefix>-part-<index>`.
pub fn chunk_path(prefix: &Path, index: usize) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(format!("-part-{}", index));

    return PathBuf::from(path);
}

pub(crate) fn buf_reader<R: Read>(inner: R, buf_size: Option<usize>) -> io::BufReader<R> {
    match buf_size {
        Some(buf_size) => io::BufReader::with_capacity(buf_size, inner),
        None => io::BufReader::new(inner),
    }
}

pub(crate) fn buf_writer<W: Write>(inner: W, buf_size: Option<usize>) -> io::BufWriter<W> {
    match buf_size {
        Some(buf_size) => io::BufWriter::with_capacity(buf_size, inner),
        None => io::BufWriter::new(inner),
    }
}

pub(crate) fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}

/// Persisted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    /// Chunk index in creation order.
    index: usize,
    /// Chunk file path.
    path: PathBuf,
    /// Number of records stored in the chunk.
    len: usize,
}

impl ChunkFile {
    pub(crate) fn new(index: usize, path: PathBuf, len: usize) -> Self {
        ChunkFile { index, path, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records in the chunk.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Opens the chunk for sequential reading.
    pub fn open(&self, buf_size: Option<usize>) -> io::Result<ChunkReader> {
        let file = fs::File::open(&self.path)?;

        return Ok(ChunkReader {
            reader: buf_reader(file, buf_size),
        });
    }

    /// Removes the chunk file.
    pub fn remove(&self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }
}

/// Chunk writer. The file is released when the writer is dropped, so an early error never leaks the handle.
pub struct ChunkWriter {
    index: usize,
    path: PathBuf,
    len: usize,
    writer: io::BufWriter<fs::File>,
}

impl ChunkWriter {
    /// Creates (or truncates) a chunk file.
    pub fn create(path: PathBuf, index: usize, buf_size: Option<usize>) -> io::Result<Self> {
        let file = fs::File::create(&path)?;

        return Ok(ChunkWriter {
            index,
            path,
            len: 0,
            writer: buf_writer(file, buf_size),
        });
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Appends a record followed by a line terminator.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        write_line(&mut self.writer, line)?;
        self.len += 1;

        return Ok(());
    }

    /// Flushes and closes the chunk file.
    pub fn finish(self) -> io::Result<ChunkFile> {
        let ChunkWriter {
            index,
            path,
            len,
            mut writer,
        } = self;
        writer.flush()?;

        return Ok(ChunkFile::new(index, path, len));
    }
}

/// Forward-only chunk reader yielding one record per line.
///
/// Only the `\n` terminator written by [`ChunkWriter`] is stripped, any other trailing byte (`\r` included)
/// belongs to the record.
pub struct ChunkReader {
    reader: io::BufReader<fs::File>,
}

impl Iterator for ChunkReader {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();

        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Chunk sorter. Loads a whole chunk into memory, sorts it and replaces the chunk file with the sorted records.
#[derive(Default, Clone)]
pub struct ChunkSorter {
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Cancellation signal.
    interrupt: Option<Arc<AtomicBool>>,
}

impl ChunkSorter {
    pub fn new(rw_buf_size: Option<usize>, interrupt: Option<Arc<AtomicBool>>) -> Self {
        ChunkSorter {
            rw_buf_size,
            interrupt,
        }
    }

    /// Sorts the chunk in place using the provided compare function.
    ///
    /// Sorted records are written to a temporary sibling file which then replaces the chunk, so on failure the
    /// chunk file keeps its previous content.
    pub fn sort_by<F>(&self, chunk: &ChunkFile, compare: F) -> Result<(), SortError>
    where
        F: Fn(&str, &str) -> Ordering,
    {
        let mut records = self.load(chunk)?;

        log::debug!("sorting chunk {} ({} records) ...", chunk.index(), records.len());
        records.sort_by(|a, b| compare(a.as_str(), b.as_str()));

        self.store(chunk, records)
            .map_err(|err| SortError::io(Stage::ChunkSort, chunk.path(), err))?;

        return Ok(());
    }

    fn load(&self, chunk: &ChunkFile) -> Result<Vec<String>, SortError> {
        let mut records: Vec<String> = Vec::new();
        records
            .try_reserve_exact(chunk.len())
            .map_err(|_| SortError::OutOfMemory {
                path: chunk.path().into(),
                records: chunk.len(),
            })?;

        let reader = chunk
            .open(self.rw_buf_size)
            .map_err(|err| SortError::io(Stage::ChunkSort, chunk.path(), err))?;

        for line in reader {
            check_interrupted(&self.interrupt, Stage::ChunkSort)?;

            let line = line.map_err(|err| SortError::io(Stage::ChunkSort, chunk.path(), err))?;
            records.try_reserve(1).map_err(|_| SortError::OutOfMemory {
                path: chunk.path().into(),
                records: records.len(),
            })?;
            records.push(line);
        }

        if records.len() != chunk.len() {
            return Err(SortError::InvariantViolation {
                stage: Stage::ChunkSort,
                path: chunk.path().into(),
                reason: format!("chunk holds {} records, {} expected", records.len(), chunk.len()),
            });
        }

        return Ok(records);
    }

    fn store(&self, chunk: &ChunkFile, records: Vec<String>) -> io::Result<()> {
        let dir = match chunk.path().parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        // the temporary file is deleted on drop unless it has been persisted
        let tmp_file = tempfile::NamedTempFile::new_in(dir)?;
        let mut writer = buf_writer(tmp_file, self.rw_buf_size);
        for record in records {
            write_line(&mut writer, &record)?;
        }

        let tmp_file = writer.into_inner().map_err(|err| err.into_error())?;
        tmp_file.persist(chunk.path()).map_err(|err| err.error)?;

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use rstest::*;

    use super::{chunk_path, ChunkFile, ChunkSorter, ChunkWriter};
    use crate::sort::{SortError, Stage};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_chunk(dir: &Path, index: usize, lines: &[&str]) -> ChunkFile {
        let mut writer = ChunkWriter::create(chunk_path(&dir.join("input.txt"), index), index, None).unwrap();
        for line in lines {
            writer.write_line(line).unwrap();
        }

        writer.finish().unwrap()
    }

    #[rstest]
    #[case("input.txt", 0, "input.txt-part-0")]
    #[case("data/input.txt", 12, "data/input.txt-part-12")]
    fn test_chunk_path(#[case] prefix: &str, #[case] index: usize, #[case] expected: &str) {
        assert_eq!(chunk_path(Path::new(prefix), index), Path::new(expected));
    }

    #[rstest]
    fn test_chunk_writer(tmp_dir: tempfile::TempDir) {
        let chunk = write_chunk(tmp_dir.path(), 3, &["banana", "", "apple"]);

        assert_eq!(chunk.index(), 3);
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.path(), tmp_dir.path().join("input.txt-part-3"));
        assert_eq!(fs::read_to_string(chunk.path()).unwrap(), "banana\n\napple\n");

        let restored: Vec<String> = chunk.open(Some(16)).unwrap().map(Result::unwrap).collect();
        assert_eq!(restored, vec!["banana", "", "apple"]);
    }

    #[rstest]
    fn test_chunk_reader_keeps_carriage_returns(tmp_dir: tempfile::TempDir) {
        let chunk = write_chunk(tmp_dir.path(), 0, &["b\r", "\r", "a\r\r"]);

        assert_eq!(fs::read_to_string(chunk.path()).unwrap(), "b\r\n\r\na\r\r\n");

        let restored: Vec<String> = chunk.open(None).unwrap().map(Result::unwrap).collect();
        assert_eq!(restored, vec!["b\r", "\r", "a\r\r"]);

        ChunkSorter::default().sort_by(&chunk, str::cmp).unwrap();
        assert_eq!(fs::read_to_string(chunk.path()).unwrap(), "\r\na\r\r\nb\r\n");
    }

    #[rstest]
    fn test_chunk_sorter(tmp_dir: tempfile::TempDir) {
        let chunk = write_chunk(tmp_dir.path(), 0, &["banana", "apple", "cherry", "apple"]);

        ChunkSorter::default().sort_by(&chunk, str::cmp).unwrap();

        assert_eq!(
            fs::read_to_string(chunk.path()).unwrap(),
            "apple\napple\nbanana\ncherry\n"
        );
        // only the chunk itself is left, the temporary sibling has been persisted over it
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 1);
    }

    #[rstest]
    fn test_chunk_sorter_custom_order(tmp_dir: tempfile::TempDir) {
        let chunk = write_chunk(tmp_dir.path(), 0, &["1", "10", "9"]);

        ChunkSorter::new(Some(8), None)
            .sort_by(&chunk, |a, b| b.cmp(a))
            .unwrap();

        assert_eq!(fs::read_to_string(chunk.path()).unwrap(), "9\n10\n1\n");
    }

    #[rstest]
    fn test_chunk_sorter_length_mismatch(tmp_dir: tempfile::TempDir) {
        let chunk = write_chunk(tmp_dir.path(), 0, &["b", "a"]);
        fs::write(chunk.path(), "b\na\nc\n").unwrap();

        let result = ChunkSorter::default().sort_by(&chunk, str::cmp);

        match result {
            Err(err @ SortError::InvariantViolation { .. }) => assert_eq!(err.stage(), Some(Stage::ChunkSort)),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(fs::read_to_string(chunk.path()).unwrap(), "b\na\nc\n");
    }

    #[rstest]
    fn test_chunk_sorter_missing_file(tmp_dir: tempfile::TempDir) {
        let chunk = write_chunk(tmp_dir.path(), 0, &["a"]);
        chunk.remove().unwrap();

        let result = ChunkSorter::default().sort_by(&chunk, str::cmp);

        match result {
            Err(SortError::IO { stage, path, .. }) => {
                assert_eq!(stage, Stage::ChunkSort);
                assert_eq!(path, chunk.path());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[rstest]
    fn test_chunk_sorter_interrupted(tmp_dir: tempfile::TempDir) {
        let chunk = write_chunk(tmp_dir.path(), 0, &["b", "a"]);
        let interrupt = Arc::new(AtomicBool::new(true));

        let result = ChunkSorter::new(None, Some(interrupt)).sort_by(&chunk, str::cmp);

        assert!(matches!(result, Err(SortError::Interrupted(Stage::ChunkSort))));
        assert_eq!(fs::read_to_string(chunk.path()).unwrap(), "b\na\n");
    }
}
