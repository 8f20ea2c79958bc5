//! External sorter.

use log;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;

use crate::chunk::{buf_writer, write_line, ChunkFile, ChunkReader, ChunkSorter};
use crate::merger::{BinaryHeapMerger, MergeError};
use crate::splitter::Splitter;

/// Default maximum number of records per chunk.
pub const DEFAULT_MAX_LINES: usize = 1_000_000;

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Input splitting into chunks.
    Split,
    /// In-memory sorting of a single chunk.
    ChunkSort,
    /// K-way merge of sorted chunks.
    Merge,
    /// Chunk files removal.
    Cleanup,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Split => "split",
            Stage::ChunkSort => "chunk sort",
            Stage::Merge => "merge",
            Stage::Cleanup => "cleanup",
        })
    }
}

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Sorter configuration is not valid.
    InvalidConfig(String),
    /// File open, read, write or delete error.
    IO {
        stage: Stage,
        path: PathBuf,
        source: io::Error,
    },
    /// Chunk records do not fit in memory. A smaller chunk size should be used.
    OutOfMemory { path: PathBuf, records: usize },
    /// Internal consistency check failed.
    InvariantViolation {
        stage: Stage,
        path: PathBuf,
        reason: String,
    },
    /// Sorting has been interrupted by the caller.
    Interrupted(Stage),
}

impl SortError {
    pub(crate) fn io(stage: Stage, path: &Path, source: io::Error) -> Self {
        SortError::IO {
            stage,
            path: path.into(),
            source,
        }
    }

    /// Returns the stage the error occurred at, if known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SortError::InvalidConfig(_) => None,
            SortError::IO { stage, .. } => Some(*stage),
            SortError::OutOfMemory { .. } => Some(Stage::ChunkSort),
            SortError::InvariantViolation { stage, .. } => Some(*stage),
            SortError::Interrupted(stage) => Some(*stage),
        }
    }
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::IO { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidConfig(reason) => write!(f, "invalid sorter configuration: {}", reason),
            SortError::IO { stage, path, source } => {
                write!(f, "{} stage I/O operation failed on {}: {}", stage, path.display(), source)
            }
            SortError::OutOfMemory { path, records } => write!(
                f,
                "chunk {} does not fit in memory ({} records loaded)",
                path.display(),
                records
            ),
            SortError::InvariantViolation { stage, path, reason } => {
                write!(f, "{} stage invariant violated in {}: {}", stage, path.display(), reason)
            }
            SortError::Interrupted(stage) => write!(f, "sorting interrupted at {} stage", stage),
        }
    }
}

pub(crate) fn check_interrupted(interrupt: &Option<Arc<AtomicBool>>, stage: Stage) -> Result<(), SortError> {
    match interrupt {
        Some(flag) if flag.load(atomic::Ordering::Relaxed) => Err(SortError::Interrupted(stage)),
        _ => Ok(()),
    }
}

/// Sorting result summary.
#[derive(Debug, Default)]
pub struct SortSummary {
    /// Number of records written to the output.
    pub records: usize,
    /// Number of chunks the input has been split into.
    pub chunks: usize,
    /// Chunk files that could not be removed after the merge.
    pub cleanup_failures: Vec<(PathBuf, io::Error)>,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder {
    /// Maximum number of records per chunk.
    max_lines: usize,
    /// Directory to be used to store chunk files.
    tmp_dir: Option<Box<Path>>,
    /// Input, chunk and output files read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Cancellation signal.
    interrupt: Option<Arc<AtomicBool>>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        ExternalSorter::new(self.max_lines, self.tmp_dir.as_deref(), self.rw_buf_size, self.interrupt)
    }

    /// Sets maximum number of records per chunk.
    pub fn with_max_lines(mut self, max_lines: usize) -> ExternalSorterBuilder {
        self.max_lines = max_lines;
        return self;
    }

    /// Sets directory to be used to store chunk files.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets files read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets cancellation signal. Sorting is aborted as soon as the flag is raised.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> ExternalSorterBuilder {
        self.interrupt = Some(interrupt);
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            max_lines: DEFAULT_MAX_LINES,
            tmp_dir: None,
            rw_buf_size: None,
            interrupt: None,
        }
    }
}

/// External sorter.
pub struct ExternalSorter {
    /// Directory to be used to store chunk files. Chunks are placed next to the input if not set.
    tmp_dir: Option<PathBuf>,
    /// Input, chunk and output files read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Cancellation signal.
    interrupt: Option<Arc<AtomicBool>>,
    splitter: Splitter,
    chunk_sorter: ChunkSorter,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `max_lines` - Maximum number of records per chunk. Larger values reduce merge fan-in but increase
    ///   memory consumption of the chunk sort.
    /// * `tmp_path` - Directory to be used to store chunk files. If parameter is [`None`] chunks are created
    ///   next to the input file.
    /// * `rw_buf_size` - Files read/write buffer size.
    /// * `interrupt` - Cancellation signal checked for every processed record.
    pub fn new(
        max_lines: usize,
        tmp_path: Option<&Path>,
        rw_buf_size: Option<usize>,
        interrupt: Option<Arc<AtomicBool>>,
    ) -> Result<Self, SortError> {
        if max_lines == 0 {
            return Err(SortError::InvalidConfig("maximum chunk size must be positive".to_string()));
        }
        if rw_buf_size == Some(0) {
            return Err(SortError::InvalidConfig("read/write buffer size must be positive".to_string()));
        }
        if let Some(tmp_path) = tmp_path {
            if !tmp_path.is_dir() {
                return Err(SortError::InvalidConfig(format!(
                    "{} is not a directory",
                    tmp_path.display()
                )));
            }
            log::info!("using {} as a temporary directory", tmp_path.display());
        }

        return Ok(ExternalSorter {
            tmp_dir: tmp_path.map(PathBuf::from),
            rw_buf_size,
            splitter: Splitter::new(max_lines, rw_buf_size, interrupt.clone()),
            chunk_sorter: ChunkSorter::new(rw_buf_size, interrupt.clone()),
            interrupt,
        });
    }

    /// Sorts the `input` file lines in byte-wise lexicographic order and writes them to the `output` file.
    ///
    /// # Arguments
    /// * `input` - File to be sorted
    /// * `output` - Result file, created or truncated
    pub fn sort_file(&self, input: &Path, output: &Path) -> Result<SortSummary, SortError> {
        self.sort_file_by(input, output, str::cmp)
    }

    /// Sorts the `input` file lines using a custom compare function and writes them to the `output` file.
    ///
    /// Chunks are left on disk if splitting or chunk sorting fails. If the merge fails the partially written
    /// output is removed. Chunk removal failures are not fatal, they are reported in the returned summary.
    ///
    /// # Arguments
    /// * `input` - File to be sorted
    /// * `output` - Result file, created or truncated
    /// * `compare` - Function to be used to compare lines
    pub fn sort_file_by<F>(&self, input: &Path, output: &Path, compare: F) -> Result<SortSummary, SortError>
    where
        F: Fn(&str, &str) -> Ordering + Copy,
    {
        let prefix = self.chunk_prefix(input)?;

        log::info!("splitting {} ...", input.display());
        let chunks = self.splitter.split_file(input, &prefix)?;

        log::info!("sorting {} chunk(s) ...", chunks.len());
        for chunk in &chunks {
            if let Err(err) = self.chunk_sorter.sort_by(chunk, compare) {
                log::error!("chunk sort failed, {} chunk file(s) left on disk", chunks.len());
                return Err(err);
            }
        }

        log::info!("merging {} chunk(s) into {} ...", chunks.len(), output.display());
        let records = match self.merge(&chunks, output, compare) {
            Ok(records) => records,
            Err(err) => {
                log::error!("merge failed, {} chunk file(s) left on disk", chunks.len());
                return Err(err);
            }
        };

        let cleanup_failures = self.cleanup(&chunks);
        log::info!("{} record(s) sorted", records);

        return Ok(SortSummary {
            records,
            chunks: chunks.len(),
            cleanup_failures,
        });
    }

    fn chunk_prefix(&self, input: &Path) -> Result<PathBuf, SortError> {
        let tmp_dir = match &self.tmp_dir {
            Some(tmp_dir) => tmp_dir,
            None => return Ok(input.to_path_buf()),
        };

        match input.file_name() {
            Some(file_name) => Ok(tmp_dir.join(file_name)),
            None => Err(SortError::InvalidConfig(format!(
                "{} does not name a file",
                input.display()
            ))),
        }
    }

    /// Merges sorted chunks into the output. The output is removed if it has been created and the merge failed.
    fn merge<F>(&self, chunks: &[ChunkFile], output: &Path, compare: F) -> Result<usize, SortError>
    where
        F: Fn(&str, &str) -> Ordering + Copy,
    {
        let mut readers = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let reader = chunk
                .open(self.rw_buf_size)
                .map_err(|err| SortError::io(Stage::Merge, chunk.path(), err))?;
            readers.push(reader);
        }

        let output_file = fs::File::create(output).map_err(|err| SortError::io(Stage::Merge, output, err))?;
        let result = self.write_merged(chunks, readers, output_file, output, compare);

        if result.is_err() {
            if let Err(err) = fs::remove_file(output) {
                log::warn!("partial output {} not removed: {}", output.display(), err);
            }
        }

        return result;
    }

    fn write_merged<F>(
        &self,
        chunks: &[ChunkFile],
        readers: Vec<ChunkReader>,
        output_file: fs::File,
        output: &Path,
        compare: F,
    ) -> Result<usize, SortError>
    where
        F: Fn(&str, &str) -> Ordering + Copy,
    {
        let mut output_writer = buf_writer(output_file, self.rw_buf_size);

        let mut records = 0;
        let merger = BinaryHeapMerger::new(readers, |a: &String, b: &String| compare(a.as_str(), b.as_str()));
        for line in merger {
            check_interrupted(&self.interrupt, Stage::Merge)?;

            let line = line.map_err(|err| Self::merge_error(chunks, err))?;
            write_line(&mut output_writer, &line).map_err(|err| SortError::io(Stage::Merge, output, err))?;
            records += 1;
        }

        output_writer
            .flush()
            .map_err(|err| SortError::io(Stage::Merge, output, err))?;

        return Ok(records);
    }

    fn merge_error(chunks: &[ChunkFile], err: MergeError<io::Error>) -> SortError {
        let path = chunks[err.chunk()].path();

        match err {
            MergeError::Source { error, .. } => SortError::io(Stage::Merge, path, error),
            MergeError::Unsorted { .. } => SortError::InvariantViolation {
                stage: Stage::Merge,
                path: path.into(),
                reason: "chunk records are out of order".to_string(),
            },
        }
    }

    /// Removes chunk files. Failures are logged and returned but never abort the sorting.
    fn cleanup(&self, chunks: &[ChunkFile]) -> Vec<(PathBuf, io::Error)> {
        let mut failures = Vec::new();

        for chunk in chunks {
            log::debug!("removing chunk {}", chunk.path().display());
            if let Err(err) = chunk.remove() {
                log::warn!("{} stage: chunk {} not removed: {}", Stage::Cleanup, chunk.path().display(), err);
                failures.push((chunk.path().to_path_buf(), err));
            }
        }

        return failures;
    }
}

impl Debug for ExternalSorter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSorter")
            .field("tmp_dir", &self.tmp_dir)
            .field("rw_buf_size", &self.rw_buf_size)
            .finish()
    }
}
