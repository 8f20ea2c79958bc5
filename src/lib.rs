//! `line-ext-sort` is an external sort implementation for newline-delimited text files.
//!
//! A text file with more lines than can be sorted in memory is sorted on disk: it is cut into chunk files small
//! enough to be sorted one at a time in RAM, and the sorted chunks are then merged line by line into the result.
//! Memory use is bounded by the chunk size (`max_lines`) plus one buffered line per chunk during the merge.
//! See [External Sorting](https://en.wikipedia.org/wiki/External_sorting) for background.
//!
//! # Overview
//!
//! The sorting pipeline runs in four sequential stages:
//!
//! * **Split:**
//!   the input is split into chunk files of at most `max_lines` records each, named `<input>-part-<N>`.
//! * **Chunk sort:**
//!   every chunk is loaded into memory, sorted and written back in place.
//! * **Merge:**
//!   sorted chunks are merged into the output file by a binary heap k-way merge in *m* \* log(*n*) time.
//! * **Cleanup:**
//!   chunk files are removed. Removal failures are reported but do not fail the sorting.
//!
//! Lines are compared byte-wise (which is the Unicode code point order for UTF-8 text) unless a custom compare
//! function is provided. Note that this order is not numeric: `"10"` sorts before `"9"`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use log;
//!
//! use line_ext_sort::{ExternalSorter, ExternalSorterBuilder};
//!
//! fn main() {
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_max_lines(1_000_000)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter.sort_file(Path::new("input.txt"), Path::new("output.txt")).unwrap();
//!     log::info!("{} lines sorted", summary.records);
//! }
//! ```

pub mod chunk;
pub mod merger;
pub mod sort;
pub mod splitter;

pub use chunk::{ChunkFile, ChunkReader, ChunkSorter, ChunkWriter};
pub use merger::{BinaryHeapMerger, MergeError};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortSummary, Stage, DEFAULT_MAX_LINES};
pub use splitter::Splitter;
