//! Binary heap merger.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};

/// Merge error. Identifies the source that failed by its index.
#[derive(Debug)]
pub enum MergeError<E: Error> {
    /// Source read error.
    Source { chunk: usize, error: E },
    /// Source yielded an item smaller than the previous one.
    Unsorted { chunk: usize },
}

impl<E: Error> MergeError<E> {
    /// Returns the index of the failed source.
    pub fn chunk(&self) -> usize {
        match self {
            MergeError::Source { chunk, .. } => *chunk,
            MergeError::Unsorted { chunk } => *chunk,
        }
    }
}

impl<E: Error + 'static> Error for MergeError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            MergeError::Source { error, .. } => Some(error),
            MergeError::Unsorted { .. } => None,
        }
    }
}

impl<E: Error> Display for MergeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            MergeError::Source { chunk, error } => write!(f, "chunk {} read error: {}", chunk, error),
            MergeError::Unsorted { chunk } => write!(f, "chunk {} is not sorted", chunk),
        }
    }
}

/// Current head item of a source.
struct HeadItem<T, F> {
    item: T,
    chunk: usize,
    compare: F,
}

impl<T, F> PartialEq for HeadItem<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, F> Eq for HeadItem<T, F> where F: Fn(&T, &T) -> Ordering {}

impl<T, F> PartialOrd for HeadItem<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, F> Ord for HeadItem<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn cmp(&self, other: &Self) -> Ordering {
        // binary heap is max-heap by default so the order is reversed to convert it to min-heap,
        // equal items are popped in source index order
        (self.compare)(&other.item, &self.item).then_with(|| other.chunk.cmp(&self.chunk))
    }
}

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of chunks (inputs).
///
/// The merger stops after the first error: the item read before a failure is still returned,
/// then the error, then the iteration ends.
pub struct BinaryHeapMerger<T, E, F, C>
where
    E: Error,
    F: Fn(&T, &T) -> Ordering + Copy,
    C: IntoIterator<Item = Result<T, E>>,
{
    items: BinaryHeap<HeadItem<T, F>>,
    chunks: Vec<C::IntoIter>,
    compare: F,
    initiated: bool,
    pending_error: Option<MergeError<E>>,
    failed: bool,
}

impl<T, E, F, C> BinaryHeapMerger<T, E, F, C>
where
    E: Error,
    F: Fn(&T, &T) -> Ordering + Copy,
    C: IntoIterator<Item = Result<T, E>>,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk items should be sorted in ascending order according to `compare`, a source found out of order
    /// yields [`MergeError::Unsorted`].
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    /// * `compare` - Function to be used to compare items
    pub fn new<I>(chunks: I, compare: F) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let items = BinaryHeap::with_capacity(chunks.len());

        return BinaryHeapMerger {
            chunks,
            items,
            compare,
            initiated: false,
            pending_error: None,
            failed: false,
        };
    }

    fn fail(&mut self, err: MergeError<E>) -> Option<Result<T, MergeError<E>>> {
        self.failed = true;
        self.items.clear();

        return Some(Err(err));
    }
}

impl<T, E, F, C> Iterator for BinaryHeapMerger<T, E, F, C>
where
    E: Error,
    F: Fn(&T, &T) -> Ordering + Copy,
    C: IntoIterator<Item = Result<T, E>>,
{
    type Item = Result<T, MergeError<E>>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(err) = self.pending_error.take() {
            return self.fail(err);
        }

        if !self.initiated {
            self.initiated = true;
            for chunk in 0..self.chunks.len() {
                match self.chunks[chunk].next() {
                    Some(Ok(item)) => self.items.push(HeadItem {
                        item,
                        chunk,
                        compare: self.compare,
                    }),
                    Some(Err(error)) => return self.fail(MergeError::Source { chunk, error }),
                    None => {}
                }
            }
        }

        let head = self.items.pop()?;
        match self.chunks[head.chunk].next() {
            Some(Ok(item)) if (self.compare)(&item, &head.item) == Ordering::Less => {
                self.pending_error = Some(MergeError::Unsorted { chunk: head.chunk });
            }
            Some(Ok(item)) => self.items.push(HeadItem {
                item,
                chunk: head.chunk,
                compare: self.compare,
            }),
            Some(Err(error)) => {
                self.pending_error = Some(MergeError::Source {
                    chunk: head.chunk,
                    error,
                });
            }
            None => {}
        }

        return Some(Ok(head.item));
    }
}

impl<T, E, F, C> Debug for BinaryHeapMerger<T, E, F, C>
where
    E: Error,
    F: Fn(&T, &T) -> Ordering + Copy,
    C: IntoIterator<Item = Result<T, E>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryHeapMerger")
            .field("chunks", &self.chunks.len())
            .field("active", &self.items.len())
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use std::error::Error;
    use std::io::{self, ErrorKind};

    use super::{BinaryHeapMerger, MergeError};

    #[rstest]
    #[case(
        vec![],
        vec![],
    )]
    #[case(
        vec![
            vec![],
            vec![]
        ],
        vec![],
    )]
    #[case(
        vec![
            vec![Ok(4), Ok(5), Ok(7)],
            vec![Ok(1), Ok(6)],
            vec![Ok(3)],
            vec![],
        ],
        vec![Ok(1), Ok(3), Ok(4), Ok(5), Ok(6), Ok(7)],
    )]
    #[case(
        vec![
            vec![Ok(1), Ok(2), Ok(2), Ok(9)],
        ],
        vec![Ok(1), Ok(2), Ok(2), Ok(9)],
    )]
    #[case(
        vec![
            vec![Result::Err(io::Error::new(ErrorKind::Other, "test error"))]
        ],
        vec![
            Result::Err(MergeError::Source { chunk: 0, error: io::Error::new(ErrorKind::Other, "test error") })
        ],
    )]
    #[case(
        vec![
            vec![Ok(3), Result::Err(io::Error::new(ErrorKind::Other, "test error")), Ok(4)],
            vec![Ok(1), Ok(2)],
        ],
        vec![
            Ok(1),
            Ok(2),
            Ok(3),
            Result::Err(MergeError::Source { chunk: 0, error: io::Error::new(ErrorKind::Other, "test error") }),
        ],
    )]
    #[case(
        vec![
            vec![Ok(1), Ok(5)],
            vec![Ok(2), Ok(0), Ok(7)],
        ],
        vec![
            Ok(1),
            Ok(2),
            Result::Err(MergeError::Unsorted { chunk: 1 }),
        ],
    )]
    fn test_merger(
        #[case] chunks: Vec<Vec<Result<i32, io::Error>>>,
        #[case] expected_result: Vec<Result<i32, MergeError<io::Error>>>,
    ) {
        let merger = BinaryHeapMerger::new(chunks, |a: &i32, b: &i32| a.cmp(b));
        let actual_result = merger.collect();
        assert!(
            compare_vectors_of_result(&actual_result, &expected_result),
            "actual={:?}, expected={:?}",
            actual_result,
            expected_result
        );
    }

    #[test]
    fn test_merger_ties_broken_by_chunk_index() {
        let chunks = vec![
            vec![Ok::<_, io::Error>((1, 'c')), Ok((2, 'c'))],
            vec![Ok((1, 'a')), Ok((2, 'a'))],
            vec![Ok((0, 'b')), Ok((1, 'b'))],
        ];

        let merger = BinaryHeapMerger::new(chunks, |a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0));
        let actual_result: Vec<(i32, char)> = merger.map(Result::unwrap).collect();

        assert_eq!(
            actual_result,
            vec![(0, 'b'), (1, 'c'), (1, 'a'), (1, 'b'), (2, 'c'), (2, 'a')]
        );
    }

    #[test]
    fn test_merger_custom_order() {
        let chunks = vec![
            vec![Ok::<_, io::Error>("cherry"), Ok("apple")],
            vec![Ok("date"), Ok("banana")],
        ];

        let merger = BinaryHeapMerger::new(chunks, |a: &&str, b: &&str| b.cmp(a));
        let actual_result: Vec<&str> = merger.map(Result::unwrap).collect();

        assert_eq!(actual_result, vec!["date", "cherry", "banana", "apple"]);
    }

    fn compare_vectors_of_result<T: PartialEq, E: Error + 'static>(
        actual: &Vec<Result<T, MergeError<E>>>,
        expected: &Vec<Result<T, MergeError<E>>>,
    ) -> bool {
        actual.len() == expected.len()
            && actual
                .into_iter()
                .zip(expected)
                .all(
                    |(actual_result, expected_result)| match (actual_result, expected_result) {
                        (Ok(actual_result), Ok(expected_result)) if actual_result == expected_result => true,
                        (Err(actual_err), Err(expected_err)) => actual_err.to_string() == expected_err.to_string(),
                        _ => false,
                    },
                )
    }
}
