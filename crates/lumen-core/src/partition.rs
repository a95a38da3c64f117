//! Draw-range partitioning for parallel command recording.
//!
//! A frame's drawables are split into one contiguous range per worker
//! thread. Each range is recorded into its own secondary command buffer and
//! the buffers are replayed in range order, so the ranges must tile the
//! drawable list exactly and in order.

use std::ops::Range;

/// A half-open range `[start, end)` of drawable indices assigned to one worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DrawRange {
    /// First drawable index (inclusive).
    pub start: usize,
    /// One past the last drawable index.
    pub end: usize,
}

impl DrawRange {
    /// Create a new range.
    #[inline]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of drawables in the range.
    #[inline]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if the range holds no drawables.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Convert to a standard library range, e.g. for slicing.
    #[inline]
    pub const fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<DrawRange> for Range<usize> {
    fn from(range: DrawRange) -> Self {
        range.as_range()
    }
}

/// Split `draw_count` drawables across `thread_count` workers.
///
/// Returns exactly `thread_count` ranges, in worker order. With
/// `base = draw_count / thread_count`:
/// - if `base == 0` every drawable goes to range 0 and all other ranges are
///   the empty range `[draw_count, draw_count)`;
/// - otherwise the first `draw_count % thread_count` ranges hold `base + 1`
///   drawables and the rest hold `base`.
///
/// # Panics
/// Panics if `thread_count` is zero.
pub fn partition_draws(draw_count: usize, thread_count: usize) -> Vec<DrawRange> {
    assert!(thread_count > 0, "cannot partition draws across zero threads");

    let base = draw_count / thread_count;

    if base == 0 {
        let mut ranges = Vec::with_capacity(thread_count);
        ranges.push(DrawRange::new(0, draw_count));
        ranges.resize(thread_count, DrawRange::new(draw_count, draw_count));
        return ranges;
    }

    let remainder = draw_count % thread_count;
    let mut start = 0;

    (0..thread_count)
        .map(|thread| {
            let len = if thread < remainder { base + 1 } else { base };
            let range = DrawRange::new(start, start + len);
            start += len;
            range
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(ranges: &[DrawRange]) -> Vec<usize> {
        ranges.iter().map(DrawRange::len).collect()
    }

    #[test]
    fn ten_draws_four_threads() {
        let ranges = partition_draws(10, 4);

        assert_eq!(lengths(&ranges), vec![3, 3, 2, 2]);
        assert_eq!(
            ranges,
            vec![
                DrawRange::new(0, 3),
                DrawRange::new(3, 6),
                DrawRange::new(6, 8),
                DrawRange::new(8, 10),
            ]
        );
    }

    #[test]
    fn more_threads_than_draws() {
        let ranges = partition_draws(2, 8);

        assert_eq!(ranges.len(), 8);
        assert_eq!(ranges[0], DrawRange::new(0, 2));
        for range in &ranges[1..] {
            assert_eq!(*range, DrawRange::new(2, 2));
            assert!(range.is_empty());
        }
    }

    #[test]
    fn no_draws() {
        let ranges = partition_draws(0, 3);

        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(DrawRange::is_empty));
    }

    #[test]
    fn single_thread_takes_everything() {
        assert_eq!(partition_draws(17, 1), vec![DrawRange::new(0, 17)]);
    }

    #[test]
    fn even_split() {
        assert_eq!(lengths(&partition_draws(12, 4)), vec![3, 3, 3, 3]);
    }

    #[test]
    fn ranges_tile_the_draw_list() {
        for threads in 1..=16 {
            for draws in 0..=200 {
                let ranges = partition_draws(draws, threads);
                assert_eq!(ranges.len(), threads);

                let mut expected_start = 0;
                for range in &ranges {
                    if range.is_empty() {
                        continue;
                    }
                    assert_eq!(range.start, expected_start, "gap at {draws}/{threads}");
                    expected_start = range.end;
                }
                assert_eq!(expected_start, draws, "coverage at {draws}/{threads}");

                if draws >= threads {
                    let min = ranges.iter().map(DrawRange::len).min().unwrap_or(0);
                    let max = ranges.iter().map(DrawRange::len).max().unwrap_or(0);
                    assert!(max - min <= 1, "imbalance at {draws}/{threads}");
                } else {
                    assert_eq!(ranges[0].len(), draws);
                    assert!(ranges[1..].iter().all(DrawRange::is_empty));
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "zero threads")]
    fn zero_threads_panics() {
        let _ = partition_draws(4, 0);
    }
}
