//! Granularizer (`spec.md` §4.10, component C10): slices a time-ordered
//! cursor into bucket intervals.

use crate::cursor::{Cursor, ScalarCursor};
use crate::error::ExecutionError;
use crate::segment::TIME_COLUMN;
use crate::selector::ScalarSelector;
use crate::time::Interval;

/// A bucketing granularity, expressed as a millisecond period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
    Custom(i64),
}

impl Granularity {
    pub const fn millis(self) -> i64 {
        match self {
            Self::Hour => 3_600_000,
            Self::Day => 86_400_000,
            Self::Custom(ms) => ms,
        }
    }

    /// Truncates `t` down to the nearest multiple of this granularity,
    /// correct for negative timestamps (floor division, not truncation).
    pub fn truncate(self, t: i64) -> i64 {
        let g = self.millis();
        t.div_euclid(g) * g
    }
}

/// All bucket start times covering `[bound.start, bound.end)` at
/// `granularity`, in ascending order regardless of scan direction — callers
/// reverse for descending iteration.
pub fn bucket_starts(bound: Interval, granularity: Granularity) -> Vec<i64> {
    if bound.is_empty() {
        return vec![];
    }
    let g = granularity.millis();
    let mut starts = vec![];
    let mut bucket = granularity.truncate(bound.start);
    while bucket < bound.end {
        starts.push(bucket);
        bucket += g;
    }
    starts
}

/// Groups a time-ordered [`ScalarCursor`] into bucket intervals of
/// `granularity`.
pub struct Granularizer<'a, 'b> {
    cursor: &'a mut ScalarCursor<'b>,
    time_selector: Box<dyn ScalarSelector>,
    granularity: Granularity,
    descending: bool,
}

impl<'a, 'b> Granularizer<'a, 'b> {
    pub fn new(cursor: &'a mut ScalarCursor<'b>, granularity: Granularity, descending: bool) -> Self {
        let time_selector = cursor
            .column_selector_factory()
            .make_scalar_selector(TIME_COLUMN, cursor.shared_offset());
        Self {
            cursor,
            time_selector,
            granularity,
            descending,
        }
    }

    /// The bucket containing the cursor's current row, or `None` if the
    /// cursor is exhausted.
    pub fn bucket_start(&self) -> Option<i64> {
        if self.cursor.is_done() {
            return None;
        }
        let t = self
            .time_selector
            .get_long()
            .expect("__time is single-valued, non-null and always present");
        Some(self.granularity.truncate(t))
    }

    /// Advances the cursor through every row of the current bucket, stopping
    /// as soon as a row in a different bucket is observed (or the cursor is
    /// exhausted). The cursor's own row order is preserved within the
    /// bucket, per `spec.md` §4.10.
    pub fn advance_within_bucket(&mut self, uninterruptibly: bool) -> Result<(), ExecutionError> {
        let Some(bucket) = self.bucket_start() else {
            return Ok(());
        };
        loop {
            if uninterruptibly {
                self.cursor.advance_uninterruptibly();
            } else {
                self.cursor.advance()?;
            }
            match self.bucket_start() {
                Some(next) if next == bucket => continue,
                _ => return Ok(()),
            }
        }
    }

    /// Advances the cursor until its current bucket is `bucket`, or until
    /// doing so would overshoot it (meaning `bucket` has no rows at all).
    /// Used to skip empty buckets when iterating a granularity-derived
    /// bucket list rather than just following the data.
    pub fn advance_to_bucket(&mut self, bucket: i64) -> Result<(), ExecutionError> {
        loop {
            match self.bucket_start() {
                None => return Ok(()),
                Some(current) if current == bucket => return Ok(()),
                Some(current) => {
                    let overshot = if self.descending {
                        current < bucket
                    } else {
                        current > bucket
                    };
                    if overshot {
                        return Ok(());
                    }
                    self.cursor.advance()?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_cache::{ColumnCache, Closer};
    use crate::offset::{Ascending, Descending};
    use crate::selector::ColumnSelectorFactory;
    use crate::testutil::InMemorySegment;
    use crate::virtual_columns::VirtualColumns;

    #[test]
    fn truncate_handles_negative_timestamps() {
        assert_eq!(Granularity::Hour.truncate(3_600_000), 3_600_000);
        assert_eq!(Granularity::Hour.truncate(3_600_001), 3_600_000);
        assert_eq!(Granularity::Hour.truncate(-1), -3_600_000);
    }

    #[test]
    fn bucket_starts_cover_bound() {
        let bound = Interval::new(0, 3 * 3_600_000 + 1);
        let starts = bucket_starts(bound, Granularity::Hour);
        assert_eq!(starts, vec![0, 3_600_000, 7_200_000, 10_800_000]);
    }

    #[test]
    fn hourly_buckets_group_rows_s5_shape() {
        // Segment `[0,1,1,2,3]` with __time = i * 3_600_000, matching S5.
        let segment = InMemorySegment::builder()
            .time_column(vec![0, 3_600_000, 3_600_000, 7_200_000, 10_800_000])
            .build();
        let cache = ColumnCache::new(&segment);
        let closer = Closer::default();
        let vcs = VirtualColumns::default();
        let factory = ColumnSelectorFactory::new(&cache, &closer, &vcs);

        let mut cursor = crate::cursor::ScalarCursor::from_offset(
            Box::new(Descending::new(5)),
            factory,
        );

        let mut gran = Granularizer::new(&mut cursor, Granularity::Hour, true);
        let mut buckets = vec![];
        while let Some(b) = gran.bucket_start() {
            buckets.push(b);
            gran.advance_within_bucket(false).unwrap();
        }
        assert_eq!(buckets, vec![10_800_000, 7_200_000, 3_600_000]);
    }

    #[test]
    fn ascending_buckets_in_increasing_order() {
        let segment = InMemorySegment::builder()
            .time_column(vec![0, 3_600_000, 3_600_000, 7_200_000])
            .build();
        let cache = ColumnCache::new(&segment);
        let closer = Closer::default();
        let vcs = VirtualColumns::default();
        let factory = ColumnSelectorFactory::new(&cache, &closer, &vcs);
        let mut cursor =
            crate::cursor::ScalarCursor::from_offset(Box::new(Ascending::new(4)), factory);

        let mut gran = Granularizer::new(&mut cursor, Granularity::Hour, false);
        let mut buckets = vec![];
        while let Some(b) = gran.bucket_start() {
            buckets.push(b);
            gran.advance_within_bucket(false).unwrap();
        }
        assert_eq!(buckets, vec![0, 3_600_000, 7_200_000]);
    }
}
