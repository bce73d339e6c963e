//! Ordered, non-overlapping presentation time ranges.

use std::fmt;

/// A single buffered interval in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Snapshot of a buffer's buffered ranges.
///
/// Ranges are kept sorted by start time and never overlap. Adjacent ranges
/// separated by no more than the merge tolerance passed to [`TimeRanges::add`]
/// are coalesced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<TimeRange> {
        self.ranges.get(index).copied()
    }

    /// End time of the first range, the value append drivers test against.
    pub fn first_end(&self) -> Option<f64> {
        self.ranges.first().map(|r| r.end)
    }

    /// End time of the last range.
    pub fn last_end(&self) -> Option<f64> {
        self.ranges.last().map(|r| r.end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    /// Returns the range containing `time`, if any.
    pub fn find(&self, time: f64) -> Option<TimeRange> {
        self.ranges.iter().copied().find(|r| r.contains(time))
    }

    /// Inserts `[start, end)` and coalesces with neighbours whose gap is at
    /// most `tolerance` seconds.
    pub fn add(&mut self, start: f64, end: f64, tolerance: f64) {
        if end <= start {
            return;
        }

        let mut merged = TimeRange::new(start, end);
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);

        for range in self.ranges.drain(..) {
            let disjoint =
                range.end + tolerance < merged.start || merged.end + tolerance < range.start;
            if disjoint {
                kept.push(range);
            } else {
                merged.start = merged.start.min(range.start);
                merged.end = merged.end.max(range.end);
            }
        }

        kept.push(merged);
        kept.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.ranges = kept;
    }

    /// Removes `[start, end)` from every range, splitting where needed.
    pub fn remove(&mut self, start: f64, end: f64) {
        if end <= start {
            return;
        }

        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for range in self.ranges.drain(..) {
            if range.end <= start || range.start >= end {
                kept.push(range);
                continue;
            }
            if range.start < start {
                kept.push(TimeRange::new(range.start, start));
            }
            if range.end > end {
                kept.push(TimeRange::new(end, range.end));
            }
        }
        self.ranges = kept;
    }
}

impl FromIterator<TimeRange> for TimeRanges {
    fn from_iter<I: IntoIterator<Item = TimeRange>>(iter: I) -> Self {
        let mut ranges = TimeRanges::new();
        for range in iter {
            ranges.add(range.start, range.end, 0.0);
        }
        ranges
    }
}

impl fmt::Display for TimeRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{:.3}, {:.3})", range.start, range.end)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_disjoint_ranges_sorted() {
        let mut ranges = TimeRanges::new();
        ranges.add(4.0, 5.0, 0.0);
        ranges.add(0.0, 1.0, 0.0);
        ranges.add(2.0, 3.0, 0.0);

        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges.get(0), Some(TimeRange::new(0.0, 1.0)));
        assert_eq!(ranges.get(2), Some(TimeRange::new(4.0, 5.0)));
    }

    #[test]
    fn test_add_bridges_gap_and_coalesces_neighbours() {
        let mut ranges = TimeRanges::new();
        ranges.add(0.0, 1.0, 0.0);
        ranges.add(2.0, 3.0, 0.0);
        ranges.add(1.0, 2.0, 0.0);

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges.first_end(), Some(3.0));
    }

    #[test]
    fn test_tolerance_controls_gap_merge() {
        let mut ranges = TimeRanges::new();
        ranges.add(0.0, 1.0, 0.05);
        ranges.add(1.01, 2.01, 0.05);
        assert_eq!(ranges.len(), 1);

        ranges.add(2.31, 3.31, 0.05);
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn test_remove_splits_range() {
        let mut ranges: TimeRanges = [TimeRange::new(0.0, 10.0)].into_iter().collect();
        ranges.remove(4.0, 6.0);

        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges.get(0), Some(TimeRange::new(0.0, 4.0)));
        assert_eq!(ranges.get(1), Some(TimeRange::new(6.0, 10.0)));

        ranges.remove(0.0, f64::INFINITY);
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_find_uses_half_open_intervals() {
        let ranges: TimeRanges = [TimeRange::new(0.0, 2.0)].into_iter().collect();
        assert!(ranges.find(1.999).is_some());
        assert!(ranges.find(2.0).is_none());
    }
}
