//! Cumulative-duration index: prefix sums over a sequence's items, used
//! by the position resolver via binary search.
//!
//! Derived data, never stored on the model: rebuilt whenever a sequence's
//! item list changes (which, given the immutable model, means once per
//! construction), otherwise cacheable.

use splice_common::TimeUs;

use crate::item::MediaItem;

/// Result of locating a position within an indexed item list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Located {
    /// Index of the containing item.
    pub index: usize,
    /// Position within that item, in `[0, item_duration)`.
    pub local: TimeUs,
    /// Cumulative start of the item.
    pub item_start: TimeUs,
}

/// Monotonic prefix-sum of item durations.
#[derive(Clone, Debug)]
pub struct CumulativeIndex {
    /// `starts[i]` is the cumulative start of item `i`.
    starts: Vec<TimeUs>,
    /// Sum of all item durations.
    total: TimeUs,
}

impl CumulativeIndex {
    pub fn build(items: &[MediaItem]) -> Self {
        let mut starts = Vec::with_capacity(items.len());
        let mut acc = TimeUs::ZERO;
        for item in items {
            starts.push(acc);
            acc += item.duration();
        }
        Self { starts, total: acc }
    }

    pub fn total(&self) -> TimeUs {
        self.total
    }

    pub fn item_start(&self, index: usize) -> TimeUs {
        self.starts[index]
    }

    /// Locate the item whose `[start, start + duration)` interval contains
    /// `pos`.
    ///
    /// - Negative positions clamp to the first item's beginning.
    /// - A position exactly on an item boundary resolves to the start of
    ///   the **later** item (half-open intervals, no double counting).
    /// - Positions at or past the total duration return `None`; the
    ///   caller decides how to hold the last item.
    pub fn locate(&self, pos: TimeUs) -> Option<Located> {
        if self.starts.is_empty() {
            return None;
        }
        if pos >= self.total {
            return None;
        }
        let pos = pos.max(TimeUs::ZERO);

        // partition_point: number of items whose start is <= pos.
        let idx = self.starts.partition_point(|s| *s <= pos) - 1;
        Some(Located {
            index: idx,
            local: pos - self.starts[idx],
            item_start: self.starts[idx],
        })
    }

    /// The last item's index, if any.
    pub fn last_index(&self) -> Option<usize> {
        self.starts.len().checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::{Rational, SourceId};

    fn items() -> Vec<MediaItem> {
        vec![
            MediaItem::clip(SourceId::new("a"), TimeUs::from_millis(1_000), Rational::FPS_30),
            MediaItem::gap(TimeUs::from_millis(500)),
            MediaItem::clip(SourceId::new("b"), TimeUs::from_millis(2_000), Rational::FPS_30),
        ]
    }

    #[test]
    fn locate_inside_items() {
        let index = CumulativeIndex::build(&items());
        assert_eq!(index.total(), TimeUs::from_millis(3_500));

        let hit = index.locate(TimeUs::from_millis(250)).unwrap();
        assert_eq!(hit.index, 0);
        assert_eq!(hit.local, TimeUs::from_millis(250));

        let hit = index.locate(TimeUs::from_millis(1_200)).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.local, TimeUs::from_millis(200));

        let hit = index.locate(TimeUs::from_millis(3_499)).unwrap();
        assert_eq!(hit.index, 2);
        assert_eq!(hit.local, TimeUs::from_millis(1_999));
    }

    #[test]
    fn boundary_resolves_to_later_item() {
        let index = CumulativeIndex::build(&items());
        let hit = index.locate(TimeUs::from_millis(1_000)).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.local, TimeUs::ZERO);

        let hit = index.locate(TimeUs::from_millis(1_500)).unwrap();
        assert_eq!(hit.index, 2);
        assert_eq!(hit.local, TimeUs::ZERO);
    }

    #[test]
    fn negative_and_zero_resolve_to_first_item_start() {
        let index = CumulativeIndex::build(&items());
        let hit = index.locate(TimeUs::from_millis(-50)).unwrap();
        assert_eq!(hit.index, 0);
        assert_eq!(hit.local, TimeUs::ZERO);

        let hit = index.locate(TimeUs::ZERO).unwrap();
        assert_eq!(hit.index, 0);
        assert_eq!(hit.local, TimeUs::ZERO);
    }

    #[test]
    fn past_end_returns_none() {
        let index = CumulativeIndex::build(&items());
        assert!(index.locate(TimeUs::from_millis(3_500)).is_none());
        assert!(index.locate(TimeUs::from_millis(10_000)).is_none());
    }

    #[test]
    fn empty_index() {
        let index = CumulativeIndex::build(&[]);
        assert!(index.locate(TimeUs::ZERO).is_none());
        assert!(index.last_index().is_none());
    }
}
