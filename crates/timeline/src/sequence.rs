//! Sequences: ordered item lists, optionally looping.

use serde::{Deserialize, Serialize};

use splice_common::TimeUs;

use crate::item::MediaItem;

/// An ordered list of items played back to back.
///
/// A looping sequence is conceptually repeated until it matches (or
/// exceeds, and is truncated to) the duration of the longest non-looping
/// sequence in its composition. The stored item list is never mutated to
/// achieve this.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    items: Vec<MediaItem>,
    looping: bool,
}

impl Sequence {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self {
            items,
            looping: false,
        }
    }

    pub fn looping(items: Vec<MediaItem>) -> Self {
        Self {
            items,
            looping: true,
        }
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Duration of one pass over the stored item list.
    pub fn single_pass_duration(&self) -> TimeUs {
        self.items
            .iter()
            .fold(TimeUs::ZERO, |acc, item| acc + item.duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::{Rational, SourceId};

    #[test]
    fn single_pass_duration_sums_items() {
        let seq = Sequence::new(vec![
            MediaItem::clip(SourceId::new("a"), TimeUs::from_millis(1_000), Rational::FPS_30),
            MediaItem::gap(TimeUs::from_millis(500)),
            MediaItem::image(SourceId::new("b"), TimeUs::from_millis(200), Rational::FPS_30),
        ]);
        assert_eq!(seq.single_pass_duration(), TimeUs::from_millis(1_700));
        assert!(!seq.is_looping());
    }

    #[test]
    fn empty_sequence() {
        let seq = Sequence::new(vec![]);
        assert!(seq.is_empty());
        assert_eq!(seq.single_pass_duration(), TimeUs::ZERO);
    }
}
